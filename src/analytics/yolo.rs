//! YOLOv8 detector running an ONNX export through tract.
//!
//! The model is loaded and optimised once. Inference runs on the blocking
//! thread pool so a slow model never stalls other cameras' loops.

use crate::analytics::detector::{BoundingBox, Detection, Detector, ObjectClass};
use crate::capture::Frame;
use crate::config::DetectorConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use image::imageops::FilterType;
use image::RgbImage;
use log::info;
use std::sync::Arc;
use tract_onnx::prelude::*;

type YoloModel = RunnableModel<TypedFact, Box<dyn TypedOp>, TypedModel>;

/// Object detector over a YOLOv8 ONNX model
pub struct YoloDetector {
    model: Arc<YoloModel>,
    input_size: u32,
    confidence_threshold: f32,
    iou_threshold: f32,
}

impl YoloDetector {
    /// Load and optimise the model named by the configuration
    pub fn load(config: &DetectorConfig) -> Result<Self> {
        info!("Loading detection model from {}", config.model_path.display());

        let size = config.input_size as usize;
        let model = tract_onnx::onnx()
            .model_for_path(&config.model_path)
            .map_err(|e| Error::Detection(format!("Failed to read model: {}", e)))?
            .with_input_fact(0, f32::fact([1, 3, size, size]).into())
            .map_err(|e| Error::Detection(format!("Unexpected model input: {}", e)))?
            .into_optimized()
            .map_err(|e| Error::Detection(format!("Failed to optimise model: {}", e)))?
            .into_runnable()
            .map_err(|e| Error::Detection(format!("Failed to prepare model: {}", e)))?;

        info!("Detection model ready ({}x{} input)", size, size);

        Ok(Self {
            model: Arc::new(model),
            input_size: config.input_size,
            confidence_threshold: config.confidence_threshold,
            iou_threshold: config.iou_threshold,
        })
    }
}

#[async_trait]
impl Detector for YoloDetector {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>> {
        let model = Arc::clone(&self.model);
        let frame = frame.clone();
        let input_size = self.input_size;
        let confidence_threshold = self.confidence_threshold;
        let iou_threshold = self.iou_threshold;

        tokio::task::spawn_blocking(move || {
            let input = preprocess(&frame, input_size)?;
            let outputs = model
                .run(tvec!(input.into()))
                .map_err(|e| Error::Detection(format!("Inference failed: {}", e)))?;
            let output = outputs[0]
                .to_array_view::<f32>()
                .map_err(|e| Error::Detection(format!("Unexpected output type: {}", e)))?;

            let scale_x = frame.width as f32 / input_size as f32;
            let scale_y = frame.height as f32 / input_size as f32;
            let candidates = decode_output(output, confidence_threshold, scale_x, scale_y)?;

            Ok(clamp_to_frame(
                non_max_suppression(candidates, iou_threshold),
                frame.width,
                frame.height,
            ))
        })
        .await
        .map_err(|e| Error::Internal(format!("Detection task failed: {}", e)))?
    }
}

/// Resize to the square model input and lay out as normalised NCHW
fn preprocess(frame: &Frame, input_size: u32) -> Result<Tensor> {
    let image = RgbImage::from_raw(frame.width, frame.height, frame.data.to_vec())
        .ok_or_else(|| Error::Detection("Frame buffer does not match its size".to_string()))?;
    let resized = image::imageops::resize(&image, input_size, input_size, FilterType::Triangle);

    let size = input_size as usize;
    let tensor: Tensor = tract_ndarray::Array4::from_shape_fn((1, 3, size, size), |(_, c, y, x)| {
        resized[(x as u32, y as u32)][c] as f32 / 255.0
    })
    .into();

    Ok(tensor)
}

/// Decode a `[1, 4 + classes, anchors]` YOLOv8 output into frame-space detections
fn decode_output(
    output: tract_ndarray::ArrayViewD<f32>,
    confidence_threshold: f32,
    scale_x: f32,
    scale_y: f32,
) -> Result<Vec<Detection>> {
    let shape = output.shape().to_vec();
    if shape.len() != 3 || shape[0] != 1 || shape[1] <= 4 {
        return Err(Error::Detection(format!("Unexpected output shape {:?}", shape)).into());
    }

    let classes = shape[1] - 4;
    let anchors = shape[2];
    let mut detections = Vec::new();

    for i in 0..anchors {
        let (class_index, score) = (0..classes)
            .map(|c| (c, output[[0, 4 + c, i]]))
            .fold((0, f32::MIN), |best, candidate| {
                if candidate.1 > best.1 {
                    candidate
                } else {
                    best
                }
            });

        if score < confidence_threshold {
            continue;
        }

        let cx = output[[0, 0, i]];
        let cy = output[[0, 1, i]];
        let w = output[[0, 2, i]];
        let h = output[[0, 3, i]];

        detections.push(Detection {
            class: ObjectClass::from_coco_index(class_index),
            confidence: score,
            bbox: BoundingBox::new(
                (cx - w / 2.0) * scale_x,
                (cy - h / 2.0) * scale_y,
                (cx + w / 2.0) * scale_x,
                (cy + h / 2.0) * scale_y,
            ),
        });
    }

    Ok(detections)
}

/// Greedy per-class suppression, highest confidence first
fn non_max_suppression(mut candidates: Vec<Detection>, iou_threshold: f32) -> Vec<Detection> {
    candidates.sort_by(|a, b| b.confidence.total_cmp(&a.confidence));

    let mut kept: Vec<Detection> = Vec::with_capacity(candidates.len());
    for candidate in candidates {
        let suppressed = kept
            .iter()
            .any(|k| k.class == candidate.class && k.bbox.iou(&candidate.bbox) > iou_threshold);
        if !suppressed {
            kept.push(candidate);
        }
    }

    kept
}

fn clamp_to_frame(detections: Vec<Detection>, width: u32, height: u32) -> Vec<Detection> {
    let max_x = width.saturating_sub(1) as f32;
    let max_y = height.saturating_sub(1) as f32;

    detections
        .into_iter()
        .map(|mut d| {
            d.bbox.x1 = d.bbox.x1.clamp(0.0, max_x);
            d.bbox.y1 = d.bbox.y1.clamp(0.0, max_y);
            d.bbox.x2 = d.bbox.x2.clamp(0.0, max_x);
            d.bbox.y2 = d.bbox.y2.clamp(0.0, max_y);
            d
        })
        .collect()
}
