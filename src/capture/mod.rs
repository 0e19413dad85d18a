pub mod gst_capture;

pub use gst_capture::GstCaptureSource;

use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// A decoded RGB8 frame.
///
/// Pixel data is shared, so cloning a frame is cheap and never copies the
/// image. Frames are immutable once captured.
#[derive(Debug, Clone)]
pub struct Frame {
    pub width: u32,
    pub height: u32,
    pub data: Arc<[u8]>,
    pub captured_at: DateTime<Utc>,
}

impl Frame {
    /// Wrap tightly packed RGB8 pixels captured now
    pub fn from_rgb(width: u32, height: u32, data: Vec<u8>) -> Result<Self> {
        let expected = width as usize * height as usize * 3;
        if data.len() != expected {
            return Err(Error::Capture(format!(
                "Frame buffer has {} bytes, expected {} for {}x{} RGB",
                data.len(),
                expected,
                width,
                height
            ))
            .into());
        }

        Ok(Self {
            width,
            height,
            data: Arc::from(data),
            captured_at: Utc::now(),
        })
    }

    /// Uniformly coloured frame, mostly useful for test sources
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Self {
        let data: Vec<u8> = rgb
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 3)
            .collect();

        Self {
            width,
            height,
            data: Arc::from(data),
            captured_at: Utc::now(),
        }
    }

    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 3;
        Some([
            self.data[offset],
            self.data[offset + 1],
            self.data[offset + 2],
        ])
    }
}

/// Opens capture sessions for camera source addresses
#[async_trait]
pub trait CaptureSource: Send + Sync {
    async fn open(&self, source: &str) -> Result<Box<dyn CaptureSession>>;
}

/// A live, exclusively owned connection to one video source
#[async_trait]
pub trait CaptureSession: Send {
    /// Read the next frame. An error means the stream ended or dropped.
    async fn read(&mut self) -> Result<Frame>;

    /// Stop the underlying stream. Reads after release fail.
    fn release(&mut self);
}
