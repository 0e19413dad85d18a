use crate::capture::{CaptureSession, CaptureSource, Frame};
use crate::config::CaptureConfig;
use crate::error::Error;
use anyhow::Result;
use async_trait::async_trait;
use gstreamer as gst;
use gstreamer::prelude::*;
use gstreamer_app as gst_app;
use gstreamer_video as gst_video;
use log::{debug, info, warn};
use std::path::PathBuf;
use std::time::Duration;

const APPSINK_NAME: &str = "frames";
const URI_SCHEMES: [&str; 5] = ["rtsp", "rtsps", "http", "https", "file"];

/// Kind of video source a camera address points at
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceKind {
    /// Anything `uridecodebin` understands: rtsp, http, file URIs
    Uri(url::Url),
    /// Local capture device by index
    Device(u32),
    /// Generated test pattern
    TestPattern(u32),
    /// Path to a video file on disk
    File(PathBuf),
}

impl SourceKind {
    /// Determine the source kind from a camera source address.
    /// Addresses with a known scheme must be well-formed URLs.
    pub fn parse(source: &str) -> Result<Self, Error> {
        let source = source.trim();

        if source.chars().any(|c| c.is_control() || c == '"') {
            return Err(Error::Validation(format!(
                "Source address contains forbidden characters: {:?}",
                source
            )));
        }

        if let Some((scheme, _)) = source.split_once("://") {
            if URI_SCHEMES.contains(&scheme.to_ascii_lowercase().as_str()) {
                let uri = url::Url::parse(source).map_err(|e| {
                    Error::Validation(format!("Invalid source URL {:?}: {}", source, e))
                })?;
                return Ok(SourceKind::Uri(uri));
            }
        }

        let kind = if source == "test" {
            SourceKind::TestPattern(0)
        } else if let Some(pattern) = source.strip_prefix("test:") {
            SourceKind::TestPattern(pattern.parse::<u32>().unwrap_or(0))
        } else if let Ok(index) = source.parse::<u32>() {
            SourceKind::Device(index)
        } else {
            SourceKind::File(PathBuf::from(source))
        };
        Ok(kind)
    }

    /// Resolve file paths to a `file://` URI
    fn uri(&self) -> Result<Option<url::Url>> {
        match self {
            SourceKind::Uri(uri) => Ok(Some(uri.clone())),
            SourceKind::File(path) => {
                let absolute = std::fs::canonicalize(path).map_err(|e| {
                    Error::Capture(format!("Video file {} not accessible: {}", path.display(), e))
                })?;
                let uri = url::Url::from_file_path(&absolute).map_err(|_| {
                    Error::Capture(format!("Cannot build URI for {}", absolute.display()))
                })?;
                Ok(Some(uri))
            }
            SourceKind::Device(_) | SourceKind::TestPattern(_) => Ok(None),
        }
    }

    /// Element producing raw video for this source
    fn build_source(&self) -> Result<gst::Element> {
        let element = match (self, self.uri()?) {
            (_, Some(uri)) => gst::ElementFactory::make("uridecodebin")
                .property("uri", uri.as_str())
                .build()?,
            (SourceKind::TestPattern(pattern), None) => gst::ElementFactory::make("videotestsrc")
                .property_from_str("pattern", &pattern.to_string())
                .property("is-live", true)
                .build()?,
            (SourceKind::Device(index), None) => device_source(*index)?,
            (kind, None) => {
                return Err(Error::Capture(format!("No source element for {:?}", kind)).into())
            }
        };
        Ok(element)
    }
}

#[cfg(target_os = "macos")]
fn device_source(index: u32) -> Result<gst::Element> {
    Ok(gst::ElementFactory::make("avfvideosrc")
        .property("device-index", index as i32)
        .build()?)
}

#[cfg(not(target_os = "macos"))]
fn device_source(index: u32) -> Result<gst::Element> {
    Ok(gst::ElementFactory::make("v4l2src")
        .property("device", format!("/dev/video{}", index))
        .build()?)
}

/// Source element, then `videoconvert` into an RGB appsink
fn build_pipeline(kind: &SourceKind) -> Result<(gst::Pipeline, gst_app::AppSink)> {
    let pipeline = gst::Pipeline::new();
    let source = kind.build_source()?;
    let convert = gst::ElementFactory::make("videoconvert").build()?;
    let appsink = gst_app::AppSink::builder()
        .name(APPSINK_NAME)
        .caps(
            &gst_video::VideoCapsBuilder::new()
                .format(gst_video::VideoFormat::Rgb)
                .build(),
        )
        .max_buffers(1)
        .drop(true)
        .sync(false)
        .build();

    pipeline.add_many([&source, &convert, appsink.upcast_ref()])?;
    convert.link(&appsink)?;

    if source.static_pad("src").is_some() {
        source.link(&convert)?;
    } else {
        // Decoder pads appear once the stream type is known
        let convert_weak = convert.downgrade();
        source.connect_pad_added(move |_, src_pad| {
            let Some(convert) = convert_weak.upgrade() else {
                return;
            };
            let is_video = src_pad
                .current_caps()
                .and_then(|caps| caps.structure(0).map(|s| s.name().starts_with("video/")))
                .unwrap_or(false);
            if !is_video {
                return;
            }
            let Some(sink_pad) = convert.static_pad("sink") else {
                return;
            };
            if sink_pad.is_linked() {
                return;
            }
            if let Err(e) = src_pad.link(&sink_pad) {
                warn!("Failed to link decoded video pad: {:?}", e);
            }
        });
    }

    Ok((pipeline, appsink))
}

/// Capture source backed by GStreamer pipelines
pub struct GstCaptureSource {
    open_timeout: Duration,
    read_timeout: Duration,
}

impl GstCaptureSource {
    pub fn new(config: &CaptureConfig) -> Self {
        Self {
            open_timeout: Duration::from_secs(config.open_timeout_secs),
            read_timeout: Duration::from_secs(config.read_timeout_secs),
        }
    }
}

#[async_trait]
impl CaptureSource for GstCaptureSource {
    async fn open(&self, source: &str) -> Result<Box<dyn CaptureSession>> {
        let kind = SourceKind::parse(source)?;
        debug!("Creating capture pipeline for {:?}", kind);

        let open_timeout = self.open_timeout;
        let read_timeout = self.read_timeout;
        let session = tokio::task::spawn_blocking(move || {
            GstCaptureSession::start(&kind, open_timeout, read_timeout)
        })
        .await
        .map_err(|e| Error::Internal(format!("Capture open task failed: {}", e)))??;

        Ok(Box::new(session))
    }
}

/// One playing pipeline with an appsink at its end
pub struct GstCaptureSession {
    pipeline: gst::Pipeline,
    appsink: gst_app::AppSink,
    read_timeout: Duration,
    released: bool,
}

impl GstCaptureSession {
    fn start(kind: &SourceKind, open_timeout: Duration, read_timeout: Duration) -> Result<Self> {
        gst::init().map_err(|e| Error::Capture(format!("GStreamer init failed: {}", e)))?;

        let (pipeline, appsink) = build_pipeline(kind)
            .map_err(|e| Error::Capture(format!("Failed to build pipeline: {}", e)))?;

        if let Err(e) = pipeline.set_state(gst::State::Playing) {
            let reason = bus_error(&pipeline).unwrap_or_else(|| e.to_string());
            let _ = pipeline.set_state(gst::State::Null);
            return Err(Error::Capture(format!("Failed to start pipeline: {}", reason)).into());
        }

        let (result, state, _) =
            pipeline.state(gst::ClockTime::from_mseconds(open_timeout.as_millis() as u64));
        if result.is_err() || state != gst::State::Playing {
            let reason = bus_error(&pipeline)
                .unwrap_or_else(|| format!("pipeline stuck in {:?}", state));
            let _ = pipeline.set_state(gst::State::Null);
            return Err(Error::Capture(format!("Failed to open source: {}", reason)).into());
        }

        info!("Capture pipeline playing");

        Ok(Self {
            pipeline,
            appsink,
            read_timeout,
            released: false,
        })
    }
}

#[async_trait]
impl CaptureSession for GstCaptureSession {
    async fn read(&mut self) -> Result<Frame> {
        if self.released {
            return Err(Error::Capture("Session released".to_string()).into());
        }

        let appsink = self.appsink.clone();
        let timeout = gst::ClockTime::from_mseconds(self.read_timeout.as_millis() as u64);
        let sample = tokio::task::spawn_blocking(move || appsink.try_pull_sample(timeout))
            .await
            .map_err(|e| Error::Internal(format!("Frame read task failed: {}", e)))?;

        match sample {
            Some(sample) => frame_from_sample(&sample),
            None if self.appsink.is_eos() => {
                Err(Error::Capture("End of stream".to_string()).into())
            }
            None => {
                let reason = bus_error(&self.pipeline)
                    .unwrap_or_else(|| "Timed out waiting for a frame".to_string());
                Err(Error::Capture(reason).into())
            }
        }
    }

    fn release(&mut self) {
        if !self.released {
            let _ = self.pipeline.set_state(gst::State::Null);
            self.released = true;
        }
    }
}

impl Drop for GstCaptureSession {
    fn drop(&mut self) {
        self.release();
    }
}

fn bus_error(pipeline: &gst::Pipeline) -> Option<String> {
    let bus = pipeline.bus()?;
    let msg = bus.pop_filtered(&[gst::MessageType::Error])?;
    match msg.view() {
        gst::MessageView::Error(err) => Some(format!("{} ({:?})", err.error(), err.debug())),
        _ => None,
    }
}

fn frame_from_sample(sample: &gst::Sample) -> Result<Frame> {
    let caps = sample
        .caps()
        .ok_or_else(|| Error::Capture("Sample without caps".to_string()))?;
    let info = gst_video::VideoInfo::from_caps(caps)
        .map_err(|e| Error::Capture(format!("Unsupported caps: {}", e)))?;
    let buffer = sample
        .buffer()
        .ok_or_else(|| Error::Capture("Sample without buffer".to_string()))?;
    let map = buffer
        .map_readable()
        .map_err(|e| Error::Capture(format!("Failed to map buffer: {}", e)))?;

    let width = info.width();
    let height = info.height();
    let stride = info.stride()[0] as usize;
    let offset = info.offset()[0];
    let row_bytes = width as usize * 3;

    // Rows may be padded, copy only the visible pixels
    let bytes = map.as_slice();
    let mut data = Vec::with_capacity(row_bytes * height as usize);
    for row in 0..height as usize {
        let start = offset + row * stride;
        let line = bytes
            .get(start..start + row_bytes)
            .ok_or_else(|| Error::Capture("Truncated frame buffer".to_string()))?;
        data.extend_from_slice(line);
    }

    Frame::from_rgb(width, height, data)
}
