use crate::capture::Frame;
use std::collections::HashMap;
use std::sync::{PoisonError, RwLock};

/// Most recent frame per camera.
///
/// Each camera's worker is the only writer for its entry. Readers get a
/// cheap clone of the last published frame and never block the writer for
/// longer than a map insert.
#[derive(Default)]
pub struct LatestFrameCache {
    frames: RwLock<HashMap<i64, Frame>>,
}

impl LatestFrameCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the camera's entry with a newer frame
    pub fn publish(&self, camera_id: i64, frame: Frame) {
        let mut frames = self.frames.write().unwrap_or_else(PoisonError::into_inner);
        frames.insert(camera_id, frame);
    }

    /// Last frame published for the camera, if any
    pub fn latest(&self, camera_id: i64) -> Option<Frame> {
        let frames = self.frames.read().unwrap_or_else(PoisonError::into_inner);
        frames.get(&camera_id).cloned()
    }

    pub fn remove(&self, camera_id: i64) -> Option<Frame> {
        let mut frames = self.frames.write().unwrap_or_else(PoisonError::into_inner);
        frames.remove(&camera_id)
    }
}
