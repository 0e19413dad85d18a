//! Per-camera ingestion: capture, detection, zone evaluation and events.

pub mod debounce;
pub mod frame_cache;
pub mod registry;
pub mod snapshot;
pub mod supervisor;
pub mod worker;

#[cfg(test)]
mod tests;

pub use debounce::{IntrusionDebouncer, ZoneHit};
pub use frame_cache::LatestFrameCache;
pub use registry::{CameraRegistry, EventRecorder};
pub use snapshot::{FileSnapshotStore, SnapshotStore};
pub use supervisor::{WorkerStatus, WorkerSupervisor};
pub use worker::CameraWorker;

use crate::analytics::{Detector, ObjectClass};
use crate::capture::CaptureSource;
use crate::config::{IngestionConfig, IntrusionPolicy};
use anyhow::Result;
use std::sync::Arc;
use std::time::Duration;

/// Ingestion loop tuning, resolved from configuration
#[derive(Debug, Clone)]
pub struct IngestSettings {
    /// Detection runs on every Nth read frame, never less than 1
    pub frame_skip: u64,
    pub frame_interval: Duration,
    pub offline_backoff: Duration,
    pub reconnect_cooldown: Duration,
    /// Classes allowed to trigger an intrusion
    pub object_classes: Vec<ObjectClass>,
    pub intrusion_policy: IntrusionPolicy,
    pub realert_after: Option<Duration>,
    pub restart_on_panic: bool,
}

impl IngestSettings {
    pub fn from_config(config: &IngestionConfig) -> Result<Self> {
        let object_classes = config
            .object_classes
            .iter()
            .map(|name| name.parse::<ObjectClass>())
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            frame_skip: config.frame_skip.max(1),
            frame_interval: Duration::from_millis(config.frame_interval_ms),
            offline_backoff: Duration::from_secs(config.offline_backoff_secs),
            reconnect_cooldown: Duration::from_secs(config.reconnect_cooldown_secs),
            object_classes,
            intrusion_policy: config.intrusion_policy,
            realert_after: match config.realert_after_secs {
                0 => None,
                secs => Some(Duration::from_secs(secs)),
            },
            restart_on_panic: config.restart_on_panic,
        })
    }
}

impl Default for IngestSettings {
    fn default() -> Self {
        Self {
            frame_skip: 5,
            frame_interval: Duration::from_millis(50),
            offline_backoff: Duration::from_secs(5),
            reconnect_cooldown: Duration::from_secs(2),
            object_classes: vec![ObjectClass::Person],
            intrusion_policy: IntrusionPolicy::PerPresence,
            realert_after: Some(Duration::from_secs(60)),
            restart_on_panic: true,
        }
    }
}

/// Process-wide collaborators shared by every camera worker
pub struct IngestContext {
    pub registry: Arc<dyn CameraRegistry>,
    pub recorder: Arc<dyn EventRecorder>,
    pub capture: Arc<dyn CaptureSource>,
    pub detector: Arc<dyn Detector>,
    pub snapshots: Arc<dyn SnapshotStore>,
    pub frames: Arc<LatestFrameCache>,
    pub settings: IngestSettings,
}
