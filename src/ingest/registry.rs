use crate::db::models::{Camera, CameraStatus, Event, NewEvent};
use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

/// Camera records as seen by ingestion workers
#[async_trait]
pub trait CameraRegistry: Send + Sync {
    /// Fetch a camera, `None` once it has been deregistered
    async fn camera(&self, camera_id: i64) -> Result<Option<Camera>>;

    async fn set_status(&self, camera_id: i64, status: CameraStatus) -> Result<()>;

    /// Record the time of the latest frame and the measured frame rate
    async fn heartbeat(&self, camera_id: i64, at: DateTime<Utc>, fps: f64) -> Result<()>;
}

/// Append-only event store shared by all workers
#[async_trait]
pub trait EventRecorder: Send + Sync {
    async fn record(&self, event: &NewEvent) -> Result<Event>;
}
