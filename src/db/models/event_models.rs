use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Rule name recorded for zone intrusions
pub const INTRUSION_RULE: &str = "intrusion";

/// Event model, append-only once written
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct Event {
    pub id: i64,
    pub camera_id: i64,
    pub timestamp: DateTime<Utc>,
    pub rule: String,
    pub object_type: String,
    pub confidence: f32,
    /// `[x1, y1, x2, y2]` in frame pixels
    #[sqlx(json)]
    pub bbox: [i32; 4],
    pub snapshot_path: String,
}

/// Event about to be appended
#[derive(Debug, Clone, PartialEq)]
pub struct NewEvent {
    pub camera_id: i64,
    pub timestamp: DateTime<Utc>,
    pub rule: String,
    pub object_type: String,
    pub confidence: f32,
    pub bbox: [i32; 4],
    pub snapshot_path: String,
}

/// Event query filters, all optional, time bounds inclusive
#[derive(Debug, Clone, Default, Deserialize)]
pub struct EventFilter {
    pub camera_id: Option<i64>,
    pub rule: Option<String>,
    pub from_time: Option<DateTime<Utc>>,
    pub to_time: Option<DateTime<Utc>>,
    pub limit: Option<i64>,
}
