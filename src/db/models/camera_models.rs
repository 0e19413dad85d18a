use crate::analytics::geometry::{self, Point};
use crate::error::Error;
use crate::capture::gst_capture::SourceKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::types::Json;
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Camera lifecycle status, written only by the camera's own worker
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CameraStatus {
    Offline,
    Online,
}

impl CameraStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            CameraStatus::Offline => "offline",
            CameraStatus::Online => "online",
        }
    }
}

impl Display for CameraStatus {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for CameraStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "offline" => Ok(CameraStatus::Offline),
            "online" => Ok(CameraStatus::Online),
            other => Err(Error::Serialization(format!("Unknown camera status: {}", other))),
        }
    }
}

/// Named polygon within a camera's frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    pub points: Vec<Point>,
}

impl Zone {
    pub fn contains(&self, point: Point) -> bool {
        geometry::contains(point, &self.points)
    }

    /// Name used in logs, falling back to the zone's position
    pub fn label(&self, index: usize) -> String {
        self.name
            .clone()
            .unwrap_or_else(|| format!("zone {}", index))
    }
}

/// Zone configuration stored on the camera record as
/// `{"zones": [{"points": [[x, y], ...]}, ...]}`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ZoneSet {
    #[serde(default)]
    pub zones: Vec<Zone>,
}

impl ZoneSet {
    /// Every zone must be a polygon with at least three points
    pub fn validate(&self) -> Result<(), Error> {
        for (index, zone) in self.zones.iter().enumerate() {
            if zone.points.len() < 3 {
                return Err(Error::Validation(format!(
                    "{} has {} points, at least 3 are required",
                    zone.label(index),
                    zone.points.len()
                )));
            }
        }
        Ok(())
    }

    /// First zone, in configured order, containing the point
    pub fn first_match(&self, point: Point) -> Option<(usize, &Zone)> {
        self.zones
            .iter()
            .enumerate()
            .find(|(_, zone)| zone.contains(point))
    }

    pub fn is_empty(&self) -> bool {
        self.zones.is_empty()
    }
}

/// Camera model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Camera {
    pub id: i64,
    pub name: String,
    pub location: Option<String>,
    pub source_url: String,
    pub status: CameraStatus,
    pub fps: f64,
    pub last_frame_time: Option<DateTime<Utc>>,
    pub zones: Option<ZoneSet>,
    pub created_at: DateTime<Utc>,
}

impl Camera {
    /// Zones to evaluate for this camera, empty when none are configured
    pub fn zone_set(&self) -> ZoneSet {
        self.zones.clone().unwrap_or_default()
    }
}

/// Database row representation of a camera
#[derive(Debug, Clone, sqlx::FromRow)]
pub struct CameraDb {
    pub id: i64,
    pub name: String,
    pub location: Option<String>,
    pub source_url: String,
    pub status: String,
    pub fps: f64,
    pub last_frame_time: Option<DateTime<Utc>>,
    pub zones: Option<Json<ZoneSet>>,
    pub created_at: DateTime<Utc>,
}

impl From<CameraDb> for Camera {
    fn from(row: CameraDb) -> Self {
        Camera {
            id: row.id,
            name: row.name,
            location: row.location,
            source_url: row.source_url,
            // Unknown values are treated as not streaming
            status: row.status.parse().unwrap_or(CameraStatus::Offline),
            fps: row.fps,
            last_frame_time: row.last_frame_time,
            zones: row.zones.map(|Json(zones)| zones),
            created_at: row.created_at,
        }
    }
}

/// Camera registration request
#[derive(Debug, Clone, Deserialize)]
pub struct NewCamera {
    pub name: String,
    pub location: Option<String>,
    #[serde(alias = "rtsp_url")]
    pub source_url: String,
    pub zones: Option<ZoneSet>,
}

impl NewCamera {
    pub fn validate(&self) -> Result<(), Error> {
        if self.name.trim().is_empty() {
            return Err(Error::Validation("Camera name is required".to_string()));
        }
        if self.source_url.trim().is_empty() {
            return Err(Error::Validation("Camera source address is required".to_string()));
        }
        SourceKind::parse(&self.source_url)?;
        if let Some(zones) = &self.zones {
            zones.validate()?;
        }
        Ok(())
    }
}
