use crate::analytics::geometry::Point;
use crate::capture::Frame;
use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt::{Display, Formatter};
use std::str::FromStr;

/// Object classes the detector reports.
///
/// Model classes without a dedicated variant map to `Other`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectClass {
    Person,
    Bicycle,
    Car,
    Motorcycle,
    Bus,
    Truck,
    Cat,
    Dog,
    Other,
}

impl ObjectClass {
    /// Map a COCO class index (as emitted by YOLO models) to a class.
    pub fn from_coco_index(index: usize) -> Self {
        match index {
            0 => ObjectClass::Person,
            1 => ObjectClass::Bicycle,
            2 => ObjectClass::Car,
            3 => ObjectClass::Motorcycle,
            5 => ObjectClass::Bus,
            7 => ObjectClass::Truck,
            15 => ObjectClass::Cat,
            16 => ObjectClass::Dog,
            _ => ObjectClass::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectClass::Person => "person",
            ObjectClass::Bicycle => "bicycle",
            ObjectClass::Car => "car",
            ObjectClass::Motorcycle => "motorcycle",
            ObjectClass::Bus => "bus",
            ObjectClass::Truck => "truck",
            ObjectClass::Cat => "cat",
            ObjectClass::Dog => "dog",
            ObjectClass::Other => "other",
        }
    }
}

impl Display for ObjectClass {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ObjectClass {
    type Err = crate::error::Error;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "person" => Ok(ObjectClass::Person),
            "bicycle" => Ok(ObjectClass::Bicycle),
            "car" => Ok(ObjectClass::Car),
            "motorcycle" => Ok(ObjectClass::Motorcycle),
            "bus" => Ok(ObjectClass::Bus),
            "truck" => Ok(ObjectClass::Truck),
            "cat" => Ok(ObjectClass::Cat),
            "dog" => Ok(ObjectClass::Dog),
            "other" => Ok(ObjectClass::Other),
            other => Err(crate::error::Error::Config(format!(
                "Unknown object class: {}",
                other
            ))),
        }
    }
}

/// Axis aligned box in frame pixel coordinates
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self { x1, y1, x2, y2 }
    }

    /// Box corners truncated to whole pixels, `[x1, y1, x2, y2]`
    pub fn to_pixels(&self) -> [i32; 4] {
        [
            self.x1 as i32,
            self.y1 as i32,
            self.x2 as i32,
            self.y2 as i32,
        ]
    }

    /// Centre of the pixel box, truncated to a whole pixel
    pub fn centroid(&self) -> Point {
        let [x1, y1, x2, y2] = self.to_pixels();
        Point::new(((x1 + x2) / 2) as f64, ((y1 + y2) / 2) as f64)
    }

    pub fn area(&self) -> f32 {
        (self.x2 - self.x1).max(0.0) * (self.y2 - self.y1).max(0.0)
    }

    /// Intersection over union with another box
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let ix1 = self.x1.max(other.x1);
        let iy1 = self.y1.max(other.y1);
        let ix2 = self.x2.min(other.x2);
        let iy2 = self.y2.min(other.y2);

        let intersection = (ix2 - ix1).max(0.0) * (iy2 - iy1).max(0.0);
        let union = self.area() + other.area() - intersection;
        if union <= 0.0 {
            0.0
        } else {
            intersection / union
        }
    }
}

/// One labelled box produced by the detector for a single frame
#[derive(Debug, Clone, PartialEq)]
pub struct Detection {
    pub class: ObjectClass,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

/// Object detector seam.
///
/// Implementations hold the loaded model and must not keep per-call state.
/// The input frame is never modified.
#[async_trait]
pub trait Detector: Send + Sync {
    async fn detect(&self, frame: &Frame) -> Result<Vec<Detection>>;
}
