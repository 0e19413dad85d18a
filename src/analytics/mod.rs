pub mod detector;
pub mod geometry;
pub mod yolo;

pub use detector::{BoundingBox, Detection, Detector, ObjectClass};
pub use geometry::{contains, Point};
pub use yolo::YoloDetector;
