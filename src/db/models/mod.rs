pub mod camera_models;
pub mod event_models;

pub use camera_models::{Camera, CameraDb, CameraStatus, NewCamera, Zone, ZoneSet};
pub use event_models::{Event, EventFilter, NewEvent, INTRUSION_RULE};
