pub mod cameras;
pub mod events;


pub use cameras::CamerasRepository;
pub use events::EventsRepository;
