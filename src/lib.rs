pub mod analytics;
pub mod api;
pub mod capture;
pub mod config;
pub mod db;
pub mod error;
pub mod ingest;

pub use error::Error;
