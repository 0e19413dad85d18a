use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("Capture error: {0}")]
    Capture(String),

    #[error("Detection error: {0}")]
    Detection(String),

    #[error("Snapshot error: {0}")]
    Snapshot(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
