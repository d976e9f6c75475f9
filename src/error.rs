//! Error types for the plate recognition pipeline

use thiserror::Error;

#[derive(Debug, Error)]
pub enum LprError {
    /// Input image is unusable (e.g. not 3-channel). Raised before any model call.
    #[error("Invalid input image: {0}")]
    InvalidInput(String),

    /// Requested backend or detect level is not available in this build
    #[error("Unsupported configuration: {0}")]
    UnsupportedConfiguration(String),

    /// Detector row did not have the expected number of fields
    #[error("Malformed detection row: expected {expected} fields, got {actual}")]
    MalformedDetection { expected: usize, actual: usize },

    /// Failure raised by a detector / recognizer / classifier collaborator
    #[error(transparent)]
    Inference(#[from] anyhow::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, LprError>;
