//! Error types and handling
//!
//! Common error types used across the crate. Subsystems keep their own
//! enums (`CaptureError`, `EncoderError`, `LibraryError`, `ConfigError`);
//! `AppError` is the umbrella a host application can match on.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::capture::CaptureError;
use crate::encoder::EncoderError;
use crate::library::LibraryError;
use crate::recorder::ConfigError;

/// Crate-wide error type
#[derive(Error, Debug)]
pub enum AppError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Capture error: {0}")]
    Capture(#[from] CaptureError),

    #[error("Encoder error: {0}")]
    Encoder(#[from] EncoderError),

    #[error("Library error: {0}")]
    Library(#[from] LibraryError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),

    #[error("Recording error: {0}")]
    Recording(String),
}

/// Error response for host UIs
#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub code: String,
    pub message: String,
}

impl From<AppError> for ErrorResponse {
    fn from(error: AppError) -> Self {
        let code = match &error {
            AppError::Io(_) => "IO_ERROR",
            AppError::Serialization(_) => "SERIALIZATION_ERROR",
            AppError::Capture(_) => "CAPTURE_ERROR",
            AppError::Encoder(_) => "ENCODER_ERROR",
            AppError::Library(_) => "LIBRARY_ERROR",
            AppError::Config(_) => "CONFIG_ERROR",
            AppError::Recording(_) => "RECORDING_ERROR",
        };

        ErrorResponse {
            code: code.to_string(),
            message: error.to_string(),
        }
    }
}

/// Result type alias using AppError
pub type AppResult<T> = Result<T, AppError>;
