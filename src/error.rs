//! Error types for microscope-core

use std::io;
use thiserror::Error;

use crate::video::{DecodeError, RecordError, TransportError};

/// Result type alias using MicroscopeError
pub type Result<T> = std::result::Result<T, MicroscopeError>;

/// Top-level error type
///
/// Every error in the acquisition/overlay subsystem is recoverable: callers
/// either show a placeholder frame, keep the previous frame, or keep the
/// previous configuration value. None of these variants is fatal.
#[derive(Debug, Error)]
pub enum MicroscopeError {
    /// I/O error
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Camera transport failure (timeout, refused, DNS, bad status)
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    /// Payload could not be decoded into a frame
    #[error("Decode error: {0}")]
    Decode(#[from] DecodeError),

    /// Frame-sequence writer could not be opened, written or closed
    #[error("Recording error: {0}")]
    Record(#[from] RecordError),

    /// Rejected configuration value (zero fps, malformed URL, ...)
    #[error("Invalid configuration: {0}")]
    Configuration(String),

    /// Settings file could not be parsed or written
    #[error("Settings error: {0}")]
    Settings(String),

    /// Plugin error
    #[error("Plugin error: {0}")]
    Plugin(String),

    /// Plugin name already used in the same pipeline
    #[error("Already exists: {0}")]
    AlreadyExists(String),

    /// Plugin, camera or preset not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl MicroscopeError {
    /// Create a Configuration error
    pub fn configuration(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Create a Settings error
    pub fn settings(msg: impl Into<String>) -> Self {
        Self::Settings(msg.into())
    }

    /// Create a Plugin error
    pub fn plugin(msg: impl Into<String>) -> Self {
        Self::Plugin(msg.into())
    }

    /// Create a NotFound error
    pub fn not_found(msg: impl Into<String>) -> Self {
        Self::NotFound(msg.into())
    }

    /// Create an Other error
    pub fn other(msg: impl Into<String>) -> Self {
        Self::Other(msg.into())
    }
}

impl From<toml::de::Error> for MicroscopeError {
    fn from(err: toml::de::Error) -> Self {
        Self::Configuration(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = MicroscopeError::configuration("fps must be positive");
        assert!(matches!(err, MicroscopeError::Configuration(_)));
    }

    #[test]
    fn test_error_display() {
        let err = MicroscopeError::NotFound("Camera 7".to_string());
        assert_eq!(err.to_string(), "Not found: Camera 7");
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: MicroscopeError = TransportError::Timeout {
            url: "http://localhost:9998/jpg/image.jpg".into(),
        }
        .into();
        assert!(matches!(err, MicroscopeError::Transport(_)));
        assert!(err.to_string().contains("timed out"));
    }
}
