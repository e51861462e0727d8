//! # Error Types
//!
//! Custom error types for the tracker core using `thiserror`.

use thiserror::Error;

/// Errors raised by the cloud codec
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// Nothing queued to encode
    #[error("no queued data to encode")]
    NoData,

    /// Inbound payload carries no config object
    #[error("payload is not a config object")]
    NotConfig,

    /// Inbound payload is not AGPS assistance data
    #[error("payload is not AGPS data")]
    NotAgps,

    /// Wall-clock time has not been obtained yet
    #[error("UTC time not available for timestamp conversion")]
    TimeUnavailable,

    /// Payload could not be parsed
    #[error("malformed payload: {0}")]
    Malformed(String),
}

/// Main error type for the tracker
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] toml::de::Error),

    /// I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization errors outside the cloud codec
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Cloud codec errors
    #[error("Codec error: {0}")]
    Codec(#[from] CodecError),

    /// Cloud transport errors
    #[error("Transport error: {0}")]
    Transport(String),

    /// Hardware driver errors
    #[error("Driver error: {0}")]
    Driver(String),

    /// Settings storage errors
    #[error("Settings store error: {0}")]
    Store(String),
}

/// Result type alias for the tracker
pub type Result<T> = std::result::Result<T, TrackerError>;
