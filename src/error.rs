//! Error types for deal-harvester
//!
//! This module provides error handling for the library:
//! - [`Error`] for run-level failures (configuration, output creation, I/O)
//! - [`ImageError`] for per-URL image failures, which are logged and never
//!   propagated past the download task that hit them

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias for deal-harvester operations
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type for deal-harvester
///
/// Only [`Error::OutputCreation`] is fatal to a run. Everything else is either
/// reported at startup (configuration) or logged locally by the task that
/// encountered it.
#[derive(Debug, Error)]
pub enum Error {
    /// Configuration error with context about which setting is invalid
    #[error("configuration error: {message}")]
    Config {
        /// Human-readable error message describing the configuration issue
        message: String,
        /// The configuration key that caused the error (e.g., "window_size")
        key: Option<String>,
    },

    /// The primary persisted output could not be created
    #[error("failed to create output file {path}: {source}")]
    OutputCreation {
        /// Path of the file that could not be created
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Network error
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    /// CSV serialization or write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Serialization error (config files)
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Invalid URL
    #[error("invalid URL: {0}")]
    Url(#[from] url::ParseError),

    /// A detail or listing page could not be turned into records
    #[error("extraction error: {0}")]
    Extraction(String),

    /// The channel a task was feeding has been closed by its consumer
    #[error("channel closed")]
    ChannelClosed,
}

impl Error {
    /// Shorthand for a configuration error tied to a specific key.
    pub fn config(key: &str, message: impl Into<String>) -> Self {
        Error::Config {
            message: message.into(),
            key: Some(key.to_string()),
        }
    }

    /// Whether this error must abort the whole run.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Error::OutputCreation { .. } | Error::Config { .. })
    }
}

/// Per-URL image failure, tagged with the stage that failed
#[derive(Debug, Error)]
pub enum ImageError {
    /// The per-record image directory could not be created
    #[error("failed to create directory {path}: {source}")]
    CreateDir {
        /// Directory path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The image output file could not be created
    #[error("failed to create file {path}: {source}")]
    CreateFile {
        /// File path
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },

    /// The request never produced a response
    #[error("transport error: {0}")]
    Transport(String),

    /// The server answered with a non-success status
    #[error("HTTP status {status}")]
    HttpStatus {
        /// HTTP status code
        status: u16,
    },

    /// Streaming the body into the file failed
    #[error("copy failed after {written} bytes: {reason}")]
    Copy {
        /// Bytes written before the failure
        written: u64,
        /// The reason the copy failed
        reason: String,
    },
}
