//! Error types for chat_media_fetcher
//!
//! This module defines the error types for every component of the download core.
//! Download errors are never surfaced to callers of `request_download`; the
//! orchestrator converts them into `error` states. They are still typed so the
//! state store, the CLI and the logs can report exactly what went wrong.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised while fetching, validating or saving a resource
#[derive(Error, Debug)]
pub enum DownloadError {
    /// Server answered with something other than 200 or 206
    #[error("HTTP error! status: {status}")]
    Transport { status: u16 },

    /// Content-Range start does not match the requested offset
    #[error("Gap detected between responses: expected offset {expected}, server returned {actual}")]
    Gap { expected: u64, actual: u64 },

    /// Total size changed between two chunks
    #[error("Total size differs: expected {expected} bytes, server reported {actual} bytes")]
    SizeMismatch { expected: u64, actual: u64 },

    /// Resource key metadata could not be parsed
    #[error("Invalid resource key {key}: {reason}")]
    MalformedResource { key: String, reason: String },

    /// Content-Range header present but unreadable
    #[error("Unparseable Content-Range header: {value}")]
    InvalidContentRange { value: String },

    /// Server returned no data before the end of the resource
    #[error("Empty chunk received at offset {offset}")]
    EmptyChunk { offset: u64 },

    /// Progressive media answered with a non-video body
    #[error("Got non video response with MIME type {mime}")]
    NotVideo { mime: String },

    /// Low-level HTTP failure (connection, TLS, body read)
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    /// I/O error while persisting a file
    #[error("File I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// File persistence collaborator refused the file
    #[error("Failed to save {path}: {reason}")]
    Sink { path: PathBuf, reason: String },
}

impl DownloadError {
    /// Name of the error class used in logs and JSON output
    pub fn kind(&self) -> &'static str {
        match self {
            DownloadError::Transport { .. } | DownloadError::Http(_) => "TransportError",
            DownloadError::Gap { .. } | DownloadError::InvalidContentRange { .. } => "GapError",
            DownloadError::SizeMismatch { .. } => "SizeMismatchError",
            DownloadError::MalformedResource { .. } => "MalformedResourceError",
            DownloadError::EmptyChunk { .. } | DownloadError::NotVideo { .. } => "TransportError",
            DownloadError::Io(_) | DownloadError::Sink { .. } => "PersistenceError",
        }
    }

    /// Whether a manual retry of the whole resource could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        !matches!(self, DownloadError::MalformedResource { .. })
    }
}

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    NotFound { path: PathBuf },

    /// Invalid configuration format
    #[error("Invalid configuration format: {0}")]
    InvalidFormat(#[from] toml::de::Error),

    /// Invalid configuration value
    #[error("Invalid configuration value for {field}: {value}. {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Top-level application error that can represent any error type
#[derive(Error, Debug)]
pub enum AppError {
    /// Download error
    #[error(transparent)]
    Download(#[from] DownloadError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Generic I/O error
    #[error(transparent)]
    Io(#[from] std::io::Error),

    /// Generic application error with context
    #[error("Application error: {message}")]
    Generic { message: String },
}

impl AppError {
    /// Create a generic application error with a message
    pub fn generic(message: impl Into<String>) -> Self {
        Self::Generic {
            message: message.into(),
        }
    }

    /// Check if the error is recoverable by retrying
    pub fn is_recoverable(&self) -> bool {
        match self {
            AppError::Download(e) => e.is_retryable(),
            AppError::Io(_) => true,
            AppError::Config(_) | AppError::Generic { .. } => false,
        }
    }

    /// Get error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            AppError::Download(_) => "download",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Generic { .. } => "generic",
        }
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, AppError>;

/// Download result type alias
pub type DownloadResult<T> = std::result::Result<T, DownloadError>;

/// Configuration result type alias
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;
