// src/error.rs

//! Unified error handling for the list updater.
//!
//! Only run-level failures are represented here. Per-source problems
//! (fetch errors, rejected payloads) are plain values carried in the
//! run report so that one bad list never aborts the whole run.

use std::fmt;
use std::path::Path;

use thiserror::Error;

/// Result type alias for updater operations.
pub type Result<T> = std::result::Result<T, AppError>;

/// Unified application error type.
#[derive(Error, Debug)]
pub enum AppError {
    /// I/O operation failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// HTTP request failed
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// TOML parsing failed
    #[error("TOML parse error: {0}")]
    Toml(#[from] toml::de::Error),

    /// SQLite operation failed
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Data validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Output directory cannot be used
    #[error("Storage error at {path}: {message}")]
    Storage { path: String, message: String },

    /// Search index could not be built
    #[error("Index build failed: {0}")]
    Index(String),

    /// Error tracker rejected or dropped an event
    #[error("Reporting failed: {0}")]
    Reporting(String),
}

impl AppError {
    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a storage error for a path.
    pub fn storage(path: &Path, message: impl fmt::Display) -> Self {
        Self::Storage {
            path: path.display().to_string(),
            message: message.to_string(),
        }
    }

    /// Create an index build error.
    pub fn index(message: impl fmt::Display) -> Self {
        Self::Index(message.to_string())
    }

    /// Create a reporting error.
    pub fn reporting(message: impl fmt::Display) -> Self {
        Self::Reporting(message.to_string())
    }
}
