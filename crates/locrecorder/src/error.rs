//! Error types for locrecorder.
//!
//! This module defines the error types shared across the crate. Watcher
//! failures have their own enum in [`crate::watcher`] and are folded into
//! [`Error::Watcher`] when they cross into the tracker.

use std::path::PathBuf;
use thiserror::Error;

use crate::watcher::WatcherError;

/// The main error type for locrecorder operations.
#[derive(Error, Debug)]
pub enum Error {
    // === Storage Errors ===
    /// Failed to open or create the database.
    #[error("failed to open database at {path}: {source}")]
    DatabaseOpen {
        /// Path to the database file.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: rusqlite::Error,
    },

    /// A database query failed.
    #[error("database query failed: {0}")]
    DatabaseQuery(#[from] rusqlite::Error),

    /// Failed to run database migrations.
    #[error("database migration failed: {message}")]
    DatabaseMigration {
        /// Description of what went wrong.
        message: String,
    },

    /// The stored location history could not be read or decoded.
    #[error("failed to read '{key}' from storage: {message}")]
    StorageRead {
        /// Storage key that was being read.
        key: String,
        /// Description of what went wrong.
        message: String,
    },

    /// The location history could not be written back to storage.
    #[error("failed to write '{key}' to storage: {message}")]
    StorageWrite {
        /// Storage key that was being written.
        key: String,
        /// Description of what went wrong.
        message: String,
    },

    // === Configuration Errors ===
    /// Failed to load configuration.
    #[error("failed to load configuration: {0}")]
    ConfigLoad(Box<figment::Error>),

    /// Configuration validation failed.
    #[error("invalid configuration: {message}")]
    ConfigValidation {
        /// Description of the validation failure.
        message: String,
    },

    // === Tracking Errors ===
    /// The location service refused access.
    #[error("location permission denied: {message}")]
    PermissionDenied {
        /// Message reported by the location service.
        message: String,
    },

    /// The location watcher failed.
    #[error("location watcher '{name}' failed: {source}")]
    Watcher {
        /// Name of the watcher.
        name: &'static str,
        /// The underlying watcher error.
        #[source]
        source: WatcherError,
    },

    /// Tracking was started twice on the same tracker.
    #[error("tracking is already running")]
    AlreadyTracking,

    // === I/O Errors ===
    /// File system operation failed.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Failed to create a required directory.
    #[error("failed to create directory {path}: {source}")]
    DirectoryCreate {
        /// Path that couldn't be created.
        path: PathBuf,
        /// The underlying error.
        #[source]
        source: std::io::Error,
    },

    // === Serialization Errors ===
    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    // === Generic Errors ===
    /// An internal error occurred (bug).
    #[error("internal error: {0}")]
    Internal(String),
}

/// A specialized Result type for locrecorder operations.
pub type Result<T> = std::result::Result<T, Error>;

impl From<figment::Error> for Error {
    fn from(err: figment::Error) -> Self {
        Self::ConfigLoad(Box::new(err))
    }
}

impl Error {
    /// Create a new internal error.
    #[must_use]
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal(message.into())
    }

    /// Create a storage read error for the given key.
    #[must_use]
    pub fn storage_read(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageRead {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Create a storage write error for the given key.
    #[must_use]
    pub fn storage_write(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::StorageWrite {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Wrap a watcher error, lifting permission denial into its own variant.
    #[must_use]
    pub fn watcher(name: &'static str, source: WatcherError) -> Self {
        match source {
            WatcherError::NotAuthorized(message) => Self::PermissionDenied { message },
            source => Self::Watcher { name, source },
        }
    }

    /// Check if this error is a permission issue.
    #[must_use]
    pub fn is_permission_error(&self) -> bool {
        matches!(self, Self::PermissionDenied { .. })
    }

    /// Check if this error came from reading or writing stored locations.
    #[must_use]
    pub fn is_storage_error(&self) -> bool {
        matches!(
            self,
            Self::StorageRead { .. }
                | Self::StorageWrite { .. }
                | Self::DatabaseOpen { .. }
                | Self::DatabaseQuery(_)
                | Self::DatabaseMigration { .. }
        )
    }
}
