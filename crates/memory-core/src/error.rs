//! Error types for the project memory store.
//!
//! Migration and consolidation convert these into structured results at their
//! operation boundary; everything below that boundary propagates them with `?`.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for the project memory store.
#[derive(Debug, Error)]
pub enum MemoryError {
    // Database errors
    #[error("Database error: {message}")]
    Database {
        message: String,
        #[source]
        source: Option<rusqlite::Error>,
    },

    // File system errors
    #[error("IO error at {path:?}: {message}")]
    Io {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    /// The pre-migration backup could not be created or verified.
    #[error("Backup failed for {path:?}: {message}")]
    Backup {
        message: String,
        path: Option<PathBuf>,
        #[source]
        source: Option<std::io::Error>,
    },

    /// A legacy row could not be rewritten into its current-schema family.
    #[error("Cannot migrate {family} row {row_id}: {message}")]
    Transform {
        family: &'static str,
        row_id: String,
        message: String,
    },

    // Serialization errors
    #[error("JSON error: {message}")]
    Json {
        message: String,
        #[source]
        source: Option<serde_json::Error>,
    },

    // Configuration errors
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Invalid parameters: {message}")]
    InvalidParams { message: String },

    // Generic errors
    #[error("{0}")]
    Other(String),
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, MemoryError>;

impl From<std::io::Error> for MemoryError {
    fn from(err: std::io::Error) -> Self {
        MemoryError::Io {
            message: err.to_string(),
            path: None,
            source: Some(err),
        }
    }
}

impl From<serde_json::Error> for MemoryError {
    fn from(err: serde_json::Error) -> Self {
        MemoryError::Json {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl From<rusqlite::Error> for MemoryError {
    fn from(err: rusqlite::Error) -> Self {
        MemoryError::Database {
            message: err.to_string(),
            source: Some(err),
        }
    }
}

impl MemoryError {
    /// Create an IO error with path context.
    pub fn io_with_path(err: std::io::Error, path: impl Into<PathBuf>) -> Self {
        MemoryError::Io {
            message: err.to_string(),
            path: Some(path.into()),
            source: Some(err),
        }
    }

    /// Create a backup error with path context.
    pub fn backup(message: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        MemoryError::Backup {
            message: message.into(),
            path: Some(path.into()),
            source: None,
        }
    }

    /// Create a transform error for a legacy row.
    pub fn transform(
        family: &'static str,
        row_id: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        MemoryError::Transform {
            family,
            row_id: row_id.into(),
            message: message.into(),
        }
    }

    /// Convert to a JSON-RPC error code.
    ///
    /// Custom codes (application-defined, -32000 to -32099):
    /// - -32010: Backup failure
    /// - -32011: Legacy row transform failure
    pub fn to_rpc_error_code(&self) -> i32 {
        match self {
            MemoryError::InvalidParams { .. } => -32602,
            MemoryError::Backup { .. } => -32010,
            MemoryError::Transform { .. } => -32011,
            _ => -32603,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = MemoryError::transform("todos", "t-1", "missing title");
        assert_eq!(err.to_string(), "Cannot migrate todos row t-1: missing title");
    }

    #[test]
    fn test_rpc_error_codes() {
        assert_eq!(
            MemoryError::InvalidParams {
                message: "dry_run".into()
            }
            .to_rpc_error_code(),
            -32602
        );
        assert_eq!(
            MemoryError::backup("disk full", "/tmp/memory.db").to_rpc_error_code(),
            -32010
        );
        assert_eq!(MemoryError::Other("boom".into()).to_rpc_error_code(), -32603);
    }

    #[test]
    fn test_rusqlite_error_converts_to_database() {
        let err: MemoryError = rusqlite::Error::QueryReturnedNoRows.into();
        assert!(matches!(err, MemoryError::Database { source: Some(_), .. }));
    }
}
