//! Local persistence of session documents.
//!
//! This module provides the durable backup log written on every
//! submission and the one-off JSON export of a session.

pub mod backup;
pub mod export;

pub use backup::{BackupStore, FileBackupStore};
pub use export::{export_file_name, export_session};

use std::path::PathBuf;

/// Errors raised while persisting session documents locally.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("I/O error on {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to serialize session data: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("backup file {} is not a JSON array of sessions: {source}", .path.display())]
    Corrupt {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },
}

impl StorageError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        StorageError::Io {
            path: path.into(),
            source,
        }
    }
}

pub type StorageResult<T> = Result<T, StorageError>;
