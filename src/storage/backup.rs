//! Durable backup of submitted sessions.
//!
//! Every submission is appended to an ordered JSON array on disk before any
//! network call is attempted, so the data survives an unreachable server.

use super::{StorageError, StorageResult};
use crate::models::SessionDocument;
use serde_json::Value;
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{debug, info};

/// Ordered log of submitted session documents.
pub trait BackupStore: Send + Sync {
    /// All documents stored so far, oldest first.
    fn load(&self) -> StorageResult<Vec<Value>>;

    /// Append one document to the end of the log.
    fn append(&self, document: &SessionDocument) -> StorageResult<()>;
}

/// Backup log kept as a JSON array in a single file.
#[derive(Debug, Clone)]
pub struct FileBackupStore {
    path: PathBuf,
}

impl FileBackupStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn parent_dir(&self) -> PathBuf {
        match self.path.parent() {
            Some(dir) if !dir.as_os_str().is_empty() => dir.to_path_buf(),
            _ => PathBuf::from("."),
        }
    }

    /// Replace the file contents in one step via a sibling temp file.
    fn write_all(&self, submissions: &[Value]) -> StorageResult<()> {
        let dir = self.parent_dir();
        fs::create_dir_all(&dir).map_err(|e| StorageError::io(&dir, e))?;

        let json = serde_json::to_vec_pretty(submissions)?;
        let mut tmp = NamedTempFile::new_in(&dir).map_err(|e| StorageError::io(&dir, e))?;
        tmp.write_all(&json)
            .map_err(|e| StorageError::io(tmp.path(), e))?;
        tmp.persist(&self.path)
            .map_err(|e| StorageError::io(&self.path, e.error))?;
        Ok(())
    }
}

impl BackupStore for FileBackupStore {
    fn load(&self) -> StorageResult<Vec<Value>> {
        if !self.path.exists() {
            debug!("No backup file at {}", self.path.display());
            return Ok(Vec::new());
        }

        let content =
            fs::read_to_string(&self.path).map_err(|e| StorageError::io(&self.path, e))?;
        if content.trim().is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_str(&content).map_err(|source| StorageError::Corrupt {
            path: self.path.clone(),
            source,
        })
    }

    fn append(&self, document: &SessionDocument) -> StorageResult<()> {
        let mut submissions = self.load()?;
        submissions.push(serde_json::to_value(document)?);
        self.write_all(&submissions)?;

        info!(
            "Backed up session {} to {} ({} stored)",
            document.session_id,
            self.path.display(),
            submissions.len()
        );
        Ok(())
    }
}
