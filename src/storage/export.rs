//! One-off JSON export of a session.

use super::{StorageError, StorageResult};
use crate::models::SessionDocument;
use chrono::{DateTime, Utc};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

/// File name for an export: `session_<YYYYMMDDTHHMMSS>_<user prefix>.json`.
///
/// The user prefix is the first 8 characters of the user id, or `unknown`
/// when the session was never initialized.
pub fn export_file_name(user_id: &str, at: DateTime<Utc>) -> String {
    let prefix: String = user_id.chars().take(8).collect();
    let prefix = if prefix.is_empty() {
        "unknown".to_string()
    } else {
        prefix
    };
    format!("session_{}_{}.json", at.format("%Y%m%dT%H%M%S"), prefix)
}

/// Write the document as pretty JSON into `dir` and return the file path.
pub fn export_session(
    document: &SessionDocument,
    dir: &Path,
    at: DateTime<Utc>,
) -> StorageResult<PathBuf> {
    fs::create_dir_all(dir).map_err(|e| StorageError::io(dir, e))?;

    let path = dir.join(export_file_name(&document.user_id, at));
    let json = serde_json::to_string_pretty(document)?;
    fs::write(&path, json).map_err(|e| StorageError::io(&path, e))?;

    info!("Exported session to {}", path.display());
    Ok(path)
}
