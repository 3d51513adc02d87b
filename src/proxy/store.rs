//! Rule file persistence
//!
//! The rule file is a JSON array of [`ProxyRecord`]s. Saves go to a sibling
//! temporary file that is then renamed over the target.

use std::io;
use std::path::{Path, PathBuf};

use log::debug;
use tokio::fs;

use crate::common::{ProxyError, Result};
use super::rule::ProxyRecord;

fn persistence_error(action: &str, path: &Path, err: impl std::fmt::Display) -> ProxyError {
    ProxyError::Persistence(format!("Failed to {} {}: {}", action, path.display(), err))
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Write `records` to `path`
pub async fn write_records(path: &Path, records: &[ProxyRecord]) -> Result<()> {
    let data = serde_json::to_vec_pretty(records).map_err(|e| persistence_error("serialize", path, e))?;

    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)
                .await
                .map_err(|e| persistence_error("create directory for", path, e))?;
        }
    }

    let temp = temp_path(path);
    fs::write(&temp, &data)
        .await
        .map_err(|e| persistence_error("write", &temp, e))?;
    fs::rename(&temp, path)
        .await
        .map_err(|e| persistence_error("replace", path, e))?;

    debug!("Wrote {} rules to {}", records.len(), path.display());
    Ok(())
}

/// Read records from `path`
///
/// # Returns
///
/// `None` when the file does not exist.
///
/// # Errors
///
/// Returns `ProxyError::Persistence` when the file cannot be read or is not
/// a JSON array of rules.
pub async fn read_records(path: &Path) -> Result<Option<Vec<ProxyRecord>>> {
    let data = match fs::read(path).await {
        Ok(data) => data,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
        Err(e) => return Err(persistence_error("read", path, e)),
    };

    // An empty file is what a crash during the first save leaves behind
    if data.iter().all(u8::is_ascii_whitespace) {
        return Ok(Some(Vec::new()));
    }

    serde_json::from_slice(&data)
        .map(Some)
        .map_err(|e| persistence_error("parse", path, e))
}
