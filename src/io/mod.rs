//! Filesystem helpers shared by the cache, the recorder and the request writer.

use crate::errors::{Error, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

/// A sibling temp path unique to this process and call.
fn temp_path_for(target: &Path) -> PathBuf {
    static COUNTER: AtomicU64 = AtomicU64::new(0);

    let timestamp = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos();
    let counter = COUNTER.fetch_add(1, Ordering::SeqCst);

    let temp_name = format!(
        "{}.tmp.{}.{}.{}",
        target
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("file"),
        std::process::id(),
        timestamp,
        counter
    );
    target.with_file_name(temp_name)
}

pub fn ensure_parent_dir(path: &Path) -> Result<()> {
    match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => {
            fs::create_dir_all(parent).map_err(|e| Error::io(parent, e))
        }
        _ => Ok(()),
    }
}

/// Write `data` to `target` via a temp file and rename.
///
/// Readers see either the previous contents or the new contents, never a
/// partial write. The temp file is removed if the rename fails.
pub fn write_atomic(target: &Path, data: &[u8]) -> Result<()> {
    ensure_parent_dir(target)?;
    let temp = temp_path_for(target);

    fs::write(&temp, data).map_err(|e| Error::io(&temp, e))?;
    if let Err(e) = fs::rename(&temp, target) {
        let _ = fs::remove_file(&temp);
        return Err(Error::io(target, e));
    }
    Ok(())
}

/// Pretty-print `value` as JSON and write it atomically.
pub fn write_json_atomic<T: Serialize + ?Sized>(target: &Path, value: &T) -> Result<()> {
    let mut json = serde_json::to_string_pretty(value)
        .map_err(|e| Error::malformed("json document", target, e.to_string()))?;
    json.push('\n');
    write_atomic(target, json.as_bytes())
}
