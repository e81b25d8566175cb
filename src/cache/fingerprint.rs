//! Fingerprints used to decide whether a cached stage is still valid.
//!
//! Both fingerprints hash a canonical JSON rendering of logical content, so
//! they do not depend on how the cached payload itself is encoded.

use serde::Serialize;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

/// The pair of fingerprints a cache entry must match to be a hit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Fingerprints {
    pub files: String,
    pub config: String,
}

impl Fingerprints {
    pub fn new<C: Serialize + ?Sized>(root: &Path, files: &[PathBuf], config: &C) -> Self {
        Self {
            files: files_fingerprint(root, files),
            config: config_fingerprint(config),
        }
    }
}

#[derive(Serialize)]
struct FileStamp {
    path: String,
    /// Nanoseconds since the epoch; `None` when the file is missing.
    mtime: Option<u128>,
}

fn modification_time(path: &Path) -> Option<u128> {
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_nanos())
}

/// Hash the sorted `(relative path, mtime)` pairs of `files`.
///
/// Paths outside `root` keep their full form.
pub fn files_fingerprint(root: &Path, files: &[PathBuf]) -> String {
    let mut stamps: Vec<FileStamp> = files
        .iter()
        .map(|file| FileStamp {
            path: file
                .strip_prefix(root)
                .unwrap_or(file)
                .to_string_lossy()
                .into_owned(),
            mtime: modification_time(file),
        })
        .collect();
    stamps.sort_by(|a, b| a.path.cmp(&b.path));
    stamps.dedup_by(|a, b| a.path == b.path);

    hash_json(&stamps)
}

/// Hash the configuration slice a stage depends on.
pub fn config_fingerprint<C: Serialize + ?Sized>(config: &C) -> String {
    hash_json(config)
}

fn hash_json<T: Serialize + ?Sized>(value: &T) -> String {
    let mut hasher = Sha256::new();
    // serde_json only fails on non-string map keys, which none of the
    // fingerprinted types contain; an empty rendering still hashes stably.
    let rendered = serde_json::to_vec(value).unwrap_or_default();
    hasher.update(&rendered);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::File;
    use std::time::{Duration, SystemTime};
    use tempfile::TempDir;

    fn touch(path: &Path, offset_secs: u64) {
        let file = File::options().write(true).open(path).unwrap();
        file.set_modified(SystemTime::UNIX_EPOCH + Duration::from_secs(1_700_000_000 + offset_secs))
            .unwrap();
    }

    #[test]
    fn test_order_independent() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.py");
        let b = dir.path().join("b.py");
        fs::write(&a, "").unwrap();
        fs::write(&b, "").unwrap();

        assert_eq!(
            files_fingerprint(dir.path(), &[a.clone(), b.clone()]),
            files_fingerprint(dir.path(), &[b, a])
        );
    }

    #[test]
    fn test_mtime_changes_fingerprint() {
        let dir = TempDir::new().unwrap();
        let a = dir.path().join("a.py");
        fs::write(&a, "").unwrap();
        touch(&a, 0);
        let before = files_fingerprint(dir.path(), std::slice::from_ref(&a));
        touch(&a, 10);
        let after = files_fingerprint(dir.path(), std::slice::from_ref(&a));
        assert_ne!(before, after);
    }

    #[test]
    fn test_relative_paths_make_fingerprint_root_independent() {
        let one = TempDir::new().unwrap();
        let two = TempDir::new().unwrap();
        for dir in [&one, &two] {
            let file = dir.path().join("a.py");
            fs::write(&file, "").unwrap();
            touch(&file, 5);
        }
        assert_eq!(
            files_fingerprint(one.path(), &[one.path().join("a.py")]),
            files_fingerprint(two.path(), &[two.path().join("a.py")])
        );
    }

    #[test]
    fn test_config_fingerprint_tracks_values() {
        #[derive(Serialize)]
        struct Slice<'a> {
            patterns: &'a [&'a str],
        }
        let a = config_fingerprint(&Slice { patterns: &["src/**/*.py"] });
        let b = config_fingerprint(&Slice { patterns: &["lib/**/*.py"] });
        assert_ne!(a, b);
        assert_eq!(a, config_fingerprint(&Slice { patterns: &["src/**/*.py"] }));
    }
}
