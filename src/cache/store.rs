//! One blob per stage in a cache directory.

use super::fingerprint::Fingerprints;
use super::Stage;
use crate::errors::{Error, Result};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

const ENTRY_EXTENSION: &str = "cache";

/// What is stored for a stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CacheEntry {
    pub payload: Vec<u8>,
    pub files_fingerprint: String,
    pub config_fingerprint: String,
}

impl CacheEntry {
    fn matches(&self, fingerprints: &Fingerprints) -> bool {
        self.files_fingerprint == fingerprints.files
            && self.config_fingerprint == fingerprints.config
    }
}

/// Whether a stage result came from the cache.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum CacheStatus {
    Hit,
    Miss,
    Disabled,
}

#[derive(Debug, Clone)]
pub struct StageCache {
    dir: PathBuf,
}

impl StageCache {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn entry_path(&self, stage: Stage) -> PathBuf {
        self.dir
            .join(format!("{}.{}", stage.name(), ENTRY_EXTENSION))
    }

    /// Decoded payload for `stage`, if a valid entry exists.
    ///
    /// Missing, unreadable, undecodable and stale entries are all misses.
    pub fn load<T: DeserializeOwned>(&self, stage: Stage, fingerprints: &Fingerprints) -> Option<T> {
        let path = self.entry_path(stage);
        let bytes = match fs::read(&path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == ErrorKind::NotFound => return None,
            Err(e) => {
                log::warn!("Cache read failed for {}: {}", stage.name(), e);
                return None;
            }
        };

        let entry: CacheEntry = match postcard::from_bytes(&bytes) {
            Ok(entry) => entry,
            Err(e) => {
                log::warn!("Discarding corrupt cache entry {}: {}", path.display(), e);
                return None;
            }
        };
        if !entry.matches(fingerprints) {
            log::debug!("Cache entry for {} is stale", stage.name());
            return None;
        }

        match postcard::from_bytes(&entry.payload) {
            Ok(value) => Some(value),
            Err(e) => {
                log::warn!("Discarding undecodable {} payload: {}", stage.name(), e);
                None
            }
        }
    }

    /// Replace the entry for `stage`. Failures are logged and swallowed.
    pub fn store<T: Serialize>(&self, stage: Stage, fingerprints: &Fingerprints, value: &T) {
        if let Err(e) = self.try_store(stage, fingerprints, value) {
            log::warn!("Cache write failed for {}: {}", stage.name(), e);
        }
    }

    fn try_store<T: Serialize>(
        &self,
        stage: Stage,
        fingerprints: &Fingerprints,
        value: &T,
    ) -> std::result::Result<(), String> {
        let entry = CacheEntry {
            payload: postcard::to_allocvec(value).map_err(|e| e.to_string())?,
            files_fingerprint: fingerprints.files.clone(),
            config_fingerprint: fingerprints.config.clone(),
        };
        let bytes = postcard::to_allocvec(&entry).map_err(|e| e.to_string())?;
        crate::io::write_atomic(&self.entry_path(stage), &bytes).map_err(|e| e.to_string())
    }

    /// Return the cached value or compute, store and return a fresh one.
    ///
    /// Errors from `compute` propagate and leave the previous entry alone.
    pub fn get_or_compute<T, F>(
        &self,
        stage: Stage,
        fingerprints: &Fingerprints,
        compute: F,
    ) -> Result<(T, CacheStatus)>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Result<T>,
    {
        if let Some(value) = self.load(stage, fingerprints) {
            log::debug!("Cache hit for {}", stage.name());
            return Ok((value, CacheStatus::Hit));
        }
        let value = compute()?;
        self.store(stage, fingerprints, &value);
        Ok((value, CacheStatus::Miss))
    }

    /// Remove every stored entry. Returns how many were removed.
    pub fn clear(&self) -> Result<usize> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(Error::io(&self.dir, e)),
        };

        let mut removed = 0;
        for entry in entries {
            let path = entry.map_err(|e| Error::io(&self.dir, e))?.path();
            if path.extension().is_some_and(|ext| ext == ENTRY_EXTENSION) {
                fs::remove_file(&path).map_err(|e| Error::io(&path, e))?;
                removed += 1;
            }
        }
        log::info!("Removed {} cache entries from {}", removed, self.dir.display());
        Ok(removed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use std::cell::Cell;
    use tempfile::TempDir;

    fn fingerprints(files: &str, config: &str) -> Fingerprints {
        Fingerprints {
            files: files.to_string(),
            config: config.to_string(),
        }
    }

    #[test]
    fn test_hit_requires_both_fingerprints() {
        let dir = TempDir::new().unwrap();
        let cache = StageCache::new(dir.path());
        let fp = fingerprints("f1", "c1");
        cache.store(Stage::Durations, &fp, &vec![1u32, 2, 3]);

        assert_eq!(cache.load::<Vec<u32>>(Stage::Durations, &fp), Some(vec![1, 2, 3]));
        assert_eq!(cache.load::<Vec<u32>>(Stage::Durations, &fingerprints("f2", "c1")), None);
        assert_eq!(cache.load::<Vec<u32>>(Stage::Durations, &fingerprints("f1", "c2")), None);
        assert_eq!(cache.load::<Vec<u32>>(Stage::FunctionIndex, &fp), None);
    }

    #[test]
    fn test_corrupt_entry_is_a_miss() {
        let dir = TempDir::new().unwrap();
        let cache = StageCache::new(dir.path());
        fs::write(cache.entry_path(Stage::TestCoverage), b"\xff\xff\xff").unwrap();

        let calls = Cell::new(0);
        let (value, status) = cache
            .get_or_compute(Stage::TestCoverage, &fingerprints("f", "c"), || {
                calls.set(calls.get() + 1);
                Ok(String::from("fresh"))
            })
            .unwrap();
        assert_eq!(value, "fresh");
        assert_eq!(status, CacheStatus::Miss);
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_get_or_compute_short_circuits() {
        let dir = TempDir::new().unwrap();
        let cache = StageCache::new(dir.path());
        let fp = fingerprints("f", "c");

        let (_, first) = cache
            .get_or_compute(Stage::ChangedFunctions, &fp, || Ok(7u64))
            .unwrap();
        let (value, second) = cache
            .get_or_compute(Stage::ChangedFunctions, &fp, || -> Result<u64> {
                panic!("should not recompute")
            })
            .unwrap();
        assert_eq!(first, CacheStatus::Miss);
        assert_eq!(second, CacheStatus::Hit);
        assert_eq!(value, 7);
    }

    #[test]
    fn test_failed_compute_keeps_previous_entry() {
        let dir = TempDir::new().unwrap();
        let cache = StageCache::new(dir.path());
        let fp = fingerprints("f", "c");
        cache.store(Stage::Durations, &fp, &1u8);

        let result = cache.get_or_compute(Stage::Durations, &fingerprints("g", "c"), || {
            Err::<u8, _>(Error::config("boom"))
        });
        assert!(result.is_err());
        assert_eq!(cache.load::<u8>(Stage::Durations, &fp), Some(1));
    }

    #[test]
    fn test_clear_counts_entries() {
        let dir = TempDir::new().unwrap();
        let cache = StageCache::new(dir.path().join("cache"));
        assert_eq!(cache.clear().unwrap(), 0);

        let fp = fingerprints("f", "c");
        for stage in Stage::ALL {
            cache.store(stage, &fp, &0u8);
        }
        fs::write(cache.dir().join("notes.txt"), "keep").unwrap();

        assert_eq!(cache.clear().unwrap(), 4);
        assert_eq!(cache.clear().unwrap(), 0);
        assert!(cache.dir().join("notes.txt").exists());
    }
}
