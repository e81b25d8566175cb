//! Per-test elapsed times.

pub mod recorder;

pub use recorder::{DurationRecorder, FlushGuard};

use crate::errors::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fs;
use std::io::ErrorKind;
use std::path::Path;

/// Test identifier to elapsed seconds.
///
/// A missing entry and a stored zero are different values here; both count
/// as "no usable duration" when a request is built.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DurationTable {
    durations: BTreeMap<String, f64>,
}

impl DurationTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, test_id: &str) -> Option<f64> {
        self.durations.get(test_id).copied()
    }

    pub fn insert(&mut self, test_id: impl Into<String>, seconds: f64) {
        self.durations.insert(test_id.into(), seconds);
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &f64)> {
        self.durations.iter()
    }

    pub fn stats(&self) -> DurationStats {
        DurationStats::compute(self)
    }

    /// Parse a flat JSON object of test id to seconds.
    ///
    /// Values may be numbers or numeric strings. Any other value, or a
    /// negative one, rejects the whole document.
    pub fn parse(content: &str) -> std::result::Result<Self, String> {
        let raw: BTreeMap<String, Value> =
            serde_json::from_str(content).map_err(|e| e.to_string())?;

        let mut table = Self::new();
        for (test_id, value) in raw {
            let seconds = match &value {
                Value::Number(n) => n.as_f64(),
                Value::String(s) => s.trim().parse::<f64>().ok(),
                _ => None,
            }
            .filter(|s| s.is_finite() && *s >= 0.0)
            .ok_or_else(|| format!("invalid duration {value} for {test_id}"))?;
            table.insert(test_id, seconds);
        }
        Ok(table)
    }
}

impl FromIterator<(String, f64)> for DurationTable {
    fn from_iter<I: IntoIterator<Item = (String, f64)>>(iter: I) -> Self {
        Self {
            durations: iter.into_iter().collect(),
        }
    }
}

/// How a duration load went.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadStatus {
    Loaded,
    Absent,
    /// The document was rejected; the table is empty.
    Malformed(String),
}

/// Load a duration table, all or nothing.
///
/// A missing file or a malformed document yields an empty table and a
/// status describing why; only unexpected I/O failures are errors.
pub fn load_durations(path: &Path) -> Result<(DurationTable, LoadStatus)> {
    let content = match fs::read_to_string(path) {
        Ok(content) => content,
        Err(e) if e.kind() == ErrorKind::NotFound => {
            log::debug!("No duration table at {}", path.display());
            return Ok((DurationTable::new(), LoadStatus::Absent));
        }
        Err(e) if e.kind() == ErrorKind::InvalidData => {
            return Ok((DurationTable::new(), LoadStatus::Malformed(e.to_string())));
        }
        Err(e) => return Err(Error::io(path, e)),
    };

    match DurationTable::parse(&content) {
        Ok(table) => Ok((table, LoadStatus::Loaded)),
        Err(message) => {
            log::warn!(
                "Ignoring duration table {}: {}",
                path.display(),
                message
            );
            Ok((DurationTable::new(), LoadStatus::Malformed(message)))
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct DurationStats {
    pub total_tests: usize,
    pub total_time: f64,
    pub average_time: f64,
    pub min_time: f64,
    pub max_time: f64,
}

impl DurationStats {
    pub fn compute(table: &DurationTable) -> Self {
        if table.is_empty() {
            return Self::default();
        }
        let times: Vec<f64> = table.durations.values().copied().collect();
        let total: f64 = times.iter().sum();

        Self {
            total_tests: times.len(),
            total_time: total,
            average_time: total / times.len() as f64,
            min_time: times.iter().copied().fold(f64::INFINITY, f64::min),
            max_time: times.iter().copied().fold(f64::NEG_INFINITY, f64::max),
        }
    }
}
