//! Recording durations during a test session.
//!
//! The runner feeds every phase report it sees into a [`FlushGuard`]; only
//! the `call` phase is kept. The guard writes the table exactly once, when
//! the session finishes or when the guard is dropped on an early exit.
//!
//! Reports arrive as a JSON-lines stream, one object per phase, carrying
//! the unrounded elapsed seconds:
//!
//! ```text
//! {"test_id": "tests/t.py::test_a", "phase": "call", "seconds": 0.000412}
//! ```

use super::DurationTable;
use crate::errors::Result;
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

/// Phase whose elapsed time is recorded.
pub const CALL_PHASE: &str = "call";

/// One phase report from the stream.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PhaseReport {
    pub test_id: String,
    pub phase: String,
    pub seconds: f64,
}

/// Parse one stream line. Blank and malformed lines yield `None`.
pub fn parse_report_line(line: &str) -> Option<PhaseReport> {
    let line = line.trim();
    if line.is_empty() {
        return None;
    }
    match serde_json::from_str(line) {
        Ok(report) => Some(report),
        Err(e) => {
            log::debug!("Skipping malformed phase report {line:?}: {e}");
            None
        }
    }
}

/// Session-scoped accumulator of call-phase durations.
#[derive(Debug, Default)]
pub struct DurationRecorder {
    durations: BTreeMap<String, f64>,
}

impl DurationRecorder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Forget everything recorded so far.
    pub fn reset(&mut self) {
        self.durations.clear();
    }

    /// Record one phase report. Returns whether it was kept.
    pub fn record(&mut self, test_id: &str, phase: &str, seconds: f64) -> bool {
        if phase != CALL_PHASE || !seconds.is_finite() || seconds < 0.0 {
            return false;
        }
        self.durations.insert(test_id.to_string(), seconds);
        true
    }

    /// Feed every phase report of a stream. Returns how many were kept.
    pub fn record_stream(&mut self, stream: &str) -> usize {
        stream
            .lines()
            .filter_map(parse_report_line)
            .filter(|r| self.record(&r.test_id, &r.phase, r.seconds))
            .count()
    }

    pub fn len(&self) -> usize {
        self.durations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.durations.is_empty()
    }

    pub fn table(&self) -> DurationTable {
        self.durations
            .iter()
            .map(|(id, secs)| (id.clone(), *secs))
            .collect()
    }

    pub fn write_to(&self, path: &Path) -> Result<()> {
        crate::io::write_json_atomic(path, &self.durations)
    }
}

/// Writes the recorded table once, on [`FlushGuard::finish`] or on drop.
#[derive(Debug)]
pub struct FlushGuard {
    recorder: DurationRecorder,
    path: PathBuf,
    flushed: bool,
}

impl FlushGuard {
    /// Begin a session with an empty recorder.
    pub fn start(path: impl Into<PathBuf>) -> Self {
        Self {
            recorder: DurationRecorder::new(),
            path: path.into(),
            flushed: false,
        }
    }

    pub fn recorder(&mut self) -> &mut DurationRecorder {
        &mut self.recorder
    }

    /// Flush now and report the outcome. Returns the number of tests written.
    pub fn finish(mut self) -> Result<usize> {
        self.flush()
    }

    fn flush(&mut self) -> Result<usize> {
        if self.flushed {
            return Ok(self.recorder.len());
        }
        self.flushed = true;
        self.recorder.write_to(&self.path)?;
        log::info!(
            "Recorded durations for {} tests to {}",
            self.recorder.len(),
            self.path.display()
        );
        Ok(self.recorder.len())
    }
}

impl Drop for FlushGuard {
    fn drop(&mut self) {
        if let Err(e) = self.flush() {
            log::warn!("Failed to write durations: {e}");
        }
    }
}
