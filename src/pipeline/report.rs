//! What a pipeline run did, for printing and for tests.

use crate::cache::{CacheStatus, Stage};
use crate::coverage::CoverageStats;
use crate::durations::{DurationStats, LoadStatus};
use crate::errors::{Error, ErrorCategory};
use crate::index::IndexStats;
use crate::request::{BuildError, BuildStats, ImpactRequest};
use std::path::PathBuf;
use std::time::Duration;

/// A stage that could not produce its result.
#[derive(Debug, Clone, PartialEq)]
pub struct StageFailure {
    pub category: ErrorCategory,
    pub message: String,
    /// Running the producing process first would fix this.
    pub regenerable: bool,
}

impl From<&Error> for StageFailure {
    fn from(error: &Error) -> Self {
        Self {
            category: error.category(),
            message: error.to_string(),
            regenerable: error.is_regenerable(),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StageReport {
    pub stage: Stage,
    pub cache: CacheStatus,
    pub elapsed: Duration,
    pub failure: Option<StageFailure>,
}

#[derive(Debug, Clone)]
pub struct RunReport {
    pub index: IndexStats,
    pub changed_functions: usize,
    pub coverage: CoverageStats,
    pub durations: DurationStats,
    pub durations_status: LoadStatus,
    pub build: BuildStats,
    pub stages: Vec<StageReport>,
    pub request: Result<ImpactRequest, BuildError>,
    /// Where the request was written, when one was built.
    pub output: Option<PathBuf>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.request.is_ok()
    }

    pub fn stage(&self, stage: Stage) -> Option<&StageReport> {
        self.stages.iter().find(|s| s.stage == stage)
    }

    pub fn failures(&self) -> impl Iterator<Item = (Stage, &StageFailure)> {
        self.stages
            .iter()
            .filter_map(|s| s.failure.as_ref().map(|f| (s.stage, f)))
    }

    /// Whether any failed stage could be fixed by regenerating its input.
    pub fn needs_regeneration(&self) -> bool {
        self.failures().any(|(_, f)| f.regenerable)
    }
}
