//! Assembling the impact request handed to the selection service.

use crate::coverage::TestCoverageMap;
use crate::durations::DurationTable;
use crate::errors::ErrorCategory;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use thiserror::Error;

/// Schema version written into every request.
pub const SCHEMA_VERSION: &str = "1.0.0";

/// Why a request could not be built.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BuildError {
    #[error("no changed functions provided")]
    NoChangedFunctions,

    #[error("no test coverage data provided")]
    NoCoverage,

    #[error("no test duration data provided")]
    NoDurations,

    #[error("time budget must be positive, got {0}")]
    InvalidTimeBudget(f64),

    #[error("max seed size must be positive, got {0}")]
    InvalidMaxSeedSize(usize),

    #[error(
        "no valid tests found: {irrelevant} tests without changed-function coverage, \
         {missing_duration} tests without duration data, \
         {invalid_duration} tests with a non-positive duration"
    )]
    NoCandidates {
        irrelevant: usize,
        missing_duration: usize,
        invalid_duration: usize,
    },
}

impl BuildError {
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InvalidTimeBudget(_) | Self::InvalidMaxSeedSize(_) => {
                ErrorCategory::Configuration
            }
            Self::NoChangedFunctions
            | Self::NoCoverage
            | Self::NoDurations
            | Self::NoCandidates { .. } => ErrorCategory::InputEmpty,
        }
    }
}

/// One test the selection service may schedule.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TestCandidate {
    pub duration: f64,
    /// Sorted intersection of the test's coverage with the changed functions.
    pub covered_functions: Vec<String>,
}

/// The validated document consumed by the selection service.
///
/// Only [`RequestBuilder::build`] constructs one, so every candidate has a
/// positive duration and at least one covered changed function.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ImpactRequest {
    schema_version: String,
    changed_functions: Vec<String>,
    candidate_tests: BTreeMap<String, TestCandidate>,
    time_budget: f64,
    max_seed_size: usize,
}

impl ImpactRequest {
    pub fn schema_version(&self) -> &str {
        &self.schema_version
    }

    pub fn changed_functions(&self) -> &[String] {
        &self.changed_functions
    }

    pub fn candidate_tests(&self) -> &BTreeMap<String, TestCandidate> {
        &self.candidate_tests
    }

    pub fn time_budget(&self) -> f64 {
        self.time_budget
    }

    pub fn max_seed_size(&self) -> usize {
        self.max_seed_size
    }

    pub fn to_json_pretty(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

/// Counts describing one build, successful or not.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct BuildStats {
    pub changed_functions: usize,
    pub total_tests: usize,
    pub relevant_tests: usize,
    pub dropped_irrelevant: usize,
    pub dropped_missing_duration: usize,
    pub dropped_invalid_duration: usize,
    pub candidates: usize,
    pub total_duration: f64,
    pub budget_utilization: f64,
}

pub struct RequestBuilder<'a> {
    changed: &'a BTreeSet<String>,
    coverage: &'a TestCoverageMap,
    durations: &'a DurationTable,
    time_budget: f64,
    max_seed_size: usize,
}

impl<'a> RequestBuilder<'a> {
    pub fn new(
        changed: &'a BTreeSet<String>,
        coverage: &'a TestCoverageMap,
        durations: &'a DurationTable,
    ) -> Self {
        Self {
            changed,
            coverage,
            durations,
            time_budget: 300.0,
            max_seed_size: 2,
        }
    }

    pub fn time_budget(mut self, seconds: f64) -> Self {
        self.time_budget = seconds;
        self
    }

    pub fn max_seed_size(mut self, size: usize) -> Self {
        self.max_seed_size = size;
        self
    }

    pub fn build(&self) -> Result<ImpactRequest, BuildError> {
        if self.changed.is_empty() {
            return Err(BuildError::NoChangedFunctions);
        }
        if self.coverage.is_empty() {
            return Err(BuildError::NoCoverage);
        }
        if self.durations.is_empty() {
            return Err(BuildError::NoDurations);
        }
        if !self.time_budget.is_finite() || self.time_budget <= 0.0 {
            return Err(BuildError::InvalidTimeBudget(self.time_budget));
        }
        if self.max_seed_size == 0 {
            return Err(BuildError::InvalidMaxSeedSize(self.max_seed_size));
        }

        let (candidate_tests, stats) = self.filter();
        if candidate_tests.is_empty() {
            return Err(BuildError::NoCandidates {
                irrelevant: stats.dropped_irrelevant,
                missing_duration: stats.dropped_missing_duration,
                invalid_duration: stats.dropped_invalid_duration,
            });
        }

        Ok(ImpactRequest {
            schema_version: SCHEMA_VERSION.to_string(),
            changed_functions: self.changed.iter().cloned().collect(),
            candidate_tests,
            time_budget: self.time_budget,
            max_seed_size: self.max_seed_size,
        })
    }

    /// Counts for the current inputs, whether or not `build` would succeed.
    pub fn stats(&self) -> BuildStats {
        self.filter().1
    }

    fn filter(&self) -> (BTreeMap<String, TestCandidate>, BuildStats) {
        let mut stats = BuildStats {
            changed_functions: self.changed.len(),
            total_tests: self.coverage.len(),
            ..BuildStats::default()
        };
        let mut candidates = BTreeMap::new();

        for (test_id, covered) in self.coverage {
            let relevant: Vec<String> = covered.intersection(self.changed).cloned().collect();
            if relevant.is_empty() {
                stats.dropped_irrelevant += 1;
                continue;
            }
            stats.relevant_tests += 1;

            let Some(duration) = self.durations.get(test_id) else {
                stats.dropped_missing_duration += 1;
                continue;
            };
            if duration <= 0.0 {
                stats.dropped_invalid_duration += 1;
                continue;
            }

            stats.total_duration += duration;
            candidates.insert(
                test_id.clone(),
                TestCandidate {
                    duration,
                    covered_functions: relevant,
                },
            );
        }

        stats.candidates = candidates.len();
        if self.time_budget > 0.0 {
            stats.budget_utilization = stats.total_duration / self.time_budget * 100.0;
        }
        (candidates, stats)
    }
}
