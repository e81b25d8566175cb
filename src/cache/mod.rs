//! Stage-level memoization.
//!
//! Each producing stage of the pipeline stores at most one entry, keyed by
//! the stage name. An entry is reused only when both the input-file
//! fingerprint and the configuration fingerprint match exactly; every other
//! outcome is a miss.

pub mod fingerprint;
pub mod store;

pub use fingerprint::{config_fingerprint, files_fingerprint, Fingerprints};
pub use store::{CacheEntry, CacheStatus, StageCache};

use std::fmt;

/// The four cacheable pipeline stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    FunctionIndex,
    ChangedFunctions,
    TestCoverage,
    Durations,
}

impl Stage {
    pub const ALL: [Stage; 4] = [
        Stage::FunctionIndex,
        Stage::ChangedFunctions,
        Stage::TestCoverage,
        Stage::Durations,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Stage::FunctionIndex => "function_index",
            Stage::ChangedFunctions => "changed_functions",
            Stage::TestCoverage => "test_coverage",
            Stage::Durations => "durations",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}
