//! Function-level test impact analysis for Python projects under git.
//!
//! Given two revisions, impactmap works out which functions changed, which
//! tests executed those functions, and how long each test takes, and writes
//! an [`ImpactRequest`] for a downstream test-selection service.

// Export modules for library usage
pub mod cache;
pub mod changes;
pub mod cli;
pub mod commands;
pub mod config;
pub mod coverage;
pub mod durations;
pub mod errors;
pub mod index;
pub mod io;
pub mod pipeline;
pub mod process;
pub mod request;
pub mod runner;

// Re-export commonly used types
pub use crate::cache::{CacheStatus, Stage, StageCache};
pub use crate::changes::{ChangeDetector, DiffRange, GitRepo};
pub use crate::config::ImpactConfig;
pub use crate::coverage::{attribute_coverage, CoverageStore, JsonCoverageTrace, TestCoverageMap};
pub use crate::durations::{load_durations, DurationRecorder, DurationTable, FlushGuard};
pub use crate::errors::{Error, ErrorCategory, Result};
pub use crate::index::{find_function_at_line, FunctionIndex, FunctionRecord, FunctionScanner};
pub use crate::pipeline::{Pipeline, RunReport};
pub use crate::request::{BuildError, ImpactRequest, RequestBuilder};
pub use crate::runner::TestRunner;
