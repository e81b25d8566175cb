//! CLI command implementations for impactmap operations.
//!
//! Available commands:
//! - **analyze**: Build an impact request for the changes between two revisions
//! - **run-tests**: Run the tests to record the coverage trace and durations
//! - **clear-cache**: Remove every cached stage result
//! - **init**: Initialize a new impactmap configuration file

pub mod analyze;
pub mod clear_cache;
pub mod init;

pub use analyze::{handle_analyze, AnalyzeConfig};
pub use clear_cache::clear_cache;
pub use init::{init_config, init_config_in};
pub use run_tests::run_tests;
