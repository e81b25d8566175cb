//! Eager validation, run once when configuration is loaded.

use super::ImpactConfig;
use crate::errors::{Error, Result};
use glob::Pattern;

impl ImpactConfig {
    /// Reject configurations no stage could run with.
    ///
    /// Collects every problem so a user can fix them in one pass.
    pub fn validate(&self) -> Result<()> {
        let problems = collect_problems(self);
        if problems.is_empty() {
            Ok(())
        } else {
            Err(Error::config(problems.join("; ")))
        }
    }
}

fn collect_problems(config: &ImpactConfig) -> Vec<String> {
    let mut problems = Vec::new();

    let budget = config.selection.time_budget;
    if !budget.is_finite() || budget <= 0.0 {
        problems.push(format!("selection.time_budget must be positive, got {budget}"));
    }
    if config.selection.max_seed_size == 0 {
        problems.push("selection.max_seed_size must be positive".to_string());
    }
    if config.project.source_patterns.is_empty() {
        problems.push("project.source_patterns must not be empty".to_string());
    }
    if config.git.base_ref.trim().is_empty() {
        problems.push("git.base_ref must not be empty".to_string());
    }
    if config.git.timeout_secs == 0 {
        problems.push("git.timeout_secs must be positive".to_string());
    }
    if config.runner.timeout_secs == 0 {
        problems.push("runner.timeout_secs must be positive".to_string());
    }
    if config.runner.program.trim().is_empty() {
        problems.push("runner.program must not be empty".to_string());
    }
    if config.runner.coverage_program.trim().is_empty() {
        problems.push("runner.coverage_program must not be empty".to_string());
    }

    let patterns = [
        ("project.source_patterns", &config.project.source_patterns),
        ("project.test_patterns", &config.project.test_patterns),
        ("project.exclude_patterns", &config.project.exclude_patterns),
    ];
    for (field, list) in patterns {
        for pattern in list {
            if let Err(e) = Pattern::new(pattern) {
                problems.push(format!("{field}: invalid glob {pattern:?}: {e}"));
            }
        }
    }

    problems
}
