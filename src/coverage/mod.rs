//! Coverage attribution: which functions did each test execute?

pub mod trace;

pub use trace::{CoverageStore, JsonCoverageTrace};

use crate::errors::{Error, Result};
use crate::index::FunctionIndex;
use serde::Serialize;
use std::collections::{BTreeMap, BTreeSet};
use std::path::Path;

/// Test identifier to the identifiers of functions its body executed.
pub type TestCoverageMap = BTreeMap<String, BTreeSet<String>>;

/// Execution phases that count as test-body coverage.
const RUN_PHASES: [&str; 2] = ["", "run"];

/// Split a `"<test_id>|<phase>"` context into its parts.
///
/// Returns `None` for contexts outside the test body (setup, teardown) and
/// for contexts without a test id.
pub fn parse_context(context: &str) -> Option<&str> {
    let (test_id, phase) = context.split_once('|').unwrap_or((context, ""));
    if test_id.is_empty() || !RUN_PHASES.contains(&phase) {
        return None;
    }
    Some(test_id)
}

/// Fold a trace into a [`TestCoverageMap`].
///
/// Fails with [`Error::MissingContexts`] when the trace carries no test
/// contexts at all, which means it was recorded without context tracking.
/// Lines that resolve to no indexed function are dropped.
pub fn attribute_coverage(
    store: &dyn CoverageStore,
    index: &FunctionIndex,
    trace_path: &Path,
) -> Result<TestCoverageMap> {
    if !store.has_contexts() {
        return Err(Error::MissingContexts {
            path: trace_path.to_path_buf(),
        });
    }

    let mut coverage = TestCoverageMap::new();
    let mut unresolved_lines = 0usize;

    for file in store.measured_files() {
        if file.extension().is_none_or(|ext| ext != "py") {
            continue;
        }
        let Some(functions) = index.functions_in(&file) else {
            continue;
        };
        if functions.is_empty() {
            continue;
        }

        for (line, contexts) in store.contexts_by_line(&file) {
            let Some(function) = crate::index::find_function_at_line(functions, line) else {
                unresolved_lines += 1;
                continue;
            };
            let identifier = function.identifier();
            for test_id in contexts.iter().filter_map(|c| parse_context(c)) {
                coverage
                    .entry(test_id.to_string())
                    .or_default()
                    .insert(identifier.clone());
            }
        }
    }

    log::info!(
        "Attributed coverage for {} tests ({} covered lines outside any function)",
        coverage.len(),
        unresolved_lines
    );
    Ok(coverage)
}

/// Derived, read-only view over a coverage map.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CoverageStats {
    pub total_tests: usize,
    pub total_functions: usize,
    pub covered_functions: usize,
    pub uncovered_functions: usize,
    pub coverage_percentage: f64,
}

impl CoverageStats {
    pub fn compute(coverage: &TestCoverageMap, index: &FunctionIndex) -> Self {
        let all: BTreeSet<String> = index.records().map(|f| f.identifier()).collect();
        let covered = covered_functions(coverage);
        let covered_known = covered.intersection(&all).count();

        Self {
            total_tests: coverage.len(),
            total_functions: all.len(),
            covered_functions: covered_known,
            uncovered_functions: all.len() - covered_known,
            coverage_percentage: if all.is_empty() {
                0.0
            } else {
                covered_known as f64 / all.len() as f64 * 100.0
            },
        }
    }
}

/// Union of every test's covered functions.
pub fn covered_functions(coverage: &TestCoverageMap) -> BTreeSet<String> {
    coverage.values().flatten().cloned().collect()
}
