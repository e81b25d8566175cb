//! Property-based tests for the pure parts of impact analysis
//!
//! These tests verify invariants that should hold for all inputs:
//! - Hunk headers map to exactly the target-side line range
//! - Line resolution picks a containing function of minimal span
//! - Every candidate in a built request is positive and relevant
//! - Extraction finds one record per generated `def`

use impactmap::changes::parse_changed_lines;
use impactmap::coverage::TestCoverageMap;
use impactmap::durations::DurationTable;
use impactmap::index::python::extract_functions;
use impactmap::index::{find_function_at_line, FunctionRecord};
use impactmap::request::RequestBuilder;
use proptest::prelude::*;
use std::collections::BTreeSet;
use std::path::Path;

fn function_ranges() -> impl Strategy<Value = Vec<(usize, usize)>> {
    prop::collection::vec((1usize..200, 0usize..40), 1..12)
        .prop_map(|ranges| ranges.into_iter().map(|(s, len)| (s, s + len)).collect())
}

fn function_name() -> impl Strategy<Value = String> {
    "f_[a-z0-9_]{0,10}"
}

proptest! {
    /// Property: `+c,d` yields lines c..c+d, and `+c` alone yields just c
    #[test]
    fn prop_hunk_header_maps_to_target_range(
        old_start in 1usize..5000,
        start in 1usize..5000,
        count in 0usize..300,
        omit_count in any::<bool>()
    ) {
        let header = if omit_count {
            format!("@@ -{old_start},2 +{start} @@ def helper():")
        } else {
            format!("@@ -{old_start},2 +{start},{count} @@")
        };
        let lines = parse_changed_lines(&format!("diff --git a/x.py b/x.py\n{header}\n+pass\n"));

        let expected: BTreeSet<usize> = if omit_count {
            BTreeSet::from([start])
        } else {
            (start..start + count).collect()
        };
        prop_assert_eq!(lines, expected);
    }

    /// Property: body lines that merely look like headers are ignored
    #[test]
    fn prop_body_lines_never_add_changes(text in "[a-z +@,0-9]{0,40}") {
        let diff = format!("@@ -1,0 +7,0 @@\n+{text}\n-{text}\n {text}\n");
        prop_assert!(parse_changed_lines(&diff).is_empty());
    }

    /// Property: the resolved function contains the line and no containing
    /// function is strictly smaller
    #[test]
    fn prop_resolution_is_innermost(ranges in function_ranges(), line in 1usize..260) {
        let functions: Vec<FunctionRecord> = ranges
            .iter()
            .enumerate()
            .map(|(i, (s, e))| FunctionRecord::new("/p/m.py", format!("f{i}"), *s, *e))
            .collect();

        match find_function_at_line(&functions, line) {
            Some(found) => {
                prop_assert!(found.contains_line(line));
                let smallest = functions
                    .iter()
                    .filter(|f| f.contains_line(line))
                    .map(FunctionRecord::span)
                    .min()
                    .unwrap();
                prop_assert_eq!(found.span(), smallest);
            }
            None => prop_assert!(functions.iter().all(|f| !f.contains_line(line))),
        }
    }

    /// Property: built requests only carry positive, relevant candidates
    #[test]
    fn prop_candidates_are_positive_and_relevant(
        coverage in prop::collection::btree_map(
            "t[0-9]{1,2}",
            prop::collection::btree_set("fn[0-9]", 1..4),
            1..10,
        ),
        changed in prop::collection::btree_set("fn[0-9]", 1..4),
        durations in prop::collection::btree_map("t[0-9]{1,2}", -2.0f64..5.0, 0..10),
    ) {
        let coverage: TestCoverageMap = coverage;
        let durations: DurationTable = durations.into_iter().collect();
        let builder = RequestBuilder::new(&changed, &coverage, &durations);

        let stats = builder.stats();
        prop_assert_eq!(
            stats.total_tests,
            stats.dropped_irrelevant
                + stats.dropped_missing_duration
                + stats.dropped_invalid_duration
                + stats.candidates
        );

        if let Ok(request) = builder.build() {
            prop_assert_eq!(request.candidate_tests().len(), stats.candidates);
            for (test_id, candidate) in request.candidate_tests() {
                prop_assert!(candidate.duration > 0.0);
                prop_assert!(!candidate.covered_functions.is_empty());
                for function in &candidate.covered_functions {
                    prop_assert!(changed.contains(function));
                    prop_assert!(coverage[test_id].contains(function));
                }
            }
            prop_assert_eq!(builder.build(), Ok(request));
        }
    }

    /// Property: each generated top-level `def` becomes one record at its line
    #[test]
    fn prop_extraction_finds_every_def(
        names in prop::collection::btree_set(function_name(), 1..8),
        body_lines in 1usize..4
    ) {
        let mut source = String::new();
        let mut expected = Vec::new();
        let mut line = 1;
        for name in &names {
            expected.push((name.clone(), line));
            source.push_str(&format!("def {name}(x):\n"));
            for i in 0..body_lines {
                source.push_str(&format!("    x = x + {i}\n"));
            }
            source.push_str("\n\n");
            line += body_lines + 3;
        }

        let functions = extract_functions(&source, Path::new("/p/gen.py")).unwrap();
        let found: Vec<(String, usize)> = functions
            .iter()
            .map(|f| (f.name.clone(), f.start_line))
            .collect();
        prop_assert_eq!(found, expected);
        for f in &functions {
            prop_assert_eq!(f.end_line, f.start_line + body_lines);
        }
    }
}
