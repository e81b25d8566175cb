//! Change detection: which indexed functions did a diff touch?

pub mod git;
pub mod hunks;

pub use git::{DiffRange, GitRepo};
pub use hunks::{parse_changed_lines, parse_hunk_header, HunkRange};

use crate::errors::Result;
use crate::index::FunctionIndex;
use std::collections::{BTreeMap, BTreeSet};
use std::path::{Path, PathBuf};

/// Added/modified target lines per absolute file path.
pub type ChangedLines = BTreeMap<PathBuf, BTreeSet<usize>>;

/// Source-language suffix considered by the detector.
pub const SOURCE_EXTENSION: &str = "py";

/// Finds changed functions between two revisions of a project.
#[derive(Debug, Clone)]
pub struct ChangeDetector {
    root: PathBuf,
    repo: GitRepo,
}

impl ChangeDetector {
    /// `root` is the analysis scope; it may be a subdirectory of the work tree.
    pub fn new(root: &Path, repo: GitRepo) -> Result<Self> {
        let root = root
            .canonicalize()
            .map_err(|e| crate::errors::Error::io(root, e))?;
        Ok(Self { root, repo })
    }

    /// Changed source files inside the analysis root, as absolute paths.
    ///
    /// Deleted files and paths that fall outside the root (for example a
    /// sibling project in the same repository) are dropped.
    pub fn changed_files(&self, range: &DiffRange) -> Result<Vec<PathBuf>> {
        let files = self
            .repo
            .changed_paths(range)?
            .into_iter()
            .filter(|p| has_source_extension(p))
            .filter_map(|p| self.repo.work_tree().join(p).canonicalize().ok())
            .filter(|p| p.starts_with(&self.root))
            .collect::<Vec<_>>();

        log::debug!("{} changed source files under {}", files.len(), self.root.display());
        Ok(files)
    }

    /// Changed-line sets for each changed source file.
    pub fn changed_lines(&self, range: &DiffRange) -> Result<ChangedLines> {
        let mut result = ChangedLines::new();
        for file in self.changed_files(range)? {
            let Ok(relative) = file.strip_prefix(self.repo.work_tree()) else {
                continue;
            };
            let diff = self.repo.zero_context_diff(range, relative)?;
            let lines = parse_changed_lines(&diff);
            if !lines.is_empty() {
                result.insert(file, lines);
            }
        }
        Ok(result)
    }

    /// Identifiers of indexed functions whose range overlaps a changed line.
    pub fn changed_functions(
        &self,
        range: &DiffRange,
        index: &FunctionIndex,
    ) -> Result<BTreeSet<String>> {
        let lines = self.changed_lines(range)?;
        let changed = attribute_changes(&lines, index);
        log::info!(
            "{} changed functions across {} changed files ({}..{})",
            changed.len(),
            lines.len(),
            range.base,
            range.target.as_deref().unwrap_or("work tree")
        );
        Ok(changed)
    }
}

fn has_source_extension(path: &Path) -> bool {
    path.extension().is_some_and(|ext| ext == SOURCE_EXTENSION)
}

/// Intersect changed lines with function ranges.
///
/// A single overlapping line marks the function as changed. Files absent
/// from the index contribute nothing.
pub fn attribute_changes(changed: &ChangedLines, index: &FunctionIndex) -> BTreeSet<String> {
    changed
        .iter()
        .filter_map(|(file, lines)| index.functions_in(file).map(|fns| (fns, lines)))
        .flat_map(|(functions, lines)| {
            functions
                .iter()
                .filter(|f| lines.range(f.start_line..=f.end_line).next().is_some())
                .map(|f| f.identifier())
        })
        .collect()
}
