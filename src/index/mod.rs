//! Structural index of function boundaries.
//!
//! The index maps every scanned source file to the functions defined in it,
//! in declaration order. Both change detection and coverage attribution
//! resolve line numbers against it, so it is always built first.

pub mod python;
pub mod scanner;

pub use scanner::{FunctionScanner, IndexStats};

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::path::{Path, PathBuf};

/// One function or method definition.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionRecord {
    pub file: PathBuf,
    pub name: String,
    /// 1-based line of the `def` header
    pub start_line: usize,
    /// 1-based last line of the body, inclusive
    pub end_line: usize,
}

impl FunctionRecord {
    pub fn new(file: impl Into<PathBuf>, name: impl Into<String>, start: usize, end: usize) -> Self {
        Self {
            file: file.into(),
            name: name.into(),
            start_line: start,
            end_line: end.max(start),
        }
    }

    /// Stable key used as the unit of change and coverage.
    pub fn identifier(&self) -> String {
        format!("{}::{}::{}", self.file.display(), self.start_line, self.name)
    }

    pub fn contains_line(&self, line: usize) -> bool {
        self.start_line <= line && line <= self.end_line
    }

    /// Number of lines spanned by the definition.
    pub fn span(&self) -> usize {
        self.end_line - self.start_line + 1
    }
}

impl fmt::Display for FunctionRecord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} ({}:{}-{})",
            self.name,
            self.file.display(),
            self.start_line,
            self.end_line
        )
    }
}

/// Mapping from absolute source path to its functions in declaration order.
///
/// Files that were scanned but define no functions are kept with an empty
/// list so the index also records which files were looked at.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FunctionIndex {
    files: BTreeMap<PathBuf, Vec<FunctionRecord>>,
}

impl FunctionIndex {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, file: PathBuf, functions: Vec<FunctionRecord>) {
        self.files.insert(file, functions);
    }

    pub fn functions_in(&self, file: &Path) -> Option<&[FunctionRecord]> {
        self.files.get(file).map(Vec::as_slice)
    }

    pub fn contains_file(&self, file: &Path) -> bool {
        self.files.contains_key(file)
    }

    pub fn files(&self) -> impl Iterator<Item = (&PathBuf, &Vec<FunctionRecord>)> {
        self.files.iter()
    }

    pub fn records(&self) -> impl Iterator<Item = &FunctionRecord> {
        self.files.values().flatten()
    }

    pub fn file_count(&self) -> usize {
        self.files.len()
    }

    pub fn function_count(&self) -> usize {
        self.files.values().map(Vec::len).sum()
    }

    /// Resolve a line of `file` to its enclosing function, if any.
    pub fn find_function(&self, file: &Path, line: usize) -> Option<&FunctionRecord> {
        self.functions_in(file)
            .and_then(|functions| find_function_at_line(functions, line))
    }
}

/// Return the innermost function whose range contains `line`.
///
/// Innermost means the smallest span; equal spans prefer the later header,
/// then the earlier declaration. Lines outside every function yield `None`.
pub fn find_function_at_line(functions: &[FunctionRecord], line: usize) -> Option<&FunctionRecord> {
    functions
        .iter()
        .enumerate()
        .filter(|(_, f)| f.contains_line(line))
        .min_by(|(ia, a), (ib, b)| {
            a.span()
                .cmp(&b.span())
                .then(b.start_line.cmp(&a.start_line))
                .then(ia.cmp(ib))
        })
        .map(|(_, f)| f)
}
