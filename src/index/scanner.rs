use super::python::{extract_functions, ParseFailure};
use super::{FunctionIndex, FunctionRecord};
use crate::errors::{Error, Result};
use glob::Pattern;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fs;
use std::path::{Path, PathBuf};

/// Counters collected while building an index.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexStats {
    pub files_scanned: usize,
    pub files_with_functions: usize,
    pub files_skipped: usize,
    pub functions: usize,
}

impl IndexStats {
    pub fn from_index(index: &FunctionIndex, files_skipped: usize) -> Self {
        Self {
            files_scanned: index.file_count(),
            files_with_functions: index.files().filter(|(_, f)| !f.is_empty()).count(),
            files_skipped,
            functions: index.function_count(),
        }
    }
}

/// Finds source files under a root and indexes their functions.
#[derive(Debug, Clone)]
pub struct FunctionScanner {
    root: PathBuf,
    include_patterns: Vec<String>,
    exclude_patterns: Vec<Pattern>,
}

impl FunctionScanner {
    pub fn new(
        root: impl Into<PathBuf>,
        include_patterns: &[String],
        exclude_patterns: &[String],
    ) -> Result<Self> {
        let exclude_patterns = exclude_patterns
            .iter()
            .map(|p| Pattern::new(p))
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Self {
            root: root.into(),
            include_patterns: include_patterns.to_vec(),
            exclude_patterns,
        })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Enumerate matched, non-excluded files as sorted absolute paths.
    pub fn scan_files(&self) -> Result<Vec<PathBuf>> {
        let root = self
            .root
            .canonicalize()
            .map_err(|e| Error::io(&self.root, e))?;
        let escaped_root = Pattern::escape(&root.to_string_lossy());

        let mut files = BTreeSet::new();
        for pattern in &self.include_patterns {
            let full_pattern = format!("{}/{}", escaped_root.trim_end_matches('/'), pattern);
            for entry in glob::glob(&full_pattern)? {
                let path = entry.map_err(|e| {
                    let path = e.path().to_path_buf();
                    Error::io(path, std::io::Error::from(e))
                })?;
                if !path.is_file() || self.is_excluded(&path) {
                    continue;
                }
                files.insert(path);
            }
        }

        log::debug!(
            "Matched {} files under {} with {} include patterns",
            files.len(),
            root.display(),
            self.include_patterns.len()
        );
        Ok(files.into_iter().collect())
    }

    fn is_excluded(&self, path: &Path) -> bool {
        let path_str = path.to_string_lossy();
        self.exclude_patterns.iter().any(|p| p.matches(&path_str))
    }

    /// Build the function index for every matched file.
    pub fn build_index(&self) -> Result<FunctionIndex> {
        self.build_index_with_stats().map(|(index, _)| index)
    }

    /// Build the function index, parsing files in parallel.
    ///
    /// Files with syntax errors contribute an empty function list. Read
    /// failures abort the whole scan.
    pub fn build_index_with_stats(&self) -> Result<(FunctionIndex, IndexStats)> {
        let files = self.scan_files()?;

        let parsed: Vec<(PathBuf, Option<Vec<FunctionRecord>>)> = files
            .into_par_iter()
            .map(|path| -> Result<(PathBuf, Option<Vec<FunctionRecord>>)> {
                let functions = index_file(&path)?;
                Ok((path, functions))
            })
            .collect::<Result<_>>()?;

        let mut index = FunctionIndex::new();
        let mut skipped = 0;
        for (path, functions) in parsed {
            if functions.is_none() {
                skipped += 1;
            }
            index.insert(path, functions.unwrap_or_default());
        }

        let stats = IndexStats::from_index(&index, skipped);
        log::info!(
            "Indexed {} functions in {} files ({} skipped for syntax errors)",
            stats.functions,
            stats.files_scanned,
            stats.files_skipped
        );
        Ok((index, stats))
    }
}

/// Read and index one file. `None` means the file did not parse.
fn index_file(path: &Path) -> Result<Option<Vec<FunctionRecord>>> {
    let bytes = fs::read(path).map_err(|e| Error::io(path, e))?;
    let content = String::from_utf8_lossy(&bytes);

    match extract_functions(&content, path) {
        Ok(functions) => Ok(Some(functions)),
        Err(ParseFailure::Syntax { line }) => {
            log::warn!("Skipping {}: syntax error near line {}", path.display(), line);
            Ok(None)
        }
        Err(e) => {
            log::warn!("Skipping {}: {}", path.display(), e);
            Ok(None)
        }
    }
}
