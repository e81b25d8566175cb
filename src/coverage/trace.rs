//! Coverage traces with per-line execution contexts.
//!
//! The on-disk format is the JSON report written by
//! `coverage json --show-contexts`:
//!
//! ```json
//! {
//!   "files": {
//!     "src/module_c.py": {
//!       "executed_lines": [1, 2],
//!       "contexts": { "2": ["tests/test_c.py::test_sum|run"] }
//!     }
//!   }
//! }
//! ```
//!
//! Relative file keys resolve against the directory holding the report.

use crate::errors::{Error, Result};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

/// Read access to a coverage trace.
pub trait CoverageStore {
    /// Every measured file, as recorded by the trace.
    fn measured_files(&self) -> Vec<PathBuf>;

    /// Context strings recorded for each line of `file`.
    fn contexts_by_line(&self, file: &Path) -> BTreeMap<usize, Vec<String>>;

    /// Whether any line of any file carries a non-empty context.
    fn has_contexts(&self) -> bool {
        self.measured_files().iter().any(|file| {
            self.contexts_by_line(file)
                .values()
                .flatten()
                .any(|ctx| !ctx.is_empty())
        })
    }
}

#[derive(Debug, Deserialize)]
struct RawReport {
    files: BTreeMap<String, RawFile>,
}

#[derive(Debug, Deserialize)]
struct RawFile {
    #[serde(default)]
    contexts: Option<BTreeMap<String, Vec<String>>>,
}

/// A `coverage json --show-contexts` report held in memory.
#[derive(Debug, Clone, Default)]
pub struct JsonCoverageTrace {
    files: BTreeMap<PathBuf, BTreeMap<usize, Vec<String>>>,
}

impl JsonCoverageTrace {
    /// Load a report from disk.
    ///
    /// A missing file is [`Error::InputAbsent`]; undecodable JSON is
    /// [`Error::InputMalformed`]. A trace without contexts loads fine and is
    /// rejected later by the attributor.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::absent(
                "coverage trace",
                path,
                Some("run `impactmap run-tests` to produce it".to_string()),
            ));
        }
        let content = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::parse(&content, base).map_err(|message| Error::malformed("coverage trace", path, message))
    }

    /// Parse report text, resolving relative file keys against `base`.
    pub fn parse(content: &str, base: &Path) -> std::result::Result<Self, String> {
        let raw: RawReport = serde_json::from_str(content).map_err(|e| e.to_string())?;

        let mut files = BTreeMap::new();
        for (name, file) in raw.files {
            let mut by_line = BTreeMap::new();
            for (line, contexts) in file.contexts.unwrap_or_default() {
                let line: usize = line
                    .parse()
                    .map_err(|_| format!("invalid line number {line:?} in {name}"))?;
                by_line.insert(line, contexts);
            }
            files.insert(resolve(base, &name), by_line);
        }
        Ok(Self { files })
    }
}

fn resolve(base: &Path, name: &str) -> PathBuf {
    let path = Path::new(name);
    let absolute = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    absolute.canonicalize().unwrap_or(absolute)
}

impl CoverageStore for JsonCoverageTrace {
    fn measured_files(&self) -> Vec<PathBuf> {
        self.files.keys().cloned().collect()
    }

    fn contexts_by_line(&self, file: &Path) -> BTreeMap<usize, Vec<String>> {
        self.files.get(file).cloned().unwrap_or_default()
    }
}
