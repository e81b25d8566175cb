//! Error types for the impact analysis pipeline.
//!
//! Every failure the library can report is an [`Error`]. Variants are grouped
//! into an [`ErrorCategory`] so the orchestrating layer can decide what to do
//! next: regenerate a missing input, report a malformed one, or treat an empty
//! result as a legitimate no-op run.
//!
//! Request construction failures live in [`crate::request::BuildError`] and are
//! wrapped by [`Error::Build`] when they cross a module boundary.

use crate::request::BuildError;
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Result alias used throughout the library.
pub type Result<T> = std::result::Result<T, Error>;

/// Coarse classification of an [`Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCategory {
    /// A required input file does not exist.
    InputAbsent,
    /// An input exists but cannot be used as-is.
    InputMalformed,
    /// An input parsed correctly but carries nothing to work with.
    InputEmpty,
    /// A collaborator process exited unexpectedly or timed out.
    ExternalProcess,
    /// Invalid configuration.
    Configuration,
    /// File system failure outside of the categories above.
    Io,
}

impl fmt::Display for ErrorCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::InputAbsent => "input absent",
            Self::InputMalformed => "input malformed",
            Self::InputEmpty => "input empty",
            Self::ExternalProcess => "external process failure",
            Self::Configuration => "configuration error",
            Self::Io => "i/o error",
        };
        f.write_str(label)
    }
}

/// Main error type for impactmap operations
#[derive(Debug, Error)]
pub enum Error {
    /// A required input file is missing
    #[error("{what} not found: {}{}", .path.display(), hint_suffix(.hint))]
    InputAbsent {
        what: &'static str,
        path: PathBuf,
        hint: Option<String>,
    },

    /// An input file exists but could not be parsed
    #[error("{what} at {} is malformed: {message}", .path.display())]
    InputMalformed {
        what: &'static str,
        path: PathBuf,
        message: String,
    },

    /// The coverage trace was recorded without per-test contexts
    #[error(
        "coverage trace {} does not contain test contexts; \
         run the tests with --cov-context=test and export with `coverage json --show-contexts`",
        .path.display()
    )]
    MissingContexts { path: PathBuf },

    /// A collaborator process exited with an unexpected status
    #[error("`{command}` failed ({status}): {stderr}")]
    ProcessFailure {
        command: String,
        status: String,
        stderr: String,
    },

    /// A collaborator process did not finish in time and was killed
    #[error("`{command}` did not finish within {}s", .timeout.as_secs())]
    ProcessTimeout { command: String, timeout: Duration },

    /// The analysis root is not inside a git work tree
    #[error("{} is not inside a git work tree", .0.display())]
    NotARepository(PathBuf),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// File system errors with path context
    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Glob pattern errors
    #[error(transparent)]
    Pattern(#[from] glob::PatternError),

    /// Request construction failures
    #[error(transparent)]
    Build(#[from] BuildError),
}

fn hint_suffix(hint: &Option<String>) -> String {
    hint.as_ref()
        .map(|h| format!(" ({h})"))
        .unwrap_or_default()
}

impl Error {
    /// Create an input-absent error with an optional regeneration hint.
    pub fn absent(what: &'static str, path: impl Into<PathBuf>, hint: Option<String>) -> Self {
        Self::InputAbsent {
            what,
            path: path.into(),
            hint,
        }
    }

    /// Create an input-malformed error.
    pub fn malformed(
        what: &'static str,
        path: impl Into<PathBuf>,
        message: impl Into<String>,
    ) -> Self {
        Self::InputMalformed {
            what,
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create an I/O error with path context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Create a configuration error.
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Classify this error.
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::InputAbsent { .. } => ErrorCategory::InputAbsent,
            Self::InputMalformed { .. } | Self::MissingContexts { .. } => {
                ErrorCategory::InputMalformed
            }
            Self::ProcessFailure { .. } | Self::ProcessTimeout { .. } => {
                ErrorCategory::ExternalProcess
            }
            Self::NotARepository(_) | Self::Config(_) | Self::Pattern(_) => {
                ErrorCategory::Configuration
            }
            Self::Io { .. } => ErrorCategory::Io,
            Self::Build(e) => e.category(),
        }
    }

    /// Whether the orchestrating caller can recover by producing the input first.
    pub fn is_regenerable(&self) -> bool {
        matches!(
            self,
            Self::InputAbsent { .. } | Self::MissingContexts { .. }
        )
    }
}
