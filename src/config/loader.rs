use super::ImpactConfig;
use crate::errors::{Error, Result};
use std::fs;
use std::path::{Path, PathBuf};

pub const CONFIG_FILE_NAME: &str = ".impactmap.toml";

/// How many directories discovery walks up from the start directory.
pub const MAX_TRAVERSAL_DEPTH: usize = 10;

/// `start` and its ancestors, at most `max_depth` directories in total.
pub fn directory_ancestors(start: PathBuf, max_depth: usize) -> impl Iterator<Item = PathBuf> {
    std::iter::successors(Some(start), |dir| {
        let mut parent = dir.clone();
        if parent.pop() {
            Some(parent)
        } else {
            None
        }
    })
    .take(max_depth)
}

impl ImpactConfig {
    /// Parse configuration text without validating it. Relative paths resolve
    /// against `base_dir`.
    pub fn parse(contents: &str, base_dir: &Path) -> std::result::Result<Self, String> {
        let mut config: ImpactConfig =
            toml::from_str(contents).map_err(|e| format!("failed to parse: {e}"))?;
        config.set_base_dir(base_dir.to_path_buf());
        Ok(config)
    }

    /// Load the file at `path`. Missing files are an error here.
    pub fn load(path: &Path) -> Result<Self> {
        if !path.is_file() {
            return Err(Error::absent("configuration file", path, None));
        }
        let contents = fs::read_to_string(path).map_err(|e| Error::io(path, e))?;
        let base_dir = path
            .parent()
            .filter(|p| !p.as_os_str().is_empty())
            .map(Path::to_path_buf)
            .unwrap_or_else(|| PathBuf::from("."));
        let base_dir = base_dir.canonicalize().unwrap_or(base_dir);

        let config = Self::parse(&contents, &base_dir)
            .map_err(|message| Error::malformed("configuration file", path, message))?;
        config.validate()?;

        log::debug!("Loaded config from {}", path.display());
        Ok(config)
    }

    /// Nearest `.impactmap.toml` at or above `start`, or defaults rooted at
    /// `start` when there is none.
    pub fn discover(start: &Path) -> Result<Self> {
        let found = directory_ancestors(start.to_path_buf(), MAX_TRAVERSAL_DEPTH)
            .map(|dir| dir.join(CONFIG_FILE_NAME))
            .find(|path| path.is_file());

        match found {
            Some(path) => Self::load(&path),
            None => {
                log::debug!(
                    "No config found after checking {} directories. Using default config.",
                    MAX_TRAVERSAL_DEPTH
                );
                let config = Self::with_base_dir(start);
                config.validate()?;
                Ok(config)
            }
        }
    }

    /// An explicit path if given, otherwise discovery from the working directory.
    pub fn resolve(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::load(path),
            None => {
                let current = std::env::current_dir().map_err(|e| Error::io(".", e))?;
                Self::discover(&current)
            }
        }
    }
}

/// The commented configuration written by `impactmap init`.
pub fn default_toml() -> &'static str {
    r#"# impactmap configuration

[project]
# Relative to this file
root = "."
source_patterns = ["src/**/*.py"]
test_patterns = ["tests/**/*.py"]
# Matched against the full path of each file
exclude_patterns = ["**/test_*.py", "**/__pycache__/**", "**/migrations/**"]

[git]
base_ref = "HEAD~1"
# Empty compares against the work tree
target_ref = "HEAD"
timeout_secs = 60

[coverage]
# Written by `coverage json --show-contexts`
file = "coverage.json"

[durations]
file = ".test_durations.json"

[selection]
time_budget = 300.0
max_seed_size = 2

[output]
file = "impact_request.json"

[cache]
enabled = true
directory = ".impactmap_cache"

[runner]
program = "pytest"
coverage_program = "coverage"
extra_args = []
timeout_secs = 1800
"#
}
