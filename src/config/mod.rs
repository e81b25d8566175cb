//! Configuration for an impact analysis run.
//!
//! Loaded from `.impactmap.toml`; every field has a documented default so an
//! empty file (or no file at all) is a valid configuration.

mod loader;
pub mod validation;

pub use loader::{default_toml, directory_ancestors, CONFIG_FILE_NAME, MAX_TRAVERSAL_DEPTH};

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Root configuration structure for impactmap.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ImpactConfig {
    /// Which files belong to the project
    #[serde(default)]
    pub project: ProjectConfig,

    /// Revisions to compare
    #[serde(default)]
    pub git: GitConfig,

    /// Coverage trace location
    #[serde(default)]
    pub coverage: CoverageConfig,

    /// Duration table location
    #[serde(default)]
    pub durations: DurationsConfig,

    /// Parameters forwarded to the selection service
    #[serde(default)]
    pub selection: SelectionConfig,

    /// Where the request is written
    #[serde(default)]
    pub output: OutputConfig,

    /// Stage cache settings
    #[serde(default)]
    pub cache: CacheConfig,

    /// Test runner invocation
    #[serde(default)]
    pub runner: RunnerConfig,

    /// Directory relative paths resolve against: the config file's directory,
    /// or the working directory when running on defaults.
    #[serde(skip)]
    base_dir: PathBuf,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProjectConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,

    #[serde(default = "default_source_patterns")]
    pub source_patterns: Vec<String>,

    #[serde(default = "default_test_patterns")]
    pub test_patterns: Vec<String>,

    /// Glob patterns matched against the full path of each candidate file
    #[serde(default = "default_exclude_patterns")]
    pub exclude_patterns: Vec<String>,
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            source_patterns: default_source_patterns(),
            test_patterns: default_test_patterns(),
            exclude_patterns: default_exclude_patterns(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GitConfig {
    #[serde(default = "default_base_ref")]
    pub base_ref: String,

    /// Empty means the work tree
    #[serde(default = "default_target_ref")]
    pub target_ref: String,

    #[serde(default = "default_git_timeout")]
    pub timeout_secs: u64,
}

impl Default for GitConfig {
    fn default() -> Self {
        Self {
            base_ref: default_base_ref(),
            target_ref: default_target_ref(),
            timeout_secs: default_git_timeout(),
        }
    }
}

impl GitConfig {
    pub fn target(&self) -> Option<String> {
        Some(self.target_ref.trim())
            .filter(|t| !t.is_empty())
            .map(str::to_string)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoverageConfig {
    #[serde(default = "default_coverage_file")]
    pub file: PathBuf,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            file: default_coverage_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DurationsConfig {
    #[serde(default = "default_durations_file")]
    pub file: PathBuf,
}

impl Default for DurationsConfig {
    fn default() -> Self {
        Self {
            file: default_durations_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SelectionConfig {
    /// Seconds available to the selected tests
    #[serde(default = "default_time_budget")]
    pub time_budget: f64,

    #[serde(default = "default_max_seed_size")]
    pub max_seed_size: usize,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            time_budget: default_time_budget(),
            max_seed_size: default_max_seed_size(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutputConfig {
    #[serde(default = "default_output_file")]
    pub file: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            file: default_output_file(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,

    #[serde(default = "default_cache_directory")]
    pub directory: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            directory: default_cache_directory(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunnerConfig {
    #[serde(default = "default_runner_program")]
    pub program: String,

    /// Exports the recorded trace as JSON
    #[serde(default = "default_coverage_program")]
    pub coverage_program: String,

    #[serde(default)]
    pub extra_args: Vec<String>,

    #[serde(default = "default_runner_timeout")]
    pub timeout_secs: u64,
}

impl Default for RunnerConfig {
    fn default() -> Self {
        Self {
            program: default_runner_program(),
            coverage_program: default_coverage_program(),
            extra_args: Vec::new(),
            timeout_secs: default_runner_timeout(),
        }
    }
}

impl RunnerConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_source_patterns() -> Vec<String> {
    vec!["src/**/*.py".to_string()]
}

fn default_test_patterns() -> Vec<String> {
    vec!["tests/**/*.py".to_string()]
}

fn default_exclude_patterns() -> Vec<String> {
    vec![
        "**/test_*.py".to_string(),
        "**/__pycache__/**".to_string(),
        "**/migrations/**".to_string(),
    ]
}

fn default_base_ref() -> String {
    "HEAD~1".to_string()
}

fn default_target_ref() -> String {
    "HEAD".to_string()
}

fn default_git_timeout() -> u64 {
    60
}

fn default_coverage_file() -> PathBuf {
    PathBuf::from("coverage.json")
}

fn default_durations_file() -> PathBuf {
    PathBuf::from(".test_durations.json")
}

fn default_time_budget() -> f64 {
    300.0
}

fn default_max_seed_size() -> usize {
    2
}

fn default_output_file() -> PathBuf {
    PathBuf::from("impact_request.json")
}

fn default_true() -> bool {
    true
}

fn default_cache_directory() -> PathBuf {
    PathBuf::from(".impactmap_cache")
}

fn default_runner_program() -> String {
    "pytest".to_string()
}

fn default_coverage_program() -> String {
    "coverage".to_string()
}

fn default_runner_timeout() -> u64 {
    1800
}

/// Configuration the function index depends on.
///
/// Cached payloads hold absolute paths, so the canonical project root is
/// part of every slice built on this one.
#[derive(Debug, Serialize)]
pub struct IndexSlice<'a> {
    pub root: &'a Path,
    pub source_patterns: &'a [String],
    pub exclude_patterns: &'a [String],
}

/// Configuration change detection depends on, including resolved commits.
#[derive(Debug, Serialize)]
pub struct ChangeSlice<'a> {
    pub index: IndexSlice<'a>,
    pub base_ref: &'a str,
    pub target_ref: &'a str,
    pub base_commit: Option<String>,
    pub target_commit: Option<String>,
}

/// Configuration coverage attribution depends on.
#[derive(Debug, Serialize)]
pub struct CoverageSlice<'a> {
    pub index: IndexSlice<'a>,
    pub trace: &'a Path,
}

/// Configuration the duration load depends on.
#[derive(Debug, Serialize)]
pub struct DurationsSlice<'a> {
    pub table: &'a Path,
}

impl ImpactConfig {
    /// Defaults rooted at `base_dir`.
    pub fn with_base_dir(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
            ..Self::default()
        }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub(crate) fn set_base_dir(&mut self, base_dir: PathBuf) {
        self.base_dir = base_dir;
    }

    /// Absolute project root.
    pub fn project_root(&self) -> PathBuf {
        resolve(&self.base_dir, &self.project.root)
    }

    pub fn coverage_file(&self) -> PathBuf {
        resolve(&self.project_root(), &self.coverage.file)
    }

    pub fn durations_file(&self) -> PathBuf {
        resolve(&self.project_root(), &self.durations.file)
    }

    pub fn output_file(&self) -> PathBuf {
        resolve(&self.project_root(), &self.output.file)
    }

    pub fn cache_dir(&self) -> PathBuf {
        resolve(&self.project_root(), &self.cache.directory)
    }

    pub fn index_slice<'a>(&'a self, root: &'a Path) -> IndexSlice<'a> {
        IndexSlice {
            root,
            source_patterns: &self.project.source_patterns,
            exclude_patterns: &self.project.exclude_patterns,
        }
    }

    pub fn change_slice<'a>(
        &'a self,
        root: &'a Path,
        base_commit: Option<String>,
        target_commit: Option<String>,
    ) -> ChangeSlice<'a> {
        ChangeSlice {
            index: self.index_slice(root),
            base_ref: &self.git.base_ref,
            target_ref: &self.git.target_ref,
            base_commit,
            target_commit,
        }
    }

    pub fn coverage_slice<'a>(&'a self, root: &'a Path, trace: &'a Path) -> CoverageSlice<'a> {
        CoverageSlice {
            index: self.index_slice(root),
            trace,
        }
    }

    pub fn durations_slice<'a>(&'a self, table: &'a Path) -> DurationsSlice<'a> {
        DurationsSlice { table }
    }
}

/// Join `path` onto `base` unless it is absolute, dropping `.` components.
fn resolve(base: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    };
    joined.components().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_empty_document_is_all_defaults() {
        let config: ImpactConfig = toml::from_str("").unwrap();
        assert_eq!(config, ImpactConfig::default());
        assert_eq!(config.selection.time_budget, 300.0);
        assert_eq!(config.selection.max_seed_size, 2);
        assert_eq!(config.git.base_ref, "HEAD~1");
        assert!(config.cache.enabled);
    }

    #[test]
    fn test_partial_sections_keep_other_defaults() {
        let config: ImpactConfig = toml::from_str(
            r#"
            [project]
            source_patterns = ["app/**/*.py"]

            [selection]
            time_budget = 60.0
            "#,
        )
        .unwrap();
        assert_eq!(config.project.source_patterns, vec!["app/**/*.py"]);
        assert_eq!(config.project.test_patterns, default_test_patterns());
        assert_eq!(config.selection.time_budget, 60.0);
        assert_eq!(config.selection.max_seed_size, 2);
    }

    #[test]
    fn test_empty_target_means_work_tree() {
        let mut git = GitConfig::default();
        assert_eq!(git.target().as_deref(), Some("HEAD"));
        git.target_ref = "  ".to_string();
        assert_eq!(git.target(), None);
    }

    #[test]
    fn test_paths_resolve_against_project_root() {
        let mut config = ImpactConfig::with_base_dir("/work");
        config.project.root = PathBuf::from("proj");
        config.output.file = PathBuf::from("/abs/out.json");

        assert_eq!(config.project_root(), PathBuf::from("/work/proj"));
        assert_eq!(
            ImpactConfig::with_base_dir("/work").project_root(),
            PathBuf::from("/work")
        );
        assert_eq!(config.coverage_file(), PathBuf::from("/work/proj/coverage.json"));
        assert_eq!(config.cache_dir(), PathBuf::from("/work/proj/.impactmap_cache"));
        assert_eq!(config.output_file(), PathBuf::from("/abs/out.json"));
    }

    #[test]
    fn test_slices_ignore_unrelated_settings() {
        let a = ImpactConfig::default();
        let mut b = ImpactConfig::default();
        b.selection.time_budget = 10.0;
        b.runner.program = "python".to_string();

        let root = Path::new("/work/proj");
        let fp = |c: &ImpactConfig| crate::cache::config_fingerprint(&c.index_slice(root));
        assert_eq!(fp(&a), fp(&b));

        b.project.exclude_patterns.clear();
        assert_ne!(fp(&a), fp(&b));
    }

    #[test]
    fn test_slices_depend_on_project_root() {
        let config = ImpactConfig::default();
        let (a, b) = (Path::new("/work/proj_a"), Path::new("/work/proj_b"));
        use crate::cache::config_fingerprint as fp;
        let trace = Path::new("coverage.json");

        assert_ne!(fp(&config.index_slice(a)), fp(&config.index_slice(b)));
        assert_ne!(
            fp(&config.change_slice(a, None, None)),
            fp(&config.change_slice(b, None, None))
        );
        assert_ne!(
            fp(&config.coverage_slice(a, trace)),
            fp(&config.coverage_slice(b, trace))
        );
    }
}
