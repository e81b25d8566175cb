//! Git collaborator: work tree discovery via libgit2, diffs via the git CLI.

use crate::errors::{Error, Result};
use crate::process::{run_checked, CommandOutput};
use git2::Repository;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Create a `Command` for git with process-environment isolation.
///
/// Strips `GIT_DIR` and `GIT_WORK_TREE` so inherited variables cannot point
/// the command at a different repository than `current_dir`.
fn git_cmd(dir: &Path) -> Command {
    let mut cmd = Command::new("git");
    cmd.env_remove("GIT_DIR")
        .env_remove("GIT_WORK_TREE")
        .current_dir(dir);
    cmd
}

/// Whether a `git` executable is on the PATH.
pub fn git_available() -> bool {
    Command::new("git")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

/// The two revisions being compared. `target == None` means the work tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DiffRange {
    pub base: String,
    pub target: Option<String>,
}

impl DiffRange {
    pub fn new(base: impl Into<String>, target: Option<String>) -> Self {
        Self {
            base: base.into(),
            target: target.filter(|t| !t.trim().is_empty()),
        }
    }

    fn push_refs(&self, cmd: &mut Command) {
        cmd.arg(&self.base);
        if let Some(target) = &self.target {
            cmd.arg(target);
        }
    }
}

/// A git work tree containing the analysis root.
#[derive(Debug, Clone)]
pub struct GitRepo {
    work_tree: PathBuf,
    timeout: Duration,
}

impl GitRepo {
    /// Discover the work tree enclosing `path`.
    pub fn discover(path: &Path, timeout: Duration) -> Result<Self> {
        let repo =
            Repository::discover(path).map_err(|_| Error::NotARepository(path.to_path_buf()))?;
        let work_tree = repo
            .workdir()
            .ok_or_else(|| Error::NotARepository(path.to_path_buf()))?;
        let work_tree = work_tree
            .canonicalize()
            .map_err(|e| Error::io(work_tree, e))?;

        Ok(Self { work_tree, timeout })
    }

    pub fn work_tree(&self) -> &Path {
        &self.work_tree
    }

    /// Resolve a revision to its commit id, if it names one.
    pub fn resolve_commit(&self, rev: &str) -> Option<String> {
        let repo = Repository::open(&self.work_tree).ok()?;
        let object = repo.revparse_single(rev).ok()?;
        let commit = object.peel_to_commit().ok()?;
        Some(commit.id().to_string())
    }

    /// `git diff --name-only`, paths relative to the work tree.
    ///
    /// Names are NUL-separated so git prints them verbatim instead of
    /// C-quoting non-ASCII bytes.
    pub fn changed_paths(&self, range: &DiffRange) -> Result<Vec<PathBuf>> {
        let mut cmd = git_cmd(&self.work_tree);
        cmd.args(["diff", "--name-only", "--no-renames", "-z"]);
        range.push_refs(&mut cmd);

        let output = self.run(cmd)?;
        Ok(output
            .stdout
            .split('\0')
            .filter(|name| !name.is_empty())
            .map(PathBuf::from)
            .collect())
    }

    /// `git diff -U0` restricted to one work-tree-relative path.
    pub fn zero_context_diff(&self, range: &DiffRange, relative_path: &Path) -> Result<String> {
        let mut cmd = git_cmd(&self.work_tree);
        cmd.args(["diff", "-U0", "--no-color", "--no-ext-diff"]);
        range.push_refs(&mut cmd);
        cmd.arg("--").arg(relative_path);

        Ok(self.run(cmd)?.stdout)
    }

    fn run(&self, cmd: Command) -> Result<CommandOutput> {
        run_checked(cmd, self.timeout)
    }
}
