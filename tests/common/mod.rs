// Test utility module for impactmap integration tests
#![allow(dead_code)]

use impactmap::config::ImpactConfig;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

/// Skip the current test when no `git` executable is available.
#[macro_export]
macro_rules! require_git {
    () => {
        if !impactmap::changes::git::git_available() {
            eprintln!("skipping: git is not available");
            return;
        }
    };
}

pub const ALPHA_V1: &str = r#"def f1():
    return 1


def f2():
    return 2


def f3(x):
    y = x + 1
    return y


class Widget:
    def method_a(self):
        return "a"

    def method_b(self):
        return "b"


async def f6():
    return 6
"#;

/// `ALPHA_V1` with one line changed inside `f3` (line 10).
pub const ALPHA_V2: &str = r#"def f1():
    return 1


def f2():
    return 2


def f3(x):
    y = x + 2
    return y


class Widget:
    def method_a(self):
        return "a"

    def method_b(self):
        return "b"


async def f6():
    return 6
"#;

pub const EMPTY_MODULE: &str = "CONSTANT = 1\nNAMES = [\"a\", \"b\"]\n";

pub const BETA: &str = r#"def g1():
    return "g1"


def g2():
    return "g2"
"#;

pub const TEST_ONE: &str = "tests/test_alpha.py::test_one";
pub const TEST_TWO: &str = "tests/test_alpha.py::test_two";
pub const TEST_THREE: &str = "tests/test_alpha.py::test_three";
pub const TEST_BETA: &str = "tests/test_beta.py::test_g1";

/// A throwaway git repository holding a small Python project.
pub struct TestProject {
    _dir: TempDir,
    pub root: PathBuf,
}

impl TestProject {
    pub fn new() -> Self {
        let dir = TempDir::new().expect("create temp dir");
        let root = dir.path().canonicalize().expect("canonical temp dir");
        let project = Self { _dir: dir, root };
        project.git(&["init", "-q"]);
        project.git(&["config", "user.email", "test@example.com"]);
        project.git(&["config", "user.name", "Test User"]);
        project.git(&["config", "commit.gpgsign", "false"]);
        project
    }

    /// Three source files with 6, 0 and 2 functions, committed twice: the
    /// second commit changes one line inside `f3`.
    pub fn scenario() -> Self {
        let project = Self::new();
        project.write("src/pkg/alpha.py", ALPHA_V1);
        project.write("src/pkg/empty.py", EMPTY_MODULE);
        project.write("src/pkg/beta.py", BETA);
        project.commit("initial");
        project.write("src/pkg/alpha.py", ALPHA_V2);
        project.commit("tweak f3");
        project
    }

    /// Move the whole project, `.git` and cache included, to a new directory.
    /// File modification times survive the rename.
    pub fn relocate(&mut self) {
        let dir = TempDir::new().expect("create temp dir");
        let target = dir
            .path()
            .canonicalize()
            .expect("canonical temp dir")
            .join("moved");
        fs::rename(&self.root, &target).expect("move project");
        self._dir = dir;
        self.root = target;
    }

    pub fn path(&self, relative: &str) -> PathBuf {
        self.root.join(relative)
    }

    pub fn write(&self, relative: &str, content: &str) -> PathBuf {
        let path = self.path(relative);
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).expect("create parent dirs");
        }
        fs::write(&path, content).expect("write file");
        path
    }

    pub fn git(&self, args: &[&str]) -> String {
        let output = Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .env_remove("GIT_DIR")
            .env_remove("GIT_WORK_TREE")
            .output()
            .expect("run git");
        assert!(
            output.status.success(),
            "git {:?} failed: {}",
            args,
            String::from_utf8_lossy(&output.stderr)
        );
        String::from_utf8_lossy(&output.stdout).into_owned()
    }

    pub fn commit(&self, message: &str) {
        self.git(&["add", "-A"]);
        self.git(&["commit", "-q", "-m", message]);
    }

    pub fn identifier(&self, relative: &str, line: usize, name: &str) -> String {
        format!("{}::{}::{}", self.path(relative).display(), line, name)
    }

    pub fn config(&self) -> ImpactConfig {
        ImpactConfig::with_base_dir(&self.root)
    }

    /// Write a `coverage json --show-contexts` report with relative keys.
    pub fn write_coverage(&self, lines: &[(&str, usize, &[&str])]) -> PathBuf {
        let mut files = serde_json::Map::new();
        for (file, line, contexts) in lines {
            let entry = files
                .entry(file.to_string())
                .or_insert_with(|| serde_json::json!({"executed_lines": [], "contexts": {}}));
            entry["executed_lines"]
                .as_array_mut()
                .expect("array")
                .push(serde_json::json!(line));
            entry["contexts"]
                .as_object_mut()
                .expect("object")
                .insert(line.to_string(), serde_json::json!(contexts));
        }
        let report = serde_json::json!({
            "meta": {"version": "7.4.0", "show_contexts": true},
            "files": files,
        });
        self.write("coverage.json", &report.to_string())
    }

    /// Coverage where three tests run `f3` and one test runs `g1`.
    pub fn write_scenario_coverage(&self) -> PathBuf {
        self.write_coverage(&[
            ("src/pkg/alpha.py", 2, &["tests/test_alpha.py::test_one|setup"]),
            ("src/pkg/alpha.py", 10, &[TEST_ONE, "tests/test_alpha.py::test_two|run"]),
            ("src/pkg/alpha.py", 11, &["tests/test_alpha.py::test_three|run"]),
            ("src/pkg/beta.py", 2, &["tests/test_beta.py::test_g1|run"]),
        ])
    }

    pub fn write_durations(&self, durations: &[(&str, f64)]) -> PathBuf {
        let table: serde_json::Map<String, serde_json::Value> = durations
            .iter()
            .map(|(id, secs)| (id.to_string(), serde_json::json!(secs)))
            .collect();
        self.write(
            ".test_durations.json",
            &serde_json::Value::Object(table).to_string(),
        )
    }
}

pub fn touch(path: &Path, secs_after_epoch: u64) {
    let file = fs::File::options()
        .write(true)
        .open(path)
        .expect("open for touch");
    file.set_modified(std::time::UNIX_EPOCH + std::time::Duration::from_secs(secs_after_epoch))
        .expect("set mtime");
}
