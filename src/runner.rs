//! Producing the coverage trace and duration table by running the tests.
//!
//! The runner is invoked with per-test coverage contexts enabled and a small
//! generated plugin loaded through `-p`. The plugin appends every phase report
//! with its unrounded elapsed time to a stream file, which is fed into a
//! [`FlushGuard`] that writes the table on every exit path.

use crate::config::ImpactConfig;
use crate::durations::{DurationRecorder, FlushGuard};
use crate::errors::{Error, Result};
use crate::process::{describe, failure, run_checked, run_with_timeout};
use serde::Serialize;
use std::collections::BTreeSet;
use std::ffi::OsString;
use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;

/// Exit codes meaning the session ran to completion (1: some tests failed).
const COMPLETED_EXIT_CODES: [i32; 2] = [0, 1];

/// Module name the phase-report plugin is loaded under.
pub const PLUGIN_MODULE: &str = "impactmap_durations";

/// Environment variable naming the stream file the plugin appends to.
pub const PHASE_REPORTS_ENV: &str = "IMPACTMAP_PHASE_REPORTS";

/// Scratch directory under the cache directory holding the plugin.
const RUNNER_DIR: &str = "runner";

const PHASE_REPORTS_FILE: &str = "phase_reports.jsonl";

const PLUGIN_SOURCE: &str = r#"import json
import os


def pytest_runtest_logreport(report):
    stream = os.environ.get("IMPACTMAP_PHASE_REPORTS")
    if not stream:
        return
    line = json.dumps(
        {"test_id": report.nodeid, "phase": report.when, "seconds": report.duration}
    )
    with open(stream, "a", encoding="utf-8") as out:
        out.write(line + "\n")
"#;

/// Top-level directories named by glob patterns.
///
/// `src/**/*.py` yields `src`; a pattern without `**` is taken as a
/// directory as-is.
pub fn pattern_base_dirs(patterns: &[String]) -> Vec<String> {
    patterns
        .iter()
        .map(|pattern| {
            if let Some((base, _)) = pattern.split_once("/**") {
                base.to_string()
            } else if let Some((base, _)) = pattern.split_once("**") {
                base.trim_end_matches('/').to_string()
            } else {
                pattern.clone()
            }
        })
        .filter(|base| !base.is_empty())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    pub exit_code: i32,
    pub tests_failed: bool,
    pub durations_recorded: usize,
    pub coverage_file: PathBuf,
    pub durations_file: PathBuf,
}

#[derive(Debug, Clone)]
pub struct TestRunner {
    root: PathBuf,
    program: String,
    coverage_program: String,
    extra_args: Vec<String>,
    base_dirs: Vec<String>,
    test_dirs: Vec<String>,
    coverage_file: PathBuf,
    durations_file: PathBuf,
    plugin_dir: PathBuf,
    timeout: Duration,
}

impl TestRunner {
    pub fn from_config(config: &ImpactConfig) -> Self {
        Self {
            root: config.project_root(),
            program: config.runner.program.clone(),
            coverage_program: config.runner.coverage_program.clone(),
            extra_args: config.runner.extra_args.clone(),
            base_dirs: pattern_base_dirs(&config.project.source_patterns),
            test_dirs: pattern_base_dirs(&config.project.test_patterns),
            coverage_file: config.coverage_file(),
            durations_file: config.durations_file(),
            plugin_dir: config.cache_dir().join(RUNNER_DIR),
            timeout: config.runner.timeout(),
        }
    }

    /// The test session command.
    pub fn test_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.current_dir(&self.root).args(&self.extra_args);
        for base in &self.base_dirs {
            cmd.arg(format!("--cov={base}"));
        }
        cmd.args(["--cov-context=test", "--cov-report=", "-p", PLUGIN_MODULE]);
        cmd.args(&self.test_dirs);
        cmd.env("PYTHONPATH", self.python_path())
            .env(PHASE_REPORTS_ENV, self.phase_reports_file());
        cmd
    }

    pub fn plugin_file(&self) -> PathBuf {
        self.plugin_dir.join(format!("{PLUGIN_MODULE}.py"))
    }

    pub fn phase_reports_file(&self) -> PathBuf {
        self.plugin_dir.join(PHASE_REPORTS_FILE)
    }

    /// The plugin directory ahead of any inherited `PYTHONPATH`.
    fn python_path(&self) -> OsString {
        let inherited = std::env::var_os("PYTHONPATH");
        let paths = std::iter::once(self.plugin_dir.clone()).chain(
            inherited
                .iter()
                .flat_map(std::env::split_paths)
                .filter(|p| !p.as_os_str().is_empty()),
        );
        std::env::join_paths(paths).unwrap_or_else(|_| self.plugin_dir.clone().into_os_string())
    }

    /// Write the plugin and drop reports left over from an earlier session.
    fn install_plugin(&self) -> Result<()> {
        crate::io::write_atomic(&self.plugin_file(), PLUGIN_SOURCE.as_bytes())?;
        let stream = self.phase_reports_file();
        match fs::remove_file(&stream) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::io(stream, e)),
        }
    }

    /// Feed whatever the plugin streamed so far into `recorder`.
    fn collect_reports(&self, recorder: &mut DurationRecorder) -> usize {
        let stream = self.phase_reports_file();
        match read_stream(&stream) {
            Ok(content) => recorder.record_stream(&content),
            Err(e) => {
                log::warn!("Failed to read phase reports from {}: {e}", stream.display());
                0
            }
        }
    }

    /// The command exporting the recorded trace as JSON with contexts.
    pub fn export_command(&self) -> Command {
        let mut cmd = Command::new(&self.coverage_program);
        cmd.current_dir(&self.root)
            .args(["json", "--show-contexts", "-o"])
            .arg(&self.coverage_file);
        cmd
    }

    /// Run the tests, record durations and export the coverage trace.
    pub fn run(&self) -> Result<RunSummary> {
        if self.base_dirs.is_empty() {
            return Err(Error::config(
                "no coverage directories could be derived from project.source_patterns",
            ));
        }

        self.install_plugin()?;
        let mut guard = FlushGuard::start(&self.durations_file);

        let cmd = self.test_command();
        let command = describe(&cmd);
        log::info!("Running: {}", command);
        let output = run_with_timeout(cmd, self.timeout);
        let parsed = self.collect_reports(guard.recorder());
        log::debug!("Recorded {} call-phase durations from phase reports", parsed);
        let output = output?;

        let exit_code = match output.code() {
            Some(code) if COMPLETED_EXIT_CODES.contains(&code) => code,
            _ => return Err(failure(command, &output)),
        };
        if exit_code != 0 {
            log::warn!("Some tests failed; coverage and durations are still recorded");
        }

        let export = self.export_command();
        log::info!("Running: {}", describe(&export));
        run_checked(export, self.timeout)?;

        let durations_recorded = guard.finish()?;
        Ok(RunSummary {
            exit_code,
            tests_failed: exit_code != 0,
            durations_recorded,
            coverage_file: self.coverage_file.clone(),
            durations_file: self.durations_file.clone(),
        })
    }
}

/// An absent stream means no test reported a phase.
fn read_stream(path: &Path) -> std::io::Result<String> {
    match fs::read_to_string(path) {
        Err(e) if e.kind() == ErrorKind::NotFound => Ok(String::new()),
        other => other,
    }
}
