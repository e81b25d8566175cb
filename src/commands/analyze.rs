use crate::config::ImpactConfig;
use crate::pipeline::{Pipeline, RunReport};
use crate::request::BuildError;
use anyhow::{Context, Result};
use colored::*;
use std::fmt::Write as _;
use std::path::PathBuf;

/// `analyze` arguments, layered over the loaded configuration.
#[derive(Debug, Default)]
pub struct AnalyzeConfig {
    pub config: Option<PathBuf>,
    pub base: Option<String>,
    pub target: Option<String>,
    pub time_budget: Option<f64>,
    pub max_seed_size: Option<usize>,
    pub output: Option<PathBuf>,
    pub no_cache: bool,
}

impl AnalyzeConfig {
    /// Apply command-line overrides and re-validate.
    pub fn apply(&self, config: &mut ImpactConfig) -> Result<()> {
        if let Some(base) = &self.base {
            config.git.base_ref = base.clone();
        }
        if let Some(target) = &self.target {
            config.git.target_ref = target.clone();
        }
        if let Some(budget) = self.time_budget {
            config.selection.time_budget = budget;
        }
        if let Some(size) = self.max_seed_size {
            config.selection.max_seed_size = size;
        }
        if let Some(output) = &self.output {
            config.output.file = if output.is_absolute() {
                output.clone()
            } else {
                std::env::current_dir()
                    .context("Failed to read the working directory")?
                    .join(output)
            };
        }
        config.validate().context("Invalid command-line overrides")?;
        Ok(())
    }
}

/// Run the pipeline and print its summary.
///
/// Returns the report when a request was written or when there was nothing
/// to do; every other build failure is an error.
pub fn handle_analyze(args: AnalyzeConfig) -> Result<RunReport> {
    let mut config =
        ImpactConfig::resolve(args.config.as_deref()).context("Failed to load configuration")?;
    args.apply(&mut config)?;

    let pipeline = if args.no_cache {
        Pipeline::new(config, None)
    } else {
        Pipeline::from_config(config)
    };
    let report = pipeline.run().context("Impact analysis failed")?;
    print!("{}", format_summary(&report));

    match &report.request {
        Ok(_) => Ok(report),
        Err(BuildError::NoChangedFunctions) if report.failures().next().is_none() => {
            println!("{}", "No changed functions: nothing to select.".green());
            Ok(report)
        }
        Err(e) => Err(anyhow::Error::new(e.clone()).context("No impact request was built")),
    }
}

fn cache_note(report: &RunReport, stage: crate::cache::Stage) -> ColoredString {
    use crate::cache::CacheStatus;
    match report.stage(stage).map(|s| s.cache) {
        Some(CacheStatus::Hit) => " (cached)".dimmed(),
        _ => "".normal(),
    }
}

/// Stage-by-stage summary of a run.
pub fn format_summary(report: &RunReport) -> String {
    use crate::cache::Stage;

    let mut out = String::new();
    let index = &report.index;
    let _ = writeln!(
        out,
        "{} {} files scanned, {} functions indexed, {} skipped for syntax errors{}",
        "Index:".bold(),
        index.files_scanned,
        index.functions,
        index.files_skipped,
        cache_note(report, Stage::FunctionIndex)
    );
    let _ = writeln!(
        out,
        "{} {} changed functions{}",
        "Changes:".bold(),
        report.changed_functions,
        cache_note(report, Stage::ChangedFunctions)
    );
    let coverage = &report.coverage;
    let _ = writeln!(
        out,
        "{} {} tests cover {}/{} functions ({:.1}%){}",
        "Coverage:".bold(),
        coverage.total_tests,
        coverage.covered_functions,
        coverage.total_functions,
        coverage.coverage_percentage,
        cache_note(report, Stage::TestCoverage)
    );
    let durations = &report.durations;
    let _ = writeln!(
        out,
        "{} {} tests, {:.2}s total, {:.2}s average{}",
        "Durations:".bold(),
        durations.total_tests,
        durations.total_time,
        durations.average_time,
        cache_note(report, Stage::Durations)
    );

    let build = &report.build;
    let _ = writeln!(
        out,
        "{} {} of {} relevant tests ({} without changed coverage, {} missing duration, {} invalid duration)",
        "Candidates:".bold(),
        build.candidates,
        build.relevant_tests,
        build.dropped_irrelevant,
        build.dropped_missing_duration,
        build.dropped_invalid_duration
    );
    if build.candidates > 0 {
        let _ = writeln!(
            out,
            "{} {:.2}s of candidate tests, {:.1}% of the time budget",
            "Budget:".bold(),
            build.total_duration,
            build.budget_utilization
        );
    }

    for (stage, failure) in report.failures() {
        let _ = writeln!(
            out,
            "{} {} ({}): {}",
            "warning:".yellow().bold(),
            stage,
            failure.category,
            failure.message
        );
    }
    if let Some(path) = &report.output {
        let _ = writeln!(out, "{} {}", "Request written to".green(), path.display());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overrides_replace_config_values() {
        let mut config = ImpactConfig::with_base_dir("/proj");
        let args = AnalyzeConfig {
            base: Some("main".to_string()),
            target: Some(String::new()),
            time_budget: Some(30.0),
            max_seed_size: Some(4),
            output: Some(PathBuf::from("/tmp/request.json")),
            ..AnalyzeConfig::default()
        };
        args.apply(&mut config).unwrap();

        assert_eq!(config.git.base_ref, "main");
        assert_eq!(config.git.target(), None);
        assert_eq!(config.selection.time_budget, 30.0);
        assert_eq!(config.selection.max_seed_size, 4);
        assert_eq!(config.output_file(), PathBuf::from("/tmp/request.json"));
    }

    #[test]
    fn test_invalid_override_is_rejected() {
        let mut config = ImpactConfig::with_base_dir("/proj");
        let args = AnalyzeConfig {
            time_budget: Some(-5.0),
            ..AnalyzeConfig::default()
        };
        assert!(args.apply(&mut config).is_err());
    }
}
