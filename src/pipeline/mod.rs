//! The impact analysis pipeline.
//!
//! Stages run in order: function index, change detection, coverage
//! attribution, duration load, request build. A failing stage yields an
//! empty result and a [`StageFailure`]; the request builder then reports
//! which input was empty.

pub mod report;

pub use report::{RunReport, StageFailure, StageReport};

use crate::cache::{CacheStatus, Fingerprints, Stage, StageCache};
use crate::changes::{ChangeDetector, DiffRange, GitRepo};
use crate::config::ImpactConfig;
use crate::coverage::{attribute_coverage, CoverageStats, JsonCoverageTrace, TestCoverageMap};
use crate::durations::{load_durations, DurationTable, LoadStatus};
use crate::errors::{Error, Result};
use crate::index::{FunctionIndex, FunctionScanner, IndexStats};
use crate::request::RequestBuilder;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::time::Instant;

const REGENERATE_HINT: &str = "run `impactmap run-tests` to produce it";

pub struct Pipeline {
    config: ImpactConfig,
    cache: Option<StageCache>,
}

impl Pipeline {
    pub fn new(config: ImpactConfig, cache: Option<StageCache>) -> Self {
        Self { config, cache }
    }

    /// A pipeline caching in the configured directory when caching is enabled.
    pub fn from_config(config: ImpactConfig) -> Self {
        let cache = config
            .cache
            .enabled
            .then(|| StageCache::new(config.cache_dir()));
        Self::new(config, cache)
    }

    pub fn config(&self) -> &ImpactConfig {
        &self.config
    }

    /// Run every stage and write the request if one could be built.
    ///
    /// Only a missing project root or a failed output write abort the run;
    /// everything else is reported in the returned [`RunReport`].
    pub fn run(&self) -> Result<RunReport> {
        let configured_root = self.config.project_root();
        let root = configured_root
            .canonicalize()
            .map_err(|e| Error::io(&configured_root, e))?;
        let mut stages = Vec::new();

        let scanner = FunctionScanner::new(
            &root,
            &self.config.project.source_patterns,
            &self.config.project.exclude_patterns,
        )?;
        let source_files = scanner.scan_files().unwrap_or_else(|e| {
            log::warn!("Source scan failed: {e}");
            Vec::new()
        });

        let (index, index_stats): (FunctionIndex, IndexStats) = self.stage(
            Stage::FunctionIndex,
            &mut stages,
            || Ok(Fingerprints::new(&root, &source_files, &self.config.index_slice(&root))),
            || scanner.build_index_with_stats(),
        );

        let changed: BTreeSet<String> = self.stage(
            Stage::ChangedFunctions,
            &mut stages,
            || self.change_fingerprints(&root, &source_files),
            || self.detect_changes(&root, &index),
        );

        let trace_path = self.config.coverage_file();
        let coverage: TestCoverageMap = self.stage(
            Stage::TestCoverage,
            &mut stages,
            || {
                let mut inputs = source_files.clone();
                inputs.push(trace_path.clone());
                Ok(Fingerprints::new(
                    &root,
                    &inputs,
                    &self.config.coverage_slice(&root, &trace_path),
                ))
            },
            || {
                let trace = JsonCoverageTrace::load(&trace_path)?;
                attribute_coverage(&trace, &index, &trace_path)
            },
        );

        let (durations, durations_status) = self.load_durations_stage(&root, &mut stages);

        let builder = RequestBuilder::new(&changed, &coverage, &durations)
            .time_budget(self.config.selection.time_budget)
            .max_seed_size(self.config.selection.max_seed_size);
        let build = builder.stats();
        let request = builder.build();

        let output = match &request {
            Ok(request) => {
                let path = self.config.output_file();
                crate::io::write_json_atomic(&path, request)?;
                log::info!("Wrote impact request to {}", path.display());
                Some(path)
            }
            Err(e) => {
                log::warn!("No impact request built: {e}");
                None
            }
        };

        Ok(RunReport {
            index: index_stats,
            changed_functions: changed.len(),
            coverage: CoverageStats::compute(&coverage, &index),
            durations: durations.stats(),
            durations_status,
            build,
            stages,
            request,
            output,
        })
    }

    /// Run one cacheable stage, turning failure into an empty result.
    fn stage<T, P, F>(
        &self,
        stage: Stage,
        reports: &mut Vec<StageReport>,
        fingerprints: P,
        compute: F,
    ) -> T
    where
        T: Default + Serialize + DeserializeOwned,
        P: FnOnce() -> Result<Fingerprints>,
        F: FnOnce() -> Result<T>,
    {
        let started = Instant::now();
        let result = match &self.cache {
            Some(cache) => match fingerprints() {
                Ok(fp) => cache.get_or_compute(stage, &fp, compute),
                Err(e) => {
                    log::debug!("No fingerprint for {stage}, bypassing cache: {e}");
                    compute().map(|value| (value, CacheStatus::Miss))
                }
            },
            None => compute().map(|value| (value, CacheStatus::Disabled)),
        };

        let (value, cache, failure) = match result {
            Ok((value, status)) => (value, status, None),
            Err(e) => {
                log::warn!("Stage {stage} failed: {e}");
                (T::default(), self.miss_status(), Some(StageFailure::from(&e)))
            }
        };
        reports.push(StageReport {
            stage,
            cache,
            elapsed: started.elapsed(),
            failure,
        });
        value
    }

    fn miss_status(&self) -> CacheStatus {
        if self.cache.is_some() {
            CacheStatus::Miss
        } else {
            CacheStatus::Disabled
        }
    }

    fn repo(&self, root: &Path) -> Result<GitRepo> {
        GitRepo::discover(root, self.config.git.timeout())
    }

    fn diff_range(&self) -> DiffRange {
        DiffRange::new(self.config.git.base_ref.clone(), self.config.git.target())
    }

    /// Source file stamps plus the commits both refs currently name.
    fn change_fingerprints(&self, root: &Path, source_files: &[PathBuf]) -> Result<Fingerprints> {
        let repo = self.repo(root)?;
        let range = self.diff_range();
        let base_commit = repo.resolve_commit(&range.base);
        let target_commit = range.target.as_deref().and_then(|t| repo.resolve_commit(t));
        Ok(Fingerprints::new(
            root,
            source_files,
            &self.config.change_slice(root, base_commit, target_commit),
        ))
    }

    fn detect_changes(&self, root: &Path, index: &FunctionIndex) -> Result<BTreeSet<String>> {
        let detector = ChangeDetector::new(root, self.repo(root)?)?;
        detector.changed_functions(&self.diff_range(), index)
    }

    /// Durations are cached only when the table loaded cleanly, so an absent
    /// or malformed table is re-reported on every run.
    fn load_durations_stage(
        &self,
        root: &Path,
        reports: &mut Vec<StageReport>,
    ) -> (DurationTable, LoadStatus) {
        let started = Instant::now();
        let path = self.config.durations_file();
        let fingerprints = Fingerprints::new(
            root,
            std::slice::from_ref(&path),
            &self.config.durations_slice(&path),
        );

        if let Some(table) = self
            .cache
            .as_ref()
            .and_then(|c| c.load::<DurationTable>(Stage::Durations, &fingerprints))
        {
            reports.push(StageReport {
                stage: Stage::Durations,
                cache: CacheStatus::Hit,
                elapsed: started.elapsed(),
                failure: None,
            });
            return (table, LoadStatus::Loaded);
        }

        let (table, status, failure) = match load_durations(&path) {
            Ok((table, LoadStatus::Loaded)) => {
                if let Some(cache) = &self.cache {
                    cache.store(Stage::Durations, &fingerprints, &table);
                }
                (table, LoadStatus::Loaded, None)
            }
            Ok((table, LoadStatus::Absent)) => {
                let error = Error::absent(
                    "duration table",
                    &path,
                    Some(REGENERATE_HINT.to_string()),
                );
                (table, LoadStatus::Absent, Some(StageFailure::from(&error)))
            }
            Ok((table, LoadStatus::Malformed(message))) => {
                let error = Error::malformed("duration table", &path, message.clone());
                (
                    table,
                    LoadStatus::Malformed(message),
                    Some(StageFailure::from(&error)),
                )
            }
            Err(e) => {
                log::warn!("Stage {} failed: {e}", Stage::Durations);
                (
                    DurationTable::new(),
                    LoadStatus::Malformed(e.to_string()),
                    Some(StageFailure::from(&e)),
                )
            }
        };

        reports.push(StageReport {
            stage: Stage::Durations,
            cache: self.miss_status(),
            elapsed: started.elapsed(),
            failure,
        });
        (table, status)
    }
}
