//! Batch orchestration: discover files, extract records, assemble the dataset.

use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use log::{debug, info, warn};
use thiserror::Error;

use crate::cache::{CacheKey, DatasetCache};
use crate::catalog::discover;
use crate::config::PipelineConfig;
use crate::data::extract::{file_name, raw_table, Extractor, RawTable};
use crate::data::model::Dataset;
use crate::data::outliers::DEFAULT_SIGMA;
use crate::identity::{orid_from_path, orids_equivalent, TargetTable};

// ---------------------------------------------------------------------------
// Request and report
// ---------------------------------------------------------------------------

/// Parameters of one analysis run.
#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisRequest {
    pub analysis: String,
    /// Restrict extraction to these parameter groups; `None` means all.
    pub groups: Option<Vec<String>>,
    pub remove_outliers: bool,
    pub sigma: f64,
}

impl AnalysisRequest {
    pub fn new(analysis: &str) -> Self {
        Self {
            analysis: analysis.to_string(),
            groups: None,
            remove_outliers: false,
            sigma: DEFAULT_SIGMA,
        }
    }

    pub fn with_groups(mut self, groups: Vec<String>) -> Self {
        self.groups = Some(groups);
        self
    }

    pub fn with_outlier_rejection(mut self, sigma: f64) -> Self {
        self.remove_outliers = true;
        self.sigma = sigma;
        self
    }

    pub fn cache_key(&self) -> CacheKey {
        CacheKey::new(&self.analysis, self.groups.as_deref(), self.remove_outliers, self.sigma)
    }
}

/// Why an analysis produced an empty dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum NoData {
    #[error("analysis is not configured")]
    UnknownAnalysis,
    #[error("no files found for the data source")]
    NoFilesFound,
    #[error("no file yielded a record")]
    NoRecords,
}

/// What happened to the files of one batch.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BatchReport {
    pub files_discovered: usize,
    pub files_processed: usize,
    pub records: usize,
    /// Skipped file count per [`SkipReason::kind`](crate::data::extract::SkipReason::kind).
    pub skipped: BTreeMap<&'static str, usize>,
    pub no_data: Option<NoData>,
}

impl BatchReport {
    fn no_data(reason: NoData) -> Self {
        Self {
            no_data: Some(reason),
            ..Self::default()
        }
    }

    pub fn files_skipped(&self) -> usize {
        self.skipped.values().sum()
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct AnalysisResult {
    pub dataset: Dataset,
    pub report: BatchReport,
}

impl AnalysisResult {
    fn empty(reason: NoData) -> Self {
        Self {
            dataset: Dataset::default(),
            report: BatchReport::no_data(reason),
        }
    }
}

// ---------------------------------------------------------------------------
// Target accessibility
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq)]
pub struct AccessibilityRow {
    pub target: String,
    pub observation_request_id: String,
    pub year: Option<i32>,
    /// One flag per [`AccessibilityTable::labels`] entry.
    pub available: Vec<bool>,
}

/// Which reference targets have files in which sources.
#[derive(Debug, Clone, PartialEq)]
pub struct AccessibilityTable {
    pub labels: Vec<String>,
    pub rows: Vec<AccessibilityRow>,
}

// ---------------------------------------------------------------------------
// Pipeline
// ---------------------------------------------------------------------------

pub struct Pipeline {
    config: PipelineConfig,
    targets: Arc<TargetTable>,
    cache: DatasetCache<Arc<AnalysisResult>>,
}

impl Pipeline {
    /// Build a pipeline, loading the reference table named by the config.
    /// A missing table leaves every target unresolved.
    pub fn new(config: PipelineConfig) -> Self {
        let targets = TargetTable::load_or_empty(&config.targets_table);
        Self::with_targets(config, targets)
    }

    pub fn with_targets(config: PipelineConfig, targets: TargetTable) -> Self {
        Self {
            config,
            targets: Arc::new(targets),
            cache: DatasetCache::new(),
        }
    }

    pub fn with_cache_ttl(mut self, ttl: Duration) -> Self {
        self.cache = DatasetCache::new().with_ttl(ttl);
        self
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn targets(&self) -> &TargetTable {
        &self.targets
    }

    /// Re-read the reference table and drop every cached result.
    pub fn reload_targets(&mut self) {
        self.targets = Arc::new(TargetTable::load_or_empty(&self.config.targets_table));
        self.cache.clear();
    }

    /// Drop cached results of one analysis.
    pub fn invalidate(&self, analysis: &str) {
        self.cache.invalidate(analysis);
    }

    /// Cached [`Pipeline::run`].
    pub fn analyze(&self, request: &AnalysisRequest) -> Arc<AnalysisResult> {
        self.cache
            .get_or_insert_with(request.cache_key(), || Arc::new(self.run(request)))
    }

    /// Process every file of the analysis' source. Never fails: problems
    /// surface as skip counts or a [`NoData`] reason.
    pub fn run(&self, request: &AnalysisRequest) -> AnalysisResult {
        let analysis = match self.config.analysis(&request.analysis) {
            Ok(a) => a,
            Err(e) => {
                warn!("{e}");
                return AnalysisResult::empty(NoData::UnknownAnalysis);
            }
        };
        let source = match self.config.source_for(analysis) {
            Ok(s) => s,
            Err(e) => {
                warn!("{e}");
                return AnalysisResult::empty(NoData::UnknownAnalysis);
            }
        };

        let files = discover(source);
        if files.is_empty() {
            info!("{}: no files found", analysis.name);
            return AnalysisResult::empty(NoData::NoFilesFound);
        }

        let columns = analysis.columns(request.groups.as_deref());
        let mut extractor = Extractor::new(source, &self.targets, columns);
        if !analysis.calculate_stats {
            extractor = extractor.direct_values();
        } else if request.remove_outliers {
            extractor = extractor.with_outlier_rejection(request.sigma);
        }

        let mut report = BatchReport {
            files_discovered: files.len(),
            ..BatchReport::default()
        };
        let mut records = Vec::new();
        for path in &files {
            match extractor.extract(path) {
                Ok(found) => {
                    report.files_processed += 1;
                    records.extend(found);
                }
                Err(reason) => {
                    debug!("skipping {}: {reason}", path.display());
                    *report.skipped.entry(reason.kind()).or_insert(0) += 1;
                }
            }
        }

        let dataset = Dataset::assemble(records);
        report.records = dataset.len();
        if dataset.is_empty() {
            report.no_data = Some(NoData::NoRecords);
        }
        info!(
            "{}: {} files, {} processed, {} skipped, {} records",
            analysis.name,
            report.files_discovered,
            report.files_processed,
            report.files_skipped(),
            report.records
        );
        AnalysisResult { dataset, report }
    }

    /// For every reference entry, whether each accessibility source holds a
    /// file whose path ORID matches it.
    pub fn accessibility(&self) -> AccessibilityTable {
        let checks = self.config.accessibility_checks();
        let orids: Vec<BTreeSet<String>> = checks
            .iter()
            .map(|check| match self.config.sources.get(&check.source) {
                Some(source) => discover(source).iter().filter_map(|p| orid_from_path(p)).collect(),
                None => {
                    warn!("accessibility source {} is not configured", check.source);
                    BTreeSet::new()
                }
            })
            .collect();

        let rows = self
            .targets
            .entries()
            .iter()
            .map(|entry| AccessibilityRow {
                target: entry.target.clone(),
                observation_request_id: entry.observation_request_id.clone(),
                year: entry.year,
                available: orids
                    .iter()
                    .map(|set| set.iter().any(|o| orids_equivalent(o, &entry.observation_request_id)))
                    .collect(),
            })
            .collect();

        AccessibilityTable {
            labels: checks.into_iter().map(|c| c.label).collect(),
            rows,
        }
    }

    /// Discovered file of the analysis' source with the given file name.
    pub fn find_file(&self, analysis: &str, name: &str) -> Result<PathBuf> {
        let analysis = self.config.analysis(analysis)?;
        let source = self.config.source_for(analysis)?;
        discover(source)
            .into_iter()
            .find(|p| file_name(p) == name)
            .ok_or_else(|| anyhow!("no file named {name} in source {}", analysis.source))
    }

    /// Unaggregated time axis and analysis columns of one file.
    pub fn raw_table(&self, analysis: &str, name: &str) -> Result<RawTable> {
        let path = self.find_file(analysis, name)?;
        let spec = self.config.analysis(analysis)?;
        let source = self.config.source_for(spec)?;
        Ok(raw_table(source, &path, &spec.columns(None))?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    fn config(dir: &Path) -> PipelineConfig {
        let text = r#"{
            "targets_table": "targets.csv",
            "sources": { "lc": { "directory": "lc", "pattern": "**/*.fits" } },
            "analyses": [
                { "name": "flux", "source": "lc",
                  "parameters": [ { "name": "Flux", "columns": ["FLUX"] } ] },
                { "name": "orphan", "source": "missing",
                  "parameters": [] }
            ]
        }"#;
        PipelineConfig::from_json_str(text, dir).unwrap()
    }

    #[test]
    fn unknown_analysis_is_no_data() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path()));
        let result = pipeline.run(&AnalysisRequest::new("nope"));
        assert!(result.dataset.is_empty());
        assert_eq!(result.report.no_data, Some(NoData::UnknownAnalysis));
        let result = pipeline.run(&AnalysisRequest::new("orphan"));
        assert_eq!(result.report.no_data, Some(NoData::UnknownAnalysis));
    }

    #[test]
    fn missing_directory_is_no_files() {
        let dir = tempfile::tempdir().unwrap();
        let pipeline = Pipeline::new(config(dir.path()));
        assert!(pipeline.targets().is_empty());
        let result = pipeline.run(&AnalysisRequest::new("flux"));
        assert_eq!(result.report.no_data, Some(NoData::NoFilesFound));
    }

    #[test]
    fn request_keys() {
        let a = AnalysisRequest::new("flux").with_outlier_rejection(2.0);
        let b = AnalysisRequest::new("flux");
        assert_ne!(a.cache_key(), b.cache_key());
        let c = AnalysisRequest {
            sigma: 5.0,
            ..AnalysisRequest::new("flux")
        };
        assert_eq!(b.cache_key(), c.cache_key());
        assert_eq!(b.sigma, DEFAULT_SIGMA);
        assert!(!b.remove_outliers);
    }
}
