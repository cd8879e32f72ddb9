//! Declarative pipeline configuration: where files live, how to read them,
//! and which columns each analysis extracts.
//!
//! The configuration is an immutable value handed to each stage; it is
//! usually read from JSON:
//!
//! ```json
//! {
//!   "targets_table": "DATA/tables/targets.csv",
//!   "sources": {
//!     "PIPE_lightcurve_sa": {
//!       "directory": "DATA/PIPE_lightcurve",
//!       "pattern": "**/*_sa.fits",
//!       "exclude": ["im.fits"],
//!       "table": { "by_index": 1 },
//!       "time_column": "MJD_TIME",
//!       "time_format": "mjd",
//!       "lightcurve": true
//!     }
//!   },
//!   "analyses": [
//!     {
//!       "name": "PIPE Lightcurve (sa)",
//!       "source": "PIPE_lightcurve_sa",
//!       "parameters": [ { "name": "FLUX", "columns": ["FLUX"] } ]
//!     }
//!   ]
//! }
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::data::stats::metric_names;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("unknown analysis type '{0}'")]
    UnknownAnalysis(String),

    #[error("analysis '{analysis}' refers to unknown source '{source_name}'")]
    UnknownSource {
        analysis: String,
        source_name: String,
    },
}

// ---------------------------------------------------------------------------
// Data sources
// ---------------------------------------------------------------------------

/// Encoding of the time column.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TimeEncoding {
    /// Strings starting with `YYYY-MM-DD`.
    #[default]
    Iso,
    /// Modified julian date, numeric.
    Mjd,
}

/// Which HDU of a file holds the data table.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TableSelector {
    ByIndex(usize),
    ByNameSubstring(String),
    #[default]
    FirstNonPrimary,
}

fn default_time_column() -> String {
    "UTC_TIME".to_string()
}

fn default_target_header() -> String {
    "TARGNAME".to_string()
}

/// One family of files.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceSpec {
    pub directory: PathBuf,
    /// Glob matched against paths below `directory`; `**` spans directories.
    pub pattern: String,
    /// Paths containing any of these (substring, or glob if it has wildcards) are dropped.
    #[serde(default)]
    pub exclude: Vec<String>,
    #[serde(default)]
    pub table: TableSelector,
    #[serde(default = "default_time_column")]
    pub time_column: String,
    #[serde(default)]
    pub time_format: TimeEncoding,
    /// Header keyword holding the fallback target name.
    #[serde(default = "default_target_header")]
    pub target_header: String,
    /// Per-sample timestamps are meaningful: derive elapsed hours and binned noise.
    #[serde(default)]
    pub lightcurve: bool,
}

impl SourceSpec {
    pub fn new(directory: impl Into<PathBuf>, pattern: &str) -> Self {
        Self {
            directory: directory.into(),
            pattern: pattern.to_string(),
            exclude: Vec::new(),
            table: TableSelector::default(),
            time_column: default_time_column(),
            time_format: TimeEncoding::default(),
            target_header: default_target_header(),
            lightcurve: false,
        }
    }

    pub fn excluding(mut self, pattern: &str) -> Self {
        self.exclude.push(pattern.to_string());
        self
    }

    pub fn with_table(mut self, table: TableSelector) -> Self {
        self.table = table;
        self
    }

    pub fn with_time(mut self, column: &str, format: TimeEncoding) -> Self {
        self.time_column = column.to_string();
        self.time_format = format;
        self
    }

    pub fn as_lightcurve(mut self) -> Self {
        self.lightcurve = true;
        self
    }
}

// ---------------------------------------------------------------------------
// Analyses
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ParameterGroup {
    pub name: String,
    pub columns: Vec<String>,
}

fn default_true() -> bool {
    true
}

/// A named set of parameter groups read from one source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisSpec {
    pub name: String,
    pub source: String,
    /// `false`: keep raw per-row values instead of statistics.
    #[serde(default = "default_true")]
    pub calculate_stats: bool,
    pub parameters: Vec<ParameterGroup>,
    #[serde(default)]
    pub description: String,
}

impl AnalysisSpec {
    /// Flat list of columns, optionally restricted to the named groups.
    pub fn columns(&self, groups: Option<&[String]>) -> Vec<String> {
        self.parameters
            .iter()
            .filter(|g| groups.map_or(true, |sel| sel.iter().any(|s| *s == g.name)))
            .flat_map(|g| g.columns.iter().cloned())
            .collect()
    }

    /// Output column names per group: `{param}_{metric}` for statistics,
    /// the raw column names otherwise.
    pub fn stat_columns(&self, lightcurve: bool) -> Vec<(String, Vec<String>)> {
        self.parameters
            .iter()
            .map(|group| {
                let columns = if self.calculate_stats {
                    group
                        .columns
                        .iter()
                        .flat_map(|param| {
                            metric_names(lightcurve)
                                .into_iter()
                                .map(move |metric| format!("{param}_{metric}"))
                        })
                        .collect()
                } else {
                    group.columns.clone()
                };
                (group.name.clone(), columns)
            })
            .collect()
    }
}

/// Source shown as one column of the target accessibility table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AccessibilityCheck {
    pub source: String,
    pub label: String,
}

// ---------------------------------------------------------------------------
// PipelineConfig
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    pub targets_table: PathBuf,
    pub sources: BTreeMap<String, SourceSpec>,
    pub analyses: Vec<AnalysisSpec>,
    #[serde(default)]
    pub accessibility: Vec<AccessibilityCheck>,
}

impl PipelineConfig {
    /// Read a JSON configuration. Relative paths are taken relative to the
    /// file's directory.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        let base = path.parent().unwrap_or_else(|| Path::new("."));
        Self::from_json_str(&text, base)
            .with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn from_json_str(text: &str, base_dir: &Path) -> Result<Self> {
        let mut config: PipelineConfig = serde_json::from_str(text)?;
        config.resolve_paths(base_dir);
        Ok(config)
    }

    fn resolve_paths(&mut self, base_dir: &Path) {
        if self.targets_table.is_relative() {
            self.targets_table = base_dir.join(&self.targets_table);
        }
        for source in self.sources.values_mut() {
            if source.directory.is_relative() {
                source.directory = base_dir.join(&source.directory);
            }
        }
    }

    pub fn analysis(&self, name: &str) -> Result<&AnalysisSpec, ConfigError> {
        self.analyses
            .iter()
            .find(|a| a.name == name)
            .ok_or_else(|| ConfigError::UnknownAnalysis(name.to_string()))
    }

    pub fn source_for(&self, analysis: &AnalysisSpec) -> Result<&SourceSpec, ConfigError> {
        self.sources
            .get(&analysis.source)
            .ok_or_else(|| ConfigError::UnknownSource {
                analysis: analysis.name.clone(),
                source_name: analysis.source.clone(),
            })
    }

    /// Accessibility columns; every source when none are configured.
    pub fn accessibility_checks(&self) -> Vec<AccessibilityCheck> {
        if !self.accessibility.is_empty() {
            return self.accessibility.clone();
        }
        self.sources
            .keys()
            .map(|name| AccessibilityCheck {
                source: name.clone(),
                label: name.clone(),
            })
            .collect()
    }
}
