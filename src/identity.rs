//! Target identity: observation request identifiers (ORIDs) and the
//! reference table mapping them to target names.
//!
//! An ORID looks like `PR300005_TG000101_V0300`: a programme number, a target
//! group code and an optional processing version.

use std::path::Path;
use std::sync::OnceLock;

use anyhow::{Context, Result};
use chrono::NaiveDate;
use log::warn;
use regex::Regex;
use serde::Deserialize;

fn version_suffix() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)_V\d+$").expect("valid regex"))
}

fn program_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)PR\d+").expect("valid regex"))
}

fn group_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)TG(\d+)").expect("valid regex"))
}

fn orid_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)PR\d+_TG\d+").expect("valid regex"))
}

// ---------------------------------------------------------------------------
// ORID matching
// ---------------------------------------------------------------------------

/// Remove a trailing `_V<digits>` processing version.
pub fn strip_version(orid: &str) -> &str {
    match version_suffix().find(orid) {
        Some(m) => &orid[..m.start()],
        None => orid,
    }
}

/// Target group number: the digits after `TG`, limited to the first four.
///
/// `TG0001` → 1, `TG000101` → 1, `TG001001` → 10, `TG001802` → 18.
pub fn extract_target_group(orid: &str) -> Option<u32> {
    let digits = group_pattern().captures(orid)?.get(1)?.as_str();
    let group = if digits.len() <= 4 { digits } else { &digits[..4] };
    group.parse().ok()
}

/// Whether two ORIDs denote the same target group.
///
/// Equal after version stripping (case-insensitive), or same `PR` programme
/// and same target group number. Heuristic: `TG0001` and `TG000101` match,
/// `TG001001` does not.
pub fn orids_equivalent(a: &str, b: &str) -> bool {
    let a = strip_version(a.trim()).to_ascii_lowercase();
    let b = strip_version(b.trim()).to_ascii_lowercase();
    if a == b {
        return true;
    }

    let (Some(pr_a), Some(pr_b)) = (program_pattern().find(&a), program_pattern().find(&b)) else {
        return false;
    };
    if pr_a.as_str() != pr_b.as_str() {
        return false;
    }
    match (extract_target_group(&a), extract_target_group(&b)) {
        (Some(ga), Some(gb)) => ga == gb,
        _ => false,
    }
}

/// First path component carrying a `PR<digits>_TG<digits>` identifier.
pub fn orid_from_path(path: &Path) -> Option<String> {
    let text = path.to_string_lossy();
    text.split(['/', '\\'])
        .find_map(|part| orid_pattern().find(part))
        .map(|m| m.as_str().to_string())
}

/// `TG<digits>` token of a file name, used as a last-resort target label.
pub fn target_group_token(file_name: &str) -> Option<String> {
    group_pattern()
        .find(file_name)
        .map(|m| format!("TG{}", &m.as_str()[2..]))
}

// ---------------------------------------------------------------------------
// Reference target table
// ---------------------------------------------------------------------------

/// One row of the reference table.
#[derive(Debug, Clone, PartialEq)]
pub struct TargetEntry {
    pub target: String,
    pub observation_request_id: String,
    pub visit_date: Option<NaiveDate>,
    pub year: Option<i32>,
}

#[derive(Debug, Deserialize)]
struct TargetRow {
    #[serde(rename = "Target")]
    target: String,
    #[serde(rename = "OR ID")]
    or_id: String,
    #[serde(rename = "Date of visit", default)]
    date_of_visit: Option<String>,
    #[serde(rename = "Year", default, deserialize_with = "csv::invalid_option")]
    year: Option<i32>,
}

fn parse_loose_date(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    ["%Y-%m-%d", "%d/%m/%Y", "%d.%m.%Y", "%Y/%m/%d"]
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
        .or_else(|| crate::time::iso_to_date(s))
}

/// Ordered, read-only reference table of targets.
#[derive(Debug, Clone, Default)]
pub struct TargetTable {
    entries: Vec<TargetEntry>,
}

impl TargetTable {
    pub fn from_entries(entries: Vec<TargetEntry>) -> Self {
        Self { entries }
    }

    /// Load the CSV table. Column names and cells are whitespace-trimmed;
    /// rows lacking `Target` or `OR ID` are dropped.
    pub fn load(path: &Path) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .trim(csv::Trim::All)
            .from_path(path)
            .with_context(|| format!("opening target table {}", path.display()))?;

        let mut entries = Vec::new();
        for (row_no, result) in reader.deserialize::<TargetRow>().enumerate() {
            let row = match result {
                Ok(row) => row,
                Err(e) => {
                    warn!("{}: skipping row {row_no}: {e}", path.display());
                    continue;
                }
            };
            if row.target.is_empty() || row.or_id.is_empty() {
                continue;
            }
            entries.push(TargetEntry {
                target: row.target,
                observation_request_id: row.or_id,
                visit_date: row.date_of_visit.as_deref().and_then(parse_loose_date),
                year: row.year,
            });
        }
        Ok(Self { entries })
    }

    /// [`TargetTable::load`], degrading to an empty table.
    pub fn load_or_empty(path: &Path) -> Self {
        match Self::load(path) {
            Ok(table) => table,
            Err(e) => {
                warn!("could not load target table: {e:#}");
                Self::default()
            }
        }
    }

    /// Target name of the first entry whose ORID is equivalent to `orid`.
    pub fn resolve(&self, orid: &str) -> Option<&str> {
        let query = strip_version(orid.trim());
        self.entries
            .iter()
            .find(|entry| orids_equivalent(query, &entry.observation_request_id))
            .map(|entry| entry.target.as_str())
    }

    pub fn entries(&self) -> &[TargetEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn entry(target: &str, orid: &str) -> TargetEntry {
        TargetEntry {
            target: target.to_string(),
            observation_request_id: orid.to_string(),
            visit_date: None,
            year: None,
        }
    }

    #[test]
    fn target_group_uses_first_four_digits() {
        assert_eq!(extract_target_group("TG0001"), Some(1));
        assert_eq!(extract_target_group("TG000101"), Some(1));
        assert_eq!(extract_target_group("TG001001"), Some(10));
        assert_eq!(extract_target_group("TG001802"), Some(18));
        assert_eq!(extract_target_group("PR300005_tg12"), Some(12));
        assert_eq!(extract_target_group("PR300005"), None);
    }

    #[test]
    fn equivalence_rules() {
        assert!(orids_equivalent("PR300005_TG0001", "PR300005_TG000101"));
        assert!(!orids_equivalent("PR300005_TG0001", "PR300005_TG001001"));
        assert!(!orids_equivalent("PR300005_TG0001", "PR400005_TG0001"));
        assert!(orids_equivalent("PR300005_TG000101_V0300", "pr300005_tg000101"));
        assert!(orids_equivalent("PR300005_TG000101_v0102", "PR300005_TG000101_V0300"));
    }

    #[test]
    fn equivalence_is_symmetric_and_reflexive() {
        let ids = [
            "PR300005_TG0001",
            "PR300005_TG000101_V0300",
            "PR300005_TG001001",
            "PR400005_TG0001",
            "PR100018_TG000203",
            "something_else",
        ];
        for a in ids {
            assert!(orids_equivalent(a, a), "{a}");
            for b in ids {
                assert_eq!(orids_equivalent(a, b), orids_equivalent(b, a), "{a} / {b}");
            }
        }
    }

    #[test]
    fn identifier_from_path_components() {
        let path = PathBuf::from("/data/lc/PR300005_TG000101_V0300/CH_PR300005_TG000101_lc.fits");
        assert_eq!(orid_from_path(&path).as_deref(), Some("PR300005_TG000101"));
        let path = PathBuf::from(r"C:\data\pr100018_tg000203\lc.fits");
        assert_eq!(orid_from_path(&path).as_deref(), Some("pr100018_tg000203"));
        assert_eq!(orid_from_path(Path::new("/data/lc/file.fits")), None);
    }

    #[test]
    fn resolve_first_match_wins() {
        let table = TargetTable::from_entries(vec![
            entry("HD 88111", "PR300005_TG0002"),
            entry("WASP-43", "PR300005_TG0001"),
            entry("WASP-43 duplicate", "PR300005_TG000102"),
        ]);
        assert_eq!(table.resolve("PR300005_TG000101_V0300"), Some("WASP-43"));
        assert_eq!(table.resolve("PR300005_TG001001"), None);
        assert_eq!(TargetTable::default().resolve("PR300005_TG0001"), None);
    }

    #[test]
    fn loads_csv_with_padded_headers() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("targets.csv");
        std::fs::write(
            &path,
            " Target , OR ID ,Date of visit, Year \n\
             WASP-43, PR300005_TG0001 ,2021-03-04,2021\n\
             HD 88111,PR300005_TG0002,,\n\
             ,PR300005_TG0003,,\n",
        )
        .unwrap();

        let table = TargetTable::load(&path).unwrap();
        assert_eq!(table.len(), 2);
        assert_eq!(table.entries()[0].observation_request_id, "PR300005_TG0001");
        assert_eq!(table.entries()[0].visit_date, NaiveDate::from_ymd_opt(2021, 3, 4));
        assert_eq!(table.entries()[0].year, Some(2021));
        assert_eq!(table.entries()[1].year, None);
    }

    #[test]
    fn missing_table_degrades_to_empty() {
        let table = TargetTable::load_or_empty(Path::new("/nonexistent/targets.csv"));
        assert!(table.is_empty());
    }

    #[test]
    fn file_name_group_token() {
        assert_eq!(
            target_group_token("CH_PR100018_TG000203_general.fits").as_deref(),
            Some("TG000203")
        );
        assert_eq!(target_group_token("general.fits"), None);
    }
}
