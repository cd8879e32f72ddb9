use std::path::Path;

use chrono::NaiveDate;
use log::debug;
use thiserror::Error;

use crate::config::{SourceSpec, TableSelector, TimeEncoding};
use crate::fits::{BinTable, FitsFile, Hdu};
use crate::identity::{orid_from_path, target_group_token, TargetTable};
use crate::time::{date_from_file_name, elapsed_hours, iso_to_date, iso_to_mjd, mjd_to_date, mjd_to_datetime};

use super::model::ObservationRecord;
use super::outliers::reject_outliers;
use super::stats::summarize;

/// Target label used when no identity source knows the file.
pub const UNKNOWN_TARGET: &str = "Unknown";

/// Dedicated per-sample MJD column, preferred for elapsed times.
const MJD_TIME_COLUMN: &str = "MJD_TIME";
/// ISO timestamp column, last resort for elapsed times.
const UTC_TIME_COLUMN: &str = "UTC_TIME";

// ---------------------------------------------------------------------------
// Skip reasons
// ---------------------------------------------------------------------------

/// Why a file produced no record. Never fatal to a batch.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SkipReason {
    #[error("cannot read file: {0}")]
    Open(String),
    #[error("no data table selected by {0}")]
    MissingTable(String),
    #[error("data table is empty")]
    EmptyTable,
    #[error("time column '{0}' not found")]
    MissingTimeColumn(String),
    #[error("cannot derive a date from time column '{0}'")]
    UnparseableDate(String),
    #[error("no date in the file name or time column")]
    NoVisitDate,
}

impl SkipReason {
    /// Stable label for counting skips by reason.
    pub fn kind(&self) -> &'static str {
        match self {
            SkipReason::Open(_) => "open",
            SkipReason::MissingTable(_) => "missing_table",
            SkipReason::EmptyTable => "empty_table",
            SkipReason::MissingTimeColumn(_) => "missing_time_column",
            SkipReason::UnparseableDate(_) => "unparseable_date",
            SkipReason::NoVisitDate => "no_visit_date",
        }
    }
}

// ---------------------------------------------------------------------------
// Per-file helpers
// ---------------------------------------------------------------------------

pub fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.to_string_lossy().into_owned())
}

/// Target of a file: reference table via the path ORID, then the header
/// keyword of any HDU, then the `TG` token of the file name.
pub fn resolve_target(path: &Path, fits: &FitsFile, header_key: &str, targets: &TargetTable) -> String {
    if let Some(target) = orid_from_path(path).and_then(|orid| targets.resolve(&orid)) {
        return target.to_string();
    }

    let from_header = fits.header_value(header_key).map(|value| match value.as_str() {
        Some(s) => s.trim().to_string(),
        None => value.to_string(),
    });
    if let Some(name) = from_header.filter(|s| !s.is_empty()) {
        return name;
    }

    target_group_token(&file_name(path)).unwrap_or_else(|| UNKNOWN_TARGET.to_string())
}

/// HDU index of the data table.
pub fn select_table(hdus: &[Hdu], selector: &TableSelector) -> Option<usize> {
    match selector {
        TableSelector::ByIndex(index) => hdus.get(*index).filter(|h| h.is_bintable()).map(|h| h.index),
        TableSelector::ByNameSubstring(part) => hdus
            .iter()
            .find(|h| h.is_bintable() && h.name().contains(part.as_str()))
            .map(|h| h.index),
        TableSelector::FirstNonPrimary => hdus.iter().skip(1).find(|h| h.is_bintable()).map(|h| h.index),
    }
}

fn describe_selector(selector: &TableSelector) -> String {
    match selector {
        TableSelector::ByIndex(index) => format!("index {index}"),
        TableSelector::ByNameSubstring(part) => format!("name containing '{part}'"),
        TableSelector::FirstNonPrimary => "first extension".to_string(),
    }
}

/// Date of the earliest value of the configured time column.
pub fn visit_date(table: &BinTable, source: &SourceSpec) -> Result<NaiveDate, SkipReason> {
    let name = &source.time_column;
    let column = table
        .column(name)
        .ok_or_else(|| SkipReason::MissingTimeColumn(name.clone()))?;
    let unparseable = || SkipReason::UnparseableDate(name.clone());

    match source.time_format {
        TimeEncoding::Mjd => {
            let values = column.to_f64().map_err(|_| unparseable())?;
            let earliest = values
                .into_iter()
                .filter(|v| v.is_finite())
                .min_by(f64::total_cmp)
                .ok_or_else(unparseable)?;
            mjd_to_date(earliest).ok_or_else(unparseable)
        }
        TimeEncoding::Iso => {
            let earliest = column
                .as_text()
                .ok_or_else(unparseable)?
                .iter()
                .map(|s| s.trim())
                .filter(|s| !s.is_empty())
                .min()
                .ok_or_else(unparseable)?;
            iso_to_date(earliest).ok_or_else(unparseable)
        }
    }
}

/// Per-sample hours since the earliest sample, from `MJD_TIME`, the
/// configured MJD time column, or `UTC_TIME`, in that order.
pub fn sample_hours(table: &BinTable, source: &SourceSpec) -> Option<Vec<f64>> {
    if let Some(values) = table.column(MJD_TIME_COLUMN).and_then(|c| c.to_f64().ok()) {
        return elapsed_hours(&values);
    }
    if source.time_format == TimeEncoding::Mjd {
        if let Some(values) = table.column(&source.time_column).and_then(|c| c.to_f64().ok()) {
            return elapsed_hours(&values);
        }
    }
    let stamps = table.column(UTC_TIME_COLUMN)?.as_text()?;
    let mjd: Option<Vec<f64>> = stamps.iter().map(|s| iso_to_mjd(s)).collect();
    elapsed_hours(&mjd?)
}

/// Remove NaN values and the matching entries of `times`.
fn drop_nan(values: Vec<f64>, times: Option<&[f64]>) -> (Vec<f64>, Option<Vec<f64>>) {
    match times {
        Some(times) => {
            let (v, t) = values
                .into_iter()
                .zip(times.iter().copied())
                .filter(|(v, _)| !v.is_nan())
                .unzip();
            (v, Some(t))
        }
        None => (values.into_iter().filter(|v| !v.is_nan()).collect(), None),
    }
}

// ---------------------------------------------------------------------------
// Extractor
// ---------------------------------------------------------------------------

/// Turns files of one source into observation records.
#[derive(Debug, Clone)]
pub struct Extractor<'a> {
    source: &'a SourceSpec,
    targets: &'a TargetTable,
    columns: Vec<String>,
    calculate_stats: bool,
    outlier_sigma: Option<f64>,
}

impl<'a> Extractor<'a> {
    pub fn new(source: &'a SourceSpec, targets: &'a TargetTable, columns: Vec<String>) -> Self {
        Self {
            source,
            targets,
            columns,
            calculate_stats: true,
            outlier_sigma: None,
        }
    }

    /// Clip each field at `sigma` robust sigmas before computing statistics.
    pub fn with_outlier_rejection(mut self, sigma: f64) -> Self {
        self.outlier_sigma = Some(sigma);
        self
    }

    /// Keep one record per table row with raw values instead of statistics.
    pub fn direct_values(mut self) -> Self {
        self.calculate_stats = false;
        self
    }

    /// Records of one file: one for statistics sources, one per non-empty
    /// row for direct-value sources.
    pub fn extract(&self, path: &Path) -> Result<Vec<ObservationRecord>, SkipReason> {
        let mut fits = FitsFile::open(path).map_err(|e| SkipReason::Open(e.to_string()))?;
        let target = resolve_target(path, &fits, &self.source.target_header, self.targets);

        let index = select_table(fits.hdus(), &self.source.table)
            .ok_or_else(|| SkipReason::MissingTable(describe_selector(&self.source.table)))?;
        let table = fits.read_table(index).map_err(|e| SkipReason::Open(e.to_string()))?;
        drop(fits);
        if table.is_empty() {
            return Err(SkipReason::EmptyTable);
        }

        let source_file = file_name(path);
        if self.calculate_stats {
            let date_of_visit = visit_date(&table, self.source)?;
            let fields = self.statistics(&table);
            Ok(vec![ObservationRecord {
                target,
                date_of_visit,
                source_file,
                sample_count: table.nrows,
                row_index: None,
                fields,
            }])
        } else {
            let date_of_visit = date_from_file_name(&source_file)
                .or_else(|| visit_date(&table, self.source).ok())
                .ok_or(SkipReason::NoVisitDate)?;
            Ok(self.rows(&table, &target, date_of_visit, &source_file))
        }
    }

    /// Numeric values of the requested columns present in the table.
    fn requested_columns(&self, table: &BinTable) -> Vec<(String, Vec<f64>)> {
        self.columns
            .iter()
            .filter_map(|name| {
                let column = table.column(name)?;
                match column.to_f64() {
                    Ok(values) => Some((name.clone(), values)),
                    Err(e) => {
                        debug!("skipping field {name}: {e}");
                        None
                    }
                }
            })
            .collect()
    }

    fn statistics(&self, table: &BinTable) -> Vec<(String, f64)> {
        let binned = self.source.lightcurve;
        let hours = if binned { sample_hours(table, self.source) } else { None };

        let mut fields = Vec::new();
        for (name, values) in self.requested_columns(table) {
            let times = hours.as_deref().filter(|t| t.len() == values.len());
            let (mut data, mut times) = drop_nan(values, times);

            if let Some(sigma) = self.outlier_sigma {
                let (kept, mask) = reject_outliers(&data, sigma);
                times = times.map(|t| {
                    t.into_iter()
                        .zip(&mask)
                        .filter(|(_, keep)| **keep)
                        .map(|(t, _)| t)
                        .collect()
                });
                data = kept;
            }

            if data.is_empty() {
                debug!("field {name} has no usable values");
                continue;
            }
            fields.extend(summarize(&data, times.as_deref()).columns(&name, binned));
        }
        fields
    }

    fn rows(&self, table: &BinTable, target: &str, date: NaiveDate, source_file: &str) -> Vec<ObservationRecord> {
        let columns = self.requested_columns(table);
        (0..table.nrows)
            .filter_map(|row| {
                let fields: Vec<(String, f64)> = columns
                    .iter()
                    .filter_map(|(name, values)| {
                        let value = *values.get(row)?;
                        (!value.is_nan()).then(|| (name.clone(), value))
                    })
                    .collect();
                (!fields.is_empty()).then(|| ObservationRecord {
                    target: target.to_string(),
                    date_of_visit: date,
                    source_file: source_file.to_string(),
                    sample_count: table.nrows,
                    row_index: Some(row),
                    fields,
                })
            })
            .collect()
    }
}

// ---------------------------------------------------------------------------
// Raw view of one file
// ---------------------------------------------------------------------------

/// Timestamps and requested columns of one file, unaggregated.
#[derive(Debug, Clone, PartialEq)]
pub struct RawTable {
    /// `YYYY-MM-DD HH:MM:SS`, one per row; empty when the row has no time.
    pub times: Vec<String>,
    pub columns: Vec<(String, Vec<f64>)>,
}

fn time_labels(table: &BinTable, source: &SourceSpec) -> Vec<String> {
    let format = |mjd: f64| {
        mjd_to_datetime(mjd)
            .map(|dt| dt.format("%Y-%m-%d %H:%M:%S").to_string())
            .unwrap_or_default()
    };
    let Some(column) = table.column(&source.time_column) else {
        return vec![String::new(); table.nrows];
    };
    match (source.time_format, column.as_text()) {
        (TimeEncoding::Iso, Some(stamps)) => stamps
            .iter()
            .map(|s| iso_to_mjd(s).map(format).unwrap_or_else(|| s.trim().to_string()))
            .collect(),
        _ => match column.to_f64() {
            Ok(values) => values.into_iter().map(format).collect(),
            Err(_) => vec![String::new(); table.nrows],
        },
    }
}

/// Read one file of `source` and return its time axis and `columns`.
pub fn raw_table(source: &SourceSpec, path: &Path, columns: &[String]) -> Result<RawTable, SkipReason> {
    let mut fits = FitsFile::open(path).map_err(|e| SkipReason::Open(e.to_string()))?;
    let index = select_table(fits.hdus(), &source.table)
        .ok_or_else(|| SkipReason::MissingTable(describe_selector(&source.table)))?;
    let table = fits.read_table(index).map_err(|e| SkipReason::Open(e.to_string()))?;

    let columns = columns
        .iter()
        .filter_map(|name| Some((name.clone(), table.column(name)?.to_f64().ok()?)))
        .collect();
    Ok(RawTable {
        times: time_labels(&table, source),
        columns,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fits::{write_fits, Column, Header, HeaderValue, TableHdu};
    use crate::identity::TargetEntry;
    use approx::assert_relative_eq;
    use std::path::PathBuf;

    fn targets() -> TargetTable {
        TargetTable::from_entries(vec![TargetEntry {
            target: "WASP-43".to_string(),
            observation_request_id: "PR300005_TG0001".to_string(),
            visit_date: None,
            year: None,
        }])
    }

    fn write(path: &Path, primary: Header, table: TableHdu) {
        std::fs::create_dir_all(path.parent().unwrap()).unwrap();
        write_fits(path, &primary, &[table]).unwrap();
    }

    fn iso_table(flux: Vec<f64>) -> TableHdu {
        let n = flux.len();
        let stamps: Vec<String> = (0..n)
            .map(|i| format!("2022-01-05T{:02}:{:02}:00", i / 60, i % 60))
            .collect();
        TableHdu::new("SCI_COR_Lightcurve")
            .with_column(Column::text("UTC_TIME", stamps))
            .with_column(Column::numeric("FLUX", flux))
    }

    fn flux() -> Vec<String> {
        vec!["FLUX".to_string()]
    }

    #[test]
    fn skip_reason_labels() {
        assert_eq!(SkipReason::EmptyTable.kind(), "empty_table");
        assert_eq!(SkipReason::Open("x".into()).kind(), "open");
    }

    #[test]
    fn statistics_record_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("PR300005_TG000101_V0300/lc.fits");
        write(&path, Header::new(), iso_table(vec![1.0, 2.0, f64::NAN, 3.0]));

        let source = SourceSpec::new(dir.path(), "**/*.fits");
        let targets = targets();
        let records = Extractor::new(&source, &targets, flux()).extract(&path).unwrap();
        assert_eq!(records.len(), 1);
        let rec = &records[0];
        assert_eq!(rec.target, "WASP-43");
        assert_eq!(rec.date_of_visit, NaiveDate::from_ymd_opt(2022, 1, 5).unwrap());
        assert_eq!(rec.source_file, "lc.fits");
        assert_eq!(rec.sample_count, 4);
        assert_relative_eq!(rec.field("FLUX_mean").unwrap(), 2.0);
        assert_eq!(rec.fields.len(), 11);
    }

    #[test]
    fn target_falls_back_to_header_then_file_name() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceSpec::new(dir.path(), "**/*.fits");
        let targets = targets();
        let extractor = Extractor::new(&source, &targets, flux());

        let with_header = dir.path().join("a/obs.fits");
        write(
            &with_header,
            Header::new().with("TARGNAME", HeaderValue::Str("KELT-11 ".into())),
            iso_table(vec![1.0]),
        );
        assert_eq!(extractor.extract(&with_header).unwrap()[0].target, "KELT-11");

        let with_token = dir.path().join("b/CH_PR999999_TG000203_lc.fits");
        write(&with_token, Header::new(), iso_table(vec![1.0]));
        assert_eq!(extractor.extract(&with_token).unwrap()[0].target, "TG000203");

        let anonymous = dir.path().join("c/lc.fits");
        write(&anonymous, Header::new(), iso_table(vec![1.0]));
        assert_eq!(extractor.extract(&anonymous).unwrap()[0].target, UNKNOWN_TARGET);
    }

    #[test]
    fn skips_with_reasons() {
        let dir = tempfile::tempdir().unwrap();
        let source = SourceSpec::new(dir.path(), "**/*.fits");
        let targets = targets();
        let extractor = Extractor::new(&source, &targets, flux());

        let garbage = dir.path().join("garbage.fits");
        std::fs::write(&garbage, b"not a fits file").unwrap();
        assert_eq!(extractor.extract(&garbage).unwrap_err().kind(), "open");

        let empty = dir.path().join("empty.fits");
        write(&empty, Header::new(), iso_table(Vec::new()));
        assert_eq!(extractor.extract(&empty).unwrap_err(), SkipReason::EmptyTable);

        let no_time = dir.path().join("no_time.fits");
        write(
            &no_time,
            Header::new(),
            TableHdu::new("DATA").with_column(Column::numeric("FLUX", vec![1.0])),
        );
        assert_eq!(
            extractor.extract(&no_time).unwrap_err(),
            SkipReason::MissingTimeColumn("UTC_TIME".into())
        );

        let bad_date = dir.path().join("bad_date.fits");
        write(
            &bad_date,
            Header::new(),
            TableHdu::new("DATA")
                .with_column(Column::text("UTC_TIME", ["soon"]))
                .with_column(Column::numeric("FLUX", vec![1.0])),
        );
        assert_eq!(extractor.extract(&bad_date).unwrap_err().kind(), "unparseable_date");

        let by_name = source.clone().with_table(TableSelector::ByNameSubstring("Metadata".into()));
        let extractor = Extractor::new(&by_name, &targets, flux());
        let path = dir.path().join("lc.fits");
        write(&path, Header::new(), iso_table(vec![1.0]));
        assert_eq!(extractor.extract(&path).unwrap_err().kind(), "missing_table");
    }

    #[test]
    fn uncoercible_and_empty_fields_are_omitted() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lc.fits");
        write(
            &path,
            Header::new(),
            iso_table(vec![1.0, 2.0])
                .with_column(Column::text("MODE", ["fast", "slow"]))
                .with_column(Column::numeric("DEAD", vec![f64::NAN, f64::NAN])),
        );
        let source = SourceSpec::new(dir.path(), "**/*.fits");
        let targets = targets();
        let columns: Vec<String> = ["FLUX", "MODE", "DEAD", "ABSENT"].iter().map(|s| s.to_string()).collect();
        let rec = &Extractor::new(&source, &targets, columns).extract(&path).unwrap()[0];
        assert!(rec.field("FLUX_mean").is_some());
        assert!(rec.field("MODE_mean").is_none());
        assert!(rec.field("DEAD_mean").is_none());
    }

    #[test]
    fn outlier_rejection_changes_statistics() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lc.fits");
        let mut values: Vec<f64> = (0..20).map(|i| 10.0 + (i % 3) as f64 * 0.1).collect();
        values.push(1000.0);
        write(&path, Header::new(), iso_table(values));

        let source = SourceSpec::new(dir.path(), "**/*.fits");
        let targets = targets();
        let plain = &Extractor::new(&source, &targets, flux()).extract(&path).unwrap()[0];
        let clipped = &Extractor::new(&source, &targets, flux())
            .with_outlier_rejection(3.0)
            .extract(&path)
            .unwrap()[0];
        assert_eq!(plain.field("FLUX_max"), Some(1000.0));
        assert_relative_eq!(clipped.field("FLUX_max").unwrap(), 10.2);
        assert_eq!(clipped.sample_count, 21);
    }

    #[test]
    fn lightcurve_adds_binned_noise_from_mjd() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lc.fits");
        // Six hours at 11.25-minute cadence, brighter after three hours.
        let mjd: Vec<f64> = (0..=32).map(|k| 59584.0 + k as f64 / 128.0).collect();
        let values: Vec<f64> = (0..=32).map(|k| if k < 16 { 1.0 } else { 3.0 }).collect();
        write(
            &path,
            Header::new(),
            TableHdu::new("LC")
                .with_column(Column::numeric("MJD_TIME", mjd))
                .with_column(Column::numeric("FLUX", values)),
        );

        let source = SourceSpec::new(dir.path(), "**/*.fits")
            .with_time("MJD_TIME", TimeEncoding::Mjd)
            .as_lightcurve();
        let targets = targets();
        let rec = &Extractor::new(&source, &targets, flux()).extract(&path).unwrap()[0];
        assert_eq!(rec.fields.len(), 14);
        assert_eq!(rec.date_of_visit, NaiveDate::from_ymd_opt(2022, 1, 5).unwrap());
        assert_relative_eq!(rec.field("FLUX_bin_noise_1h").unwrap(), 1.0, epsilon = 1e-9);
        assert_relative_eq!(rec.field("FLUX_bin_noise_3h").unwrap(), 1.0, epsilon = 1e-9);
        assert!(rec.field("FLUX_bin_noise_6h").unwrap().is_nan());
    }

    #[test]
    fn direct_values_one_record_per_row() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("CH_TU2023-04-02T10-00-00_cont_data.fits");
        write(
            &path,
            Header::new(),
            TableHdu::new("CONT")
                .with_column(Column::numeric("TEMP", vec![20.0, f64::NAN, 22.0]))
                .with_column(Column::numeric("VOLT", vec![5.0, f64::NAN, 5.1])),
        );
        let source = SourceSpec::new(dir.path(), "**/*.fits");
        let targets = targets();
        let columns = vec!["TEMP".to_string(), "VOLT".to_string()];
        let records = Extractor::new(&source, &targets, columns)
            .direct_values()
            .extract(&path)
            .unwrap();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].row_index, Some(0));
        assert_eq!(records[1].row_index, Some(2));
        assert_eq!(records[1].field("TEMP"), Some(22.0));
        assert_eq!(records[0].date_of_visit, NaiveDate::from_ymd_opt(2023, 4, 2).unwrap());

        let undated = dir.path().join("cont_data.fits");
        write(
            &undated,
            Header::new(),
            TableHdu::new("CONT").with_column(Column::numeric("TEMP", vec![20.0])),
        );
        let err = Extractor::new(&source, &targets, vec!["TEMP".to_string()])
            .direct_values()
            .extract(&undated)
            .unwrap_err();
        assert_eq!(err, SkipReason::NoVisitDate);
    }

    #[test]
    fn table_selection() {
        let dir = tempfile::tempdir().unwrap();
        let path: PathBuf = dir.path().join("multi.fits");
        write_fits(
            &path,
            &Header::new(),
            &[
                TableHdu::new("SCI_RAW_Attitude").with_column(Column::numeric("A", vec![1.0])),
                TableHdu::new("SCI_RAW_ImageMetadata").with_column(Column::numeric("B", vec![1.0])),
            ],
        )
        .unwrap();
        let fits = FitsFile::open(&path).unwrap();
        let hdus = fits.hdus();
        assert_eq!(select_table(hdus, &TableSelector::FirstNonPrimary), Some(1));
        assert_eq!(select_table(hdus, &TableSelector::ByIndex(2)), Some(2));
        assert_eq!(select_table(hdus, &TableSelector::ByIndex(0)), None);
        assert_eq!(select_table(hdus, &TableSelector::ByIndex(7)), None);
        assert_eq!(
            select_table(hdus, &TableSelector::ByNameSubstring("ImageMetadata".into())),
            Some(2)
        );
    }

    #[test]
    fn raw_view_formats_times() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("lc.fits");
        write(&path, Header::new(), iso_table(vec![1.5, 2.5]));
        let source = SourceSpec::new(dir.path(), "**/*.fits");
        let raw = raw_table(&source, &path, &flux()).unwrap();
        assert_eq!(raw.times, vec!["2022-01-05 00:00:00", "2022-01-05 00:01:00"]);
        assert_eq!(raw.columns, vec![("FLUX".to_string(), vec![1.5, 2.5])]);
    }
}
