use std::collections::BTreeSet;
use std::sync::Arc;

use arrow::array::{ArrayRef, Date32Array, Float64Array, Int64Array, StringArray};
use arrow::datatypes::{DataType, Field, Schema};
use arrow::error::ArrowError;
use arrow::record_batch::RecordBatch;
use chrono::{Datelike, NaiveDate};

use crate::config::AnalysisSpec;

use super::stats::{metric_names, BINNED_STATISTICS};

// ---------------------------------------------------------------------------
// ObservationRecord – one row of the output dataset
// ---------------------------------------------------------------------------

/// One observation: a processed file, or one row of a file for direct-value
/// sources.
#[derive(Debug, Clone, PartialEq)]
pub struct ObservationRecord {
    pub target: String,
    pub date_of_visit: NaiveDate,
    /// File name without directories.
    pub source_file: String,
    /// Row count of the data table.
    pub sample_count: usize,
    /// Table row, for direct-value records only.
    pub row_index: Option<usize>,
    /// Value columns in insertion order: `{param}_{metric}` or raw columns.
    pub fields: Vec<(String, f64)>,
}

impl ObservationRecord {
    pub fn field(&self, name: &str) -> Option<f64> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, v)| *v)
    }
}

// ---------------------------------------------------------------------------
// Dataset – the assembled, date-ordered table
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Default, PartialEq)]
pub struct Dataset {
    records: Vec<ObservationRecord>,
    /// Union of value columns, first-seen order.
    columns: Vec<String>,
}

/// Per-file statistics laid out as parameter × metric.
#[derive(Debug, Clone, PartialEq)]
pub struct StatisticsTable {
    pub metrics: Vec<&'static str>,
    /// `(parameter, one value per metric)`; NaN where the record lacks it.
    pub rows: Vec<(String, Vec<f64>)>,
}

impl Dataset {
    /// Sort records by date (then file, then row) and index their columns.
    pub fn assemble(mut records: Vec<ObservationRecord>) -> Self {
        records.sort_by(|a, b| {
            (a.date_of_visit, &a.source_file, a.row_index)
                .cmp(&(b.date_of_visit, &b.source_file, b.row_index))
        });

        let mut seen = BTreeSet::new();
        let mut columns = Vec::new();
        for record in &records {
            for (name, _) in &record.fields {
                if seen.insert(name.as_str()) {
                    columns.push(name.clone());
                }
            }
        }
        Dataset { records, columns }
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn records(&self) -> &[ObservationRecord] {
        &self.records
    }

    /// Value column names, excluding the fixed leading columns.
    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    /// Whether the records are per-row values rather than per-file statistics.
    pub fn is_direct(&self) -> bool {
        self.records.iter().any(|r| r.row_index.is_some())
    }

    /// One value per record, NaN where the record lacks the column.
    pub fn column(&self, name: &str) -> Vec<f64> {
        self.records
            .iter()
            .map(|r| r.field(name).unwrap_or(f64::NAN))
            .collect()
    }

    /// Distinct targets, sorted.
    pub fn targets(&self) -> Vec<String> {
        let set: BTreeSet<&str> = self.records.iter().map(|r| r.target.as_str()).collect();
        set.into_iter().map(str::to_string).collect()
    }

    /// Distinct visit years of one target, sorted.
    pub fn years_for(&self, target: &str) -> Vec<i32> {
        let set: BTreeSet<i32> = self
            .records
            .iter()
            .filter(|r| r.target == target)
            .map(|r| r.date_of_visit.year())
            .collect();
        set.into_iter().collect()
    }

    /// Statistics of one record arranged by parameter, for the parameters of
    /// `analysis` the record carries.
    pub fn statistics_table(&self, row: usize, analysis: &AnalysisSpec) -> Option<StatisticsTable> {
        let record = self.records.get(row)?;
        let binned = BINNED_STATISTICS
            .iter()
            .any(|m| record.fields.iter().any(|(n, _)| n.ends_with(*m)));
        let metrics = metric_names(binned);

        let rows = analysis
            .columns(None)
            .into_iter()
            .filter_map(|param| {
                let values: Vec<f64> = metrics
                    .iter()
                    .map(|m| record.field(&format!("{param}_{m}")).unwrap_or(f64::NAN))
                    .collect();
                values.iter().any(|v| !v.is_nan()).then_some((param, values))
            })
            .collect();
        Some(StatisticsTable { metrics, rows })
    }

    // -- Arrow --

    pub fn schema(&self) -> Schema {
        let mut fields = vec![
            Field::new("Target", DataType::Utf8, false),
            Field::new("DateOfVisit", DataType::Date32, false),
            Field::new("SourceFile", DataType::Utf8, false),
            Field::new("SampleCount", DataType::Int64, false),
        ];
        if self.is_direct() {
            fields.push(Field::new("RowIndex", DataType::Int64, true));
        }
        for name in &self.columns {
            fields.push(Field::new(name, DataType::Float64, true));
        }
        Schema::new(fields)
    }

    /// The dataset as one Arrow batch; missing values are null.
    pub fn to_record_batch(&self) -> Result<RecordBatch, ArrowError> {
        let unix_epoch = NaiveDate::from_ymd_opt(1970, 1, 1)
            .ok_or_else(|| ArrowError::ComputeError("invalid epoch".into()))?;

        let mut arrays: Vec<ArrayRef> = vec![
            Arc::new(StringArray::from_iter_values(
                self.records.iter().map(|r| r.target.as_str()),
            )),
            Arc::new(Date32Array::from_iter_values(self.records.iter().map(|r| {
                r.date_of_visit.signed_duration_since(unix_epoch).num_days() as i32
            }))),
            Arc::new(StringArray::from_iter_values(
                self.records.iter().map(|r| r.source_file.as_str()),
            )),
            Arc::new(Int64Array::from_iter_values(
                self.records.iter().map(|r| r.sample_count as i64),
            )),
        ];
        if self.is_direct() {
            arrays.push(Arc::new(Int64Array::from(
                self.records
                    .iter()
                    .map(|r| r.row_index.map(|i| i as i64))
                    .collect::<Vec<_>>(),
            )));
        }
        for name in &self.columns {
            arrays.push(Arc::new(Float64Array::from(
                self.records.iter().map(|r| r.field(name)).collect::<Vec<_>>(),
            )));
        }

        RecordBatch::try_new(Arc::new(self.schema()), arrays)
    }
}
