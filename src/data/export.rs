use std::path::Path;

use anyhow::{bail, Context, Result};
use parquet::arrow::ArrowWriter;

use super::model::Dataset;

// ---------------------------------------------------------------------------
// Public entry-point
// ---------------------------------------------------------------------------

/// Write a dataset to a file. Dispatch by extension.
///
/// Supported formats:
/// * `.parquet` – one row group, Arrow schema of [`Dataset::schema`]
/// * `.csv`     – header row, missing values empty, NaN as `NaN`
pub fn write_dataset(dataset: &Dataset, path: &Path) -> Result<()> {
    let ext = path
        .extension()
        .and_then(|e| e.to_str())
        .unwrap_or("")
        .to_ascii_lowercase();

    match ext.as_str() {
        "parquet" | "pq" => write_parquet(dataset, path),
        "csv" => write_csv(dataset, path),
        other => bail!("Unsupported output extension: .{other}"),
    }
}

// ---------------------------------------------------------------------------
// CSV
// ---------------------------------------------------------------------------

pub fn write_csv(dataset: &Dataset, path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let direct = dataset.is_direct();

    let mut header = vec!["Target", "DateOfVisit", "SourceFile", "SampleCount"];
    if direct {
        header.push("RowIndex");
    }
    header.extend(dataset.columns().iter().map(String::as_str));
    writer.write_record(&header).context("writing CSV header")?;

    for record in dataset.records() {
        let mut row = vec![
            record.target.clone(),
            record.date_of_visit.format("%Y-%m-%d").to_string(),
            record.source_file.clone(),
            record.sample_count.to_string(),
        ];
        if direct {
            row.push(record.row_index.map(|i| i.to_string()).unwrap_or_default());
        }
        row.extend(
            dataset
                .columns()
                .iter()
                .map(|name| record.field(name).map(|v| v.to_string()).unwrap_or_default()),
        );
        writer.write_record(&row).context("writing CSV row")?;
    }
    writer.flush().context("flushing CSV")?;
    Ok(())
}

// ---------------------------------------------------------------------------
// Parquet
// ---------------------------------------------------------------------------

pub fn write_parquet(dataset: &Dataset, path: &Path) -> Result<()> {
    let batch = dataset.to_record_batch().context("building record batch")?;
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating {}", path.display()))?;
    let mut writer = ArrowWriter::try_new(file, batch.schema(), None).context("creating parquet writer")?;
    writer.write(&batch).context("writing parquet batch")?;
    writer.close().context("closing parquet writer")?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::model::ObservationRecord;
    use chrono::NaiveDate;
    use parquet::arrow::arrow_reader::ParquetRecordBatchReaderBuilder;

    fn dataset() -> Dataset {
        Dataset::assemble(vec![
            ObservationRecord {
                target: "WASP-43".into(),
                date_of_visit: NaiveDate::from_ymd_opt(2022, 1, 5).unwrap(),
                source_file: "b.fits".into(),
                sample_count: 100,
                row_index: None,
                fields: vec![("FLUX_mean".into(), 1.5), ("FLUX_skew".into(), f64::NAN)],
            },
            ObservationRecord {
                target: "WASP-43".into(),
                date_of_visit: NaiveDate::from_ymd_opt(2021, 6, 1).unwrap(),
                source_file: "a.fits".into(),
                sample_count: 50,
                row_index: None,
                fields: vec![("BKG_mean".into(), 2.0)],
            },
        ])
    }

    #[test]
    fn csv_layout() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.csv");
        write_dataset(&dataset(), &path).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines[0], "Target,DateOfVisit,SourceFile,SampleCount,BKG_mean,FLUX_mean,FLUX_skew");
        assert_eq!(lines[1], "WASP-43,2021-06-01,a.fits,50,2,,");
        assert_eq!(lines[2], "WASP-43,2022-01-05,b.fits,100,,1.5,NaN");
    }

    #[test]
    fn parquet_round_trip_keeps_schema() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.parquet");
        write_dataset(&dataset(), &path).unwrap();

        let file = std::fs::File::open(&path).unwrap();
        let reader = ParquetRecordBatchReaderBuilder::try_new(file).unwrap().build().unwrap();
        let batches: Vec<_> = reader.map(|b| b.unwrap()).collect();
        assert_eq!(batches.iter().map(|b| b.num_rows()).sum::<usize>(), 2);
        let schema = batches[0].schema();
        assert_eq!(schema.field(1).name(), "DateOfVisit");
        assert_eq!(schema.fields().len(), 7);
    }

    #[test]
    fn unknown_extension_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        assert!(write_dataset(&dataset(), &dir.path().join("out.xlsx")).is_err());
    }
}
