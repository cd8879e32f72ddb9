//! `ageing-monitor` command line.
//!
//! ```bash
//! ageing-monitor analyze --config config/ageing.json --analysis drp_lightcurve --remove-outliers
//! ageing-monitor analyses --config config/ageing.json
//! ageing-monitor targets --config config/ageing.json
//! ageing-monitor raw --config config/ageing.json --analysis drp_lightcurve CH_PR100018_TG000101_R25_V0300.fits
//! ```

use std::path::{Path, PathBuf};

use ageing_monitor::data::filter::{apply, DatasetFilter};
use ageing_monitor::data::outliers::DEFAULT_SIGMA;
use ageing_monitor::data::{export, stats};
use ageing_monitor::{AnalysisRequest, BatchReport, Dataset, Pipeline, PipelineConfig};
use anyhow::{bail, Context, Result};
use arrow::util::pretty::pretty_format_batches;
use chrono::NaiveDate;
use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "ageing-monitor")]
#[command(about = "Per-observation statistics of FITS telemetry for ageing trends", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run an analysis over every file of its source
    Analyze {
        /// Pipeline configuration (JSON)
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        analysis: String,

        /// Only these parameter groups (repeatable)
        #[arg(long = "group")]
        groups: Vec<String>,

        /// Clip values beyond `sigma` robust sigmas before the statistics
        #[arg(long)]
        remove_outliers: bool,

        #[arg(long, default_value_t = DEFAULT_SIGMA)]
        sigma: f64,

        /// Keep only this target
        #[arg(long)]
        target: Option<String>,

        /// First visit date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        from: Option<NaiveDate>,

        /// Last visit date (YYYY-MM-DD, inclusive)
        #[arg(long)]
        until: Option<NaiveDate>,

        /// Write the dataset to a .csv or .parquet file instead of printing it
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Configured analyses and the output columns of each parameter group
    Analyses {
        #[arg(long)]
        config: PathBuf,
    },

    /// Which reference targets have files in which sources
    Targets {
        #[arg(long)]
        config: PathBuf,
    },

    /// Time axis and columns of one file, unaggregated
    Raw {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        analysis: String,

        /// File name (without directories)
        file: String,
    },

    /// Statistics of one processed file, parameter by metric
    Stats {
        #[arg(long)]
        config: PathBuf,

        #[arg(long)]
        analysis: String,

        #[arg(long)]
        file: String,
    },
}

fn main() -> Result<()> {
    env_logger::init();
    let cli = Cli::parse();

    match cli.command {
        Commands::Analyze {
            config,
            analysis,
            groups,
            remove_outliers,
            sigma,
            target,
            from,
            until,
            output,
        } => {
            let pipeline = load(&config)?;
            let mut request = AnalysisRequest::new(&analysis);
            if !groups.is_empty() {
                request = request.with_groups(groups);
            }
            if remove_outliers {
                request = request.with_outlier_rejection(sigma);
            }
            let result = pipeline.analyze(&request);
            print_report(&result.report);

            let filter = DatasetFilter {
                target,
                from,
                until,
            };
            let dataset = apply(&result.dataset, &filter);
            match output {
                Some(path) => {
                    export::write_dataset(&dataset, &path)?;
                    println!("Wrote {} rows to {}", dataset.len(), path.display());
                }
                None => print_dataset(&dataset)?,
            }
            Ok(())
        }
        Commands::Analyses { config } => {
            let config = PipelineConfig::from_json_file(&config)?;
            for analysis in &config.analyses {
                let lightcurve = config.source_for(analysis).map(|s| s.lightcurve).unwrap_or(false);
                println!("{} ({}): {}", analysis.name, analysis.source, analysis.description);
                for (group, columns) in analysis.stat_columns(lightcurve) {
                    println!("  {group:<20} {}", columns.join(", "));
                }
            }
            Ok(())
        }
        Commands::Targets { config } => {
            let table = load(&config)?.accessibility();
            println!("{:<24} {:<26} {:>6}  {}", "Target", "OR ID", "Year", table.labels.join("  "));
            for row in &table.rows {
                let marks: Vec<String> = row
                    .available
                    .iter()
                    .zip(&table.labels)
                    .map(|(ok, label)| format!("{:^w$}", if *ok { "yes" } else { "-" }, w = label.len()))
                    .collect();
                let year = row.year.map(|y| y.to_string()).unwrap_or_default();
                println!(
                    "{:<24} {:<26} {:>6}  {}",
                    row.target,
                    row.observation_request_id,
                    year,
                    marks.join("  ")
                );
            }
            Ok(())
        }
        Commands::Raw {
            config,
            analysis,
            file,
        } => {
            let raw = load(&config)?.raw_table(&analysis, &file)?;
            let names: Vec<&str> = raw.columns.iter().map(|(n, _)| n.as_str()).collect();
            println!("{:<20} {}", "Time", names.join("\t"));
            for (row, time) in raw.times.iter().enumerate() {
                let values: Vec<String> = raw
                    .columns
                    .iter()
                    .map(|(_, v)| v.get(row).map(|x| x.to_string()).unwrap_or_default())
                    .collect();
                println!("{time:<20} {}", values.join("\t"));
            }
            Ok(())
        }
        Commands::Stats {
            config,
            analysis,
            file,
        } => {
            let pipeline = load(&config)?;
            let spec = pipeline.config().analysis(&analysis)?.clone();
            if !spec.calculate_stats {
                bail!("analysis {analysis} keeps raw values, it has no statistics");
            }
            let result = pipeline.analyze(&AnalysisRequest::new(&analysis));
            let row = result
                .dataset
                .records()
                .iter()
                .position(|r| r.source_file == file)
                .with_context(|| format!("{file} produced no record"))?;
            let Some(table) = result.dataset.statistics_table(row, &spec) else {
                bail!("{file} produced no record");
            };

            println!("{:<20} {}", "Parameter", table.metrics.join("\t"));
            for (param, values) in &table.rows {
                let cells: Vec<String> = values.iter().map(|v| format!("{v:.6}")).collect();
                println!("{param:<20} {}", cells.join("\t"));
            }
            for metric in &table.metrics {
                if let Some(text) = stats::stat_definition(metric) {
                    println!("  {metric:<14} {text}");
                }
            }
            Ok(())
        }
    }
}

fn load(config: &Path) -> Result<Pipeline> {
    let config = PipelineConfig::from_json_file(config)?;
    Ok(Pipeline::new(config))
}

fn print_report(report: &BatchReport) {
    println!(
        "{} files discovered, {} processed, {} skipped, {} records",
        report.files_discovered,
        report.files_processed,
        report.files_skipped(),
        report.records
    );
    for (reason, count) in &report.skipped {
        println!("  skipped ({reason}): {count}");
    }
    if let Some(reason) = report.no_data {
        println!("No data: {reason}");
    }
}

fn print_dataset(dataset: &Dataset) -> Result<()> {
    if dataset.is_empty() {
        return Ok(());
    }
    let batch = dataset.to_record_batch()?;
    println!("{}", pretty_format_batches(&[batch])?);
    Ok(())
}
