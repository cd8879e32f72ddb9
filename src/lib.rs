//! Instrument ageing monitoring over FITS telemetry and photometry.
//!
//! Files of a configured source are discovered, each one is reduced to an
//! observation record (target, visit date, per-parameter statistics), and the
//! records are assembled into a date-ordered dataset for trend plots.

pub mod cache;
pub mod catalog;
pub mod config;
pub mod data;
pub mod fits;
pub mod identity;
pub mod pipeline;
pub mod time;

pub use config::PipelineConfig;
pub use data::model::{Dataset, ObservationRecord};
pub use pipeline::{AnalysisRequest, AnalysisResult, BatchReport, NoData, Pipeline};
