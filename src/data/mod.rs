//! Data layer: per-file extraction, statistics, and the assembled dataset.
//!
//! Architecture:
//! ```text
//!  FITS file (one per observation)
//!        │
//!        ▼
//!   ┌──────────┐
//!   │ extract  │  target, data table, visit date, elapsed hours
//!   └──────────┘
//!        │  per requested field: drop NaN
//!        ▼
//!   ┌──────────┐
//!   │ outliers │  optional median ± k·1.4826·MAD clipping
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  stats   │  summary statistics (+ binned noise) → ObservationRecord
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  model   │  Dataset: date-sorted records, Arrow batch
//!   └──────────┘
//!        │
//!        ▼
//!   ┌──────────┐
//!   │  filter  │  target / date window → row indices
//!   └──────────┘
//! ```
pub mod export;
pub mod extract;
pub mod filter;
pub mod model;
pub mod outliers;
pub mod stats;
