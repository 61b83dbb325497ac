//! # Sensor Sync
//!
//! Temporal alignment of per-sensor series onto one shared grid:
//! resampling with forward fill, gap detection, per-(sensor, interval)
//! caching, and the unified table that every analysis stage consumes.

pub mod aligner;
pub mod cache;
pub mod gaps;
pub mod resample;
pub mod unify;

pub use aligner::Aligner;
pub use cache::ResampleCache;
pub use gaps::{Gap, detect_gaps};
pub use resample::{FillStats, GridRange, ResampledSeries, Resampler, SensorFailure, resample};
pub use unify::{Column, ColumnKind, Unified, UnifiedTable, column_names, unify, unify_resampled};
