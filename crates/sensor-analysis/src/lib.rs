//! # Sensor Analysis
//!
//! Everything that runs on a unified table: anomaly labels, queries,
//! array-sensor summaries, correlation and quality reporting.

pub mod correlate;
pub mod describe;
pub mod label;
pub mod query;
pub mod summary;

pub use correlate::{CorrelatedPair, CorrelationMatrix, CorrelationReport, Correlator, Predictor, RedundantSensor};
pub use describe::{ColumnSummary, QualityReport, SensorProblem, SensorQuality, describe};
pub use label::{AnomalyLabeler, ColumnStats, LABEL_COLUMN, LabelDistribution, LabeledTable, label};
pub use query::{ALL_SENSORS, QueryResult, query, query_labeled};
pub use summary::{CrossShapeComparator, SummaryVector, summarize, summary_column_names};
