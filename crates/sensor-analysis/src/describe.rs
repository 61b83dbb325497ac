//! Descriptive statistics and data-quality reporting.

use serde::{Deserialize, Serialize};

use sensor_core::stats::{mean, median, min_max, sample_std};
use sensor_sync::{ColumnKind, Unified, UnifiedTable};

/// Per-column statistics over present, finite cells.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnSummary {
    pub column: String,
    pub sensor: String,
    pub kind: ColumnKind,
    pub count: usize,
    pub mean: Option<f64>,
    pub std: Option<f64>,
    pub min: Option<f64>,
    pub max: Option<f64>,
    pub median: Option<f64>,
}

pub fn describe(table: &UnifiedTable) -> Vec<ColumnSummary> {
    table
        .columns()
        .iter()
        .map(|column| {
            let values: Vec<f64> = column
                .present_values()
                .into_iter()
                .filter(|v| v.is_finite())
                .collect();
            let range = min_max(&values);
            ColumnSummary {
                column: column.name.clone(),
                sensor: column.sensor.clone(),
                kind: column.kind,
                count: values.len(),
                mean: mean(&values),
                std: sample_std(&values),
                min: range.map(|(lo, _)| lo),
                max: range.map(|(_, hi)| hi),
                median: median(&values),
            }
        })
        .collect()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorQuality {
    pub sensor: String,
    pub observed: usize,
    pub filled: usize,
    pub fill_ratio: f64,
    pub columns: usize,
    /// Kept out of direct columns because of its array size.
    pub routed: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SensorProblem {
    pub sensor: String,
    pub code: u32,
    pub message: String,
}

/// Fill statistics and failures of one alignment run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QualityReport {
    pub interval: f64,
    pub rows: usize,
    pub sensors: Vec<SensorQuality>,
    pub failures: Vec<SensorProblem>,
}

impl QualityReport {
    pub fn from_unified(unified: &Unified) -> Self {
        let table = &unified.table;
        let sensors = table
            .fill_stats()
            .iter()
            .map(|(sensor, stats)| SensorQuality {
                sensor: sensor.clone(),
                observed: stats.observed,
                filled: stats.filled,
                fill_ratio: stats.fill_ratio(),
                columns: table
                    .columns_for(sensor)
                    .filter(|c| c.kind == ColumnKind::Value)
                    .count(),
                routed: table.routed().contains_key(sensor),
            })
            .collect();
        let failures = unified
            .failures
            .iter()
            .map(|f| SensorProblem {
                sensor: f.sensor.clone(),
                code: f.error.code(),
                message: f.error.to_string(),
            })
            .collect();
        Self {
            interval: table.interval(),
            rows: table.len(),
            sensors,
            failures,
        }
    }

    pub fn total_filled(&self) -> usize {
        self.sensors.iter().map(|s| s.filled).sum()
    }
}
