//! # Label
//!
//! Statistical anomaly labels over a unified table.
//!
//! Each value or summary column gets its mean μ and sample standard deviation
//! σ over its present cells. A row is anomalous (1) when any column's value
//! lies more than `k·σ` from that column's μ. A constant column (σ = 0) flags
//! every value different from the constant and never the constant itself.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use sensor_core::config::LabelConfig;
use sensor_core::stats::{mean, min_max, sample_std};
use sensor_core::{Dtype, Result, SensorError};
use sensor_sync::{Column, ColumnKind, UnifiedTable};

/// Name of the aggregate label column added by [`LabeledTable::into_table`].
pub const LABEL_COLUMN: &str = "label";

/// μ and σ captured for one column at labeling time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ColumnStats {
    pub column: String,
    pub mean: f64,
    pub std: f64,
    pub count: usize,
}

/// Count of normal and anomalous rows.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct LabelDistribution {
    pub normal: usize,
    pub anomalous: usize,
}

/// A unified table with per-column and aggregate anomaly labels.
#[derive(Debug, Clone, PartialEq)]
pub struct LabeledTable {
    table: UnifiedTable,
    threshold: f64,
    stats: Vec<ColumnStats>,
    labels: Vec<u8>,
    column_labels: BTreeMap<String, Vec<u8>>,
}

impl LabeledTable {
    pub fn table(&self) -> &UnifiedTable {
        &self.table
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    /// Statistics of every column that voted.
    pub fn stats(&self) -> &[ColumnStats] {
        &self.stats
    }

    /// Aggregate label per row.
    pub fn labels(&self) -> &[u8] {
        &self.labels
    }

    /// Labels produced by a single column.
    pub fn column_labels(&self, column: &str) -> Option<&[u8]> {
        self.column_labels.get(column).map(Vec::as_slice)
    }

    pub fn distribution(&self) -> LabelDistribution {
        let anomalous = self.labels.iter().filter(|l| **l == 1).count();
        LabelDistribution {
            normal: self.labels.len() - anomalous,
            anomalous,
        }
    }

    /// The table with the aggregate label appended as an `int` label column.
    ///
    /// An existing label column of the same name is replaced.
    pub fn into_table(self) -> Result<UnifiedTable> {
        let mut table = self.table;
        table.remove_column(LABEL_COLUMN);
        let values = self.labels.iter().map(|l| Some(f64::from(*l))).collect();
        table.push_column(Column::new(
            LABEL_COLUMN,
            LABEL_COLUMN,
            Dtype::Int,
            ColumnKind::Label,
            values,
        ))?;
        Ok(table)
    }

    pub fn to_table(&self) -> Result<UnifiedTable> {
        self.clone().into_table()
    }
}

/// Labels rows with a fixed threshold multiplier `k`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AnomalyLabeler {
    threshold: f64,
}

impl AnomalyLabeler {
    pub fn new(threshold: f64) -> Result<Self> {
        if !(threshold.is_finite() && threshold > 0.0) {
            return Err(SensorError::invalid_config(format!(
                "label threshold must be positive, got {threshold}"
            )));
        }
        Ok(Self { threshold })
    }

    pub fn from_config(config: &LabelConfig) -> Result<Self> {
        Self::new(config.threshold)
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }

    pub fn label(&self, table: &UnifiedTable) -> Result<LabeledTable> {
        let analyzable: Vec<&Column> = table
            .columns()
            .iter()
            .filter(|c| c.is_analyzable())
            .collect();
        if analyzable.is_empty() {
            return Err(SensorError::empty_input("table has no numeric columns to label"));
        }

        let mut labels = vec![0u8; table.len()];
        let mut stats = Vec::new();
        let mut column_labels = BTreeMap::new();
        for column in analyzable {
            let Some((column_stats, votes)) = self.label_column(column)? else {
                debug!(column = %column.name, "column entirely missing, no vote");
                continue;
            };
            for (label, vote) in labels.iter_mut().zip(&votes) {
                *label |= *vote;
            }
            stats.push(column_stats);
            column_labels.insert(column.name.clone(), votes);
        }

        let labeled = LabeledTable {
            table: table.clone(),
            threshold: self.threshold,
            stats,
            labels,
            column_labels,
        };
        let dist = labeled.distribution();
        info!(
            normal = dist.normal,
            anomalous = dist.anomalous,
            threshold = self.threshold,
            "generated anomaly labels"
        );
        Ok(labeled)
    }

    /// Votes of one column, `None` when it has no present values.
    ///
    /// Statistics use the finite present values; a non-finite value always
    /// votes anomalous.
    pub fn label_column(&self, column: &Column) -> Result<Option<(ColumnStats, Vec<u8>)>> {
        let finite: Vec<f64> = column
            .present_values()
            .into_iter()
            .filter(|v| v.is_finite())
            .collect();
        match finite.len() {
            0 if column.present_count() == 0 => return Ok(None),
            n if n < 2 => {
                return Err(SensorError::insufficient_samples(
                    column.sensor.clone(),
                    column.name.clone(),
                    n,
                    2,
                ));
            }
            _ => {}
        }

        let (mu, sigma) = match min_max(&finite) {
            Some((lo, hi)) if lo == hi => (lo, 0.0),
            _ => (
                mean(&finite).unwrap_or(f64::NAN),
                sample_std(&finite).unwrap_or(0.0),
            ),
        };
        let k = self.threshold;
        let votes = column
            .values
            .iter()
            .map(|v| match v {
                Some(v) => u8::from(is_anomalous(*v, mu, sigma, k)),
                None => 0,
            })
            .collect();
        let stats = ColumnStats {
            column: column.name.clone(),
            mean: mu,
            std: sigma,
            count: finite.len(),
        };
        Ok(Some((stats, votes)))
    }
}

fn is_anomalous(value: f64, mu: f64, sigma: f64, k: f64) -> bool {
    if !value.is_finite() {
        return true;
    }
    if sigma == 0.0 {
        value != mu
    } else {
        (value - mu).abs() > k * sigma
    }
}

/// Labels `table` with multiplier `k`.
pub fn label(table: &UnifiedTable, k: f64) -> Result<LabeledTable> {
    AnomalyLabeler::new(k)?.label(table)
}
