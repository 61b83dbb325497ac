//! Row and column selection over a unified table.
//!
//! `query` is a pure function of its arguments: repeated calls with the same
//! table and filters return identical results.

use tracing::debug;

use sensor_core::{Result, SensorError};
use sensor_sync::{ColumnKind, UnifiedTable};

use crate::label::LabeledTable;

/// Sensor name that selects every sensor.
pub const ALL_SENSORS: &str = "all";

/// Matching rows and their count.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryResult {
    pub rows: UnifiedTable,
    pub count: usize,
}

impl QueryResult {
    pub fn is_empty(&self) -> bool {
        self.count == 0
    }
}

/// Selects rows of `table` inside `[t_start, t_end]` (inclusive) and, when a
/// sensor is given, only that sensor's columns and the rows where it has data.
///
/// Label columns are always kept. An unknown sensor matches nothing.
pub fn query(
    table: &UnifiedTable,
    sensor: Option<&str>,
    t_start: Option<f64>,
    t_end: Option<f64>,
) -> Result<QueryResult> {
    let start = t_start.unwrap_or(f64::NEG_INFINITY);
    let end = t_end.unwrap_or(f64::INFINITY);
    let sensor = sensor.filter(|s| *s != ALL_SENSORS);
    let bad_bound = [t_start, t_end].iter().flatten().any(|b| !b.is_finite());
    if bad_bound || start > end {
        return Err(match sensor {
            Some(name) => SensorError::invalid_sensor_range(name, start, end),
            None => SensorError::invalid_range(start, end),
        });
    }

    let tol = table.interval() * 1e-6;
    let in_range = |t: f64| t >= start - tol && t <= end + tol;

    let (rows, columns): (Vec<usize>, Vec<usize>) = match sensor {
        None => (
            (0..table.len()).filter(|&r| in_range(table.times()[r])).collect(),
            (0..table.columns().len()).collect(),
        ),
        Some(name) => {
            let own: Vec<usize> = table
                .columns()
                .iter()
                .enumerate()
                .filter(|(_, c)| c.sensor == name && c.kind != ColumnKind::Label)
                .map(|(i, _)| i)
                .collect();
            let labels = table
                .columns()
                .iter()
                .enumerate()
                .filter(|(_, c)| c.kind == ColumnKind::Label)
                .map(|(i, _)| i);
            let rows = match table.routed().get(name) {
                Some(routed) if own.is_empty() => (0..table.len())
                    .filter(|&r| {
                        let t = table.times()[r];
                        in_range(t) && t >= routed.start() - tol && t <= routed.end() + tol
                    })
                    .collect(),
                _ => (0..table.len())
                    .filter(|&r| in_range(table.times()[r]))
                    .filter(|&r| own.iter().any(|&c| table.columns()[c].values[r].is_some()))
                    .collect(),
            };
            (rows, own.into_iter().chain(labels).collect())
        }
    };

    let count = rows.len();
    debug!(sensor = ?sensor, start, end, count, "query");
    Ok(QueryResult {
        rows: table.subset(&rows, &columns),
        count,
    })
}

/// [`query`] over a labeled table, with its `label` column included.
pub fn query_labeled(
    labeled: &LabeledTable,
    sensor: Option<&str>,
    t_start: Option<f64>,
    t_end: Option<f64>,
) -> Result<QueryResult> {
    query(&labeled.to_table()?, sensor, t_start, t_end)
}
