//! # Unify
//!
//! Merges resampled per-sensor series into one table on a shared grid.
//!
//! The row index is the union of every sensor's grid points. Inside a sensor's
//! own range its columns hold the (already forward-filled) resampled values;
//! outside it they hold `None`. Arrays with more components than the
//! configured ceiling are not expanded; they are kept aside for the
//! cross-shape comparator.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use sensor_core::config::UnifyConfig;
use sensor_core::{
    Dtype, PipelineConfig, Result, SchemaRegistry, SensorError, SensorSeries, Shape,
};

use crate::resample::{FillStats, ResampledSeries, Resampler, SensorFailure};

/// What a column holds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ColumnKind {
    /// A component of a sensor reading.
    Value,
    /// A derived digest of an array-valued sensor.
    Summary,
    /// An anomaly label.
    Label,
}

/// One numeric column. `None` means no data for that row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub sensor: String,
    pub dtype: Dtype,
    pub kind: ColumnKind,
    /// Infinite cells serialize as `"inf"`/`"-inf"`, missing cells as `null`.
    #[serde(with = "cells")]
    pub values: Vec<Option<f64>>,
}

/// JSON numbers cannot hold infinities, so non-finite cells travel as their
/// `f64` display strings.
mod cells {
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serialize, Serializer};

    #[derive(Serialize, Deserialize)]
    #[serde(untagged)]
    enum Cell {
        Number(f64),
        Text(String),
    }

    pub fn serialize<S: Serializer>(values: &[Option<f64>], serializer: S) -> Result<S::Ok, S::Error> {
        serializer.collect_seq(values.iter().map(|v| {
            v.map(|v| {
                if v.is_finite() {
                    Cell::Number(v)
                } else {
                    Cell::Text(v.to_string())
                }
            })
        }))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Vec<Option<f64>>, D::Error> {
        Vec::<Option<Cell>>::deserialize(deserializer)?
            .into_iter()
            .map(|cell| match cell {
                None => Ok(None),
                Some(Cell::Number(v)) => Ok(Some(v)),
                Some(Cell::Text(text)) => text
                    .parse::<f64>()
                    .map(Some)
                    .map_err(|_| D::Error::custom(format!("invalid cell value '{text}'"))),
            })
            .collect()
    }
}

impl Column {
    pub fn new(
        name: impl Into<String>,
        sensor: impl Into<String>,
        dtype: Dtype,
        kind: ColumnKind,
        values: Vec<Option<f64>>,
    ) -> Self {
        Self {
            name: name.into(),
            sensor: sensor.into(),
            dtype,
            kind,
            values,
        }
    }

    /// `(row, value)` for every present cell.
    pub fn present(&self) -> impl Iterator<Item = (usize, f64)> + '_ {
        self.values
            .iter()
            .enumerate()
            .filter_map(|(i, v)| v.map(|v| (i, v)))
    }

    pub fn present_values(&self) -> Vec<f64> {
        self.values.iter().flatten().copied().collect()
    }

    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Value and summary columns take part in statistics; labels do not.
    pub fn is_analyzable(&self) -> bool {
        self.kind != ColumnKind::Label
    }
}

/// Column names for a sensor of the given shape.
///
/// A single-component sensor keeps its own name; vectors get `<sensor>_<i>`,
/// 2-D arrays `<sensor>_<i>_<j>`.
pub fn column_names(sensor: &str, shape: &Shape) -> Vec<String> {
    match shape.dims() {
        [] => vec![sensor.to_string()],
        [1] => vec![sensor.to_string()],
        [n] => (0..*n).map(|i| format!("{sensor}_{i}")).collect(),
        [rows, cols] => (0..*rows)
            .flat_map(|i| (0..*cols).map(move |j| format!("{sensor}_{i}_{j}")))
            .collect(),
        _ => (0..shape.components())
            .map(|i| format!("{sensor}_{i}"))
            .collect(),
    }
}

/// Index-aligned table of every sensor's columns.
#[derive(Debug, Clone, PartialEq)]
pub struct UnifiedTable {
    interval: f64,
    times: Vec<f64>,
    columns: Vec<Column>,
    fill_stats: BTreeMap<String, FillStats>,
    routed: BTreeMap<String, ResampledSeries>,
}

impl UnifiedTable {
    /// A table with no rows or columns.
    pub fn empty(interval: f64) -> Self {
        Self {
            interval,
            times: Vec::new(),
            columns: Vec::new(),
            fill_stats: BTreeMap::new(),
            routed: BTreeMap::new(),
        }
    }

    /// Rebuilds a table from stored parts, checking that every column
    /// matches the row count and that column names are unique.
    pub fn from_parts(
        interval: f64,
        times: Vec<f64>,
        columns: Vec<Column>,
        fill_stats: BTreeMap<String, FillStats>,
    ) -> Result<Self> {
        if !(interval.is_finite() && interval > 0.0) {
            return Err(SensorError::invalid_config(format!(
                "table interval must be positive, got {interval}"
            )));
        }
        let mut table = Self::empty(interval);
        table.times = times;
        table.fill_stats = fill_stats;
        for column in columns {
            table.push_column(column)?;
        }
        Ok(table)
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn times(&self) -> &[f64] {
        &self.times
    }

    /// Row count.
    pub fn len(&self) -> usize {
        self.times.len()
    }

    pub fn is_empty(&self) -> bool {
        self.times.is_empty()
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn columns_for<'a>(&'a self, sensor: &'a str) -> impl Iterator<Item = &'a Column> + 'a {
        self.columns.iter().filter(move |c| c.sensor == sensor)
    }

    /// Every sensor with columns or a routed array series.
    pub fn sensors(&self) -> BTreeSet<&str> {
        self.columns
            .iter()
            .filter(|c| c.kind != ColumnKind::Label)
            .map(|c| c.sensor.as_str())
            .chain(self.routed.keys().map(String::as_str))
            .collect()
    }

    /// Fill statistics per contributing sensor.
    pub fn fill_stats(&self) -> &BTreeMap<String, FillStats> {
        &self.fill_stats
    }

    /// Array sensors excluded from direct columns.
    pub fn routed(&self) -> &BTreeMap<String, ResampledSeries> {
        &self.routed
    }

    /// Row whose grid time is within half an interval of `t`.
    pub fn row_of(&self, t: f64) -> Option<usize> {
        let tol = self.interval / 2.0;
        let i = self.times.partition_point(|x| *x < t - tol);
        self.times
            .get(i)
            .filter(|x| (**x - t).abs() <= tol)
            .map(|_| i)
    }

    /// Appends a column of the same length as the table.
    pub fn push_column(&mut self, column: Column) -> Result<()> {
        if column.values.len() != self.times.len() {
            return Err(SensorError::invalid_config(format!(
                "column '{}' has {} rows, table has {}",
                column.name,
                column.values.len(),
                self.times.len()
            )));
        }
        if let Some(existing) = self.column(&column.name) {
            return Err(SensorError::shape_conflict(
                column.name.clone(),
                existing.sensor.clone(),
                column.sensor,
            ));
        }
        self.columns.push(column);
        Ok(())
    }

    pub fn remove_column(&mut self, name: &str) -> Option<Column> {
        let index = self.columns.iter().position(|c| c.name == name)?;
        Some(self.columns.remove(index))
    }

    /// New table holding only the given rows and columns, in the given order.
    pub fn subset(&self, rows: &[usize], columns: &[usize]) -> UnifiedTable {
        let columns: Vec<Column> = columns
            .iter()
            .filter_map(|&c| self.columns.get(c))
            .map(|c| Column {
                values: rows.iter().map(|&r| c.values.get(r).copied().flatten()).collect(),
                ..c.clone()
            })
            .collect();
        let sensors: BTreeSet<&str> = columns.iter().map(|c| c.sensor.as_str()).collect();
        let fill_stats = self
            .fill_stats
            .iter()
            .filter(|(name, _)| sensors.contains(name.as_str()))
            .map(|(name, stats)| (name.clone(), *stats))
            .collect();
        UnifiedTable {
            interval: self.interval,
            times: rows.iter().filter_map(|&r| self.times.get(r).copied()).collect(),
            columns,
            fill_stats,
            routed: BTreeMap::new(),
        }
    }
}

/// A table plus the sensors that could not contribute to it.
#[derive(Debug, Clone, PartialEq)]
pub struct Unified {
    pub table: UnifiedTable,
    pub failures: Vec<SensorFailure>,
}

impl Unified {
    pub fn is_partial(&self) -> bool {
        !self.failures.is_empty()
    }
}

/// Builds a unified table from already resampled series.
///
/// The result does not depend on the order of `series`. Series whose start
/// times are not on a common phase are snapped to the grid anchored at the
/// earliest start.
pub fn unify_resampled<I>(series: I, config: &UnifyConfig) -> Result<UnifiedTable>
where
    I: IntoIterator<Item = ResampledSeries>,
{
    let mut series: Vec<ResampledSeries> = series.into_iter().collect();
    if series.is_empty() {
        return Err(SensorError::empty_input("no sensor series to unify"));
    }
    series.sort_by(|a, b| a.sensor().cmp(b.sensor()));
    for pair in series.windows(2) {
        if pair[0].sensor() == pair[1].sensor() {
            return Err(SensorError::shape_conflict(
                pair[0].sensor(),
                pair[0].sensor(),
                pair[1].sensor(),
            ));
        }
    }

    let interval = series[0].interval();
    for s in &series {
        if (s.interval() - interval).abs() > interval * 1e-9 {
            return Err(SensorError::interval_mismatch(s.sensor(), interval, s.interval()));
        }
    }

    let origin = series.iter().map(ResampledSeries::start).fold(f64::INFINITY, f64::min);
    let offsets: Vec<i64> = series
        .iter()
        .map(|s| ((s.start() - origin) / interval).round() as i64)
        .collect();
    let mut ticks: Vec<i64> = series
        .iter()
        .zip(&offsets)
        .flat_map(|(s, &offset)| offset..offset + s.len() as i64)
        .collect();
    ticks.sort_unstable();
    ticks.dedup();

    let mut table = UnifiedTable::empty(interval);
    table.times = ticks.iter().map(|&k| origin + k as f64 * interval).collect();
    let rows = table.times.len();

    let mut owners: HashMap<String, String> = HashMap::new();
    for (s, &offset) in series.into_iter().zip(&offsets) {
        table.fill_stats.insert(s.sensor().to_string(), s.stats());

        if s.shape().components() > config.max_expanded_components {
            debug!(
                sensor = s.sensor(),
                shape = %s.shape(),
                "array sensor routed to comparator"
            );
            table.routed.insert(s.sensor().to_string(), s);
            continue;
        }

        // Each series covers a contiguous tick range, so its rows are contiguous too.
        let first_row = ticks.binary_search(&offset).unwrap_or_else(|i| i);
        let names = column_names(s.sensor(), s.shape());
        let mut cells: Vec<Vec<Option<f64>>> = vec![vec![None; rows]; names.len()];
        for (i, reading) in s.values().iter().enumerate() {
            for (c, value) in reading.values().iter().enumerate() {
                // A NaN coordinate of a partially valid array reading.
                cells[c][first_row + i] = (!value.is_nan()).then_some(*value);
            }
        }

        for (name, values) in names.into_iter().zip(cells) {
            if let Some(previous) = owners.insert(name.clone(), s.sensor().to_string()) {
                return Err(SensorError::shape_conflict(name, previous, s.sensor()));
            }
            table.columns.push(Column::new(
                name,
                s.sensor(),
                s.dtype(),
                ColumnKind::Value,
                values,
            ));
        }
    }

    info!(
        rows,
        columns = table.columns.len(),
        routed = table.routed.len(),
        "unified sensor table"
    );
    Ok(table)
}

/// Resamples every raw series and unifies the ones that succeed.
///
/// Per-sensor failures are returned next to the partial table; only an empty
/// input or a column conflict fails the whole call.
pub fn unify<'a, I>(
    series: I,
    registry: &SchemaRegistry,
    config: &PipelineConfig,
) -> Result<Unified>
where
    I: IntoIterator<Item = &'a SensorSeries>,
{
    let series: Vec<&SensorSeries> = series.into_iter().collect();
    if series.is_empty() {
        return Err(SensorError::empty_input("no sensor series to unify"));
    }
    let resampler = Resampler::from_config(&config.resample)?;
    let (resampled, failures) = resampler.resample_all(series, registry);
    assemble(resampled, failures, resampler.interval(), &config.unify)
}

pub(crate) fn assemble(
    resampled: Vec<ResampledSeries>,
    failures: Vec<SensorFailure>,
    interval: f64,
    config: &UnifyConfig,
) -> Result<Unified> {
    let table = if resampled.is_empty() {
        UnifiedTable::empty(interval)
    } else {
        unify_resampled(resampled, config)?
    };
    if !failures.is_empty() {
        warn!(
            failed = failures.len(),
            succeeded = table.fill_stats().len(),
            "partial table: some sensors failed to resample"
        );
    }
    Ok(Unified { table, failures })
}
