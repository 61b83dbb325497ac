//! # Summary
//!
//! Fixed-size digests of variable-shape readings.
//!
//! An array reading is treated as a cloud of points: a `(N, D)` array is N
//! points in D dimensions, a vector is N one-dimensional points and a scalar a
//! single point. Each row is reduced to its mean, spread, centroid and the
//! centroid's projection on the dominant principal axis.
//!
//! This reduction is lossy. Per-point spatial and angular detail (which beam
//! hit what, local structure inside the cloud) is discarded; only the
//! moments above survive. Downstream correlation works on these digests and
//! never on raw arrays, so that loss is confined to this module.

use nalgebra::{DMatrix, DVector, SymmetricEigen};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sensor_core::config::SummaryConfig;
use sensor_core::stats::{mean, population_std};
use sensor_core::{Dtype, Reading, Result, SensorError, Shape};
use sensor_sync::{Column, ColumnKind, ResampledSeries, SensorFailure, UnifiedTable};

/// Digest of one array-valued reading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryVector {
    pub sim_time: f64,
    /// Mean over every coordinate of the valid points.
    pub mean: f64,
    /// Population standard deviation over the same coordinates.
    pub std: f64,
    pub centroid: Vec<f64>,
    /// Centroid projected on the dominant eigenvector of the point covariance.
    pub principal_projection: f64,
    /// Square root of the largest covariance eigenvalue.
    pub principal_spread: f64,
    pub far_count: usize,
    pub dropped_points: usize,
    pub valid_points: usize,
}

impl SummaryVector {
    /// Values in the order of [`summary_column_names`].
    pub fn column_values(&self) -> Vec<f64> {
        let mut values = vec![
            self.mean,
            self.std,
            self.principal_projection,
            self.principal_spread,
            self.far_count as f64,
        ];
        values.extend_from_slice(&self.centroid);
        values
    }

    fn empty(sim_time: f64, dim: usize, dropped_points: usize) -> Self {
        Self {
            sim_time,
            mean: f64::NAN,
            std: f64::NAN,
            centroid: vec![f64::NAN; dim],
            principal_projection: f64::NAN,
            principal_spread: f64::NAN,
            far_count: 0,
            dropped_points,
            valid_points: 0,
        }
    }
}

/// Summary column names for a sensor whose points have `dim` coordinates.
pub fn summary_column_names(sensor: &str, dim: usize) -> Vec<String> {
    let mut names: Vec<String> = ["mean", "std", "pc1", "spread", "far"]
        .iter()
        .map(|field| format!("{sensor}_{field}"))
        .collect();
    names.extend((0..dim).map(|d| format!("{sensor}_centroid_{d}")));
    names
}

/// Reduces array readings to [`SummaryVector`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct CrossShapeComparator {
    max_dims: usize,
    far_threshold: Option<f64>,
}

impl Default for CrossShapeComparator {
    fn default() -> Self {
        Self::from_config(&SummaryConfig::default())
    }
}

impl CrossShapeComparator {
    pub fn new(max_dims: usize, far_threshold: Option<f64>) -> Self {
        Self {
            max_dims,
            far_threshold,
        }
    }

    pub fn from_config(config: &SummaryConfig) -> Self {
        Self::new(config.max_dims, config.far_threshold)
    }

    /// Point dimension for a sensor shape.
    pub fn point_dim(&self, sensor: &str, shape: &Shape) -> Result<usize> {
        if shape.ndim() > self.max_dims {
            return Err(SensorError::shape_unsupported(sensor, shape.clone(), self.max_dims));
        }
        Ok(match shape.dims() {
            [] | [_] => 1,
            [.., last] => *last,
        })
    }

    /// One summary per grid point. Forward-filled points reuse the summary of
    /// the observation they repeat.
    pub fn summarize(&self, series: &ResampledSeries) -> Result<Vec<SummaryVector>> {
        let dim = self.point_dim(series.sensor(), series.shape())?;
        let mut out: Vec<SummaryVector> = Vec::with_capacity(series.len());
        for (t, reading, observed) in series.iter() {
            let summary = match out.last() {
                Some(previous) if !observed => SummaryVector {
                    sim_time: t,
                    ..previous.clone()
                },
                _ => self.summarize_reading(t, reading, dim),
            };
            out.push(summary);
        }
        let dropped: usize = out.iter().map(|s| s.dropped_points).sum();
        if dropped > 0 {
            warn!(sensor = series.sensor(), dropped, "non-finite points skipped");
        }
        debug!(sensor = series.sensor(), rows = out.len(), dim, "summarized array sensor");
        Ok(out)
    }

    /// Digest of a single reading whose points have `dim` coordinates.
    pub fn summarize_reading(&self, sim_time: f64, reading: &Reading, dim: usize) -> SummaryVector {
        if dim == 0 {
            return SummaryVector::empty(sim_time, 0, 0);
        }
        let mut valid: Vec<&[f64]> = Vec::new();
        let mut dropped = 0usize;
        for point in reading.values().chunks_exact(dim) {
            if point.iter().all(|v| v.is_finite()) {
                valid.push(point);
            } else {
                dropped += 1;
            }
        }
        if valid.is_empty() {
            return SummaryVector::empty(sim_time, dim, dropped);
        }

        let n = valid.len() as f64;
        let coords: Vec<f64> = valid.iter().flat_map(|p| p.iter().copied()).collect();

        let mut centroid = DVector::<f64>::zeros(dim);
        for point in &valid {
            centroid += DVector::from_column_slice(point);
        }
        centroid /= n;

        let mut covariance = DMatrix::<f64>::zeros(dim, dim);
        for point in &valid {
            let d = DVector::from_column_slice(point) - &centroid;
            covariance += &d * d.transpose();
        }
        covariance /= n;

        let eigen = SymmetricEigen::new(covariance);
        let (axis_index, largest) = eigen
            .eigenvalues
            .iter()
            .copied()
            .enumerate()
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .unwrap_or((0, 0.0));
        let mut axis = eigen.eigenvectors.column(axis_index).into_owned();
        let pivot = axis
            .iter()
            .copied()
            .max_by(|a, b| a.abs().total_cmp(&b.abs()))
            .unwrap_or(0.0);
        if pivot < 0.0 {
            axis = -axis;
        }

        let far_count = self.far_threshold.map_or(0, |threshold| {
            valid
                .iter()
                .filter(|p| p.iter().map(|v| v * v).sum::<f64>().sqrt() > threshold)
                .count()
        });

        SummaryVector {
            sim_time,
            mean: mean(&coords).unwrap_or(f64::NAN),
            std: population_std(&coords).unwrap_or(f64::NAN),
            principal_projection: centroid.dot(&axis),
            principal_spread: largest.max(0.0).sqrt(),
            centroid: centroid.iter().copied().collect(),
            far_count,
            dropped_points: dropped,
            valid_points: valid.len(),
        }
    }

    /// Adds `series`' summary columns to `table`, aligned on grid time.
    /// Returns the number of columns added.
    pub fn attach(&self, table: &mut UnifiedTable, series: &ResampledSeries) -> Result<usize> {
        let summaries = self.summarize(series)?;
        let dim = self.point_dim(series.sensor(), series.shape())?;
        let names = summary_column_names(series.sensor(), dim);
        let mut cells = vec![vec![None; table.len()]; names.len()];
        for summary in &summaries {
            let Some(row) = table.row_of(summary.sim_time) else {
                continue;
            };
            for (column, value) in cells.iter_mut().zip(summary.column_values()) {
                column[row] = Some(value).filter(|v| !v.is_nan());
            }
        }
        let added = names.len();
        for (name, values) in names.into_iter().zip(cells) {
            let dtype = if name.ends_with("_far") {
                Dtype::Int
            } else {
                Dtype::Float
            };
            table.push_column(Column::new(
                name,
                series.sensor(),
                dtype,
                ColumnKind::Summary,
                values,
            ))?;
        }
        Ok(added)
    }

    /// Attaches summaries for every routed array sensor of `table`.
    ///
    /// Sensors the comparator cannot reduce are returned as failures; the
    /// others are attached.
    pub fn attach_routed(&self, table: &mut UnifiedTable) -> Result<Vec<SensorFailure>> {
        let routed: Vec<ResampledSeries> = table.routed().values().cloned().collect();
        let mut failures = Vec::new();
        for series in &routed {
            match self.attach(table, series) {
                Ok(_) => {}
                Err(error @ SensorError::ShapeUnsupported { .. }) => {
                    warn!(sensor = series.sensor(), error = %error, "array sensor not summarized");
                    failures.push(SensorFailure {
                        sensor: series.sensor().to_string(),
                        error,
                    });
                }
                Err(other) => return Err(other),
            }
        }
        Ok(failures)
    }
}

/// Summaries of `series` with the default comparator.
pub fn summarize(series: &ResampledSeries) -> Result<Vec<SummaryVector>> {
    CrossShapeComparator::default().summarize(series)
}
