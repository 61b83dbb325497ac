//! Pearson correlation between table columns.
//!
//! Only value and summary columns take part. Raw array sensors reach this
//! module through their summary columns.

use serde::{Deserialize, Serialize};
use tracing::info;

use sensor_core::config::CorrelateConfig;
use sensor_core::stats::pearson;
use sensor_core::{Result, SensorError};
use sensor_sync::{Column, UnifiedTable};

/// Symmetric matrix of pairwise-complete Pearson coefficients.
///
/// `None` marks a pair with fewer than two shared rows or no variance.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationMatrix {
    pub columns: Vec<String>,
    pub sensors: Vec<String>,
    pub values: Vec<Vec<Option<f64>>>,
}

impl CorrelationMatrix {
    pub fn of(table: &UnifiedTable) -> Self {
        let columns: Vec<&Column> = table
            .columns()
            .iter()
            .filter(|c| c.is_analyzable())
            .collect();
        let n = columns.len();
        let mut values = vec![vec![None; n]; n];
        for i in 0..n {
            for j in i..n {
                let r = pairwise_pearson(columns[i], columns[j]);
                values[i][j] = r;
                values[j][i] = r;
            }
        }
        Self {
            columns: columns.iter().map(|c| c.name.clone()).collect(),
            sensors: columns.iter().map(|c| c.sensor.clone()).collect(),
            values,
        }
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, a: &str, b: &str) -> Option<f64> {
        let i = self.columns.iter().position(|c| c == a)?;
        let j = self.columns.iter().position(|c| c == b)?;
        self.values[i][j]
    }

    /// Every off-diagonal pair `(i, j, r)` with `i < j` and a defined `r`.
    fn pairs(&self) -> impl Iterator<Item = (usize, usize, f64)> + '_ {
        (0..self.len()).flat_map(move |i| {
            (i + 1..self.len()).filter_map(move |j| self.values[i][j].map(|r| (i, j, r)))
        })
    }
}

fn pairwise_pearson(a: &Column, b: &Column) -> Option<f64> {
    let (xs, ys): (Vec<f64>, Vec<f64>) = a
        .values
        .iter()
        .zip(&b.values)
        .filter_map(|(x, y)| match (x, y) {
            (Some(x), Some(y)) if x.is_finite() && y.is_finite() => Some((*x, *y)),
            _ => None,
        })
        .unzip();
    pearson(&xs, &ys)
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelatedPair {
    pub a: String,
    pub b: String,
    pub r: f64,
}

/// A sensor nearly duplicated by another sensor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RedundantSensor {
    pub sensor: String,
    pub duplicate_of: String,
    pub r: f64,
}

/// A column that tracks an actuator column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Predictor {
    pub column: String,
    pub actuator: String,
    pub r: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CorrelationReport {
    pub matrix: CorrelationMatrix,
    /// Pairs above the strong threshold, strongest first.
    pub strong: Vec<CorrelatedPair>,
    pub redundant: Vec<RedundantSensor>,
    pub predictors: Vec<Predictor>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Correlator {
    config: CorrelateConfig,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new(CorrelateConfig::default())
    }
}

impl Correlator {
    pub fn new(config: CorrelateConfig) -> Self {
        Self { config }
    }

    pub fn analyze(&self, table: &UnifiedTable) -> Result<CorrelationReport> {
        let matrix = CorrelationMatrix::of(table);
        if matrix.is_empty() {
            return Err(SensorError::empty_input("table has no numeric columns to correlate"));
        }

        let mut strong: Vec<CorrelatedPair> = matrix
            .pairs()
            .filter(|(_, _, r)| r.abs() > self.config.strong)
            .map(|(i, j, r)| CorrelatedPair {
                a: matrix.columns[i].clone(),
                b: matrix.columns[j].clone(),
                r,
            })
            .collect();
        strong.sort_by(|x, y| y.r.abs().total_cmp(&x.r.abs()));

        let redundant = self.redundant_sensors(&matrix);
        let predictors = self.predictors(&matrix);

        info!(
            columns = matrix.len(),
            strong = strong.len(),
            redundant = redundant.len(),
            predictors = predictors.len(),
            "correlation analysis"
        );
        Ok(CorrelationReport {
            matrix,
            strong,
            redundant,
            predictors,
        })
    }

    /// For each sensor, its strongest cross-sensor correlation if above the
    /// redundancy threshold.
    fn redundant_sensors(&self, matrix: &CorrelationMatrix) -> Vec<RedundantSensor> {
        let mut sensors: Vec<&String> = matrix.sensors.iter().collect();
        sensors.sort();
        sensors.dedup();

        sensors
            .into_iter()
            .filter_map(|sensor| {
                matrix
                    .pairs()
                    .flat_map(|(i, j, r)| [(i, j, r), (j, i, r)])
                    .filter(|(i, j, _)| {
                        &matrix.sensors[*i] == sensor && &matrix.sensors[*j] != sensor
                    })
                    .max_by(|x, y| x.2.abs().total_cmp(&y.2.abs()))
                    .filter(|(_, _, r)| r.abs() > self.config.redundant)
                    .map(|(_, j, r)| RedundantSensor {
                        sensor: sensor.clone(),
                        duplicate_of: matrix.sensors[j].clone(),
                        r,
                    })
            })
            .collect()
    }

    fn predictors(&self, matrix: &CorrelationMatrix) -> Vec<Predictor> {
        let marker = self.config.actuator_marker.as_str();
        let is_actuator = |i: usize| !marker.is_empty() && matrix.sensors[i].contains(marker);
        matrix
            .pairs()
            .flat_map(|(i, j, r)| [(i, j, r), (j, i, r)])
            .filter(|(column, actuator, r)| {
                is_actuator(*actuator) && !is_actuator(*column) && r.abs() > self.config.predictive
            })
            .map(|(column, actuator, r)| Predictor {
                column: matrix.columns[column].clone(),
                actuator: matrix.columns[actuator].clone(),
                r,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use sensor_core::Dtype;
    use sensor_sync::ColumnKind;

    fn table(columns: &[(&str, &str, Vec<Option<f64>>)]) -> UnifiedTable {
        let len = columns[0].2.len();
        let times = (0..len).map(|i| i as f64 * 0.016).collect();
        let columns = columns
            .iter()
            .map(|(name, sensor, values)| {
                Column::new(*name, *sensor, Dtype::Float, ColumnKind::Value, values.clone())
            })
            .collect();
        UnifiedTable::from_parts(0.016, times, columns, Default::default()).unwrap()
    }

    fn some(values: &[f64]) -> Vec<Option<f64>> {
        values.iter().copied().map(Some).collect()
    }

    #[test]
    fn matrix_is_symmetric_with_unit_diagonal() {
        let t = table(&[
            ("a", "a", some(&[1.0, 2.0, 3.0, 4.0])),
            ("b", "b", some(&[2.0, 1.0, 4.0, 3.0])),
        ]);
        let m = CorrelationMatrix::of(&t);
        assert_relative_eq!(m.get("a", "a").unwrap(), 1.0, epsilon = 1e-12);
        assert_eq!(m.get("a", "b"), m.get("b", "a"));
        assert_relative_eq!(m.get("a", "b").unwrap(), 0.6, epsilon = 1e-12);
    }

    #[test]
    fn uses_pairwise_complete_rows() {
        let t = table(&[
            ("a", "a", vec![Some(1.0), Some(2.0), None, Some(4.0)]),
            ("b", "b", vec![Some(2.0), Some(4.0), Some(100.0), Some(8.0)]),
        ]);
        let m = CorrelationMatrix::of(&t);
        assert_relative_eq!(m.get("a", "b").unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn constant_column_has_no_coefficient() {
        let t = table(&[
            ("a", "a", some(&[1.0, 2.0, 3.0])),
            ("c", "c", some(&[5.0, 5.0, 5.0])),
        ]);
        assert_eq!(CorrelationMatrix::of(&t).get("a", "c"), None);
    }

    #[test]
    fn report_finds_strong_redundant_and_predictors() {
        let t = table(&[
            ("wheel_actuator", "wheel_actuator", some(&[0.0, 1.0, 2.0, 3.0, 4.0])),
            ("encoder", "encoder", some(&[0.1, 1.1, 2.0, 3.2, 3.9])),
            ("odometer", "odometer", some(&[0.2, 2.2, 4.0, 6.4, 7.8])),
            ("noise", "noise", some(&[1.0, -1.0, 1.0, -1.0, 1.0])),
        ]);
        let report = Correlator::default().analyze(&t).unwrap();

        assert!(report.strong.len() >= 3);
        assert!(report.strong.windows(2).all(|w| w[0].r.abs() >= w[1].r.abs()));
        assert!(report.redundant.iter().any(|r| r.sensor == "encoder"));
        assert!(report.redundant.iter().all(|r| r.sensor != "noise"));
        let predicted: Vec<&str> = report.predictors.iter().map(|p| p.column.as_str()).collect();
        assert!(predicted.contains(&"encoder"));
        assert!(predicted.contains(&"odometer"));
        assert!(!predicted.contains(&"noise"));
        assert!(report.predictors.iter().all(|p| p.actuator == "wheel_actuator"));
    }

    #[test]
    fn columns_of_the_same_sensor_are_not_redundant() {
        let t = table(&[
            ("accel_0", "accel", some(&[1.0, 2.0, 3.0])),
            ("accel_1", "accel", some(&[2.0, 4.0, 6.0])),
        ]);
        let report = Correlator::default().analyze(&t).unwrap();
        assert_eq!(report.strong.len(), 1);
        assert!(report.redundant.is_empty());
    }

    #[test]
    fn no_columns_is_empty_input() {
        let t = UnifiedTable::empty(0.016);
        assert!(matches!(
            Correlator::default().analyze(&t),
            Err(SensorError::EmptyInput(_))
        ));
    }
}
