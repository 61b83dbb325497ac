//! # Sensor Core
//!
//! This crate provides the core data structures for sensor time-series alignment.
//! It defines the `SensorObservation` trait, a generic interface for one sensor reading
//! on the shared simulation clock, the concrete `Observation` struct, and the
//! per-sensor `SensorSeries` built from them.
//! It also holds the schema registry, pipeline configuration, error type and the
//! statistics primitives used by the later stages.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

pub mod config;
pub mod error;
pub mod schema;
pub mod stats;

pub use config::PipelineConfig;
pub use error::{Result, SensorError};
pub use schema::{SchemaRegistry, SensorSchema};

/// Dimensions of one reading. An empty dim list is a scalar.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Shape(Vec<usize>);

impl Shape {
    pub fn new(dims: Vec<usize>) -> Self {
        Self(dims)
    }

    pub fn scalar() -> Self {
        Self(Vec::new())
    }

    pub fn vector(len: usize) -> Self {
        Self(vec![len])
    }

    pub fn dims(&self) -> &[usize] {
        &self.0
    }

    pub fn ndim(&self) -> usize {
        self.0.len()
    }

    /// Number of numeric components in one reading of this shape.
    pub fn components(&self) -> usize {
        self.0.iter().product()
    }

    pub fn is_scalar(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for Shape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.0.as_slice() {
            [] => write!(f, "()"),
            [n] => write!(f, "({n},)"),
            dims => {
                let parts: Vec<String> = dims.iter().map(ToString::to_string).collect();
                write!(f, "({})", parts.join(", "))
            }
        }
    }
}

/// Declared numeric type of a sensor. Values are always carried as `f64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Dtype {
    #[default]
    Float,
    Int,
}

impl fmt::Display for Dtype {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Dtype::Float => write!(f, "float"),
            Dtype::Int => write!(f, "int"),
        }
    }
}

/// One reading: shape plus a flat row-major buffer.
///
/// The buffer is shared, so forward-filling a large array onto many grid
/// points does not copy it. A NaN component marks a value that failed numeric
/// coercion (see [`Reading::is_missing`]). Infinities are ordinary values.
#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    shape: Shape,
    data: Arc<[f64]>,
}

impl Reading {
    pub fn scalar(value: f64) -> Self {
        Self {
            shape: Shape::scalar(),
            data: Arc::from(vec![value]),
        }
    }

    pub fn vector(values: Vec<f64>) -> Self {
        Self {
            shape: Shape::vector(values.len()),
            data: Arc::from(values),
        }
    }

    /// Builds an array reading, checking the buffer against the shape.
    pub fn array(shape: Shape, data: Vec<f64>) -> Result<Self> {
        if shape.components() != data.len() {
            return Err(SensorError::invalid_config(format!(
                "reading of shape {shape} needs {} values, got {}",
                shape.components(),
                data.len()
            )));
        }
        Ok(Self {
            shape,
            data: Arc::from(data),
        })
    }

    /// A missing reading of the given shape (every component NaN).
    pub fn missing(shape: Shape) -> Self {
        let len = shape.components();
        Self {
            shape,
            data: Arc::from(vec![f64::NAN; len]),
        }
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn values(&self) -> &[f64] {
        &self.data
    }

    /// A scalar or vector is missing when any component is NaN. A 2-D or
    /// higher array is a cloud of points along its last dim and is missing
    /// only when every point has a NaN coordinate.
    pub fn is_missing(&self) -> bool {
        match self.shape.dims() {
            [_, .., dim] if *dim > 0 && !self.data.is_empty() => self
                .data
                .chunks_exact(*dim)
                .all(|point| point.iter().any(|v| v.is_nan())),
            _ => self.data.iter().any(|v| v.is_nan()),
        }
    }

    /// True when both readings share the same buffer.
    pub fn shares_buffer(&self, other: &Reading) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

/// A timestamped reading.
#[derive(Debug, Clone, PartialEq)]
pub struct Sample {
    pub sim_time: f64,
    pub reading: Reading,
}

impl Sample {
    pub fn new(sim_time: f64, reading: Reading) -> Self {
        Self { sim_time, reading }
    }
}

/// One sensor's raw readings, strictly increasing in sim time.
///
/// Immutable once built; gaps of any size are allowed.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorSeries {
    name: String,
    samples: Vec<Sample>,
}

impl SensorSeries {
    /// Builds a series, rejecting non-finite or non-increasing timestamps.
    pub fn new(name: impl Into<String>, samples: Vec<Sample>) -> Result<Self> {
        let name = name.into();
        for (index, pair) in samples.windows(2).enumerate() {
            if !(pair[1].sim_time > pair[0].sim_time) {
                return Err(SensorError::non_monotonic(
                    name,
                    index + 1,
                    pair[0].sim_time,
                    pair[1].sim_time,
                ));
            }
        }
        if let Some(first) = samples.first() {
            if !first.sim_time.is_finite() {
                return Err(SensorError::non_monotonic(name, 0, f64::NAN, first.sim_time));
            }
        }
        if let Some(last) = samples.last() {
            if !last.sim_time.is_finite() {
                return Err(SensorError::non_monotonic(
                    name,
                    samples.len() - 1,
                    f64::NAN,
                    last.sim_time,
                ));
            }
        }
        Ok(Self { name, samples })
    }

    /// Convenience constructor for scalar series.
    pub fn from_scalars(name: impl Into<String>, points: &[(f64, f64)]) -> Result<Self> {
        let samples = points
            .iter()
            .map(|&(t, v)| Sample::new(t, Reading::scalar(v)))
            .collect();
        Self::new(name, samples)
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// `(first, last)` timestamps, `None` for an empty series.
    pub fn time_range(&self) -> Option<(f64, f64)> {
        let first = self.samples.first()?;
        let last = self.samples.last()?;
        Some((first.sim_time, last.sim_time))
    }
}

/// A reading from one sensor on the shared simulation clock.
pub trait SensorObservation {
    fn sensor_id(&self) -> &str;
    fn sim_time(&self) -> f64;
    fn reading(&self) -> &Reading;
}

/// A concrete implementation of `SensorObservation`.
#[derive(Debug, Clone, PartialEq)]
pub struct Observation {
    pub sensor_id: String,
    pub sim_time: f64,
    pub reading: Reading,
}

impl SensorObservation for Observation {
    fn sensor_id(&self) -> &str {
        &self.sensor_id
    }

    fn sim_time(&self) -> f64 {
        self.sim_time
    }

    fn reading(&self) -> &Reading {
        &self.reading
    }
}

/// Splits a mixed observation stream into per-sensor series.
///
/// Each sensor's observations must already be in increasing time order.
pub fn group_observations<O, I>(observations: I) -> Result<BTreeMap<String, SensorSeries>>
where
    O: SensorObservation,
    I: IntoIterator<Item = O>,
{
    let mut grouped: BTreeMap<String, Vec<Sample>> = BTreeMap::new();
    for obs in observations {
        grouped
            .entry(obs.sensor_id().to_string())
            .or_default()
            .push(Sample::new(obs.sim_time(), obs.reading().clone()));
    }
    grouped
        .into_iter()
        .map(|(name, samples)| SensorSeries::new(name.clone(), samples).map(|s| (name, s)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn observation_trait_impl_works() {
        let obs = Observation {
            sensor_id: "compass".to_string(),
            sim_time: 12.048,
            reading: Reading::vector(vec![0.1, 0.2, 0.3]),
        };

        assert_eq!(obs.sensor_id(), "compass");
        assert_eq!(obs.sim_time(), 12.048);
        assert_eq!(obs.reading().values(), &[0.1, 0.2, 0.3]);
        assert_eq!(obs.reading().shape(), &Shape::vector(3));
    }

    #[test]
    fn shape_display_and_components() {
        assert_eq!(Shape::scalar().to_string(), "()");
        assert_eq!(Shape::vector(3).to_string(), "(3,)");
        assert_eq!(Shape::new(vec![2048, 3]).to_string(), "(2048, 3)");
        assert_eq!(Shape::scalar().components(), 1);
        assert_eq!(Shape::new(vec![2048, 3]).components(), 6144);
    }

    #[test]
    fn array_reading_checks_length() {
        assert!(Reading::array(Shape::new(vec![2, 3]), vec![0.0; 6]).is_ok());
        assert!(Reading::array(Shape::new(vec![2, 3]), vec![0.0; 5]).is_err());
    }

    #[test]
    fn nan_marks_reading_missing_but_infinity_does_not() {
        assert!(Reading::scalar(f64::NAN).is_missing());
        assert!(Reading::missing(Shape::vector(3)).is_missing());
        assert!(!Reading::vector(vec![1.0, f64::INFINITY]).is_missing());
        assert!(Reading::vector(vec![1.0, f64::NAN]).is_missing());
    }

    #[test]
    fn point_cloud_is_missing_only_when_every_point_is() {
        let cloud = Shape::new(vec![3, 2]);
        let one_bad_beam =
            Reading::array(cloud.clone(), vec![1.0, 2.0, f64::NAN, 4.0, 5.0, 6.0]).unwrap();
        assert!(!one_bad_beam.is_missing());

        let all_bad =
            Reading::array(cloud.clone(), vec![f64::NAN, 2.0, 3.0, f64::NAN, f64::NAN, 6.0])
                .unwrap();
        assert!(all_bad.is_missing());
        assert!(Reading::missing(cloud).is_missing());
        assert!(!Reading::array(Shape::new(vec![0, 3]), Vec::new()).unwrap().is_missing());
    }

    #[test]
    fn series_rejects_non_increasing_timestamps() {
        let err = SensorSeries::from_scalars("encoder", &[(1.0, 0.0), (1.0, 1.0)]).unwrap_err();
        assert!(matches!(err, SensorError::NonMonotonic { index: 1, .. }));

        let err = SensorSeries::from_scalars("encoder", &[(1.0, 0.0), (0.5, 1.0)]).unwrap_err();
        assert!(matches!(err, SensorError::NonMonotonic { .. }));
    }

    #[test]
    fn series_rejects_non_finite_timestamps() {
        assert!(SensorSeries::from_scalars("gps", &[(f64::NAN, 0.0)]).is_err());
        assert!(SensorSeries::from_scalars("gps", &[(0.0, 0.0), (f64::INFINITY, 1.0)]).is_err());
    }

    #[test]
    fn empty_series_is_allowed() {
        let series = SensorSeries::new("gps", Vec::new()).unwrap();
        assert!(series.is_empty());
        assert_eq!(series.time_range(), None);
    }

    #[test]
    fn group_observations_splits_by_sensor() {
        let stream = vec![
            Observation {
                sensor_id: "a".into(),
                sim_time: 0.0,
                reading: Reading::scalar(1.0),
            },
            Observation {
                sensor_id: "b".into(),
                sim_time: 0.008,
                reading: Reading::scalar(5.0),
            },
            Observation {
                sensor_id: "a".into(),
                sim_time: 0.016,
                reading: Reading::scalar(2.0),
            },
        ];
        let grouped = group_observations(stream).unwrap();
        assert_eq!(grouped.len(), 2);
        assert_eq!(grouped["a"].len(), 2);
        assert_eq!(grouped["b"].time_range(), Some((0.008, 0.008)));
    }
}
