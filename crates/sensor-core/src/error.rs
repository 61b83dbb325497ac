//! Error types shared by every stage of the alignment pipeline.

use thiserror::Error;

use crate::Shape;

/// Errors raised while resampling, unifying, labeling or querying sensor data.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum SensorError {
    /// A series cannot seed its grid (empty, or first grid point unobserved).
    #[error("insufficient data for sensor '{sensor}' at interval {interval}s: {reason}")]
    InsufficientData {
        sensor: String,
        interval: f64,
        reason: String,
    },

    /// An observed reading disagrees with the registered shape.
    #[error(
        "schema mismatch for sensor '{sensor}' at interval {interval}s: expected shape {expected}, detected {detected} at t={sim_time}"
    )]
    SchemaMismatch {
        sensor: String,
        interval: f64,
        expected: Shape,
        detected: Shape,
        sim_time: f64,
    },

    /// Two sensors claim the same column.
    #[error("column '{column}' claimed by both '{first}' and '{second}'")]
    ShapeConflict {
        column: String,
        first: String,
        second: String,
    },

    /// Nothing to work on.
    #[error("empty input: {0}")]
    EmptyInput(String),

    /// Too few present values to compute a standard deviation.
    #[error(
        "insufficient samples in column '{column}' of sensor '{sensor}': found {found}, need at least {required}"
    )]
    InsufficientSamples {
        sensor: String,
        column: String,
        found: usize,
        required: usize,
    },

    /// A time range with start after end (or non-finite bounds).
    #[error("invalid range{}: start {start} is after end {end}", sensor_clause(.sensor))]
    InvalidRange {
        sensor: Option<String>,
        start: f64,
        end: f64,
    },

    /// An array reading with more dimensions than the comparator accepts.
    #[error("sensor '{sensor}' has unsupported shape {shape}: {dims} dims, at most {max} supported")]
    ShapeUnsupported {
        sensor: String,
        shape: Shape,
        dims: usize,
        max: usize,
    },

    /// The raw sample source could not supply a series.
    #[error("source unavailable for '{target}': {reason}")]
    SourceUnavailable { target: String, reason: String },

    /// A sensor with no Schema Registry entry.
    #[error("sensor '{sensor}' is not registered in the schema registry")]
    UnknownSensor { sensor: String },

    /// Timestamps that are not strictly increasing.
    #[error(
        "sensor '{sensor}' timestamps not strictly increasing at sample {index}: {previous} then {current}"
    )]
    NonMonotonic {
        sensor: String,
        index: usize,
        previous: f64,
        current: f64,
    },

    /// A resampled series whose interval differs from the table interval.
    #[error("sensor '{sensor}' resampled at {found}s, table interval is {expected}s")]
    IntervalMismatch {
        sensor: String,
        expected: f64,
        found: f64,
    },

    /// Invalid configuration value.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl SensorError {
    /// Creates an insufficient data error.
    #[must_use]
    pub fn insufficient_data(
        sensor: impl Into<String>,
        interval: f64,
        reason: impl Into<String>,
    ) -> Self {
        Self::InsufficientData {
            sensor: sensor.into(),
            interval,
            reason: reason.into(),
        }
    }

    /// Creates a schema mismatch error.
    #[must_use]
    pub fn schema_mismatch(
        sensor: impl Into<String>,
        interval: f64,
        expected: Shape,
        detected: Shape,
        sim_time: f64,
    ) -> Self {
        Self::SchemaMismatch {
            sensor: sensor.into(),
            interval,
            expected,
            detected,
            sim_time,
        }
    }

    /// Creates a shape conflict error.
    #[must_use]
    pub fn shape_conflict(
        column: impl Into<String>,
        first: impl Into<String>,
        second: impl Into<String>,
    ) -> Self {
        Self::ShapeConflict {
            column: column.into(),
            first: first.into(),
            second: second.into(),
        }
    }

    /// Creates an empty input error.
    #[must_use]
    pub fn empty_input(what: impl Into<String>) -> Self {
        Self::EmptyInput(what.into())
    }

    /// Creates an insufficient samples error.
    #[must_use]
    pub fn insufficient_samples(
        sensor: impl Into<String>,
        column: impl Into<String>,
        found: usize,
        required: usize,
    ) -> Self {
        Self::InsufficientSamples {
            sensor: sensor.into(),
            column: column.into(),
            found,
            required,
        }
    }

    /// Creates an invalid range error.
    #[must_use]
    pub const fn invalid_range(start: f64, end: f64) -> Self {
        Self::InvalidRange {
            sensor: None,
            start,
            end,
        }
    }

    /// Creates an invalid range error for a query on one sensor.
    #[must_use]
    pub fn invalid_sensor_range(sensor: impl Into<String>, start: f64, end: f64) -> Self {
        Self::InvalidRange {
            sensor: Some(sensor.into()),
            start,
            end,
        }
    }

    /// Creates a shape unsupported error.
    #[must_use]
    pub fn shape_unsupported(sensor: impl Into<String>, shape: Shape, max: usize) -> Self {
        Self::ShapeUnsupported {
            sensor: sensor.into(),
            dims: shape.ndim(),
            shape,
            max,
        }
    }

    /// Creates a source unavailable error.
    #[must_use]
    pub fn source_unavailable(target: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::SourceUnavailable {
            target: target.into(),
            reason: reason.into(),
        }
    }

    /// Creates an unknown sensor error.
    #[must_use]
    pub fn unknown_sensor(sensor: impl Into<String>) -> Self {
        Self::UnknownSensor {
            sensor: sensor.into(),
        }
    }

    /// Creates a non-monotonic timestamp error.
    #[must_use]
    pub fn non_monotonic(sensor: impl Into<String>, index: usize, previous: f64, current: f64) -> Self {
        Self::NonMonotonic {
            sensor: sensor.into(),
            index,
            previous,
            current,
        }
    }

    /// Creates an interval mismatch error.
    #[must_use]
    pub fn interval_mismatch(sensor: impl Into<String>, expected: f64, found: f64) -> Self {
        Self::IntervalMismatch {
            sensor: sensor.into(),
            expected,
            found,
        }
    }

    /// Creates an invalid configuration error.
    #[must_use]
    pub fn invalid_config(reason: impl Into<String>) -> Self {
        Self::InvalidConfig(reason.into())
    }

    /// The sensor this error concerns, if any.
    #[must_use]
    pub fn sensor(&self) -> Option<&str> {
        match self {
            Self::InsufficientData { sensor, .. }
            | Self::SchemaMismatch { sensor, .. }
            | Self::ShapeUnsupported { sensor, .. }
            | Self::UnknownSensor { sensor }
            | Self::NonMonotonic { sensor, .. }
            | Self::IntervalMismatch { sensor, .. }
            | Self::InsufficientSamples { sensor, .. } => Some(sensor),
            Self::InvalidRange { sensor, .. } => sensor.as_deref(),
            Self::ShapeConflict { second, .. } => Some(second),
            Self::SourceUnavailable { target, .. } => Some(target),
            Self::EmptyInput(_) | Self::InvalidConfig(_) => None,
        }
    }

    /// Stable numeric code, used in machine-readable output.
    #[must_use]
    pub const fn code(&self) -> u32 {
        match self {
            Self::InsufficientData { .. } => 10,
            Self::SchemaMismatch { .. } => 11,
            Self::UnknownSensor { .. } => 12,
            Self::NonMonotonic { .. } => 13,
            Self::ShapeConflict { .. } => 20,
            Self::EmptyInput(_) => 21,
            Self::IntervalMismatch { .. } => 22,
            Self::InsufficientSamples { .. } => 30,
            Self::InvalidRange { .. } => 40,
            Self::ShapeUnsupported { .. } => 50,
            Self::SourceUnavailable { .. } => 60,
            Self::InvalidConfig(_) => 70,
        }
    }
}

fn sensor_clause(sensor: &Option<String>) -> String {
    sensor
        .as_ref()
        .map(|s| format!(" for sensor '{s}'"))
        .unwrap_or_default()
}

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, SensorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn insufficient_data_names_sensor_and_interval() {
        let err = SensorError::insufficient_data("encoder", 0.016, "series is empty");
        let msg = err.to_string();
        assert!(msg.contains("encoder"));
        assert!(msg.contains("0.016"));
        assert_eq!(err.sensor(), Some("encoder"));
    }

    #[test]
    fn schema_mismatch_reports_both_shapes() {
        let err = SensorError::schema_mismatch(
            "accel",
            0.016,
            Shape::vector(3),
            Shape::vector(2),
            1.5,
        );
        let msg = err.to_string();
        assert!(msg.contains("(3,)"));
        assert!(msg.contains("(2,)"));
        assert!(msg.contains("accel"));
    }

    #[test]
    fn invalid_range_reports_bounds() {
        let err = SensorError::invalid_range(10.0, 5.0);
        assert!(err.to_string().contains("10"));
        assert!(err.to_string().contains('5'));
        assert_eq!(err.sensor(), None);

        let err = SensorError::invalid_sensor_range("lidar", 10.0, 5.0);
        assert_eq!(
            err.to_string(),
            "invalid range for sensor 'lidar': start 10 is after end 5"
        );
        assert_eq!(err.sensor(), Some("lidar"));
    }

    #[test]
    fn insufficient_samples_names_sensor_and_column() {
        let err = SensorError::insufficient_samples("accel", "accel_2", 1, 2);
        let msg = err.to_string();
        assert!(msg.contains("'accel_2'"));
        assert!(msg.contains("'accel'"));
        assert_eq!(err.sensor(), Some("accel"));
    }

    #[test]
    fn shape_unsupported_counts_dims() {
        let err = SensorError::shape_unsupported("depth", Shape::new(vec![4, 4, 3]), 2);
        match &err {
            SensorError::ShapeUnsupported { dims, max, .. } => {
                assert_eq!(*dims, 3);
                assert_eq!(*max, 2);
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn codes_are_distinct() {
        let errors = [
            SensorError::insufficient_data("a", 0.1, "x"),
            SensorError::schema_mismatch("a", 0.1, Shape::scalar(), Shape::vector(3), 0.0),
            SensorError::unknown_sensor("a"),
            SensorError::non_monotonic("a", 1, 1.0, 0.5),
            SensorError::shape_conflict("a", "b", "c"),
            SensorError::empty_input("x"),
            SensorError::interval_mismatch("a", 0.1, 0.2),
            SensorError::insufficient_samples("a", "a", 1, 2),
            SensorError::invalid_range(1.0, 0.0),
            SensorError::shape_unsupported("a", Shape::new(vec![1, 1, 1]), 2),
            SensorError::source_unavailable("data", "missing"),
            SensorError::invalid_config("x"),
        ];
        let mut codes: Vec<u32> = errors.iter().map(SensorError::code).collect();
        codes.sort_unstable();
        codes.dedup();
        assert_eq!(codes.len(), errors.len());
    }
}
