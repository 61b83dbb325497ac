//! # Resample
//!
//! Reconstructs one sensor's irregular series onto a uniform grid
//! `{t0, t0 + Δ, t0 + 2Δ, ...}`.
//!
//! Samples are bucketed to their nearest grid point (tolerance Δ/2, earlier
//! sample wins a collision). Grid points without an observation carry the most
//! recent known value forward. No interpolation is ever performed: encoder
//! counts and other event-like quantities would be misrepresented by it.

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use sensor_core::config::ResampleConfig;
use sensor_core::{
    Dtype, Reading, Result, SchemaRegistry, SensorError, SensorSchema, SensorSeries, Shape,
};

/// How many grid points were observed versus synthesized.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct FillStats {
    pub observed: usize,
    pub filled: usize,
}

impl FillStats {
    pub fn grid_len(&self) -> usize {
        self.observed + self.filled
    }

    /// Share of grid points that were forward-filled.
    pub fn fill_ratio(&self) -> f64 {
        match self.grid_len() {
            0 => 0.0,
            n => self.filled as f64 / n as f64,
        }
    }
}

/// Explicit `[start, end]` grid bounds.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GridRange {
    pub start: f64,
    pub end: f64,
}

impl GridRange {
    pub fn new(start: f64, end: f64) -> Result<Self> {
        if !(start.is_finite() && end.is_finite()) || start > end {
            return Err(SensorError::invalid_range(start, end));
        }
        Ok(Self { start, end })
    }
}

/// A sensor series reindexed onto a gap-free uniform grid.
#[derive(Debug, Clone, PartialEq)]
pub struct ResampledSeries {
    sensor: String,
    interval: f64,
    start: f64,
    schema: SensorSchema,
    values: Vec<Reading>,
    observed: Vec<bool>,
}

impl ResampledSeries {
    pub fn sensor(&self) -> &str {
        &self.sensor
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    pub fn start(&self) -> f64 {
        self.start
    }

    /// Time of the last grid point.
    pub fn end(&self) -> f64 {
        self.time_at(self.len().saturating_sub(1))
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// Grid time of point `index`. Computed by multiplication so error does
    /// not accumulate along long series.
    pub fn time_at(&self, index: usize) -> f64 {
        self.start + index as f64 * self.interval
    }

    pub fn times(&self) -> impl Iterator<Item = f64> + '_ {
        (0..self.len()).map(|i| self.time_at(i))
    }

    pub fn values(&self) -> &[Reading] {
        &self.values
    }

    pub fn observed(&self) -> &[bool] {
        &self.observed
    }

    pub fn schema(&self) -> &SensorSchema {
        &self.schema
    }

    pub fn shape(&self) -> &Shape {
        &self.schema.dims
    }

    pub fn dtype(&self) -> Dtype {
        self.schema.dtype
    }

    pub fn fill_count(&self) -> usize {
        self.observed.iter().filter(|o| !**o).count()
    }

    pub fn stats(&self) -> FillStats {
        let filled = self.fill_count();
        FillStats {
            observed: self.len() - filled,
            filled,
        }
    }

    /// `(time, reading, observed)` per grid point.
    pub fn iter(&self) -> impl Iterator<Item = (f64, &Reading, bool)> + '_ {
        self.values
            .iter()
            .zip(&self.observed)
            .enumerate()
            .map(|(i, (r, o))| (self.time_at(i), r, *o))
    }
}

/// A sensor that could not be resampled, with the reason.
#[derive(Debug, Clone, PartialEq)]
pub struct SensorFailure {
    pub sensor: String,
    pub error: SensorError,
}

/// Resamples series at a fixed interval.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Resampler {
    interval: f64,
}

impl Resampler {
    pub fn new(interval: f64) -> Result<Self> {
        if !(interval.is_finite() && interval > 0.0) {
            return Err(SensorError::invalid_config(format!(
                "resample interval must be positive, got {interval}"
            )));
        }
        Ok(Self { interval })
    }

    pub fn from_config(config: &ResampleConfig) -> Result<Self> {
        Self::new(config.interval)
    }

    pub fn interval(&self) -> f64 {
        self.interval
    }

    /// Resamples over `[first timestamp, last timestamp]`.
    pub fn resample(&self, series: &SensorSeries, schema: &SensorSchema) -> Result<ResampledSeries> {
        let (start, end) = series.time_range().ok_or_else(|| {
            SensorError::insufficient_data(series.name(), self.interval, "series is empty")
        })?;
        self.run(series, schema, GridRange { start, end })
    }

    /// Resamples over an explicit range.
    ///
    /// The latest present sample before the range seeds the first grid point
    /// as a filled value.
    pub fn resample_range(
        &self,
        series: &SensorSeries,
        schema: &SensorSchema,
        range: GridRange,
    ) -> Result<ResampledSeries> {
        if series.is_empty() {
            return Err(SensorError::insufficient_data(
                series.name(),
                self.interval,
                "series is empty",
            ));
        }
        let range = GridRange::new(range.start, range.end)?;
        self.run(series, schema, range)
    }

    fn run(
        &self,
        series: &SensorSeries,
        schema: &SensorSchema,
        range: GridRange,
    ) -> Result<ResampledSeries> {
        let dt = self.interval;
        let tol = dt / 2.0;
        let len = grid_len(range.end - range.start, dt);

        let mut slots: Vec<Option<&Reading>> = vec![None; len];
        let mut seed: Option<&Reading> = None;

        for sample in series.samples() {
            // Checked before shape: a value that failed coercion has no usable shape.
            if sample.reading.is_missing() {
                continue;
            }
            if sample.reading.shape() != &schema.dims {
                return Err(SensorError::schema_mismatch(
                    series.name(),
                    dt,
                    schema.dims.clone(),
                    sample.reading.shape().clone(),
                    sample.sim_time,
                ));
            }
            let offset = sample.sim_time - range.start;
            if offset < -tol {
                seed = Some(&sample.reading);
                continue;
            }
            if sample.sim_time > range.end + tol {
                break;
            }
            let bucket = ((offset / dt).round().max(0.0) as usize).min(len - 1);
            if slots[bucket].is_none() {
                slots[bucket] = Some(&sample.reading);
            }
        }

        let mut values = Vec::with_capacity(len);
        let mut observed = Vec::with_capacity(len);
        let mut last = seed;
        for slot in slots {
            match (slot, last) {
                (Some(reading), _) => {
                    values.push(reading.clone());
                    observed.push(true);
                    last = Some(reading);
                }
                (None, Some(reading)) => {
                    values.push(reading.clone());
                    observed.push(false);
                }
                (None, None) => {
                    return Err(SensorError::insufficient_data(
                        series.name(),
                        dt,
                        format!("no observation at or before first grid point t={}", range.start),
                    ));
                }
            }
        }

        let resampled = ResampledSeries {
            sensor: series.name().to_string(),
            interval: dt,
            start: range.start,
            schema: schema.clone(),
            values,
            observed,
        };
        let stats = resampled.stats();
        debug!(
            sensor = series.name(),
            interval = dt,
            grid_len = stats.grid_len(),
            fill_count = stats.filled,
            "resampled sensor series"
        );
        Ok(resampled)
    }

    /// Resamples every series independently.
    ///
    /// One sensor's failure never affects another's result. With the
    /// `parallel` feature the sensors are processed concurrently; output order
    /// follows input order either way.
    pub fn resample_all<'a, I>(
        &self,
        series: I,
        registry: &SchemaRegistry,
    ) -> (Vec<ResampledSeries>, Vec<SensorFailure>)
    where
        I: IntoIterator<Item = &'a SensorSeries>,
    {
        let jobs: Vec<&SensorSeries> = series.into_iter().collect();
        let run = |s: &&SensorSeries| {
            let result = registry
                .shape_of(s.name())
                .and_then(|schema| self.resample(s, schema));
            (s.name().to_string(), result)
        };

        #[cfg(feature = "parallel")]
        let results: Vec<(String, Result<ResampledSeries>)> = {
            use rayon::prelude::*;
            jobs.par_iter().map(run).collect()
        };
        #[cfg(not(feature = "parallel"))]
        let results: Vec<(String, Result<ResampledSeries>)> = jobs.iter().map(run).collect();

        let mut ok = Vec::with_capacity(results.len());
        let mut failures = Vec::new();
        for (sensor, result) in results {
            match result {
                Ok(resampled) => ok.push(resampled),
                Err(error) => {
                    warn!(sensor = %sensor, error = %error, "sensor dropped from alignment");
                    failures.push(SensorFailure { sensor, error });
                }
            }
        }
        (ok, failures)
    }
}

/// Resamples `series` at `interval` over its own time range.
pub fn resample(
    series: &SensorSeries,
    schema: &SensorSchema,
    interval: f64,
) -> Result<ResampledSeries> {
    Resampler::new(interval)?.resample(series, schema)
}

/// Number of grid points for a span. A span shorter than one interval
/// still yields one point.
fn grid_len(span: f64, dt: f64) -> usize {
    if span < dt {
        1
    } else {
        (span / dt).round() as usize + 1
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use proptest::prelude::*;
    use sensor_core::Sample;

    fn scalar_schema() -> SensorSchema {
        SensorSchema::float(Shape::scalar())
    }

    fn scalar_values(r: &ResampledSeries) -> Vec<f64> {
        r.values().iter().map(|v| v.values()[0]).collect()
    }

    #[test]
    fn encoder_gap_is_forward_filled() {
        let series =
            SensorSeries::from_scalars("encoder", &[(40.016, 159.371), (40.048, 159.572)]).unwrap();
        let r = resample(&series, &scalar_schema(), 0.016).unwrap();

        assert_eq!(r.len(), 3);
        let times: Vec<f64> = r.times().collect();
        assert_relative_eq!(times[0], 40.016, epsilon = 1e-9);
        assert_relative_eq!(times[1], 40.032, epsilon = 1e-9);
        assert_relative_eq!(times[2], 40.048, epsilon = 1e-9);
        assert_eq!(scalar_values(&r), vec![159.371, 159.371, 159.572]);
        assert_eq!(r.observed(), &[true, false, true]);
        assert_eq!(r.fill_count(), 1);
        assert_eq!(r.stats(), FillStats { observed: 2, filled: 1 });
    }

    #[test]
    fn empty_series_is_insufficient_data() {
        let series = SensorSeries::new("gps", Vec::new()).unwrap();
        let err = resample(&series, &scalar_schema(), 0.016).unwrap_err();
        assert!(matches!(err, SensorError::InsufficientData { ref sensor, .. } if sensor == "gps"));
    }

    #[test]
    fn short_series_yields_one_point() {
        let series = SensorSeries::from_scalars("gps", &[(1.0, 5.0), (1.01, 6.0)]).unwrap();
        let r = resample(&series, &scalar_schema(), 0.016).unwrap();
        assert_eq!(r.len(), 1);
        assert_eq!(scalar_values(&r), vec![5.0]);
        assert_eq!(r.fill_count(), 0);
    }

    #[test]
    fn jittered_timestamps_land_on_nearest_point() {
        let series = SensorSeries::from_scalars(
            "imu",
            &[(0.0, 1.0), (0.0161, 2.0), (0.0319, 3.0), (0.048000001, 4.0)],
        )
        .unwrap();
        let r = resample(&series, &scalar_schema(), 0.016).unwrap();
        assert_eq!(scalar_values(&r), vec![1.0, 2.0, 3.0, 4.0]);
        assert_eq!(r.fill_count(), 0);
    }

    #[test]
    fn bucket_collision_keeps_earlier_sample() {
        let series =
            SensorSeries::from_scalars("imu", &[(0.0, 1.0), (0.015, 2.0), (0.017, 3.0)]).unwrap();
        let r = resample(&series, &scalar_schema(), 0.016).unwrap();
        assert_eq!(scalar_values(&r), vec![1.0, 2.0]);
    }

    #[test]
    fn shape_mismatch_is_reported() {
        let series = SensorSeries::new(
            "accel",
            vec![
                Sample::new(0.0, Reading::vector(vec![0.0, 0.0, 9.8])),
                Sample::new(0.016, Reading::vector(vec![0.0, 9.8])),
            ],
        )
        .unwrap();
        let err = resample(&series, &SensorSchema::float(Shape::vector(3)), 0.016).unwrap_err();
        match err {
            SensorError::SchemaMismatch {
                sensor,
                interval,
                expected,
                detected,
                ..
            } => {
                assert_eq!(sensor, "accel");
                assert_eq!(interval, 0.016);
                assert_eq!(expected, Shape::vector(3));
                assert_eq!(detected, Shape::vector(2));
            }
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn missing_readings_are_filled_not_rejected() {
        let series = SensorSeries::new(
            "accel",
            vec![
                Sample::new(0.0, Reading::vector(vec![1.0, 2.0, 3.0])),
                Sample::new(0.016, Reading::scalar(f64::NAN)),
                Sample::new(0.032, Reading::vector(vec![4.0, 5.0, 6.0])),
            ],
        )
        .unwrap();
        let r = resample(&series, &SensorSchema::float(Shape::vector(3)), 0.016).unwrap();
        assert_eq!(r.values()[1].values(), &[1.0, 2.0, 3.0]);
        assert_eq!(r.fill_count(), 1);
    }

    #[test]
    fn unobserved_first_point_fails() {
        let series = SensorSeries::from_scalars("gps", &[(0.0, f64::NAN), (0.016, 1.0)]).unwrap();
        let err = resample(&series, &scalar_schema(), 0.016).unwrap_err();
        assert!(matches!(err, SensorError::InsufficientData { .. }));
    }

    #[test]
    fn explicit_range_uses_earlier_sample_as_seed() {
        let series =
            SensorSeries::from_scalars("gps", &[(0.0, 1.0), (0.064, 2.0), (0.2, 3.0)]).unwrap();
        let resampler = Resampler::new(0.016).unwrap();
        let range = GridRange::new(0.032, 0.08).unwrap();
        let r = resampler.resample_range(&series, &scalar_schema(), range).unwrap();

        assert_eq!(r.len(), 4);
        assert_eq!(scalar_values(&r), vec![1.0, 1.0, 2.0, 2.0]);
        assert_eq!(r.observed(), &[false, false, true, false]);
    }

    #[test]
    fn explicit_range_without_seed_fails() {
        let series = SensorSeries::from_scalars("gps", &[(0.064, 2.0)]).unwrap();
        let resampler = Resampler::new(0.016).unwrap();
        let range = GridRange::new(0.0, 0.08).unwrap();
        assert!(matches!(
            resampler.resample_range(&series, &scalar_schema(), range),
            Err(SensorError::InsufficientData { .. })
        ));
    }

    #[test]
    fn reversed_range_is_invalid() {
        assert!(matches!(
            GridRange::new(1.0, 0.5),
            Err(SensorError::InvalidRange { .. })
        ));
    }

    #[test]
    fn interval_must_be_positive() {
        assert!(Resampler::new(0.0).is_err());
        assert!(Resampler::new(-0.016).is_err());
        assert!(Resampler::new(f64::NAN).is_err());
    }

    #[test]
    fn filled_points_share_the_source_buffer() {
        let series = SensorSeries::new(
            "lidar",
            vec![
                Sample::new(0.0, Reading::array(Shape::new(vec![4, 3]), vec![1.0; 12]).unwrap()),
                Sample::new(0.048, Reading::array(Shape::new(vec![4, 3]), vec![2.0; 12]).unwrap()),
            ],
        )
        .unwrap();
        let r = resample(&series, &SensorSchema::float(Shape::new(vec![4, 3])), 0.016).unwrap();
        assert!(r.values()[0].shares_buffer(&r.values()[1]));
        assert!(r.values()[0].shares_buffer(&r.values()[2]));
    }

    #[test]
    fn resample_all_collects_failures_per_sensor() {
        let registry = SchemaRegistry::new()
            .with("a", scalar_schema())
            .with("empty", scalar_schema());
        let a = SensorSeries::from_scalars("a", &[(0.0, 1.0), (0.016, 2.0)]).unwrap();
        let empty = SensorSeries::new("empty", Vec::new()).unwrap();
        let unknown = SensorSeries::from_scalars("unknown", &[(0.0, 1.0)]).unwrap();

        let resampler = Resampler::new(0.016).unwrap();
        let (ok, failures) = resampler.resample_all([&a, &empty, &unknown], &registry);
        assert_eq!(ok.len(), 1);
        assert_eq!(ok[0].sensor(), "a");
        let failed: Vec<&str> = failures.iter().map(|f| f.sensor.as_str()).collect();
        assert_eq!(failed, vec!["empty", "unknown"]);
        assert!(matches!(failures[1].error, SensorError::UnknownSensor { .. }));
    }

    proptest! {
        #[test]
        fn gap_free_series_is_identity(
            start in -100.0f64..100.0,
            values in prop::collection::vec(-1e3f64..1e3, 1..200),
        ) {
            let dt = 0.016;
            let points: Vec<(f64, f64)> = values
                .iter()
                .enumerate()
                .map(|(i, v)| (start + i as f64 * dt, *v))
                .collect();
            let series = SensorSeries::from_scalars("s", &points).unwrap();
            let r = resample(&series, &scalar_schema(), dt).unwrap();
            prop_assert_eq!(r.fill_count(), 0);
            prop_assert_eq!(scalar_values(&r), values);
        }

        #[test]
        fn filled_values_repeat_previous_observation(
            steps in prop::collection::vec(1usize..6, 1..60),
        ) {
            let dt = 0.016;
            let mut tick = 0usize;
            let mut points = vec![(0.0, 0.0)];
            for (i, step) in steps.iter().enumerate() {
                tick += step;
                points.push((tick as f64 * dt, (i + 1) as f64));
            }
            let series = SensorSeries::from_scalars("s", &points).unwrap();
            let r = resample(&series, &scalar_schema(), dt).unwrap();

            prop_assert_eq!(r.len(), tick + 1);
            prop_assert_eq!(r.fill_count(), tick + 1 - points.len());
            let values = scalar_values(&r);
            let mut last = f64::NAN;
            for (v, observed) in values.iter().zip(r.observed()) {
                if *observed {
                    last = *v;
                } else {
                    prop_assert_eq!(*v, last);
                }
            }
        }
    }
}
