//! Gap detection on raw series, for data-quality reporting.

use serde::{Deserialize, Serialize};
use tracing::warn;

use sensor_core::SensorSeries;

/// A raw step longer than the tolerated interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Gap {
    /// Last timestamp before the gap.
    pub after: f64,
    /// First timestamp after the gap.
    pub before: f64,
    /// Whole intervals that produced no sample.
    pub missing_steps: usize,
}

impl Gap {
    pub fn duration(&self) -> f64 {
        self.before - self.after
    }
}

/// Reports every step of `series` longer than `expected_step * tolerance`.
pub fn detect_gaps(series: &SensorSeries, expected_step: f64, tolerance: f64) -> Vec<Gap> {
    let limit = expected_step * tolerance;
    let gaps: Vec<Gap> = series
        .samples()
        .windows(2)
        .filter_map(|pair| {
            let (after, before) = (pair[0].sim_time, pair[1].sim_time);
            let step = before - after;
            (step > limit).then(|| Gap {
                after,
                before,
                missing_steps: ((step / expected_step).round() as usize).saturating_sub(1),
            })
        })
        .collect();
    if !gaps.is_empty() {
        warn!(
            sensor = series.name(),
            gaps = gaps.len(),
            expected_step,
            "gaps detected in raw series"
        );
    }
    gaps
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regular_series_has_no_gaps() {
        let series =
            SensorSeries::from_scalars("imu", &[(0.0, 0.0), (0.016, 0.0), (0.0335, 0.0)]).unwrap();
        assert!(detect_gaps(&series, 0.016, 1.1).is_empty());
    }

    #[test]
    fn reports_missing_steps() {
        let series = SensorSeries::from_scalars(
            "encoder",
            &[(40.016, 159.371), (40.048, 159.572), (40.128, 160.0)],
        )
        .unwrap();
        let gaps = detect_gaps(&series, 0.016, 1.1);
        assert_eq!(gaps.len(), 2);
        assert_eq!(gaps[0].missing_steps, 1);
        assert_eq!(gaps[1].missing_steps, 4);
        assert!((gaps[1].duration() - 0.08).abs() < 1e-9);
    }
}
