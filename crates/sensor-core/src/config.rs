//! Pipeline configuration, loaded from TOML and passed into each stage.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Result, SchemaRegistry, SensorError, SensorSchema};

/// Native simulation step, in seconds.
pub const DEFAULT_INTERVAL: f64 = 0.016;

/// Default anomaly threshold multiplier `k`.
pub const DEFAULT_THRESHOLD: f64 = 3.0;

/// Arrays with more components than this are not expanded into columns.
pub const DEFAULT_MAX_EXPANDED_COMPONENTS: usize = 8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ResampleConfig {
    /// Grid spacing Δ in seconds.
    pub interval: f64,
    /// A raw step longer than `interval * gap_tolerance` is reported as a gap.
    pub gap_tolerance: f64,
}

impl Default for ResampleConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_INTERVAL,
            gap_tolerance: 1.1,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct UnifyConfig {
    pub max_expanded_components: usize,
}

impl Default for UnifyConfig {
    fn default() -> Self {
        Self {
            max_expanded_components: DEFAULT_MAX_EXPANDED_COMPONENTS,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct LabelConfig {
    pub threshold: f64,
}

impl Default for LabelConfig {
    fn default() -> Self {
        Self {
            threshold: DEFAULT_THRESHOLD,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SummaryConfig {
    /// Highest array rank the comparator accepts.
    pub max_dims: usize,
    /// Points with a norm above this count as far; `None` disables the count.
    pub far_threshold: Option<f64>,
}

impl Default for SummaryConfig {
    fn default() -> Self {
        Self {
            max_dims: 2,
            far_threshold: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct CorrelateConfig {
    pub strong: f64,
    pub redundant: f64,
    pub predictive: f64,
    /// Sensors whose name contains this marker are treated as actuators.
    pub actuator_marker: String,
}

impl Default for CorrelateConfig {
    fn default() -> Self {
        Self {
            strong: 0.7,
            redundant: 0.9,
            predictive: 0.6,
            actuator_marker: "actuator".to_string(),
        }
    }
}

/// Full pipeline configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    pub resample: ResampleConfig,
    pub unify: UnifyConfig,
    pub label: LabelConfig,
    pub summary: SummaryConfig,
    pub correlate: CorrelateConfig,
    pub sensors: BTreeMap<String, SensorSchema>,
}

impl PipelineConfig {
    /// Parses and validates a TOML document.
    pub fn from_toml_str(text: &str) -> Result<Self> {
        let config: Self =
            toml::from_str(text).map_err(|e| SensorError::invalid_config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SensorError::invalid_config(e.to_string()))
    }

    pub fn validate(&self) -> Result<()> {
        let interval = self.resample.interval;
        if !(interval.is_finite() && interval > 0.0) {
            return Err(SensorError::invalid_config(format!(
                "resample.interval must be positive, got {interval}"
            )));
        }
        if !(self.resample.gap_tolerance >= 1.0) {
            return Err(SensorError::invalid_config(format!(
                "resample.gap_tolerance must be at least 1, got {}",
                self.resample.gap_tolerance
            )));
        }
        let k = self.label.threshold;
        if !(k.is_finite() && k > 0.0) {
            return Err(SensorError::invalid_config(format!(
                "label.threshold must be positive, got {k}"
            )));
        }
        if self.summary.max_dims == 0 {
            return Err(SensorError::invalid_config("summary.max_dims must be at least 1"));
        }
        if let Some(far) = self.summary.far_threshold {
            if far.is_nan() || far < 0.0 {
                return Err(SensorError::invalid_config(format!(
                    "summary.far_threshold must be non-negative, got {far}"
                )));
            }
        }
        let c = &self.correlate;
        for (name, value) in [
            ("strong", c.strong),
            ("redundant", c.redundant),
            ("predictive", c.predictive),
        ] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(SensorError::invalid_config(format!(
                    "correlate.{name} must be in (0, 1], got {value}"
                )));
            }
        }
        Ok(())
    }

    /// Schema registry built from the `[sensors]` table.
    pub fn schema_registry(&self) -> SchemaRegistry {
        self.sensors
            .iter()
            .map(|(name, schema)| (name.clone(), schema.clone()))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{Dtype, Shape};

    #[test]
    fn defaults_match_simulation_step() {
        let config = PipelineConfig::default();
        assert_eq!(config.resample.interval, 0.016);
        assert_eq!(config.label.threshold, 3.0);
        assert_eq!(config.unify.max_expanded_components, 8);
        assert_eq!(config.summary.max_dims, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn parses_sensors_table() {
        let text = r#"
            [resample]
            interval = 0.032

            [sensors.accel]
            dims = [3]

            [sensors.encoder]
            dims = []
            dtype = "int"

            [sensors.lidar]
            dims = [2048, 3]
        "#;
        let config = PipelineConfig::from_toml_str(text).unwrap();
        assert_eq!(config.resample.interval, 0.032);
        assert_eq!(config.resample.gap_tolerance, 1.1);

        let registry = config.schema_registry();
        assert_eq!(registry.len(), 3);
        assert_eq!(registry.shape_of("accel").unwrap().dims, Shape::vector(3));
        assert_eq!(registry.shape_of("encoder").unwrap().dtype, Dtype::Int);
        assert_eq!(
            registry.shape_of("lidar").unwrap().dims,
            Shape::new(vec![2048, 3])
        );
    }

    #[test]
    fn rejects_unknown_keys() {
        let err = PipelineConfig::from_toml_str("[resample]\nstep = 0.1\n").unwrap_err();
        assert!(matches!(err, SensorError::InvalidConfig(_)));
    }

    #[test]
    fn rejects_bad_values() {
        assert!(PipelineConfig::from_toml_str("[resample]\ninterval = 0.0\n").is_err());
        assert!(PipelineConfig::from_toml_str("[resample]\ninterval = -0.016\n").is_err());
        assert!(PipelineConfig::from_toml_str("[label]\nthreshold = 0.0\n").is_err());
        assert!(PipelineConfig::from_toml_str("[summary]\nmax_dims = 0\n").is_err());
        assert!(PipelineConfig::from_toml_str("[correlate]\nstrong = 1.5\n").is_err());
        assert!(PipelineConfig::from_toml_str("[resample]\ngap_tolerance = 0.5\n").is_err());
    }

    #[test]
    fn toml_round_trip() {
        let mut config = PipelineConfig::default();
        config.summary.far_threshold = Some(12.5);
        config
            .sensors
            .insert("gyro".into(), SensorSchema::float(Shape::vector(3)));
        let text = config.to_toml_string().unwrap();
        assert_eq!(PipelineConfig::from_toml_str(&text).unwrap(), config);
    }
}
