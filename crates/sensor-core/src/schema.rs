//! Static per-sensor shape and dtype registry.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::{Dtype, Result, SensorError, SensorSeries, Shape};

/// Expected shape and dtype of one sensor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SensorSchema {
    pub dims: Shape,
    #[serde(default)]
    pub dtype: Dtype,
}

impl SensorSchema {
    pub fn new(dims: Shape, dtype: Dtype) -> Self {
        Self { dims, dtype }
    }

    pub fn float(dims: Shape) -> Self {
        Self::new(dims, Dtype::Float)
    }
}

/// Maps sensor names to their schema. Read-only during a pipeline run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaRegistry {
    entries: BTreeMap<String, SensorSchema>,
}

impl SchemaRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, sensor: impl Into<String>, schema: SensorSchema) -> &mut Self {
        self.entries.insert(sensor.into(), schema);
        self
    }

    pub fn with(mut self, sensor: impl Into<String>, schema: SensorSchema) -> Self {
        self.register(sensor, schema);
        self
    }

    /// Schema of `sensor`, or `UnknownSensor`.
    pub fn shape_of(&self, sensor: &str) -> Result<&SensorSchema> {
        self.entries
            .get(sensor)
            .ok_or_else(|| SensorError::unknown_sensor(sensor))
    }

    pub fn contains(&self, sensor: &str) -> bool {
        self.entries.contains_key(sensor)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &SensorSchema)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Registers unknown sensors from the shape of their first present reading.
    ///
    /// Sensors already registered keep their entry; sensors with no present
    /// reading stay unregistered. Returns the names that were added.
    pub fn infer_missing<'a, I>(&mut self, series: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a SensorSeries>,
    {
        let mut added = Vec::new();
        for s in series {
            if self.contains(s.name()) {
                continue;
            }
            let first = s.samples().iter().find(|sample| !sample.reading.is_missing());
            if let Some(sample) = first {
                self.register(s.name(), SensorSchema::float(sample.reading.shape().clone()));
                added.push(s.name().to_string());
            }
        }
        added
    }
}

impl FromIterator<(String, SensorSchema)> for SchemaRegistry {
    fn from_iter<T: IntoIterator<Item = (String, SensorSchema)>>(iter: T) -> Self {
        Self {
            entries: iter.into_iter().collect(),
        }
    }
}
