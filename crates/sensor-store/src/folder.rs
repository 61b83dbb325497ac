//! Capture folders: one `<sensor>.json` per sensor.
//!
//! Each file is a JSON array of `[sim_time, value]` pairs. A value is a
//! number, a numeric string or a nested array of those; anything that does
//! not coerce to a number becomes NaN and the reading counts as missing.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::Deserialize;
use serde_json::Value;
use tracing::{debug, info, warn};

use sensor_core::{
    Dtype, Reading, Result, Sample, SchemaRegistry, SensorError, SensorSchema, SensorSeries, Shape,
};

use crate::{MANIFEST_FILE, SampleSource, read_json, sensor_file_name, write_json};

/// Entry of a folder's `sensors.json`. Unknown keys are ignored.
#[derive(Debug, Clone, Deserialize)]
struct ManifestEntry {
    name: String,
    #[serde(default)]
    shape: Option<Vec<usize>>,
    #[serde(default)]
    dtype: Dtype,
}

/// A capture folder on disk.
#[derive(Debug, Clone)]
pub struct FolderSource {
    root: PathBuf,
}

impl FolderSource {
    pub fn open(root: impl Into<PathBuf>) -> Result<Self> {
        let root = root.into();
        if !root.is_dir() {
            return Err(SensorError::source_unavailable(
                root.display().to_string(),
                "not a directory",
            ));
        }
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn sensor_path(&self, sensor: &str) -> PathBuf {
        self.root.join(sensor_file_name(sensor))
    }

    /// Shapes declared in the folder's manifest, if it has one.
    ///
    /// A missing `shape` or `[1]` means a scalar sensor.
    pub fn manifest(&self) -> Result<Option<SchemaRegistry>> {
        let path = self.root.join(MANIFEST_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let entries: Vec<ManifestEntry> = read_json(&path)
            .map_err(|e| SensorError::source_unavailable(path.display().to_string(), format!("{e:#}")))?;
        let registry = entries
            .into_iter()
            .map(|entry| {
                let dims = match entry.shape {
                    None => Shape::scalar(),
                    Some(dims) if dims == [1] => Shape::scalar(),
                    Some(dims) => Shape::new(dims),
                };
                (entry.name, SensorSchema::new(dims, entry.dtype))
            })
            .collect();
        Ok(Some(registry))
    }
}

impl SampleSource for FolderSource {
    fn sensors(&self) -> Result<Vec<String>> {
        let unavailable =
            |e: std::io::Error| SensorError::source_unavailable(self.root.display().to_string(), e.to_string());
        let mut names = Vec::new();
        for entry in fs::read_dir(&self.root).map_err(unavailable)? {
            let path = entry.map_err(unavailable)?.path();
            if !path.is_file() || path.extension().is_none_or(|ext| ext != "json") {
                continue;
            }
            if path.file_name().is_some_and(|name| name == MANIFEST_FILE) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                names.push(stem.to_string());
            }
        }
        names.sort();
        Ok(names)
    }

    fn load(&self, sensor: &str) -> Result<SensorSeries> {
        let path = self.sensor_path(sensor);
        let pairs: Vec<(f64, Value)> = read_json(&path).map_err(|e| {
            SensorError::source_unavailable(path.display().to_string(), format!("{e:#}"))
        })?;
        let raw_len = pairs.len();

        let mut samples = Vec::with_capacity(raw_len);
        for (sim_time, value) in pairs {
            let (dims, data) = coerce_value(&value);
            let shape = match dims.as_slice() {
                [] => Shape::scalar(),
                _ => Shape::new(dims),
            };
            samples.push(Sample::new(sim_time, Reading::array(shape, data)?));
        }
        samples.sort_by(|a, b| a.sim_time.total_cmp(&b.sim_time));
        samples.dedup_by(|later, earlier| later.sim_time == earlier.sim_time);
        if samples.len() < raw_len {
            warn!(
                sensor,
                dropped = raw_len - samples.len(),
                "duplicate timestamps dropped, first sample kept"
            );
        }
        let missing = samples.iter().filter(|s| s.reading.is_missing()).count();
        debug!(sensor, samples = samples.len(), missing, "loaded sensor capture");
        SensorSeries::new(sensor, samples)
    }

    fn load_all(&self) -> Result<BTreeMap<String, SensorSeries>> {
        let names = self.sensors()?;
        let mut all = BTreeMap::new();
        for name in names {
            let series = self.load(&name)?;
            all.insert(name, series);
        }
        info!(root = %self.root.display(), sensors = all.len(), "loaded capture folder");
        Ok(all)
    }
}

/// Flattens a JSON value into `(dims, data)`.
///
/// Numbers and numeric strings are scalars (`dims` empty). Arrays nest; a
/// ragged array is flattened into one dimension. Non-numeric leaves are NaN.
pub fn coerce_value(value: &Value) -> (Vec<usize>, Vec<f64>) {
    match value {
        Value::Number(n) => (Vec::new(), vec![n.as_f64().unwrap_or(f64::NAN)]),
        Value::String(s) => (Vec::new(), vec![s.trim().parse().unwrap_or(f64::NAN)]),
        Value::Array(items) => {
            let children: Vec<(Vec<usize>, Vec<f64>)> = items.iter().map(coerce_value).collect();
            let data: Vec<f64> = children.iter().flat_map(|(_, d)| d.iter().copied()).collect();
            let inner = children.first().map(|(dims, _)| dims.clone()).unwrap_or_default();
            if children.iter().all(|(dims, _)| *dims == inner) {
                let mut dims = vec![items.len()];
                dims.extend(inner);
                (dims, data)
            } else {
                (vec![data.len()], data)
            }
        }
        Value::Null | Value::Bool(_) | Value::Object(_) => (Vec::new(), vec![f64::NAN]),
    }
}

fn nest(dims: &[usize], data: &[f64]) -> Value {
    match dims {
        [] => match data.first() {
            Some(v) if v.is_finite() => {
                serde_json::Number::from_f64(*v).map_or(Value::Null, Value::Number)
            }
            Some(v) if v.is_infinite() => Value::String(v.to_string()),
            _ => Value::Null,
        },
        [_, inner @ ..] => {
            let stride = inner.iter().product::<usize>().max(1);
            Value::Array(data.chunks(stride).map(|chunk| nest(inner, chunk)).collect())
        }
    }
}

/// Writes `series` to `<root>/<sensor>.json` in the capture format.
///
/// Missing components are written as `null` and infinities as `"inf"` or
/// `"-inf"`, which [`coerce_value`] parses back.
pub fn write_series(root: &Path, series: &SensorSeries) -> anyhow::Result<PathBuf> {
    fs::create_dir_all(root).with_context(|| format!("creating {}", root.display()))?;
    let pairs: Vec<(f64, Value)> = series
        .samples()
        .iter()
        .map(|s| (s.sim_time, nest(s.reading.shape().dims(), s.reading.values())))
        .collect();
    let path = root.join(sensor_file_name(series.name()));
    write_json(&path, &pairs)?;
    Ok(path)
}
