//! # Sensor Store
//!
//! The filesystem side of the pipeline: capture folders with one JSON file
//! per sensor are read into [`SensorSeries`], and unified tables are exported
//! as JSON next to them.
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use serde::de::DeserializeOwned;

use sensor_core::SensorSeries;

pub mod export;
pub mod folder;

pub use export::{TableRecord, export_table, import_table};
pub use folder::{FolderSource, coerce_value, write_series};

/// Anything that can hand back closed, immutable sensor series.
pub trait SampleSource {
    /// Names of every sensor the source holds, sorted.
    fn sensors(&self) -> sensor_core::Result<Vec<String>>;

    fn load(&self, sensor: &str) -> sensor_core::Result<SensorSeries>;

    fn load_all(&self) -> sensor_core::Result<BTreeMap<String, SensorSeries>> {
        self.sensors()?
            .into_iter()
            .map(|name| self.load(&name).map(|series| (name, series)))
            .collect()
    }
}

// --- File names ---

/// Optional per-folder list of sensor shapes.
pub const MANIFEST_FILE: &str = "sensors.json";

pub fn sensor_file_name(sensor: &str) -> String {
    format!("{sensor}.json")
}

/// Export name keyed by the grid interval in microseconds.
pub fn export_file_name(interval: f64) -> String {
    format!("unified_{}us.json", (interval * 1e6).round() as u64)
}

// --- Generic I/O helpers ---

fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let json_string = serde_json::to_string(value)?;
    fs::write(path, json_string).with_context(|| format!("writing {}", path.display()))?;
    Ok(())
}

fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T> {
    let json_string =
        fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    let value: T = serde_json::from_str(&json_string)
        .with_context(|| format!("parsing {}", path.display()))?;
    Ok(value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn file_names() {
        assert_eq!(sensor_file_name("encoder"), "encoder.json");
        assert_eq!(export_file_name(0.016), "unified_16000us.json");
        assert_eq!(export_file_name(0.032), "unified_32000us.json");
    }

    #[test]
    fn json_helpers_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("value.json");
        let value: BTreeMap<String, f64> = [("a".to_string(), 0.1 + 0.2)].into_iter().collect();
        write_json(&path, &value).unwrap();
        let back: BTreeMap<String, f64> = read_json(&path).unwrap();
        assert_eq!(back, value);
    }

    #[test]
    fn read_json_reports_the_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("absent.json");
        let err = read_json::<Vec<f64>>(&path).unwrap_err();
        assert!(format!("{err:#}").contains("absent.json"));
    }
}
