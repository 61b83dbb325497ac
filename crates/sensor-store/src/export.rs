//! JSON export of a unified table, keyed by its interval.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use sensor_sync::{Column, FillStats, UnifiedTable};

use crate::{export_file_name, read_json, write_json};

/// On-disk form of a [`UnifiedTable`]. Missing cells are `null`, infinite
/// cells `"inf"` or `"-inf"`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TableRecord {
    pub interval: f64,
    pub times: Vec<f64>,
    pub columns: Vec<Column>,
    pub fill_stats: BTreeMap<String, FillStats>,
    /// Array sensors kept out of the columns; listed for reference only.
    #[serde(default)]
    pub routed: Vec<String>,
}

impl From<&UnifiedTable> for TableRecord {
    fn from(table: &UnifiedTable) -> Self {
        Self {
            interval: table.interval(),
            times: table.times().to_vec(),
            columns: table.columns().to_vec(),
            fill_stats: table.fill_stats().clone(),
            routed: table.routed().keys().cloned().collect(),
        }
    }
}

impl TryFrom<TableRecord> for UnifiedTable {
    type Error = sensor_core::SensorError;

    fn try_from(record: TableRecord) -> Result<Self, Self::Error> {
        UnifiedTable::from_parts(record.interval, record.times, record.columns, record.fill_stats)
    }
}

/// Writes `table` to `<dir>/unified_<interval µs>us.json`.
pub fn export_table(dir: &Path, table: &UnifiedTable) -> Result<PathBuf> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let path = dir.join(export_file_name(table.interval()));
    write_json(&path, &TableRecord::from(table))?;
    info!(
        path = %path.display(),
        rows = table.len(),
        columns = table.columns().len(),
        "exported unified table"
    );
    Ok(path)
}

pub fn import_table(path: &Path) -> Result<UnifiedTable> {
    let record: TableRecord = read_json(path)?;
    let table = UnifiedTable::try_from(record)
        .with_context(|| format!("rebuilding table from {}", path.display()))?;
    Ok(table)
}
