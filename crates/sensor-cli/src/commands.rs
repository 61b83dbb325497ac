//! Subcommand implementations.

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Serialize;
use tracing::{info, warn};

use sensor_analysis::{
    AnomalyLabeler, ColumnStats, CorrelationReport, Correlator, CrossShapeComparator,
    LabelDistribution, QualityReport, query,
};
use sensor_core::{PipelineConfig, SensorError};
use sensor_store::{FolderSource, SampleSource, export_table};
use sensor_sync::{Aligner, Unified, UnifiedTable};

use crate::cli::{CaptureArgs, Cli, Command};

pub fn load_config(path: Option<&Path>) -> Result<PipelineConfig> {
    let Some(path) = path else {
        return Ok(PipelineConfig::default());
    };
    let text = fs::read_to_string(path).map_err(|e| {
        SensorError::invalid_config(format!("reading config {}: {e}", path.display()))
    })?;
    let config = PipelineConfig::from_toml_str(&text)
        .with_context(|| format!("loading config {}", path.display()))?;
    Ok(config)
}

/// Loads a capture folder and aligns every sensor in it.
fn align_capture(config: &PipelineConfig, capture: &CaptureArgs) -> Result<Unified> {
    let mut config = config.clone();
    if let Some(interval) = capture.interval {
        config.resample.interval = interval;
    }

    let source = FolderSource::open(&capture.folder)?;
    let mut registry = config.schema_registry();
    if let Some(manifest) = source.manifest()? {
        for (name, schema) in manifest.iter() {
            if !registry.contains(name) {
                registry.register(name, schema.clone());
            }
        }
    }
    let series = source.load_all()?;
    let mut aligner = Aligner::new(config, registry)?;
    aligner.infer_missing_schemas(series.values());

    for (sensor, gaps) in aligner.gaps(series.values()) {
        if !gaps.is_empty() {
            let missing: usize = gaps.iter().map(|g| g.missing_steps).sum();
            info!(sensor = %sensor, gaps = gaps.len(), missing, "raw capture has gaps");
        }
    }
    let unified = aligner.align(series.values())?;
    Ok(unified)
}

/// Aligns, then adds summary columns for routed array sensors.
fn summarized_table(config: &PipelineConfig, capture: &CaptureArgs) -> Result<(Unified, QualityReport)> {
    let mut unified = align_capture(config, capture)?;
    let report = QualityReport::from_unified(&unified);
    let comparator = CrossShapeComparator::from_config(&config.summary);
    for failure in comparator.attach_routed(&mut unified.table)? {
        warn!(sensor = %failure.sensor, error = %failure.error, "array sensor left out of analysis");
    }
    Ok((unified, report))
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[derive(Serialize)]
struct AlignOutput<'a> {
    quality: &'a QualityReport,
    columns: Vec<&'a str>,
    export: Option<String>,
}

#[derive(Serialize)]
struct LabelOutput<'a> {
    threshold: f64,
    distribution: LabelDistribution,
    columns: &'a [ColumnStats],
}

#[derive(Serialize)]
struct QueryOutput<'a> {
    count: usize,
    times: &'a [f64],
    columns: Vec<&'a str>,
}

pub fn run(cli: &Cli) -> Result<()> {
    let config = load_config(cli.config.as_deref())?;
    match &cli.command {
        Command::Align {
            capture,
            export_dir,
        } => {
            let unified = align_capture(&config, capture)?;
            let quality = QualityReport::from_unified(&unified);
            let export = match export_dir {
                Some(dir) => Some(export_table(dir, &unified.table)?.display().to_string()),
                None => None,
            };
            if cli.json {
                print_json(&AlignOutput {
                    quality: &quality,
                    columns: column_names(&unified.table),
                    export,
                })
            } else {
                print_quality(&quality);
                if let Some(path) = export {
                    println!("exported {path}");
                }
                Ok(())
            }
        }
        Command::Label { capture, threshold } => {
            let (unified, quality) = summarized_table(&config, capture)?;
            let labeler = AnomalyLabeler::new(threshold.unwrap_or(config.label.threshold))?;
            let labeled = labeler.label(&unified.table)?;
            let distribution = labeled.distribution();
            if cli.json {
                print_json(&LabelOutput {
                    threshold: labeler.threshold(),
                    distribution,
                    columns: labeled.stats(),
                })
            } else {
                print_quality(&quality);
                println!(
                    "labels (k = {}): {} normal, {} anomalous",
                    labeler.threshold(),
                    distribution.normal,
                    distribution.anomalous
                );
                for stats in labeled.stats() {
                    println!(
                        "  {:<24} mean {:>12.6}  std {:>12.6}  n {}",
                        stats.column, stats.mean, stats.std, stats.count
                    );
                }
                Ok(())
            }
        }
        Command::Query {
            capture,
            sensor,
            start,
            end,
            labeled,
        } => {
            let (unified, _) = summarized_table(&config, capture)?;
            let table = if *labeled {
                AnomalyLabeler::from_config(&config.label)?
                    .label(&unified.table)?
                    .into_table()?
            } else {
                unified.table
            };
            let result = query(&table, sensor.as_deref(), *start, *end)?;
            if cli.json {
                print_json(&QueryOutput {
                    count: result.count,
                    times: result.rows.times(),
                    columns: column_names(&result.rows),
                })
            } else {
                println!("{} matching rows", result.count);
                if let (Some(first), Some(last)) =
                    (result.rows.times().first(), result.rows.times().last())
                {
                    println!("  sim_time {first:.3} .. {last:.3}");
                }
                println!("  columns: {}", column_names(&result.rows).join(", "));
                Ok(())
            }
        }
        Command::Correlate { capture } => {
            let (unified, _) = summarized_table(&config, capture)?;
            let report = Correlator::new(config.correlate.clone()).analyze(&unified.table)?;
            if cli.json {
                print_json(&report)
            } else {
                print_correlation(&report);
                Ok(())
            }
        }
    }
}

fn column_names(table: &UnifiedTable) -> Vec<&str> {
    table.columns().iter().map(|c| c.name.as_str()).collect()
}

fn print_quality(quality: &QualityReport) {
    println!(
        "{} rows at {}s, {} sensors",
        quality.rows,
        quality.interval,
        quality.sensors.len()
    );
    for s in &quality.sensors {
        let routed = if s.routed { "  (summarized)" } else { "" };
        println!(
            "  {:<20} observed {:>7}  filled {:>7}  ({:>5.1}%){routed}",
            s.sensor,
            s.observed,
            s.filled,
            s.fill_ratio * 100.0
        );
    }
    for f in &quality.failures {
        println!("  {:<20} FAILED: {}", f.sensor, f.message);
    }
}

fn print_correlation(report: &CorrelationReport) {
    println!("strongly correlated pairs:");
    for pair in &report.strong {
        println!("  {:<24} {:<24} r = {:+.3}", pair.a, pair.b, pair.r);
    }
    println!("redundant sensors:");
    for r in &report.redundant {
        println!("  {:<24} ~ {:<24} r = {:+.3}", r.sensor, r.duplicate_of, r.r);
    }
    println!("actuator predictors:");
    for p in &report.predictors {
        println!("  {:<24} -> {:<24} r = {:+.3}", p.column, p.actuator, p.r);
    }
}
