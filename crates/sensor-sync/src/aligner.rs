//! Repeated alignment of a capture with cached resampling.

use std::collections::BTreeMap;

use tracing::warn;

use sensor_core::{PipelineConfig, Result, SchemaRegistry, SensorError, SensorSeries};

use crate::cache::ResampleCache;
use crate::gaps::{Gap, detect_gaps};
use crate::resample::{Resampler, SensorFailure};
use crate::unify::{Unified, assemble};

/// Holds configuration, schema registry and resample cache across runs.
#[derive(Debug)]
pub struct Aligner {
    config: PipelineConfig,
    registry: SchemaRegistry,
    resampler: Resampler,
    cache: ResampleCache,
}

impl Aligner {
    pub fn new(config: PipelineConfig, registry: SchemaRegistry) -> Result<Self> {
        config.validate()?;
        let resampler = Resampler::from_config(&config.resample)?;
        Ok(Self {
            config,
            registry,
            resampler,
            cache: ResampleCache::new(),
        })
    }

    /// Aligner whose registry comes from the config's `[sensors]` table.
    pub fn from_config(config: PipelineConfig) -> Result<Self> {
        let registry = config.schema_registry();
        Self::new(config, registry)
    }

    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    pub fn registry(&self) -> &SchemaRegistry {
        &self.registry
    }

    pub fn cache(&self) -> &ResampleCache {
        &self.cache
    }

    /// Registers sensors the registry does not know from their first reading.
    pub fn infer_missing_schemas<'a, I>(&mut self, series: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a SensorSeries>,
    {
        let added = self.registry.infer_missing(series);
        if !added.is_empty() {
            warn!(sensors = ?added, "shapes inferred for unregistered sensors");
        }
        added
    }

    /// Resamples (through the cache) and unifies the given series.
    pub fn align<'a, I>(&mut self, series: I) -> Result<Unified>
    where
        I: IntoIterator<Item = &'a SensorSeries>,
    {
        let mut resampled = Vec::new();
        let mut failures = Vec::new();
        let mut seen = 0usize;
        for s in series {
            seen += 1;
            let result = self
                .registry
                .shape_of(s.name())
                .and_then(|schema| self.cache.get_or_resample(&self.resampler, s, schema).cloned());
            match result {
                Ok(r) => resampled.push(r),
                Err(error) => {
                    warn!(sensor = s.name(), error = %error, "sensor dropped from alignment");
                    failures.push(SensorFailure {
                        sensor: s.name().to_string(),
                        error,
                    });
                }
            }
        }
        if seen == 0 {
            return Err(SensorError::empty_input("no sensor series to align"));
        }
        assemble(
            resampled,
            failures,
            self.resampler.interval(),
            &self.config.unify,
        )
    }

    /// Raw gaps per sensor, using the configured interval and tolerance.
    pub fn gaps<'a, I>(&self, series: I) -> BTreeMap<String, Vec<Gap>>
    where
        I: IntoIterator<Item = &'a SensorSeries>,
    {
        series
            .into_iter()
            .map(|s| {
                let gaps = detect_gaps(
                    s,
                    self.config.resample.interval,
                    self.config.resample.gap_tolerance,
                );
                (s.name().to_string(), gaps)
            })
            .collect()
    }
}
