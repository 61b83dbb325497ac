//! Resampled series cached per (sensor, interval).

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::hash::{DefaultHasher, Hash, Hasher};

use tracing::trace;

use sensor_core::{Result, SensorSchema, SensorSeries};

use crate::resample::{ResampledSeries, Resampler};

/// Identifies the raw series a cached entry was derived from: sample count
/// plus a digest over the bits of every timestamp, shape and component.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct Fingerprint {
    len: usize,
    digest: u64,
}

impl Fingerprint {
    fn of(series: &SensorSeries) -> Self {
        let mut hasher = DefaultHasher::new();
        for sample in series.samples() {
            sample.sim_time.to_bits().hash(&mut hasher);
            sample.reading.shape().hash(&mut hasher);
            for value in sample.reading.values() {
                value.to_bits().hash(&mut hasher);
            }
        }
        Self {
            len: series.len(),
            digest: hasher.finish(),
        }
    }
}

/// Cache of resampled series.
///
/// An entry is reused while the raw series content and the schema are
/// unchanged; any changed timestamp or value recomputes it.
#[derive(Debug, Default)]
pub struct ResampleCache {
    entries: HashMap<(String, u64), (Fingerprint, ResampledSeries)>,
    hits: usize,
    misses: usize,
}

impl ResampleCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get_or_resample(
        &mut self,
        resampler: &Resampler,
        series: &SensorSeries,
        schema: &SensorSchema,
    ) -> Result<&ResampledSeries> {
        let key = (series.name().to_string(), resampler.interval().to_bits());
        let fingerprint = Fingerprint::of(series);
        match self.entries.entry(key) {
            Entry::Occupied(mut entry) => {
                let (cached_fp, cached) = entry.get();
                if *cached_fp == fingerprint && cached.schema() == schema {
                    self.hits += 1;
                    trace!(sensor = series.name(), "resample cache hit");
                    return Ok(&entry.into_mut().1);
                }
                let fresh = resampler.resample(series, schema)?;
                self.misses += 1;
                entry.insert((fingerprint, fresh));
                Ok(&entry.into_mut().1)
            }
            Entry::Vacant(entry) => {
                let fresh = resampler.resample(series, schema)?;
                self.misses += 1;
                Ok(&entry.insert((fingerprint, fresh)).1)
            }
        }
    }

    /// Drops every cached interval of `sensor`. Returns how many were removed.
    pub fn invalidate(&mut self, sensor: &str) -> usize {
        let before = self.entries.len();
        self.entries.retain(|(name, _), _| name != sensor);
        before - self.entries.len()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn hits(&self) -> usize {
        self.hits
    }

    pub fn misses(&self) -> usize {
        self.misses
    }
}
