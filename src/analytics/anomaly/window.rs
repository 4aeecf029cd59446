//! Window Store
//!
//! Bounded, time-ordered history per (entity, property, algorithm). The store
//! is the only place where window entries are mutated.

use super::stats;
use super::types::{Algorithm, Sample};
use crate::config::SlidingWindows;
use std::collections::HashMap;
use tracing::debug;

/// Structured key of a window entry
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct WindowKey {
    pub entity_id: String,
    pub property: String,
    pub algorithm: Algorithm,
}

impl WindowKey {
    pub fn new(
        entity_id: impl Into<String>,
        property: impl Into<String>,
        algorithm: Algorithm,
    ) -> Self {
        Self {
            entity_id: entity_id.into(),
            property: property.into(),
            algorithm,
        }
    }
}

/// Population state of a window entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WindowState {
    /// Never populated; the next reading reseeds the window
    Uninitialized,
    /// Populated from historical data, no live sample yet
    Backfilled,
    /// Reset or appended at least once from live readings
    Live,
}

/// Rolling mean/std kept for z-score bindings
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Moments {
    pub mean: f64,
    pub std: f64,
}

#[derive(Debug, Clone)]
pub struct WindowEntry {
    samples: Vec<Sample>,
    state: WindowState,
    sample_count: Option<usize>,
    moments: Option<Moments>,
}

impl WindowEntry {
    fn cold() -> Self {
        Self {
            samples: Vec::new(),
            state: WindowState::Uninitialized,
            sample_count: None,
            moments: None,
        }
    }

    pub fn samples(&self) -> &[Sample] {
        &self.samples
    }

    pub fn values(&self) -> Vec<f64> {
        self.samples.iter().map(|s| s.value).collect()
    }

    /// Values of the most recent `n` samples, oldest first
    pub fn last_values(&self, n: usize) -> Vec<f64> {
        let start = self.samples.len().saturating_sub(n);
        self.samples[start..].iter().map(|s| s.value).collect()
    }

    pub fn len(&self) -> usize {
        self.samples.len()
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }

    pub fn state(&self) -> WindowState {
        self.state
    }

    pub fn is_cold(&self) -> bool {
        self.state == WindowState::Uninitialized
    }

    pub fn sample_count(&self) -> Option<usize> {
        self.sample_count
    }

    pub fn moments(&self) -> Option<Moments> {
        self.moments
    }

    /// Insert keeping ascending order; an existing timestamp wins
    fn insert(&mut self, sample: Sample) -> bool {
        match self
            .samples
            .binary_search_by(|s| s.timestamp.cmp(&sample.timestamp))
        {
            Ok(_) => false,
            Err(pos) => {
                self.samples.insert(pos, sample);
                true
            }
        }
    }

    fn trim(&mut self, cap: usize) {
        let cap = cap.max(1);
        if self.samples.len() > cap {
            let excess = self.samples.len() - cap;
            self.samples.drain(..excess);
        }
    }

    fn recompute_moments(&mut self, span: usize) {
        let values = self.last_values(span);
        self.moments = match (stats::mean(&values), stats::std_dev(&values)) {
            (Some(mean), Some(std)) => Some(Moments { mean, std }),
            _ => None,
        };
    }
}

/// Sizing parameters shared by every entry of a store
#[derive(Debug, Clone)]
pub struct WindowSettings {
    /// Maximum number of samples retained per entry
    pub query_points: usize,
    pub sliding_windows: SlidingWindows,
}

/// Keyed window storage
#[derive(Debug, Clone)]
pub struct WindowStore {
    settings: WindowSettings,
    entries: HashMap<WindowKey, WindowEntry>,
}

impl WindowStore {
    pub fn new(settings: WindowSettings) -> Self {
        Self {
            settings,
            entries: HashMap::new(),
        }
    }

    pub fn settings(&self) -> &WindowSettings {
        &self.settings
    }

    pub fn get(&self, key: &WindowKey) -> Option<&WindowEntry> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &WindowKey) -> bool {
        self.entries.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Number of samples the z-score moments are computed over
    fn moment_span(&self, property: &str) -> usize {
        self.settings.sliding_windows.get(property) * 2 + 2
    }

    /// Create an entry, optionally populated from historical rows.
    ///
    /// Without rows (or with an empty row set) the entry starts cold. For
    /// z-score bindings the initial moments cover the whole backfilled set.
    pub fn initialize(&mut self, key: WindowKey, backfill: Option<&[Sample]>) {
        let mut entry = WindowEntry::cold();

        if let Some(rows) = backfill.filter(|rows| !rows.is_empty()) {
            for row in rows {
                entry.insert(*row);
            }
            entry.trim(self.settings.query_points);
            entry.state = WindowState::Backfilled;
            entry.sample_count = Some(entry.len());
            if key.algorithm == Algorithm::Zscore {
                entry.recompute_moments(entry.len());
            }
            debug!(
                entity = %key.entity_id,
                property = %key.property,
                samples = entry.len(),
                "window backfilled"
            );
        }

        self.entries.insert(key, entry);
    }

    /// Append a raw sample, de-duplicating and trimming the entry.
    pub fn append(&mut self, key: &WindowKey, sample: Sample) {
        let cap = self.settings.query_points;
        let span = self.moment_span(&key.property);
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(WindowEntry::cold);

        if !entry.insert(sample) {
            debug!(
                entity = %key.entity_id,
                property = %key.property,
                timestamp = %sample.timestamp,
                "duplicate timestamp ignored"
            );
        }
        entry.trim(cap);
        entry.state = WindowState::Live;
        entry.sample_count = Some(entry.len());
        if key.algorithm == Algorithm::Zscore {
            entry.recompute_moments(span);
        }
    }

    /// Discard the history and seed the entry with a single sample.
    ///
    /// Z-score moments become the degenerate `mean = std = value` estimate.
    pub fn reset(&mut self, key: &WindowKey, sample: Sample) {
        let entry = self
            .entries
            .entry(key.clone())
            .or_insert_with(WindowEntry::cold);

        entry.samples.clear();
        entry.samples.push(sample);
        entry.state = WindowState::Live;
        entry.sample_count = Some(1);
        entry.moments = match key.algorithm {
            Algorithm::Zscore => Some(Moments {
                mean: sample.value,
                std: sample.value,
            }),
            _ => None,
        };
        debug!(entity = %key.entity_id, property = %key.property, "window reset");
    }
}
