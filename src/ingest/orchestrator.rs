//! Ingestion orchestrator
//!
//! Resolves a notification to its analysis, keeps the per-entity windows and
//! anomaly state, runs the bound detector on every analyzed property and
//! hands the resulting documents to the sink.

use super::outbound::{DocumentBuilder, PropertyOutcome};
use super::types::{Acknowledgement, Notification, Reading};
use crate::analytics::anomaly::{
    stats, Algorithm, AnomalyTracker, DetectorSet, Sample, Transition,
    WindowEntry, WindowKey, WindowSettings, WindowStore, MIN_THRESHOLD_SAMPLES,
};
use crate::broker::{EntitySink, HistoricalSeries, HistoryProvider};
use crate::config::{AnalysisDefinition, EmissionPolicy, QaConfig};
use crate::monitoring::LastSeenRegistry;
use chrono::{DateTime, Duration, Utc};
use futures::future::join_all;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, error, info, info_span, warn, Instrument};

/// Everything known about one entity
#[derive(Debug)]
struct EntityState {
    windows: WindowStore,
    tracker: AnomalyTracker,
    /// Latest observedAt per subscription, for gap detection
    last_observed: HashMap<String, DateTime<Utc>>,
}

impl EntityState {
    fn new(settings: WindowSettings) -> Self {
        Self {
            windows: WindowStore::new(settings),
            tracker: AnomalyTracker::new(),
            last_observed: HashMap::new(),
        }
    }
}

pub struct Orchestrator {
    config: Arc<QaConfig>,
    detectors: DetectorSet,
    settings: WindowSettings,
    documents: DocumentBuilder,
    entities: RwLock<HashMap<String, Arc<Mutex<EntityState>>>>,
    last_seen: Arc<LastSeenRegistry>,
    history: Arc<dyn HistoryProvider>,
    sink: Arc<dyn EntitySink>,
}

impl Orchestrator {
    pub fn new(
        config: Arc<QaConfig>,
        history: Arc<dyn HistoryProvider>,
        sink: Arc<dyn EntitySink>,
        last_seen: Arc<LastSeenRegistry>,
    ) -> Self {
        let settings = WindowSettings {
            query_points: config.detection.query_points,
            sliding_windows: config.detection.sliding_windows(),
        };

        Self {
            detectors: DetectorSet::from_config(&config),
            documents: DocumentBuilder::new(&config.broker),
            settings,
            entities: RwLock::new(HashMap::new()),
            last_seen,
            history,
            sink,
            config,
        }
    }

    pub fn config(&self) -> &QaConfig {
        &self.config
    }

    pub fn last_seen(&self) -> Arc<LastSeenRegistry> {
        self.last_seen.clone()
    }

    /// Process a notification batch.
    ///
    /// Readings run concurrently; readings of the same entity serialise on
    /// that entity's lock. The batch is acknowledged whatever happens to the
    /// individual readings.
    pub async fn process_notification(&self, notification: Notification) -> Acknowledgement {
        let Some(analysis) = self.config.analysis_for(&notification.subscription_id) else {
            warn!(
                subscription = %notification.subscription_id,
                "unknown subscription, notification ignored"
            );
            return Acknowledgement::success();
        };

        debug!(
            subscription = %analysis.subscription_id,
            readings = notification.data.len(),
            "processing notification"
        );

        let readings: Vec<Reading> = notification
            .data
            .into_iter()
            .enumerate()
            .filter_map(|(index, entry)| match serde_json::from_value(entry) {
                Ok(reading) => Some(reading),
                Err(e) => {
                    warn!(index, error = %e, "malformed reading skipped");
                    None
                }
            })
            .collect();

        join_all(
            readings
                .iter()
                .map(|reading| self.process_reading(analysis, reading)),
        )
        .await;

        Acknowledgement::success()
    }

    /// Analyze one reading and upsert the produced documents
    pub async fn process_reading(&self, analysis: &AnalysisDefinition, reading: &Reading) {
        let span = info_span!(
            "reading",
            entity = %reading.id,
            subscription = %analysis.subscription_id
        );

        async {
            if !analysis.accepts_entity(&reading.id) {
                debug!("entity not in allow-list, reading skipped");
                return;
            }

            self.last_seen
                .touch(&reading.id, &reading.entity_type, Utc::now())
                .await;

            let documents = self.analyze(analysis, reading).await;
            if documents.is_empty() {
                return;
            }

            // entity lock is released at this point
            if let Err(e) = self.sink.upsert(documents).await {
                error!(error = %e, "upsert failed, documents dropped");
            }
        }
        .instrument(span)
        .await
    }

    async fn entity_slot(&self, entity_id: &str) -> Arc<Mutex<EntityState>> {
        if let Some(slot) = self.entities.read().await.get(entity_id) {
            return slot.clone();
        }

        let mut entities = self.entities.write().await;
        entities
            .entry(entity_id.to_string())
            .or_insert_with(|| Arc::new(Mutex::new(EntityState::new(self.settings.clone()))))
            .clone()
    }

    async fn backfill(&self, entity_id: &str) -> Option<HistoricalSeries> {
        let detection = &self.config.detection;
        if !detection.backfill_on_first_sight {
            return None;
        }

        match self.history.last_n(entity_id, detection.query_points).await {
            Ok(Some(series)) if !series.is_empty() => {
                info!(rows = series.index.len(), "history loaded");
                Some(series)
            }
            Ok(_) => {
                info!("no history available, starting with empty windows");
                None
            }
            Err(e) => {
                warn!(error = %e, "backfill failed, starting with empty windows");
                None
            }
        }
    }

    /// Run detection under the entity lock and build the outbound documents
    async fn analyze(&self, analysis: &AnalysisDefinition, reading: &Reading) -> Vec<Value> {
        let detection = &self.config.detection;
        let algorithm = analysis.algorithm;

        let samples: Vec<(&String, Sample)> = analysis
            .analyzed_properties
            .iter()
            .filter_map(|property| match reading.sample(property) {
                Ok(sample) => Some((property, sample)),
                Err(e) => {
                    warn!(property = %property, error = %e, "skipping malformed property");
                    None
                }
            })
            .collect();
        let observed_at = reading.observed_at(&analysis.analyzed_properties);

        let slot = self.entity_slot(&reading.id).await;
        let mut guard = slot.lock().await;
        let state = &mut *guard;

        let needs_reset = match (
            state.last_observed.get(&analysis.subscription_id),
            observed_at,
        ) {
            (Some(previous), Some(current)) => Duration::try_minutes(detection.gap_reset_minutes)
                .is_some_and(|limit| current.signed_duration_since(*previous) > limit),
            _ => false,
        };
        if needs_reset {
            info!(
                gap_reset_minutes = detection.gap_reset_minutes,
                "observation gap exceeded, resetting windows"
            );
        }
        if let Some(current) = observed_at {
            state
                .last_observed
                .insert(analysis.subscription_id.clone(), current);
        }

        let unseen: Vec<WindowKey> = analysis
            .analyzed_properties
            .iter()
            .map(|property| WindowKey::new(&reading.id, property, algorithm))
            .filter(|key| !state.windows.contains(key))
            .collect();
        if !unseen.is_empty() {
            let history = self.backfill(&reading.id).await;
            for key in unseen {
                let rows = history.as_ref().map(|h| h.samples(&key.property));
                state.windows.initialize(key, rows.as_deref());
            }
        }

        let now = Utc::now();
        let mut documents = Vec::new();
        let mut outcomes = Vec::with_capacity(samples.len());

        for (property, sample) in samples {
            let key = WindowKey::new(&reading.id, property, algorithm);

            let cold = state.windows.get(&key).map_or(true, WindowEntry::is_cold);
            if cold || needs_reset {
                state.windows.reset(&key, sample);
            }
            let Some(entry) = state.windows.get(&key) else {
                continue;
            };

            let verdict = self.detectors.detect(algorithm, entry, sample.value, property);
            let corrected = if verdict.is_outlier {
                let value = self.corrected_value(algorithm, entry, property, sample.value);
                info!(property = %property, raw = sample.value, corrected = value, "outlier corrected");
                value
            } else {
                sample.value
            };

            let transition =
                state
                    .tracker
                    .observe(&reading.id, property, verdict.is_outlier, sample.timestamp);
            state.windows.append(&key, sample);

            if let Some(since) = self.emission_since(transition) {
                documents.push(self.documents.anomaly(
                    analysis,
                    &reading.id,
                    property,
                    since,
                    sample.timestamp,
                    now,
                ));
            }

            outcomes.push(PropertyOutcome {
                property: property.clone(),
                sample,
                verdict,
                corrected,
                transition,
            });
        }

        if outcomes.is_empty() {
            warn!("no analyzable property in reading");
            return documents;
        }

        documents.push(self.documents.reading_document(analysis, reading, &outcomes));
        documents
    }

    /// Substitute for an outlier, computed from the stored raw history
    fn corrected_value(
        &self,
        algorithm: Algorithm,
        entry: &WindowEntry,
        property: &str,
        raw: f64,
    ) -> f64 {
        let estimate = match algorithm {
            Algorithm::Zscore => entry.moments().map(|m| m.mean),
            Algorithm::Hampel => {
                stats::mean(&entry.last_values(self.settings.sliding_windows.get(property)))
            }
            Algorithm::Threshold => stats::mean(&entry.last_values(MIN_THRESHOLD_SAMPLES)),
        };

        stats::round_to(
            estimate.unwrap_or(raw),
            self.config.detection.precision.for_algorithm(algorithm),
        )
    }

    /// Start of the streak an anomaly record must be emitted for, if any
    fn emission_since(&self, transition: Transition) -> Option<DateTime<Utc>> {
        match (self.config.detection.anomaly_emission, transition) {
            (EmissionPolicy::EveryOutlier, transition) => transition.open_since(),
            (EmissionPolicy::OnTransition, Transition::Opened { since }) => Some(since),
            (EmissionPolicy::OnTransition, _) => None,
        }
    }

    /// Copy of one window entry
    pub async fn window(&self, key: &WindowKey) -> Option<WindowEntry> {
        let slot = self.entities.read().await.get(&key.entity_id).cloned()?;
        let state = slot.lock().await;
        state.windows.get(key).cloned()
    }

    /// Start of the open anomaly streak of `(entity_id, property)`
    pub async fn anomaly_since(&self, entity_id: &str, property: &str) -> Option<DateTime<Utc>> {
        let slot = self.entities.read().await.get(entity_id).cloned()?;
        let state = slot.lock().await;
        state.tracker.since(entity_id, property)
    }

    /// Number of entities with state
    pub async fn entity_count(&self) -> usize {
        self.entities.read().await.len()
    }
}
