//! Cadence monitor
//!
//! Periodically reports entities that have not delivered a reading for
//! longer than the configured threshold.

use super::last_seen::LastSeenRegistry;
use crate::broker::EntitySink;
use crate::config::CadenceConfig;
use crate::ingest::DocumentBuilder;
use chrono::{DateTime, Utc};
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{interval_at, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

pub struct CadenceMonitor {
    config: CadenceConfig,
    registry: Arc<LastSeenRegistry>,
    sink: Arc<dyn EntitySink>,
    documents: DocumentBuilder,
}

impl CadenceMonitor {
    pub fn new(
        config: CadenceConfig,
        registry: Arc<LastSeenRegistry>,
        sink: Arc<dyn EntitySink>,
        documents: DocumentBuilder,
    ) -> Self {
        Self {
            config,
            registry,
            sink,
            documents,
        }
    }

    /// Check every known entity against `now` and return the late ones.
    ///
    /// Each late entity produces one cadence anomaly record unless emission
    /// is disabled.
    pub async fn sweep(&self, now: DateTime<Utc>) -> Vec<String> {
        let threshold = self.config.threshold_minutes as f64;
        let snapshot = self.registry.snapshot().await;
        info!(
            entities = snapshot.len(),
            threshold_minutes = self.config.threshold_minutes,
            "cadence check"
        );

        let mut late: Vec<String> = Vec::new();
        let mut documents = Vec::new();

        for (entity_id, seen) in snapshot {
            let elapsed = (now - seen.received_at).num_seconds() as f64 / 60.0;
            if elapsed <= threshold {
                continue;
            }

            warn!(
                entity = %entity_id,
                elapsed_minutes = elapsed,
                "no data received within cadence threshold"
            );
            if self.config.emit_anomalies {
                documents.push(self.documents.cadence_anomaly(
                    &entity_id,
                    &seen.entity_type,
                    seen.received_at,
                    self.config.threshold_minutes,
                    now,
                ));
            }
            late.push(entity_id);
        }

        if !documents.is_empty() {
            if let Err(e) = self.sink.upsert(documents).await {
                error!(error = %e, "failed to upsert cadence anomalies");
            }
        }

        late.sort();
        late
    }

    /// Run `sweep` every `check_interval_secs` until `cancel` fires
    pub fn spawn(self: Arc<Self>, cancel: CancellationToken) -> JoinHandle<()> {
        let period = Duration::from_secs(self.config.check_interval_secs);

        tokio::spawn(async move {
            let mut ticker = interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        debug!("cadence monitor stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        self.sweep(Utc::now()).await;
                    }
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::RecordingSink;
    use crate::config::BrokerConfig;
    use chrono::{Duration as ChronoDuration, TimeZone};

    fn monitor(emit: bool) -> (CadenceMonitor, Arc<LastSeenRegistry>, Arc<RecordingSink>) {
        let registry = Arc::new(LastSeenRegistry::new());
        let sink = Arc::new(RecordingSink::new());
        let config = CadenceConfig {
            emit_anomalies: emit,
            ..CadenceConfig::default()
        };
        let monitor = CadenceMonitor::new(
            config,
            registry.clone(),
            sink.clone(),
            DocumentBuilder::new(&BrokerConfig::default()),
        );
        (monitor, registry, sink)
    }

    #[tokio::test]
    async fn test_sweep_reports_late_entities() {
        let (monitor, registry, sink) = monitor(true);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();

        registry
            .touch("urn:ngsi-ld:AquaSpice:Dock:D1", "Dock", now - ChronoDuration::minutes(30))
            .await;
        registry
            .touch("urn:ngsi-ld:AquaSpice:Dock:D2", "Dock", now - ChronoDuration::minutes(5))
            .await;
        registry
            .touch("urn:ngsi-ld:AquaSpice:Dock:D3", "Dock", now - ChronoDuration::minutes(20))
            .await;

        let late = monitor.sweep(now).await;
        assert_eq!(late, vec!["urn:ngsi-ld:AquaSpice:Dock:D1".to_string()]);

        let docs = sink.documents().await;
        assert_eq!(docs.len(), 1);
        assert_eq!(docs[0]["id"], "urn:ngsi-ld:AquaSpice:DockCadency:D1");
    }

    #[tokio::test]
    async fn test_sweep_log_only() {
        let (monitor, registry, sink) = monitor(false);
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 0, 0).unwrap();
        registry.touch("urn:a", "Dock", now - ChronoDuration::hours(2)).await;

        assert_eq!(monitor.sweep(now).await.len(), 1);
        assert!(sink.documents().await.is_empty());
    }

    #[tokio::test]
    async fn test_spawned_monitor_stops_on_cancel() {
        let (monitor, _, _) = monitor(true);
        let cancel = CancellationToken::new();
        let handle = Arc::new(monitor).spawn(cancel.clone());

        cancel.cancel();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .expect("monitor did not stop")
            .unwrap();
    }
}
