//! In-memory broker collaborators, used for dry runs and tests

use super::{EntitySink, HistoricalSeries, HistoryProvider, SubscriptionRegistrar};
use crate::config::AnalysisDefinition;
use crate::error::{QaError, Result};
use async_trait::async_trait;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::sync::RwLock;
use tracing::debug;

/// Serves canned history, or fails every query when unavailable
#[derive(Debug, Default)]
pub struct StaticHistory {
    series: HashMap<String, HistoricalSeries>,
    unavailable: bool,
    queries: AtomicUsize,
}

impl StaticHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_series(mut self, entity_id: impl Into<String>, series: HistoricalSeries) -> Self {
        self.series.insert(entity_id.into(), series);
        self
    }

    pub fn unavailable() -> Self {
        Self {
            unavailable: true,
            ..Self::default()
        }
    }

    /// Number of `last_n` calls served so far
    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl HistoryProvider for StaticHistory {
    async fn last_n(&self, entity_id: &str, n: usize) -> Result<Option<HistoricalSeries>> {
        self.queries.fetch_add(1, Ordering::SeqCst);
        if self.unavailable {
            return Err(QaError::Backfill("history store unavailable".to_string()));
        }

        Ok(self.series.get(entity_id).map(|series| {
            let skip = series.index.len().saturating_sub(n);
            HistoricalSeries {
                entity_id: series.entity_id.clone(),
                index: series.index[skip..].to_vec(),
                attributes: series
                    .attributes
                    .iter()
                    .map(|a| super::HistoricalAttribute {
                        attr_name: a.attr_name.clone(),
                        values: a.values.iter().skip(skip).cloned().collect(),
                    })
                    .collect(),
            }
        }))
    }
}

/// Keeps every upserted document in arrival order
#[derive(Debug, Default)]
pub struct RecordingSink {
    documents: RwLock<Vec<Value>>,
}

impl RecordingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn documents(&self) -> Vec<Value> {
        self.documents.read().await.clone()
    }

    /// Documents whose `type` equals `kind`
    pub async fn of_type(&self, kind: &str) -> Vec<Value> {
        self.documents
            .read()
            .await
            .iter()
            .filter(|doc| doc["type"] == kind)
            .cloned()
            .collect()
    }

    pub async fn clear(&self) {
        self.documents.write().await.clear();
    }
}

#[async_trait]
impl EntitySink for RecordingSink {
    async fn upsert(&self, documents: Vec<Value>) -> Result<()> {
        debug!(documents = documents.len(), "recording upsert");
        self.documents.write().await.extend(documents);
        Ok(())
    }
}

/// Accepts every registration and remembers the subscription ids
#[derive(Debug, Default)]
pub struct RecordingRegistrar {
    registered: RwLock<Vec<String>>,
}

impl RecordingRegistrar {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn registered(&self) -> Vec<String> {
        self.registered.read().await.clone()
    }
}

#[async_trait]
impl SubscriptionRegistrar for RecordingRegistrar {
    async fn register(&self, analysis: &AnalysisDefinition, _notification_url: &str) -> Result<()> {
        self.registered
            .write()
            .await
            .push(analysis.subscription_id.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::broker::HistoricalAttribute;
    use serde_json::json;

    #[tokio::test]
    async fn test_static_history_returns_last_rows() {
        let series = HistoricalSeries {
            entity_id: None,
            index: vec![
                "2024-03-01T10:00:00Z".to_string(),
                "2024-03-01T10:01:00Z".to_string(),
                "2024-03-01T10:02:00Z".to_string(),
            ],
            attributes: vec![HistoricalAttribute {
                attr_name: "ph".to_string(),
                values: vec![json!(7.0), json!(7.1), json!(7.2)],
            }],
        };
        let history = StaticHistory::new().with_series("urn:a", series);

        let last = history.last_n("urn:a", 2).await.unwrap().unwrap();
        assert_eq!(last.index.len(), 2);
        assert_eq!(last.attributes[0].values, vec![json!(7.1), json!(7.2)]);
        assert!(history.last_n("urn:b", 2).await.unwrap().is_none());
        assert_eq!(history.queries(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_history_fails() {
        let history = StaticHistory::unavailable();
        assert!(history.last_n("urn:a", 10).await.is_err());
    }

    #[tokio::test]
    async fn test_recording_sink() {
        let sink = RecordingSink::new();
        sink.upsert(vec![json!({"type": "Anomaly"}), json!({"type": "X"})])
            .await
            .unwrap();
        assert_eq!(sink.documents().await.len(), 2);
        assert_eq!(sink.of_type("Anomaly").await.len(), 1);
    }
}
