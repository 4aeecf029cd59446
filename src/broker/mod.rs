//! Context broker collaborators
//!
//! The detection core talks to the outside world only through the traits in
//! this module: historical queries for backfill, upserts of produced
//! documents, and subscription registration at start-up.

mod client;
mod memory;

pub use client::BrokerClient;
pub use memory::{RecordingRegistrar, RecordingSink, StaticHistory};

use crate::analytics::anomaly::Sample;
use crate::config::AnalysisDefinition;
use crate::error::Result;
use crate::ingest::{numeric_value, parse_timestamp};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{error, info};

/// `lastN` answer of the temporal API for one entity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalSeries {
    #[serde(default)]
    pub entity_id: Option<String>,
    #[serde(default)]
    pub index: Vec<String>,
    #[serde(default)]
    pub attributes: Vec<HistoricalAttribute>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoricalAttribute {
    pub attr_name: String,
    #[serde(default)]
    pub values: Vec<Value>,
}

impl HistoricalSeries {
    /// Samples of one attribute; rows with a null or non-numeric value or an
    /// unparsable index are dropped
    pub fn samples(&self, property: &str) -> Vec<Sample> {
        let Some(attribute) = self.attributes.iter().find(|a| a.attr_name == property) else {
            return Vec::new();
        };

        self.index
            .iter()
            .zip(attribute.values.iter())
            .filter_map(|(ts, value)| {
                Some(Sample::new(parse_timestamp(ts)?, numeric_value(value)?))
            })
            .collect()
    }

    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }
}

/// Source of historical readings used to warm up cold windows
#[async_trait]
pub trait HistoryProvider: Send + Sync {
    /// The `n` most recent rows of `entity_id`; `None` when the entity is
    /// unknown to the history store
    async fn last_n(&self, entity_id: &str, n: usize) -> Result<Option<HistoricalSeries>>;
}

/// Destination of corrected readings and anomaly records
#[async_trait]
pub trait EntitySink: Send + Sync {
    async fn upsert(&self, documents: Vec<Value>) -> Result<()>;
}

/// Registers the broker subscription feeding one analysis
#[async_trait]
pub trait SubscriptionRegistrar: Send + Sync {
    async fn register(&self, analysis: &AnalysisDefinition, notification_url: &str) -> Result<()>;
}

/// Register every analysis subscription; failures are logged and skipped.
///
/// Returns the number of subscriptions registered.
pub async fn register_all(
    registrar: &dyn SubscriptionRegistrar,
    analyses: &[AnalysisDefinition],
    notification_url: &str,
) -> usize {
    let mut registered = 0;
    for analysis in analyses {
        match registrar.register(analysis, notification_url).await {
            Ok(()) => registered += 1,
            Err(e) => error!(
                subscription = %analysis.subscription_id,
                error = %e,
                "subscription registration failed"
            ),
        }
    }
    info!(registered, total = analyses.len(), "subscriptions registered");
    registered
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::anomaly::Algorithm;
    use crate::error::QaError;
    use serde_json::json;

    fn analysis(subscription_id: &str) -> AnalysisDefinition {
        AnalysisDefinition {
            subscription_id: subscription_id.to_string(),
            algorithm: Algorithm::Zscore,
            entity_type: "MeasurementStation".to_string(),
            analyzed_properties: vec!["temperature".to_string()],
            not_corrected_properties: vec![],
            anomaly_type_id: "A1".to_string(),
            entity_ids: None,
        }
    }

    struct RejectingRegistrar;

    #[async_trait]
    impl SubscriptionRegistrar for RejectingRegistrar {
        async fn register(&self, analysis: &AnalysisDefinition, _url: &str) -> Result<()> {
            if analysis.subscription_id.ends_with(":bad") {
                return Err(QaError::Subscription("400 Bad Request".to_string()));
            }
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_register_all_records_every_analysis() {
        let registrar = RecordingRegistrar::new();
        let analyses = vec![analysis("urn:sub:z"), analysis("urn:sub:h")];

        let count = register_all(&registrar, &analyses, "http://qa:8080/notify").await;

        assert_eq!(count, 2);
        assert_eq!(registrar.registered().await, vec!["urn:sub:z", "urn:sub:h"]);
    }

    #[tokio::test]
    async fn test_register_all_continues_after_failure() {
        let analyses = vec![analysis("urn:sub:bad"), analysis("urn:sub:ok")];

        let count = register_all(&RejectingRegistrar, &analyses, "http://qa:8080/notify").await;

        assert_eq!(count, 1);
    }

    #[test]
    fn test_series_samples_skip_bad_rows() {
        let series: HistoricalSeries = serde_json::from_value(json!({
            "entityId": "urn:ngsi-ld:AquaSpice:MeasurementStation:MS01",
            "index": [
                "2024-03-01T10:00:00.000+00:00",
                "2024-03-01T10:01:00.000+00:00",
                "not a date",
                "2024-03-01T10:03:00.000+00:00"
            ],
            "attributes": [
                {"attrName": "temperature", "values": [10.0, null, 12.0, "13.5"]},
                {"attrName": "ph", "values": [7.0, 7.1, 7.2, 7.3]}
            ]
        }))
        .unwrap();

        let samples = series.samples("temperature");
        let values: Vec<f64> = samples.iter().map(|s| s.value).collect();
        assert_eq!(values, vec![10.0, 13.5]);
        assert_eq!(series.samples("ph").len(), 3);
        assert!(series.samples("salinity").is_empty());
    }
}
