//! HTTP client for the NGSI-LD broker and its temporal API

use super::{EntitySink, HistoricalSeries, HistoryProvider, SubscriptionRegistrar};
use crate::config::{AnalysisDefinition, BrokerConfig};
use crate::error::{QaError, Result};
use async_trait::async_trait;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use reqwest::{RequestBuilder, StatusCode};
use serde_json::{json, Value};
use tracing::{debug, info, warn};
use url::Url;

const LD_JSON: &str = "application/ld+json";

pub struct BrokerClient {
    config: BrokerConfig,
    client: reqwest::Client,
}

impl BrokerClient {
    pub fn new(config: BrokerConfig) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(config.timeout_seconds))
            .build()
            .map_err(|e| QaError::Config(e.to_string()))?;

        Ok(Self { config, client })
    }

    /// `base` with `segments` appended as individual, escaped path segments
    fn endpoint(base: &str, segments: &[&str]) -> Result<Url> {
        let mut url =
            Url::parse(base).map_err(|e| QaError::Config(format!("invalid URL {base}: {e}")))?;
        url.path_segments_mut()
            .map_err(|_| QaError::Config(format!("URL cannot be a base: {base}")))?
            .pop_if_empty()
            .extend(segments);
        Ok(url)
    }

    fn with_tenant(&self, request: RequestBuilder, header: &str) -> RequestBuilder {
        match &self.config.tenant {
            Some(tenant) => request.header(header, tenant),
            None => request,
        }
    }

    /// Body of a subscription feeding `analysis` to `notification_url`
    fn subscription_body(&self, analysis: &AnalysisDefinition, notification_url: &str) -> Value {
        let mut attributes = analysis.analyzed_properties.clone();
        attributes.extend(analysis.not_corrected_properties.iter().cloned());

        let entities = match &analysis.entity_ids {
            Some(ids) => ids
                .iter()
                .map(|id| json!({"id": id, "type": analysis.entity_type}))
                .collect(),
            None => vec![json!({"type": analysis.entity_type})],
        };

        json!({
            "id": analysis.subscription_id,
            "type": "Subscription",
            "description": format!("{} quality analysis of {}", analysis.algorithm, analysis.entity_type),
            "entities": entities,
            "watchedAttributes": analysis.analyzed_properties,
            "notification": {
                "attributes": attributes,
                "format": "normalized",
                "endpoint": {
                    "uri": notification_url,
                    "accept": "application/json"
                }
            },
            "@context": [self.config.ngsi_ld_context]
        })
    }
}

#[async_trait]
impl HistoryProvider for BrokerClient {
    async fn last_n(&self, entity_id: &str, n: usize) -> Result<Option<HistoricalSeries>> {
        let mut url = Self::endpoint(&self.config.history_url, &["v2", "entities", entity_id])?;
        url.query_pairs_mut().append_pair("lastN", &n.to_string());
        debug!(%url, "querying history");

        let response = self
            .with_tenant(self.client.get(url), "Fiware-Service")
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            return Err(QaError::Backfill(format!("{status} - {error_text}")));
        }

        let series: HistoricalSeries = response.json().await?;
        Ok(Some(series))
    }
}

#[async_trait]
impl EntitySink for BrokerClient {
    async fn upsert(&self, documents: Vec<Value>) -> Result<()> {
        if documents.is_empty() {
            return Ok(());
        }
        let url = Self::endpoint(
            &self.config.base_url,
            &["ngsi-ld", "v1", "entityOperations", "upsert"],
        )?;

        let response = self
            .with_tenant(self.client.post(url), "NGSILD-Tenant")
            .header(CONTENT_TYPE, LD_JSON)
            .body(serde_json::to_vec(&documents)?)
            .send()
            .await?;

        let status = response.status();
        // 207 carries per-entity errors
        if status.is_success() && status != StatusCode::MULTI_STATUS {
            debug!(documents = documents.len(), %status, "upsert accepted");
            Ok(())
        } else {
            let error_text = response.text().await.unwrap_or_default();
            Err(QaError::Upsert(format!("{status} - {error_text}")))
        }
    }
}

#[async_trait]
impl SubscriptionRegistrar for BrokerClient {
    async fn register(&self, analysis: &AnalysisDefinition, notification_url: &str) -> Result<()> {
        let url = Self::endpoint(&self.config.base_url, &["ngsi-ld", "v1", "subscriptions"])?;
        let body = self.subscription_body(analysis, notification_url);

        let response = self
            .with_tenant(self.client.post(url), "NGSILD-Tenant")
            .header(CONTENT_TYPE, LD_JSON)
            .header(ACCEPT, "application/json")
            .body(serde_json::to_vec(&body)?)
            .send()
            .await?;

        match response.status() {
            status if status.is_success() => {
                info!(subscription = %analysis.subscription_id, "subscription registered");
                Ok(())
            }
            StatusCode::CONFLICT => {
                warn!(subscription = %analysis.subscription_id, "subscription already exists");
                Ok(())
            }
            status => {
                let error_text = response.text().await.unwrap_or_default();
                Err(QaError::Subscription(format!(
                    "{}: {status} - {error_text}",
                    analysis.subscription_id
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::anomaly::Algorithm;

    #[test]
    fn test_endpoint_escapes_urn_segment() {
        let url = BrokerClient::endpoint(
            "http://quantumleap:8668/",
            &["v2", "entities", "urn:ngsi-ld:AquaSpice:MeasurementStation:MS01"],
        )
        .unwrap();
        assert_eq!(url.host_str(), Some("quantumleap"));
        assert!(url
            .path()
            .ends_with("/v2/entities/urn:ngsi-ld:AquaSpice:MeasurementStation:MS01"));
        assert!(!url.path().contains("//"));
    }

    #[test]
    fn test_endpoint_rejects_invalid_base() {
        assert!(BrokerClient::endpoint("not a url", &["v2"]).is_err());
    }

    #[test]
    fn test_subscription_body() {
        let client = BrokerClient::new(BrokerConfig::default()).unwrap();
        let analysis = AnalysisDefinition {
            subscription_id: "urn:ngsi-ld:Subscription:z".to_string(),
            algorithm: Algorithm::Zscore,
            entity_type: "MeasurementStation".to_string(),
            analyzed_properties: vec!["temperature".to_string()],
            not_corrected_properties: vec!["location".to_string()],
            anomaly_type_id: "A1".to_string(),
            entity_ids: None,
        };

        let body = client.subscription_body(&analysis, "http://qa:8080/notify");
        assert_eq!(body["id"], "urn:ngsi-ld:Subscription:z");
        assert_eq!(body["entities"][0]["type"], "MeasurementStation");
        assert_eq!(body["watchedAttributes"], json!(["temperature"]));
        assert_eq!(
            body["notification"]["attributes"],
            json!(["temperature", "location"])
        );
        assert_eq!(
            body["notification"]["endpoint"]["uri"],
            "http://qa:8080/notify"
        );
    }
}
