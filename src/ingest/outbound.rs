//! Outbound NGSI-LD documents
//!
//! Corrected/flagged readings and anomaly records, built from the outcome
//! of one reading.

use super::types::{format_timestamp, short_id, Reading};
use crate::analytics::anomaly::{Algorithm, Sample, ThresholdReason, Transition, Verdict};
use crate::config::{AnalysisDefinition, BrokerConfig};
use chrono::{DateTime, Utc};
use serde_json::{json, Map, Value};

/// Classification of one analyzed property of a reading
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyOutcome {
    pub property: String,
    pub sample: Sample,
    pub verdict: Verdict,
    /// Substitute value; equals the raw value unless the sample is an outlier
    pub corrected: f64,
    pub transition: Transition,
}

/// `measurementStation` spellings collapse to `MeasurementStation`
pub fn normalize_entity_type(entity_type: &str) -> &str {
    match entity_type {
        "measurementStation" | "measurementstation" => "MeasurementStation",
        other => other,
    }
}

fn date_property(ts: DateTime<Utc>) -> Value {
    json!({
        "type": "Property",
        "value": {"@type": "DateTime", "@value": format_timestamp(ts)}
    })
}

#[derive(Debug, Clone)]
pub struct DocumentBuilder {
    urn_prefix: String,
    context: String,
}

impl DocumentBuilder {
    pub fn new(broker: &BrokerConfig) -> Self {
        Self {
            urn_prefix: broker.urn_prefix.clone(),
            context: broker.ngsi_ld_context.clone(),
        }
    }

    fn context(&self) -> Value {
        json!([self.context])
    }

    /// Corrected (z-score, Hampel) or flagged (threshold) copy of `reading`
    pub fn reading_document(
        &self,
        analysis: &AnalysisDefinition,
        reading: &Reading,
        outcomes: &[PropertyOutcome],
    ) -> Value {
        let entity_type = normalize_entity_type(&reading.entity_type);
        let kind = format!("{entity_type}{}", analysis.algorithm.output_flag());

        let mut doc = Map::new();
        doc.insert(
            "id".to_string(),
            json!(format!("{}:{kind}:{}", self.urn_prefix, short_id(&reading.id))),
        );
        doc.insert("type".to_string(), json!(kind));

        for name in &analysis.not_corrected_properties {
            if let Some(value) = reading.property(name) {
                doc.insert(name.clone(), value.clone());
            }
        }

        for outcome in outcomes {
            let name = &outcome.property;
            let raw = reading
                .property(name)
                .and_then(|p| p.get("value"))
                .cloned()
                .unwrap_or_else(|| json!(outcome.sample.value));
            let observed_at = reading
                .property(name)
                .and_then(|p| p.get("observedAt"))
                .cloned()
                .unwrap_or_else(|| json!(format_timestamp(outcome.sample.timestamp)));

            let property = |value: Value| {
                json!({"type": "Property", "value": value, "observedAt": observed_at})
            };

            match analysis.algorithm {
                Algorithm::Threshold => {
                    let flag = if outcome.verdict.is_outlier { "Yes" } else { "No" };
                    let reason = outcome.verdict.reason.unwrap_or(ThresholdReason::None);
                    doc.insert(name.clone(), property(raw));
                    doc.insert(format!("{name}_error"), property(json!(flag)));
                    doc.insert(format!("{name}_error_reason"), property(json!(reason.as_tag())));
                }
                Algorithm::Zscore | Algorithm::Hampel => {
                    let corrected = if outcome.verdict.is_outlier {
                        json!(outcome.corrected)
                    } else {
                        raw.clone()
                    };
                    doc.insert(format!("{name}Raw"), property(raw));
                    doc.insert(format!("{name}Corrected"), property(corrected));
                }
            }
        }

        doc.insert("@context".to_string(), self.context());
        Value::Object(doc)
    }

    /// Anomaly record of an outlier streak on `property`
    pub fn anomaly(
        &self,
        analysis: &AnalysisDefinition,
        entity_id: &str,
        property: &str,
        since: DateTime<Utc>,
        observed: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Value {
        json!({
            "id": format!(
                "{}:{}Corrected:{}:{}_{property}",
                self.urn_prefix,
                normalize_entity_type(&analysis.entity_type),
                analysis.anomaly_type_id,
                short_id(entity_id)
            ),
            "type": "Anomaly",
            "name": "value-anomaly",
            "description": format!("Something is wrong with: abnormal value in sensor: {property}"),
            "dateObserved": date_property(observed),
            "validFrom": date_property(since),
            "validTo": date_property(observed),
            "dateCreated": date_property(now),
            "dateIssued": date_property(now),
            "@context": self.context()
        })
    }

    /// Anomaly record of an entity that stopped reporting
    pub fn cadence_anomaly(
        &self,
        entity_id: &str,
        entity_type: &str,
        last_received: DateTime<Utc>,
        threshold_minutes: i64,
        now: DateTime<Utc>,
    ) -> Value {
        json!({
            "id": format!(
                "{}:{}Cadency:{}",
                self.urn_prefix,
                normalize_entity_type(entity_type),
                short_id(entity_id)
            ),
            "type": "Anomaly",
            "name": "cadency-anomaly",
            "description": format!("Something is wrong with: cadency of data (>{threshold_minutes}min)"),
            "dateObserved": date_property(now),
            "validFrom": date_property(last_received),
            "validTo": date_property(now),
            "dateCreated": date_property(now),
            "dateIssued": date_property(now),
            "@context": self.context()
        })
    }
}
