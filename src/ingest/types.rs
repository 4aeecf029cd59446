//! Notification payload types
//!
//! Inbound NGSI-LD notifications and helpers to read typed values from them.

use crate::analytics::anomaly::Sample;
use crate::error::{QaError, Result};
use chrono::{DateTime, NaiveDateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Body posted by the context broker for a subscription
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub subscription_id: String,
    /// Raw entity payloads, decoded entry by entry
    #[serde(default)]
    pub data: Vec<Value>,
    /// Remaining notification fields (id, type, notifiedAt, ...)
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// Response body acknowledging a processed batch
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Acknowledgement {
    pub is_error: bool,
    pub message: String,
    pub status_code: u16,
}

impl Acknowledgement {
    pub fn success() -> Self {
        Self {
            is_error: false,
            message: "Success".to_string(),
            status_code: 200,
        }
    }
}

/// One entity notification: `id`, `type` and one object per property
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reading {
    pub id: String,
    #[serde(rename = "type")]
    pub entity_type: String,
    #[serde(flatten)]
    pub properties: Map<String, Value>,
}

impl Reading {
    /// Raw property object as received
    pub fn property(&self, name: &str) -> Option<&Value> {
        self.properties.get(name)
    }

    /// Numeric value and observation time of `name`
    pub fn sample(&self, name: &str) -> Result<Sample> {
        let property = self
            .property(name)
            .ok_or_else(|| QaError::InvalidReading(format!("property {name} missing")))?;

        let value = property
            .get("value")
            .and_then(numeric_value)
            .ok_or_else(|| QaError::InvalidReading(format!("property {name} has no numeric value")))?;

        let observed_at = property
            .get("observedAt")
            .and_then(Value::as_str)
            .ok_or_else(|| QaError::InvalidReading(format!("property {name} has no observedAt")))?;

        let timestamp = parse_timestamp(observed_at).ok_or_else(|| {
            QaError::InvalidReading(format!("property {name} has invalid observedAt {observed_at}"))
        })?;

        Ok(Sample::new(timestamp, value))
    }

    /// Latest `observedAt` among `properties`, ignoring malformed ones
    pub fn observed_at<'a>(
        &self,
        properties: impl IntoIterator<Item = &'a String>,
    ) -> Option<DateTime<Utc>> {
        properties
            .into_iter()
            .filter_map(|name| self.property(name))
            .filter_map(|p| p.get("observedAt").and_then(Value::as_str))
            .filter_map(parse_timestamp)
            .max()
    }
}

/// Numbers, or strings holding a number
pub fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

/// Parse RFC 3339 timestamps, or naive ones interpreted as UTC
pub fn parse_timestamp(raw: &str) -> Option<DateTime<Utc>> {
    if let Ok(ts) = DateTime::parse_from_rfc3339(raw) {
        return Some(ts.with_timezone(&Utc));
    }
    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(raw.trim_end_matches('Z'), format).ok())
        .map(|naive| naive.and_utc())
}

/// `YYYY-MM-DDTHH:MM:SSZ`
pub fn format_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Secs, true)
}

/// Fifth `:`-separated segment of an NGSI-LD URN, or the whole id
pub fn short_id(entity_id: &str) -> &str {
    entity_id.split(':').nth(4).unwrap_or(entity_id)
}
