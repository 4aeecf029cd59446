use crate::analytics::anomaly::{Algorithm, IqrGate};
use crate::error::{QaError, Result};
use crate::logging::LogConfig;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet};

/// Largest minute count representable as a `chrono::Duration`
pub const MAX_MINUTES: i64 = i64::MAX / 60_000;

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct QaConfig {
    /// Notification endpoint configuration
    pub server: ServerConfig,

    /// Context broker and history endpoints
    pub broker: BrokerConfig,

    /// Global detection parameters
    pub detection: DetectionConfig,

    /// Liveness monitoring
    pub cadence: CadenceConfig,

    /// Limits for the threshold algorithm
    pub watercps_error_flagging: ThresholdFlaggingConfig,

    /// One entry per subscription
    pub analysis: Vec<AnalysisDefinition>,

    /// Logging configuration
    pub logging: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Address the notification endpoint binds to
    pub bind_addr: String,

    /// URL the broker uses to reach the notification endpoint
    pub public_url: String,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:8080".to_string(),
            public_url: "http://localhost:8080/notify".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BrokerConfig {
    /// NGSI-LD context broker base URL
    pub base_url: String,

    /// Temporal API base URL used for backfill queries
    pub history_url: String,

    /// Optional NGSILD-Tenant / Fiware-Service header
    pub tenant: Option<String>,

    /// Request timeout in seconds
    pub timeout_seconds: u64,

    /// Register one subscription per analysis at start-up
    pub register_subscriptions: bool,

    /// JSON-LD context attached to outbound documents
    pub ngsi_ld_context: String,

    /// Prefix of generated entity ids
    pub urn_prefix: String,
}

impl Default for BrokerConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:1026".to_string(),
            history_url: "http://localhost:8668".to_string(),
            tenant: None,
            timeout_seconds: 30,
            register_subscriptions: true,
            ngsi_ld_context: "https://uri.etsi.org/ngsi-ld/v1/ngsi-ld-core-context.jsonld"
                .to_string(),
            urn_prefix: "urn:ngsi-ld:AquaSpice".to_string(),
        }
    }
}

/// When anomaly records are emitted for an ongoing streak
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmissionPolicy {
    /// Every outlier classification produces a record
    #[default]
    EveryOutlier,
    /// Only the transition into an anomaly produces a record
    OnTransition,
}

/// Rounding applied to corrected values, per algorithm
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PrecisionConfig {
    pub zscore: u32,
    pub hampel: u32,
    pub threshold: u32,
}

impl Default for PrecisionConfig {
    fn default() -> Self {
        Self {
            zscore: 2,
            hampel: 2,
            threshold: 0,
        }
    }
}

impl PrecisionConfig {
    pub fn for_algorithm(&self, algorithm: Algorithm) -> u32 {
        match algorithm {
            Algorithm::Zscore => self.zscore,
            Algorithm::Hampel => self.hampel,
            Algorithm::Threshold => self.threshold,
        }
    }
}

/// Per-property sliding window sizes with a fallback
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SlidingWindows {
    #[serde(default)]
    pub sizes: HashMap<String, usize>,
    pub default: usize,
}

impl SlidingWindows {
    pub fn with_default(default: usize) -> Self {
        Self {
            sizes: HashMap::new(),
            default,
        }
    }

    pub fn set(mut self, property: impl Into<String>, size: usize) -> Self {
        self.sizes.insert(property.into(), size);
        self
    }

    /// Window size of `property`.
    ///
    /// Keys are matched exactly first, then case-insensitively, since some
    /// configuration sources lowercase map keys.
    pub fn get(&self, property: &str) -> usize {
        lookup_property(&self.sizes, property)
            .copied()
            .unwrap_or(self.default)
    }
}

pub(crate) fn lookup_property<'a, V>(map: &'a HashMap<String, V>, property: &str) -> Option<&'a V> {
    map.get(property).or_else(|| {
        map.iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(property))
            .map(|(_, value)| value)
    })
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DetectionConfig {
    /// Maximum samples kept per window (also the backfill size)
    pub query_points: usize,

    /// Z-score threshold `T`
    pub zscore_threshold: f64,

    /// Minimum window length before the z-score detector may flag
    pub zscore_min_samples: usize,

    /// Hampel sensitivity `n`
    pub hampel_filter_threshold: f64,

    /// Minimum Hampel window radius
    pub hampel_min_window: usize,

    /// IQR confirmation factors
    pub iqr_threshold: IqrGate,

    /// Sliding window size per property
    pub property_sliding_window: HashMap<String, usize>,

    /// Sliding window size of properties missing from the map
    pub default_sliding_window: usize,

    /// observedAt gap (minutes) after which an entity's windows are reset
    pub gap_reset_minutes: i64,

    /// Query historical data the first time an entity is seen
    pub backfill_on_first_sight: bool,

    pub anomaly_emission: EmissionPolicy,

    pub precision: PrecisionConfig,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            query_points: 1000,
            zscore_threshold: 3.0,
            zscore_min_samples: 200,
            hampel_filter_threshold: 3.0,
            hampel_min_window: 100,
            iqr_threshold: IqrGate::default(),
            property_sliding_window: HashMap::new(),
            default_sliding_window: 200,
            gap_reset_minutes: 240,
            backfill_on_first_sight: true,
            anomaly_emission: EmissionPolicy::default(),
            precision: PrecisionConfig::default(),
        }
    }
}

impl DetectionConfig {
    pub fn sliding_windows(&self) -> SlidingWindows {
        SlidingWindows {
            sizes: self.property_sliding_window.clone(),
            default: self.default_sliding_window,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CadenceConfig {
    /// Seconds between two liveness sweeps
    pub check_interval_secs: u64,

    /// Minutes of silence after which an entity is reported
    pub threshold_minutes: i64,

    /// Emit anomaly records (false: log only)
    pub emit_anomalies: bool,
}

impl Default for CadenceConfig {
    fn default() -> Self {
        Self {
            check_interval_secs: 3000,
            threshold_minutes: 20,
            emit_anomalies: true,
        }
    }
}

/// Max/min/delta limits of one property
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PropertyLimits {
    pub max_value: f64,
    pub min_value: f64,
    pub delta_value: f64,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdFlaggingConfig {
    pub harbour_docks: HashMap<String, PropertyLimits>,
}

impl ThresholdFlaggingConfig {
    pub fn limits(&self, property: &str) -> Option<PropertyLimits> {
        lookup_property(&self.harbour_docks, property).copied()
    }
}

/// Binding of a subscription to an algorithm and a set of properties
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisDefinition {
    pub subscription_id: String,
    pub algorithm: Algorithm,
    pub entity_type: String,
    pub analyzed_properties: Vec<String>,
    #[serde(default)]
    pub not_corrected_properties: Vec<String>,
    pub anomaly_type_id: String,
    /// Optional allow-list of entity ids
    #[serde(default)]
    pub entity_ids: Option<Vec<String>>,
}

impl AnalysisDefinition {
    pub fn accepts_entity(&self, entity_id: &str) -> bool {
        match &self.entity_ids {
            Some(ids) => ids.iter().any(|id| id == entity_id),
            None => true,
        }
    }
}

impl QaConfig {
    /// Look up the analysis bound to a subscription id
    pub fn analysis_for(&self, subscription_id: &str) -> Option<&AnalysisDefinition> {
        self.analysis
            .iter()
            .find(|a| a.subscription_id == subscription_id)
    }

    /// Reject configurations the detection core cannot run with
    pub fn validate(&self) -> Result<()> {
        let detection = &self.detection;

        if self.analysis.is_empty() {
            return Err(QaError::Config("no analysis defined".to_string()));
        }

        let mut seen = HashSet::new();
        for analysis in &self.analysis {
            if !seen.insert(analysis.subscription_id.as_str()) {
                return Err(QaError::Config(format!(
                    "duplicate subscription id: {}",
                    analysis.subscription_id
                )));
            }
            if analysis.analyzed_properties.is_empty() {
                return Err(QaError::Config(format!(
                    "analysis {} has no analyzed properties",
                    analysis.subscription_id
                )));
            }
        }

        if detection.query_points == 0 {
            return Err(QaError::Config("query_points must be positive".to_string()));
        }
        if detection.zscore_threshold <= 0.0 || detection.hampel_filter_threshold <= 0.0 {
            return Err(QaError::Config(
                "detector thresholds must be positive".to_string(),
            ));
        }
        if detection.iqr_threshold.default <= 0.0 || detection.iqr_threshold.failsafe <= 0.0 {
            return Err(QaError::Config("IQR factors must be positive".to_string()));
        }
        if detection.iqr_threshold.failsafe > detection.iqr_threshold.default {
            return Err(QaError::Config(
                "iqr_threshold.failsafe must not be stricter than iqr_threshold.default"
                    .to_string(),
            ));
        }
        if detection.gap_reset_minutes <= 0 || self.cadence.threshold_minutes <= 0 {
            return Err(QaError::Config(
                "gap and cadence thresholds must be positive".to_string(),
            ));
        }
        if detection.gap_reset_minutes > MAX_MINUTES || self.cadence.threshold_minutes > MAX_MINUTES
        {
            return Err(QaError::Config(format!(
                "gap and cadence thresholds must not exceed {MAX_MINUTES} minutes"
            )));
        }
        if self.cadence.check_interval_secs == 0 {
            return Err(QaError::Config(
                "cadence.check_interval_secs must be positive".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn analysis(id: &str) -> AnalysisDefinition {
        AnalysisDefinition {
            subscription_id: id.to_string(),
            algorithm: Algorithm::Zscore,
            entity_type: "MeasurementStation".to_string(),
            analyzed_properties: vec!["temperature".to_string()],
            not_corrected_properties: vec!["location".to_string()],
            anomaly_type_id: "A1".to_string(),
            entity_ids: None,
        }
    }

    #[test]
    fn test_sliding_window_lookup_ignores_case() {
        let windows = SlidingWindows::with_default(50).set("dissolvedoxygen", 120);
        assert_eq!(windows.get("dissolvedOxygen"), 120);
        assert_eq!(windows.get("temperature"), 50);
    }

    #[test]
    fn test_validate_accepts_defaults_with_analysis() {
        let config = QaConfig {
            analysis: vec![analysis("urn:ngsi-ld:Subscription:z")],
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_duplicates_and_empty() {
        let config = QaConfig::default();
        assert!(config.validate().is_err());

        let config = QaConfig {
            analysis: vec![analysis("s"), analysis("s")],
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_inverted_iqr_factors() {
        let mut config = QaConfig {
            analysis: vec![analysis("s")],
            ..Default::default()
        };
        config.detection.iqr_threshold = IqrGate {
            default: 1.5,
            failsafe: 3.0,
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_out_of_range_gap() {
        let mut config = QaConfig {
            analysis: vec![analysis("s")],
            ..Default::default()
        };
        config.detection.gap_reset_minutes = MAX_MINUTES;
        assert!(config.validate().is_ok());

        config.detection.gap_reset_minutes = i64::MAX;
        assert!(config.validate().is_err());

        config.detection.gap_reset_minutes = 240;
        config.cadence.threshold_minutes = MAX_MINUTES + 1;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_allow_list() {
        let mut def = analysis("s");
        assert!(def.accepts_entity("urn:any"));
        def.entity_ids = Some(vec!["urn:a".to_string()]);
        assert!(def.accepts_entity("urn:a"));
        assert!(!def.accepts_entity("urn:b"));
    }
}
