use super::types::{AnalysisDefinition, PropertyLimits, QaConfig};
use crate::analytics::anomaly::Algorithm;
use anyhow::{Context, Result};
use config::{Config, Environment, File};
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    config_file: Option<PathBuf>,
    load_env: bool,
}

impl ConfigLoader {
    /// Create a new configuration loader
    pub fn new() -> Self {
        Self {
            config_file: None,
            load_env: false,
        }
    }

    /// Load configuration from file
    pub fn load_from_file(mut self, path: Option<impl AsRef<Path>>) -> Self {
        self.config_file = path.map(|p| p.as_ref().to_path_buf());
        self
    }

    /// Load configuration from environment variables (`QA_DETECTION__QUERY_POINTS=...`)
    pub fn load_from_env(mut self) -> Self {
        self.load_env = true;
        self
    }

    /// Build and validate the final configuration
    pub fn build(self) -> Result<QaConfig> {
        let mut builder = Config::builder().add_source(Config::try_from(&QaConfig::default())?);

        if let Some(config_path) = &self.config_file {
            builder = builder.add_source(File::from(config_path.as_path()).required(true));
        } else {
            // Try to load from standard locations
            builder = builder
                .add_source(File::with_name("telemetry-qa").required(false))
                .add_source(File::with_name("config/telemetry-qa").required(false));
        }

        if self.load_env {
            builder = builder.add_source(
                Environment::with_prefix("QA")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config: QaConfig = builder
            .build()
            .context("Failed to build configuration")?
            .try_deserialize()
            .context("Failed to deserialize configuration")?;

        config.validate().context("Invalid configuration")?;

        Ok(config)
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

/// Configuration covering all three algorithms, used for `--generate-config`
pub fn sample_config() -> QaConfig {
    let mut config = QaConfig::default();

    config
        .detection
        .property_sliding_window
        .insert("temperature".to_string(), 200);
    config
        .detection
        .property_sliding_window
        .insert("conductivity".to_string(), 250);

    config.watercps_error_flagging.harbour_docks.insert(
        "temperature".to_string(),
        PropertyLimits {
            max_value: 30.0,
            min_value: 0.0,
            delta_value: 5.0,
        },
    );

    let station = |subscription: &str, algorithm: Algorithm, anomaly: &str| AnalysisDefinition {
        subscription_id: subscription.to_string(),
        algorithm,
        entity_type: "MeasurementStation".to_string(),
        analyzed_properties: vec!["temperature".to_string(), "conductivity".to_string()],
        not_corrected_properties: vec!["location".to_string()],
        anomaly_type_id: anomaly.to_string(),
        entity_ids: None,
    };

    config.analysis = vec![
        station(
            "urn:ngsi-ld:Subscription:z_score_detection_1",
            Algorithm::Zscore,
            "ZScoreAnomaly",
        ),
        station(
            "urn:ngsi-ld:Subscription:hampel_anomaly_detection_1",
            Algorithm::Hampel,
            "HampelAnomaly",
        ),
        AnalysisDefinition {
            analyzed_properties: vec!["temperature".to_string()],
            ..station(
                "urn:ngsi-ld:Subscription:watercps_detection_1",
                Algorithm::Threshold,
                "ThresholdAnomaly",
            )
        },
    ];

    config
}

/// Write a commented sample configuration file
pub fn write_sample_config(path: impl AsRef<Path>) -> Result<()> {
    let body = toml::to_string_pretty(&sample_config()).context("Failed to render sample")?;

    let content = format!(
        r#"# telemetry-qa configuration
#
# Save as telemetry-qa.toml (or pass --config). Every key can be overridden
# from the environment, e.g. QA_DETECTION__GAP_RESET_MINUTES=180.
#
# [detection]
# query_points          = samples kept per window and requested on backfill
# iqr_threshold.default = first (stricter) IQR confirmation factor
# iqr_threshold.failsafe= second (looser) IQR confirmation factor
# gap_reset_minutes     = observedAt gap that discards an entity's history
# anomaly_emission      = "every_outlier" | "on_transition"
#
# [cadence]
# check_interval_secs   = seconds between liveness sweeps
# threshold_minutes     = silence after which an entity is reported

{}"#,
        body
    );

    std::fs::write(path.as_ref(), content)
        .with_context(|| format!("Failed to write {}", path.as_ref().display()))?;
    Ok(())
}
