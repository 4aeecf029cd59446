//! Anomaly Detection Types
//!
//! Types shared by the window store, the detectors and the orchestrator.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Detection algorithm bound to an analysis definition
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    /// Z-score with IQR confirmation
    #[serde(alias = "z_score")]
    Zscore,
    /// Hampel identifier with IQR confirmation
    #[serde(alias = "hampel_filter")]
    Hampel,
    /// Fixed max/min/delta limits (WaterCPS flagging)
    #[serde(alias = "watercps_threshold")]
    Threshold,
}

impl Algorithm {
    /// Suffix appended to the entity type of the outbound reading
    pub fn output_flag(&self) -> &'static str {
        match self {
            Algorithm::Zscore | Algorithm::Hampel => "Corrected",
            Algorithm::Threshold => "Flagged",
        }
    }
}

impl fmt::Display for Algorithm {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Algorithm::Zscore => "zscore",
            Algorithm::Hampel => "hampel",
            Algorithm::Threshold => "threshold",
        };
        f.write_str(name)
    }
}

/// One timestamped observation of a property
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Sample {
    pub timestamp: DateTime<Utc>,
    pub value: f64,
}

impl Sample {
    pub fn new(timestamp: DateTime<Utc>, value: f64) -> Self {
        Self { timestamp, value }
    }
}

/// Why the threshold detector flagged a reading
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ThresholdReason {
    /// 4-point mean above the configured maximum
    Max,
    /// 4-point mean below the configured minimum
    Min,
    /// Step from the previous reading larger than the configured delta
    Delta,
    #[default]
    None,
}

impl ThresholdReason {
    /// Tag written to the `<property>_error_reason` attribute
    pub fn as_tag(&self) -> &'static str {
        match self {
            ThresholdReason::Max => "reason_max",
            ThresholdReason::Min => "reason_min",
            ThresholdReason::Delta => "reason_delta",
            ThresholdReason::None => "None",
        }
    }
}

/// Classification of one sample
#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Verdict {
    pub is_outlier: bool,
    /// Only the threshold detector sets a reason
    pub reason: Option<ThresholdReason>,
}

impl Verdict {
    pub fn normal() -> Self {
        Self::default()
    }

    pub fn outlier() -> Self {
        Self {
            is_outlier: true,
            reason: None,
        }
    }

    pub fn with_reason(is_outlier: bool, reason: ThresholdReason) -> Self {
        Self {
            is_outlier,
            reason: Some(reason),
        }
    }
}
