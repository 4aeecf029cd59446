//! Threshold/delta detector (WaterCPS error flagging)
//!
//! Flags a reading when the mean of the last four values leaves the
//! configured band, or when the step from the previous value is too large.

use super::detector::OutlierDetector;
use super::stats;
use super::types::{ThresholdReason, Verdict};
use super::window::WindowEntry;
use crate::config::ThresholdFlaggingConfig;
use tracing::{debug, warn};

/// Stored samples required before the detector evaluates anything
pub const MIN_THRESHOLD_SAMPLES: usize = 4;

#[derive(Debug, Clone)]
pub struct ThresholdDetector {
    limits: ThresholdFlaggingConfig,
}

impl ThresholdDetector {
    pub fn new(limits: ThresholdFlaggingConfig) -> Self {
        Self { limits }
    }
}

impl OutlierDetector for ThresholdDetector {
    fn detect(&self, entry: &WindowEntry, sample: f64, property: &str) -> Verdict {
        let count = entry.sample_count().unwrap_or(0);
        if count < MIN_THRESHOLD_SAMPLES {
            debug!(
                property,
                samples = count,
                "Insufficient data to compute threshold method (need 4)"
            );
            return Verdict::with_reason(false, ThresholdReason::None);
        }

        let Some(limits) = self.limits.limits(property) else {
            warn!(property, "no threshold limits configured, reading not evaluated");
            return Verdict::with_reason(false, ThresholdReason::None);
        };

        let mut series = entry.last_values(MIN_THRESHOLD_SAMPLES - 1);
        series.push(sample);
        let mean = stats::mean(&series).unwrap_or(sample);
        let delta = (sample - series[series.len() - 2]).abs();
        debug!(property, mean, delta, "threshold series");

        let reason = if mean > limits.max_value {
            ThresholdReason::Max
        } else if mean < limits.min_value {
            ThresholdReason::Min
        } else if delta > limits.delta_value {
            ThresholdReason::Delta
        } else {
            ThresholdReason::None
        };

        let is_outlier = reason != ThresholdReason::None;
        if is_outlier {
            warn!(property, sample, reason = reason.as_tag(), "threshold triggered");
        }
        Verdict::with_reason(is_outlier, reason)
    }
}
