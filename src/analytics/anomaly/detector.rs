//! Detector dispatch
//!
//! Every algorithm implements [`OutlierDetector`]; [`DetectorSet`] maps the
//! algorithm bound to an analysis onto its detector.

use super::hampel::HampelDetector;
use super::threshold::ThresholdDetector;
use super::types::{Algorithm, Verdict};
use super::window::WindowEntry;
use super::zscore::ZScoreDetector;
use crate::config::QaConfig;

/// Uniform detector interface
pub trait OutlierDetector: Send + Sync {
    /// Classify `sample` for `property` against the property's window.
    ///
    /// The window must not yet contain `sample`.
    fn detect(&self, entry: &WindowEntry, sample: f64, property: &str) -> Verdict;
}

/// One configured detector per algorithm
pub struct DetectorSet {
    zscore: ZScoreDetector,
    hampel: HampelDetector,
    threshold: ThresholdDetector,
}

impl DetectorSet {
    pub fn new(zscore: ZScoreDetector, hampel: HampelDetector, threshold: ThresholdDetector) -> Self {
        Self {
            zscore,
            hampel,
            threshold,
        }
    }

    pub fn from_config(config: &QaConfig) -> Self {
        let detection = &config.detection;
        Self::new(
            ZScoreDetector::new(
                detection.zscore_threshold,
                detection.zscore_min_samples,
                detection.iqr_threshold,
            ),
            HampelDetector::new(
                detection.hampel_filter_threshold,
                detection.hampel_min_window,
                detection.sliding_windows(),
                detection.iqr_threshold,
            ),
            ThresholdDetector::new(config.watercps_error_flagging.clone()),
        )
    }

    pub fn for_algorithm(&self, algorithm: Algorithm) -> &dyn OutlierDetector {
        match algorithm {
            Algorithm::Zscore => &self.zscore,
            Algorithm::Hampel => &self.hampel,
            Algorithm::Threshold => &self.threshold,
        }
    }

    pub fn detect(
        &self,
        algorithm: Algorithm,
        entry: &WindowEntry,
        sample: f64,
        property: &str,
    ) -> Verdict {
        self.for_algorithm(algorithm).detect(entry, sample, property)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::anomaly::{Sample, WindowKey, WindowSettings, WindowStore};
    use crate::config::SlidingWindows;
    use chrono::{Duration, TimeZone, Utc};

    #[test]
    fn test_cold_windows_never_flag() {
        let detectors = DetectorSet::from_config(&QaConfig::default());
        let mut store = WindowStore::new(WindowSettings {
            query_points: 1000,
            sliding_windows: SlidingWindows::with_default(200),
        });
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();

        for algorithm in [Algorithm::Zscore, Algorithm::Hampel, Algorithm::Threshold] {
            let key = WindowKey::new("urn:a", "temperature", algorithm);
            for minute in 0..3 {
                store.append(&key, Sample::new(start + Duration::minutes(minute), 1.0));
            }
            let entry = store.get(&key).unwrap();
            for value in [1.0, 1e6, -1e6] {
                let verdict = detectors.detect(algorithm, entry, value, "temperature");
                assert!(!verdict.is_outlier, "{algorithm} flagged {value}");
            }
        }
    }
}
