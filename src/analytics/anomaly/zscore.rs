//! Z-score detector with IQR confirmation

use super::detector::OutlierDetector;
use super::stats::IqrGate;
use super::types::Verdict;
use super::window::{Moments, WindowEntry};
use tracing::{debug, warn};

#[derive(Debug, Clone)]
pub struct ZScoreDetector {
    threshold: f64,
    min_samples: usize,
    gate: IqrGate,
}

impl ZScoreDetector {
    pub fn new(threshold: f64, min_samples: usize, gate: IqrGate) -> Self {
        Self {
            threshold,
            min_samples,
            gate,
        }
    }

    pub fn threshold(&self) -> f64 {
        self.threshold
    }
}

/// `|x − mean| / std`; a zero spread puts any other value infinitely far away
fn z_score(value: f64, moments: Moments) -> f64 {
    let diff = (value - moments.mean).abs();
    if diff == 0.0 {
        0.0
    } else if moments.std == 0.0 {
        f64::INFINITY
    } else {
        diff / moments.std
    }
}

impl OutlierDetector for ZScoreDetector {
    fn detect(&self, entry: &WindowEntry, sample: f64, property: &str) -> Verdict {
        if entry.len() < self.min_samples {
            debug!(
                property,
                samples = entry.len(),
                required = self.min_samples,
                "insufficient data for z-score"
            );
            return Verdict::normal();
        }

        let Some(moments) = entry.moments() else {
            return Verdict::normal();
        };

        let z = z_score(sample, moments);
        debug!(property, mean = moments.mean, std = moments.std, sample, z, "z-score");

        if z < self.threshold {
            return Verdict::normal();
        }

        if self.gate.confirm(&entry.values(), sample) {
            warn!(property, sample, z, "z-score outlier confirmed by IQR");
            Verdict::outlier()
        } else {
            debug!(property, sample, z, "high z-score not confirmed by IQR");
            Verdict::normal()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::anomaly::{Algorithm, Sample, WindowKey, WindowSettings, WindowStore};
    use crate::config::SlidingWindows;
    use chrono::{DateTime, Duration, TimeZone, Utc};

    fn at(minute: i64) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap() + Duration::minutes(minute)
    }

    fn detector() -> ZScoreDetector {
        ZScoreDetector::new(3.0, 200, IqrGate::default())
    }

    fn fill(store: &mut WindowStore, key: &WindowKey, values: impl Iterator<Item = f64>) {
        for (minute, value) in values.enumerate() {
            store.append(key, Sample::new(at(minute as i64), value));
        }
    }

    fn key() -> WindowKey {
        WindowKey::new("urn:a", "temperature", Algorithm::Zscore)
    }

    #[test]
    fn test_mean_ten_std_one() {
        let mut store = WindowStore::new(WindowSettings {
            query_points: 1000,
            sliding_windows: SlidingWindows::with_default(150),
        });
        let key = key();
        // alternating 9/11 -> mean 10, std 1
        fill(&mut store, &key, (0..200).map(|i| if i % 2 == 0 { 9.0 } else { 11.0 }));

        let entry = store.get(&key).unwrap();
        let moments = entry.moments().unwrap();
        assert_eq!(moments.mean, 10.0);
        assert_eq!(moments.std, 1.0);

        assert!(!detector().detect(entry, 10.0, "temperature").is_outlier);
        assert!(!detector().detect(entry, 12.0, "temperature").is_outlier);
        assert!(detector().detect(entry, 50.0, "temperature").is_outlier);
    }

    #[test]
    fn test_high_z_without_iqr_confirmation_is_not_flagged() {
        // Short sliding window: moments cover the calm tail only,
        // while the IQR reference spans the whole, wide history.
        let mut store = WindowStore::new(WindowSettings {
            query_points: 1000,
            sliding_windows: SlidingWindows::with_default(10),
        });
        let key = key();
        let wide = (0..300).map(f64::from);
        let calm = (0..22).map(|i| if i % 2 == 0 { 9.0 } else { 11.0 });
        fill(&mut store, &key, wide.chain(calm));

        let entry = store.get(&key).unwrap();
        let moments = entry.moments().unwrap();
        assert_eq!(moments.mean, 10.0);
        assert_eq!(moments.std, 1.0);

        let z = z_score(50.0, moments);
        assert!(z >= 3.0);
        assert!(!detector().detect(entry, 50.0, "temperature").is_outlier);
    }

    #[test]
    fn test_insufficient_samples() {
        let mut store = WindowStore::new(WindowSettings {
            query_points: 1000,
            sliding_windows: SlidingWindows::with_default(150),
        });
        let key = key();
        fill(&mut store, &key, (0..199).map(|i| if i % 2 == 0 { 9.0 } else { 11.0 }));

        let entry = store.get(&key).unwrap();
        assert!(!detector().detect(entry, 1e9, "temperature").is_outlier);
    }

    #[test]
    fn test_zero_spread() {
        let moments = Moments { mean: 5.0, std: 0.0 };
        assert_eq!(z_score(5.0, moments), 0.0);
        assert!(z_score(5.1, moments).is_infinite());
    }
}
