//! Hampel-filter detector with IQR confirmation

use super::detector::OutlierDetector;
use super::stats::{self, IqrGate};
use super::types::Verdict;
use super::window::WindowEntry;
use crate::config::SlidingWindows;
use tracing::{debug, warn};

/// Scale factor turning the MAD into a consistent estimator of σ
const MAD_SCALE: f64 = 1.4826;

/// Positions flagged by the Hampel identifier.
///
/// Each position is compared with the median of its `[i − radius, i + radius]`
/// neighbourhood (clipped at the ends of the series); it is flagged when it
/// deviates by more than `n` scaled MADs. Values are never imputed.
pub fn hampel_outliers(series: &[f64], radius: usize, n: f64) -> Vec<usize> {
    let mut flagged = Vec::new();

    for (i, value) in series.iter().enumerate() {
        let lo = i.saturating_sub(radius);
        let hi = (i + radius + 1).min(series.len());
        let window = &series[lo..hi];

        let (Some(center), Some(mad)) = (stats::median(window), stats::mad(window)) else {
            continue;
        };
        if (value - center).abs() > n * MAD_SCALE * mad {
            flagged.push(i);
        }
    }

    flagged
}

#[derive(Debug, Clone)]
pub struct HampelDetector {
    sensitivity: f64,
    min_window: usize,
    sliding_windows: SlidingWindows,
    gate: IqrGate,
}

impl HampelDetector {
    pub fn new(
        sensitivity: f64,
        min_window: usize,
        sliding_windows: SlidingWindows,
        gate: IqrGate,
    ) -> Self {
        Self {
            sensitivity,
            min_window,
            sliding_windows,
            gate,
        }
    }
}

impl OutlierDetector for HampelDetector {
    fn detect(&self, entry: &WindowEntry, sample: f64, property: &str) -> Verdict {
        let sliding = self.sliding_windows.get(property);

        let mut series = entry.last_values(sliding);
        series.push(sample);
        let candidate = if series.len() >= 2 { series.len() - 1 } else { 0 };

        let radius = (series.len() / 2).min(sliding);
        if radius < self.min_window {
            debug!(
                property,
                radius,
                required = self.min_window,
                "insufficient data for Hampel filter"
            );
            return Verdict::normal();
        }

        let flagged = hampel_outliers(&series, radius, self.sensitivity);
        debug!(property, radius, flagged = flagged.len(), "Hampel identifier");

        if !flagged.contains(&candidate) {
            return Verdict::normal();
        }

        // Reference distribution: the stored history without the candidate
        if self.gate.confirm(&entry.values(), sample) {
            warn!(property, sample, "Hampel outlier confirmed by IQR");
            Verdict::outlier()
        } else {
            debug!(property, sample, "Hampel outlier not confirmed by IQR");
            Verdict::normal()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::analytics::anomaly::{Algorithm, Sample, WindowKey, WindowSettings, WindowStore};
    use chrono::{Duration, TimeZone, Utc};

    fn detector() -> HampelDetector {
        HampelDetector::new(3.0, 100, SlidingWindows::with_default(250), IqrGate::default())
    }

    fn store_with(count: usize) -> (WindowStore, WindowKey) {
        let mut store = WindowStore::new(WindowSettings {
            query_points: 1000,
            sliding_windows: SlidingWindows::with_default(250),
        });
        let key = WindowKey::new("urn:a", "temperature", Algorithm::Hampel);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        for i in 0..count {
            let value = 10.0 + (i % 5) as f64 * 0.1;
            store.append(&key, Sample::new(start + Duration::minutes(i as i64), value));
        }
        (store, key)
    }

    #[test]
    fn test_identifier_flags_isolated_spike() {
        let mut series: Vec<f64> = (0..21).map(|i| 5.0 + (i % 3) as f64).collect();
        series[10] = 50.0;
        let flagged = hampel_outliers(&series, 5, 3.0);
        assert_eq!(flagged, vec![10]);
    }

    #[test]
    fn test_spike_is_flagged_and_confirmed() {
        let (store, key) = store_with(300);
        let entry = store.get(&key).unwrap();

        assert!(detector().detect(entry, 100.0, "temperature").is_outlier);
        assert!(!detector().detect(entry, 10.2, "temperature").is_outlier);
    }

    #[test]
    fn test_identifier_flag_without_iqr_confirmation_is_not_flagged() {
        // Calm 9/11 tail inside the sliding window, wide ramp in the older history
        let mut store = WindowStore::new(WindowSettings {
            query_points: 1000,
            sliding_windows: SlidingWindows::with_default(250),
        });
        let key = WindowKey::new("urn:a", "temperature", Algorithm::Hampel);
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
        let wide = (0..750).map(f64::from);
        let calm = (0..250).map(|i| if i % 2 == 0 { 9.0 } else { 11.0 });
        for (i, value) in wide.chain(calm).enumerate() {
            store.append(&key, Sample::new(start + Duration::minutes(i as i64), value));
        }
        let entry = store.get(&key).unwrap();
        assert_eq!(entry.len(), 1000);

        let mut series = entry.last_values(250);
        series.push(300.0);
        assert!(hampel_outliers(&series, 125, 3.0).contains(&250));

        assert!(!detector().detect(entry, 300.0, "temperature").is_outlier);
        assert!(detector().detect(entry, 5000.0, "temperature").is_outlier);
    }

    #[test]
    fn test_small_window_never_flags() {
        // 150 stored + candidate -> radius 75 < 100
        let (store, key) = store_with(150);
        let entry = store.get(&key).unwrap();

        assert!(!detector().detect(entry, 1000.0, "temperature").is_outlier);
    }
}
