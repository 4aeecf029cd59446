//! Statistics primitives
//!
//! Percentiles, moments and the IQR confirmation gate used by every detector.

use serde::{Deserialize, Serialize};
use tracing::debug;

fn sorted_copy(values: &[f64]) -> Vec<f64> {
    let mut sorted = values.to_vec();
    sorted.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    sorted
}

fn percentile_of_sorted(sorted: &[f64], p: f64) -> Option<f64> {
    if sorted.is_empty() {
        return None;
    }
    let rank = (p.clamp(0.0, 100.0) / 100.0) * (sorted.len() - 1) as f64;
    let lower = rank.floor() as usize;
    let upper = rank.ceil() as usize;
    let frac = rank - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Percentile with linear interpolation between closest ranks.
///
/// Returns `None` for an empty slice.
pub fn percentile(values: &[f64], p: f64) -> Option<f64> {
    percentile_of_sorted(&sorted_copy(values), p)
}

/// Arithmetic mean, `None` for an empty slice
pub fn mean(values: &[f64]) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    Some(values.iter().sum::<f64>() / values.len() as f64)
}

/// Population standard deviation (divides by `n`)
pub fn std_dev(values: &[f64]) -> Option<f64> {
    let mean = mean(values)?;
    let variance =
        values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / values.len() as f64;
    Some(variance.sqrt())
}

pub fn median(values: &[f64]) -> Option<f64> {
    percentile(values, 50.0)
}

/// Median absolute deviation around the median (unscaled)
pub fn mad(values: &[f64]) -> Option<f64> {
    let center = median(values)?;
    let deviations: Vec<f64> = values.iter().map(|v| (v - center).abs()).collect();
    median(&deviations)
}

/// Round to `decimals` places; 0 rounds to the nearest integer
pub fn round_to(value: f64, decimals: u32) -> f64 {
    let factor = 10f64.powi(decimals as i32);
    (value * factor).round() / factor
}

/// Interquartile-range outlier test.
///
/// `sample` is an outlier iff it lies above `Q3 + k·IQR` or below `Q1 − k·IQR`
/// of `observations`. An empty reference set never flags.
pub fn iqr_test(observations: &[f64], sample: f64, k: f64) -> bool {
    let sorted = sorted_copy(observations);
    let (Some(q1), Some(q3)) = (
        percentile_of_sorted(&sorted, 25.0),
        percentile_of_sorted(&sorted, 75.0),
    ) else {
        return false;
    };
    let iqr = q3 - q1;
    let outlier = sample > q3 + k * iqr || sample < q1 - k * iqr;
    debug!(q1, q3, iqr, k, sample, outlier, "IQR decision");
    outlier
}

/// Two-stage IQR confirmation applied behind a primary detector
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IqrGate {
    /// First (stricter) factor
    pub default: f64,
    /// Second (looser) factor, consulted when the first check does not confirm
    pub failsafe: f64,
}

impl Default for IqrGate {
    fn default() -> Self {
        Self {
            default: 3.0,
            failsafe: 1.5,
        }
    }
}

impl IqrGate {
    pub fn confirm(&self, observations: &[f64], sample: f64) -> bool {
        if iqr_test(observations, sample, self.default) {
            return true;
        }
        if iqr_test(observations, sample, self.failsafe) {
            debug!(k = self.failsafe, sample, "failsafe IQR confirmed outlier");
            return true;
        }
        false
    }
}
