//! Anomaly Detection Module
//!
//! Window store, outlier detectors and anomaly lifecycle tracking.

mod detector;
mod hampel;
mod lifecycle;
pub mod stats;
mod threshold;
mod types;
mod window;
mod zscore;

pub use detector::{DetectorSet, OutlierDetector};
pub use hampel::{hampel_outliers, HampelDetector};
pub use lifecycle::{AnomalyState, AnomalyTracker, Transition};
pub use stats::IqrGate;
pub use threshold::{ThresholdDetector, MIN_THRESHOLD_SAMPLES};
pub use types::{Algorithm, Sample, ThresholdReason, Verdict};
pub use window::{Moments, WindowEntry, WindowKey, WindowSettings, WindowState, WindowStore};
pub use zscore::ZScoreDetector;
