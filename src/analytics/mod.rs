//! Analytics Module
//!
//! Streaming outlier detection over sensor telemetry

pub mod anomaly;

pub use anomaly::{Algorithm, AnomalyTracker, DetectorSet, Verdict, WindowStore};
