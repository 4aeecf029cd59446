//! # telemetry-qa
//!
//! Streaming data-quality service for sensor telemetry published through an
//! NGSI-LD context broker.
//!
//! Readings arrive as subscription notifications. Each analyzed property is
//! checked by the detector bound to the subscription (z-score, Hampel filter
//! or threshold/delta limits); outliers are replaced or flagged, anomaly
//! records are produced for outlier streaks, and entities that stop
//! reporting are reported by the cadence monitor.

pub mod analytics;
pub mod broker;
pub mod config;
pub mod error;
pub mod http_server;
pub mod ingest;
pub mod logging;
pub mod monitoring;

pub use error::{QaError, Result};
pub use ingest::Orchestrator;
