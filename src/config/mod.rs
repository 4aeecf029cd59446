//! Configuration loading
//!
//! `QaConfig` is loaded once at start-up and read-only afterwards.

mod loader;
mod types;

pub use loader::{sample_config, write_sample_config, ConfigLoader};
pub use types::{
    AnalysisDefinition, BrokerConfig, CadenceConfig, DetectionConfig, EmissionPolicy,
    PrecisionConfig, PropertyLimits, QaConfig, ServerConfig, SlidingWindows,
    ThresholdFlaggingConfig,
};
