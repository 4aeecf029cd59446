//! Error types for the telemetry quality service.

use thiserror::Error;

/// Result type alias for service operations
pub type Result<T> = std::result::Result<T, QaError>;

/// Error types surfaced by the detection core and its broker collaborators
#[derive(Debug, Error)]
pub enum QaError {
    /// Configuration could not be loaded or failed validation
    #[error("Configuration error: {0}")]
    Config(String),

    /// A reading (or one of its properties) is missing required fields
    #[error("Invalid reading: {0}")]
    InvalidReading(String),

    /// Historical data query failed
    #[error("Backfill error: {0}")]
    Backfill(String),

    /// Upsert to the context broker failed
    #[error("Upsert error: {0}")]
    Upsert(String),

    /// Subscription registration failed
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// Network error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// JSON serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<config::ConfigError> for QaError {
    fn from(err: config::ConfigError) -> Self {
        QaError::Config(err.to_string())
    }
}
