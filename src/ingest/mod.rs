//! Notification ingestion

mod orchestrator;
mod outbound;
mod types;

pub use orchestrator::Orchestrator;
pub use outbound::{normalize_entity_type, DocumentBuilder, PropertyOutcome};
pub use types::{
    format_timestamp, numeric_value, parse_timestamp, short_id, Acknowledgement, Notification,
    Reading,
};
