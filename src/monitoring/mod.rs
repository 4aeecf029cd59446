//! Liveness monitoring
//!
//! Tracks when each entity last reported and flags the ones that went quiet.

pub mod cadence;
pub mod last_seen;

pub use cadence::CadenceMonitor;
pub use last_seen::{LastSeen, LastSeenRegistry};
