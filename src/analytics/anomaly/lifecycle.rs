//! Anomaly lifecycle tracking
//!
//! Remembers, per (entity, property), since when the current anomaly streak
//! has been open.

use chrono::{DateTime, Utc};
use std::collections::HashMap;

/// Streak state of one (entity, property)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum AnomalyState {
    #[default]
    Clear,
    Anomalous { since: DateTime<Utc> },
}

/// Effect of one classification on the streak state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// First outlier of a streak
    Opened { since: DateTime<Utc> },
    /// Outlier inside an open streak; `since` is unchanged
    Continued { since: DateTime<Utc> },
    /// First non-outlier after a streak
    Closed { since: DateTime<Utc> },
    /// Non-outlier while clear
    Unchanged,
}

impl Transition {
    /// Start of the streak the classification belongs to, if it is an outlier
    pub fn open_since(&self) -> Option<DateTime<Utc>> {
        match self {
            Transition::Opened { since } | Transition::Continued { since } => Some(*since),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct AnomalyTracker {
    states: HashMap<(String, String), DateTime<Utc>>,
}

impl AnomalyTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn state(&self, entity_id: &str, property: &str) -> AnomalyState {
        match self.states.get(&(entity_id.to_string(), property.to_string())) {
            Some(since) => AnomalyState::Anomalous { since: *since },
            None => AnomalyState::Clear,
        }
    }

    /// `ongoingAnomalySince` of the pair, `None` while clear
    pub fn since(&self, entity_id: &str, property: &str) -> Option<DateTime<Utc>> {
        match self.state(entity_id, property) {
            AnomalyState::Anomalous { since } => Some(since),
            AnomalyState::Clear => None,
        }
    }

    /// Apply one classification observed at `at`
    pub fn observe(
        &mut self,
        entity_id: &str,
        property: &str,
        is_outlier: bool,
        at: DateTime<Utc>,
    ) -> Transition {
        let key = (entity_id.to_string(), property.to_string());

        match (self.states.get(&key).copied(), is_outlier) {
            (None, true) => {
                self.states.insert(key, at);
                Transition::Opened { since: at }
            }
            (Some(since), true) => Transition::Continued { since },
            (Some(since), false) => {
                self.states.remove(&key);
                Transition::Closed { since }
            }
            (None, false) => Transition::Unchanged,
        }
    }

    /// Number of open streaks
    pub fn open_count(&self) -> usize {
        self.states.len()
    }
}
