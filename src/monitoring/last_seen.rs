//! Last-received registry
//!
//! Wall-clock time of the latest reading received per entity, shared
//! between the ingestion path and the cadence monitor.

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::RwLock;

#[derive(Debug, Clone, PartialEq)]
pub struct LastSeen {
    pub entity_type: String,
    pub received_at: DateTime<Utc>,
}

#[derive(Debug, Default)]
pub struct LastSeenRegistry {
    entries: RwLock<HashMap<String, LastSeen>>,
}

impl LastSeenRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a receipt of `entity_id` at `at`
    pub async fn touch(&self, entity_id: &str, entity_type: &str, at: DateTime<Utc>) {
        let mut entries = self.entries.write().await;
        entries.insert(
            entity_id.to_string(),
            LastSeen {
                entity_type: entity_type.to_string(),
                received_at: at,
            },
        );
    }

    pub async fn get(&self, entity_id: &str) -> Option<LastSeen> {
        self.entries.read().await.get(entity_id).cloned()
    }

    /// Copy of the registry; the lock is released before returning
    pub async fn snapshot(&self) -> HashMap<String, LastSeen> {
        self.entries.read().await.clone()
    }

    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.read().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[tokio::test]
    async fn test_touch_overwrites() {
        let registry = LastSeenRegistry::new();
        let first = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let second = Utc.with_ymd_and_hms(2024, 3, 1, 10, 5, 0).unwrap();

        registry.touch("urn:a", "Dock", first).await;
        registry.touch("urn:a", "Dock", second).await;

        assert_eq!(registry.len().await, 1);
        assert_eq!(registry.get("urn:a").await.unwrap().received_at, second);
        assert!(registry.get("urn:b").await.is_none());
    }
}
