//! Subscription id → entity id table
//!
//! Every `subscribe_trigger` request carries a per-session message id, and
//! every event Home Assistant sends for that trigger carries the same id. This
//! table is how an inbound event finds its entity.
//!
//! Ids are only meaningful within one session. The table is cleared in full
//! whenever a session ends, so an id issued by an earlier connection can never
//! resolve against the subscriptions of a later one.
//!
//! # Thread Safety
//!
//! The table is `Clone` and shares one `Arc<Mutex<..>>`. The read loop
//! inserts and resolves; `StateMonitor::stop` clears it from the caller's task.
//!
//! # Examples
//!
//! ```rust
//! use hassmon_client::SubscriptionTable;
//!
//! # async fn example() {
//! let table = SubscriptionTable::new();
//! table.insert(1, "sensor.temp").await;
//! assert_eq!(table.resolve(1).await.as_deref(), Some("sensor.temp"));
//!
//! table.clear().await;
//! assert_eq!(table.resolve(1).await, None);
//! # }
//! ```

use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;

#[derive(Clone, Default)]
pub struct SubscriptionTable {
    entries: Arc<Mutex<HashMap<u64, String>>>,
}

impl SubscriptionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record that subscription `id` belongs to `entity_id`
    pub async fn insert(&self, id: u64, entity_id: impl Into<String>) {
        self.entries.lock().await.insert(id, entity_id.into());
    }

    /// Entity for subscription `id`, if it belongs to the live session
    pub async fn resolve(&self, id: u64) -> Option<String> {
        self.entries.lock().await.get(&id).cloned()
    }

    /// Forget every subscription; returns how many were dropped
    pub async fn clear(&self) -> usize {
        let mut entries = self.entries.lock().await;
        let count = entries.len();
        entries.clear();
        count
    }

    pub async fn len(&self) -> usize {
        self.entries.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.entries.lock().await.is_empty()
    }

    /// Current entries ordered by subscription id
    pub async fn snapshot(&self) -> Vec<(u64, String)> {
        let entries = self.entries.lock().await;
        let mut snapshot: Vec<(u64, String)> = entries
            .iter()
            .map(|(id, entity)| (*id, entity.clone()))
            .collect();
        snapshot.sort_by_key(|(id, _)| *id);
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_insert_and_resolve() {
        let table = SubscriptionTable::new();
        table.insert(1, "sensor.a").await;
        table.insert(2, "sensor.b").await;

        assert_eq!(table.resolve(1).await.as_deref(), Some("sensor.a"));
        assert_eq!(table.resolve(2).await.as_deref(), Some("sensor.b"));
        assert_eq!(table.resolve(3).await, None);
        assert_eq!(table.len().await, 2);
    }

    #[tokio::test]
    async fn test_clear_drops_all_ids() {
        let table = SubscriptionTable::new();
        table.insert(1, "sensor.a").await;
        table.insert(2, "sensor.b").await;

        assert_eq!(table.clear().await, 2);
        assert!(table.is_empty().await);
        assert_eq!(table.resolve(1).await, None);
        assert_eq!(table.clear().await, 0);
    }

    #[tokio::test]
    async fn test_clones_share_entries() {
        let table = SubscriptionTable::new();
        let reader = table.clone();
        table.insert(5, "light.kitchen").await;
        assert_eq!(reader.resolve(5).await.as_deref(), Some("light.kitchen"));

        reader.clear().await;
        assert!(table.is_empty().await);
    }

    #[tokio::test]
    async fn test_snapshot_is_sorted() {
        let table = SubscriptionTable::new();
        table.insert(3, "c").await;
        table.insert(1, "a").await;
        table.insert(2, "b").await;

        assert_eq!(
            table.snapshot().await,
            vec![(1, "a".to_string()), (2, "b".to_string()), (3, "c".to_string())]
        );
    }

    #[tokio::test]
    async fn test_concurrent_clear_and_resolve() {
        let table = SubscriptionTable::new();
        for id in 1..=100 {
            table.insert(id, format!("sensor.s{}", id)).await;
        }

        let reader = table.clone();
        let resolver = tokio::spawn(async move {
            let mut resolved = 0;
            for id in 1..=100 {
                if reader.resolve(id).await.is_some() {
                    resolved += 1;
                }
            }
            resolved
        });
        table.clear().await;

        let resolved = resolver.await.unwrap();
        assert!(resolved <= 100);
        assert!(table.is_empty().await);
    }
}
