// # Memory Dedup Store
//
// In-memory implementation of DedupStore.
//
// ## Crash Behavior
//
// - All markers are lost on restart
// - After a restart every alarm still inside its firing window fires again
//
// ## When to Use
//
// - Tests (the fake the contract tests are written against)
// - Ephemeral runs where a repeated alert after restart is acceptable

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::Error;
use crate::alarm::AlarmId;
use crate::traits::dedup_store::{DedupStore, DedupStoreFactory, TriggerRecord};

/// In-memory dedup store
///
/// Clones share the same map, so a test can keep a handle while the monitor
/// owns another.
///
/// # Example
///
/// ```rust,no_run
/// use calarm_core::{AlarmId, DedupStore, MemoryDedupStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = MemoryDedupStore::new();
///     let id = AlarmId::new("alarm-1");
///
///     store.mark_fired(&id).await?;
///     assert!(store.has_fired(&id).await?);
///
///     Ok(())
/// }
/// ```
#[derive(Debug, Clone, Default)]
pub struct MemoryDedupStore {
    inner: Arc<RwLock<HashMap<AlarmId, TriggerRecord>>>,
}

impl MemoryDedupStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of trigger records
    pub async fn len(&self) -> usize {
        self.inner.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.read().await.is_empty()
    }

    /// Drop every marker
    ///
    /// Not part of [`DedupStore`]: the monitor never clears markers. Useful
    /// for simulating a lost store in tests.
    pub async fn clear(&self) {
        self.inner.write().await.clear();
    }
}

#[async_trait]
impl DedupStore for MemoryDedupStore {
    async fn has_fired(&self, alarm_id: &AlarmId) -> Result<bool, Error> {
        Ok(self.inner.read().await.contains_key(alarm_id))
    }

    async fn mark_fired(&self, alarm_id: &AlarmId) -> Result<(), Error> {
        let mut guard = self.inner.write().await;
        guard
            .entry(alarm_id.clone())
            .or_insert_with(|| TriggerRecord::new(alarm_id.clone()));
        Ok(())
    }

    async fn get_record(&self, alarm_id: &AlarmId) -> Result<Option<TriggerRecord>, Error> {
        Ok(self.inner.read().await.get(alarm_id).cloned())
    }

    async fn list_fired(&self) -> Result<Vec<AlarmId>, Error> {
        Ok(self.inner.read().await.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        Ok(())
    }
}

/// Factory for `{"type": "memory"}`
pub struct MemoryDedupStoreFactory;

#[async_trait]
impl DedupStoreFactory for MemoryDedupStoreFactory {
    async fn create(&self, _config: &serde_json::Value) -> Result<Box<dyn DedupStore>, Error> {
        Ok(Box::new(MemoryDedupStore::new()))
    }
}
