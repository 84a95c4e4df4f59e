// # Dedup Store Trait
//
// Defines the durable "alarm X already fired" record.
//
// ## Purpose
//
// The dedup store is what makes firing exactly-once across reloads:
// - `mark_fired` is recorded before any notification channel runs
// - `has_fired` is consulted on every positive trigger evaluation
//
// A restart after `mark_fired` must not fire again. A restart before
// `mark_fired` must still fire.
//
// ## Implementations
//
// - In-memory: `MemoryDedupStore` (tests, ephemeral runs)
// - File-based: `FileDedupStore` (JSON, atomic writes)
//
// ## Usage
//
// ```rust,ignore
// use calarm_core::{AlarmId, DedupStore};
//
// let id = AlarmId::new("alarm-1");
// if !store.has_fired(&id).await? {
//     store.mark_fired(&id).await?;
//     // notify...
// }
// ```

use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::alarm::AlarmId;

/// Durable marker written once when an alarm fires
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct TriggerRecord {
    pub alarm_id: AlarmId,
    /// When the firing was recorded
    pub fired_at: DateTime<Utc>,
}

impl TriggerRecord {
    /// Create a record stamped with the current time
    ///
    /// `pub(crate)`: records are only written by store implementations on
    /// `mark_fired`.
    pub(crate) fn new(alarm_id: AlarmId) -> Self {
        Self {
            alarm_id,
            fired_at: Utc::now(),
        }
    }
}

/// Trait for dedup store implementations
///
/// # Contract
///
/// - Both `has_fired` and `mark_fired` must be durable across process
///   restarts (the in-memory store is the documented exception, used as a
///   test fake).
/// - `mark_fired` is write-once: calling it again for the same id keeps the
///   original record.
/// - There is no `clear`: alarm identifiers are never reused, and orphaned
///   records for deleted alarms are left in place.
///
/// # Thread Safety
///
/// All methods must be safe to call from any task.
#[async_trait]
pub trait DedupStore: Send + Sync {
    /// Whether `alarm_id` has already fired
    async fn has_fired(&self, alarm_id: &AlarmId) -> Result<bool, crate::Error>;

    /// Record that `alarm_id` fired
    ///
    /// Must be durable by the time it returns `Ok`.
    async fn mark_fired(&self, alarm_id: &AlarmId) -> Result<(), crate::Error>;

    /// The full trigger record, if any
    async fn get_record(&self, alarm_id: &AlarmId) -> Result<Option<TriggerRecord>, crate::Error>;

    /// Every alarm id with a trigger record
    async fn list_fired(&self) -> Result<Vec<AlarmId>, crate::Error>;

    /// Persist anything still buffered
    async fn flush(&self) -> Result<(), crate::Error>;
}

/// Helper trait for constructing dedup stores from configuration
#[async_trait]
pub trait DedupStoreFactory: Send + Sync {
    /// Create a DedupStore instance from its JSON configuration
    async fn create(&self, config: &serde_json::Value) -> Result<Box<dyn DedupStore>, crate::Error>;
}
