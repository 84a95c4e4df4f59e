// # Alarm Source Trait
//
// Defines where the alarm list comes from.
//
// The monitor itself never fetches alarms. Something outside it (a CRUD
// service, a JSON file, a UI) owns the list and pushes the whole thing in
// through `AlarmMonitor::sync` whenever it changes. An `AlarmSource` is
// that something, wrapped so `feed::run_feed` can drive it.
//
// ## Implementations
//
// - File-based: `calarm-source-file` crate
//
// ## Usage
//
// ```rust,ignore
// use calarm_core::AlarmSource;
// use tokio_stream::StreamExt;
//
// let initial = source.load().await?;
// monitor.sync(initial).await;
//
// let mut updates = source.watch();
// while let Some(records) = updates.next().await {
//     monitor.sync(records).await;
// }
// ```

use async_trait::async_trait;
use std::pin::Pin;
use tokio_stream::Stream;

use crate::alarm::AlarmRecord;

/// Trait for alarm source implementations
///
/// Records are passed through unvalidated; the monitor skips malformed
/// entries itself.
#[async_trait]
pub trait AlarmSource: Send + Sync {
    /// Load the current alarm list
    async fn load(&self) -> Result<Vec<AlarmRecord>, crate::Error>;

    /// Stream of replacement alarm lists
    ///
    /// # Behavior
    ///
    /// - Yields the complete list each time it changes, never a diff
    /// - Does not yield the list returned by the preceding `load()` again
    ///   unless it changed
    /// - Must be cancellation-safe (dropping the stream cleans up resources)
    fn watch(&self) -> Pin<Box<dyn Stream<Item = Vec<AlarmRecord>> + Send + 'static>>;

    /// Name for logs
    fn source_name(&self) -> &str;
}

/// Helper trait for constructing alarm sources from configuration
pub trait AlarmSourceFactory: Send + Sync {
    fn create(
        &self,
        config: &crate::config::AlarmSourceConfig,
    ) -> Result<Box<dyn AlarmSource>, crate::Error>;
}
