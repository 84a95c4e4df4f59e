//! Alarm feed driver
//!
//! Glue between an [`AlarmSource`] and an [`AlarmMonitor`]: load the list,
//! start monitoring, forward every new list to `sync`, and shut down
//! cleanly. The monitor never fetches alarms itself; this is the only
//! place that pulls from the outside world.

use std::future::Future;
use std::time::Duration;
use tokio_stream::StreamExt;
use tracing::{debug, info, warn};

use crate::error::Result;
use crate::monitor::AlarmMonitor;
use crate::traits::AlarmSource;

/// How long shutdown waits for notifications already being delivered
const DELIVERY_GRACE: Duration = Duration::from_secs(5);

/// Drive `monitor` from `source` until `shutdown` resolves
///
/// On shutdown the monitor is stopped, deliveries in flight get a short
/// grace period, and the dedup store is flushed.
///
/// # Errors
///
/// Fails if the initial load fails or the final flush fails. Errors while
/// running are logged and do not end the feed.
pub async fn run_feed<F>(monitor: &AlarmMonitor, source: &dyn AlarmSource, shutdown: F) -> Result<()>
where
    F: Future,
{
    tokio::pin!(shutdown);

    let initial = source.load().await?;
    let report = monitor.sync(initial).await;
    info!(
        "Loaded {} alarm(s) from {} ({} skipped as malformed)",
        report.accepted,
        source.source_name(),
        report.rejected
    );

    monitor.start().await;

    let mut updates = source.watch();
    loop {
        tokio::select! {
            update = updates.next() => match update {
                Some(records) => {
                    let report = monitor.sync(records).await;
                    debug!(
                        "Alarm list refreshed: {} accepted, {} rejected",
                        report.accepted,
                        report.rejected
                    );
                }
                None => {
                    warn!(
                        "Alarm source {} stopped producing updates; keeping the last alarm set",
                        source.source_name()
                    );
                    (&mut shutdown).await;
                    info!("Shutdown signal received");
                    break;
                }
            },

            _ = &mut shutdown => {
                info!("Shutdown signal received");
                break;
            }
        }
    }

    monitor.stop().await;
    if tokio::time::timeout(DELIVERY_GRACE, monitor.wait_for_deliveries())
        .await
        .is_err()
    {
        warn!("Notification deliveries still running at shutdown, abandoning them");
    }
    monitor.flush().await?;
    info!("Dedup store flushed, alarm feed stopped");
    Ok(())
}
