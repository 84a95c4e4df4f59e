//! Alarm monitor
//!
//! The AlarmMonitor owns the working set of alarms and the timer that
//! re-evaluates them. It is responsible for:
//! - Replacing the working set on [`sync`](AlarmMonitor::sync)
//! - Arming and disarming its one timer as the set fills and empties
//! - Running evaluation passes, never more than one at a time
//! - Recording each fire in the DedupStore before fanning it out
//!
//! ## Architecture
//!
//! ```text
//!   sync(records) ──┐              interval tick (every poll_interval)
//!                   ▼                          │
//!           ┌──────────────┐                   │
//!           │ AlarmMonitor │◀──────────────────┘
//!           └──────────────┘
//!                   │ evaluate(now, alarm) for every alarm
//!                   ▼
//!              Fire? ──▶ DedupStore (has_fired / mark_fired) ──▶ Fanout
//! ```
//!
//! ## Pass Flow
//!
//! 1. Read the clock once
//! 2. Evaluate every alarm in the snapshot of the working set
//! 3. For `Fire`: skip if already fired, else `mark_fired` then hand the
//!    alarm to a delivery task
//!
//! The pass never waits for a channel. A slow or hung channel holds only
//! its own delivery task, so detection of other alarms keeps to the poll
//! interval.
//!
//! ## Failure Direction
//!
//! A dedup store that cannot be read is treated as "not fired", and a
//! failed `mark_fired` does not stop delivery. Both risk a duplicate alert
//! after a restart rather than a missed one. Within one process the
//! monitor also remembers what it fired, so a broken store does not cause
//! an alert on every tick.

mod report;

pub use report::{MonitorStats, PassReport, SyncReport};

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

use crate::alarm::{Alarm, AlarmId, AlarmRecord};
use crate::config::MonitorConfig;
use crate::error::Result;
use crate::evaluator::{TriggerState, evaluate};
use crate::notify::{Fanout, FanoutReport};
use crate::traits::{Clock, DedupStore};

/// Lead-time alarm monitor
///
/// ## Lifecycle
///
/// 1. Create with [`AlarmMonitor::new()`]
/// 2. Feed alarms with [`AlarmMonitor::sync()`] (before or after starting)
/// 3. [`AlarmMonitor::start()`] arms the timer and evaluates immediately
/// 4. [`AlarmMonitor::stop()`] cancels the timer; a pass already running is
///    allowed to finish
///
/// Dropping the monitor cancels its timer as well.
///
/// ## Timer
///
/// At most one interval task exists per monitor. It is armed only while the
/// monitor is running and the working set is non-empty. A tick that arrives
/// while a pass is in flight is dropped, not queued.
pub struct AlarmMonitor {
    inner: Arc<Inner>,
    ticker: Mutex<Option<Ticker>>,
}

struct Ticker {
    shutdown_tx: oneshot::Sender<()>,
    handle: JoinHandle<()>,
}

struct Inner {
    store: Box<dyn DedupStore>,
    fanout: Arc<Fanout>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,

    alarms: RwLock<Arc<Vec<Alarm>>>,
    running: AtomicBool,
    pass_in_flight: AtomicBool,
    /// A sync arrived while a pass was in flight
    rerun_requested: AtomicBool,
    /// Alarms fired by this process, independent of the store
    fired_this_session: Mutex<HashSet<AlarmId>>,
    /// Delivery tasks not yet collected by `wait_for_deliveries`
    deliveries: Mutex<Vec<JoinHandle<FanoutReport>>>,

    passes_completed: AtomicUsize,
    ticks_dropped: AtomicUsize,
}

/// Held for the duration of a pass; releases the in-flight flag on drop
struct PassGuard {
    inner: Arc<Inner>,
}

impl Drop for PassGuard {
    fn drop(&mut self) {
        self.inner.pass_in_flight.store(false, Ordering::Release);
    }
}

impl AlarmMonitor {
    /// Create a stopped monitor with an empty working set
    ///
    /// # Errors
    ///
    /// Returns a configuration error if `config` does not validate.
    pub fn new(
        store: Box<dyn DedupStore>,
        fanout: Fanout,
        clock: Arc<dyn Clock>,
        config: MonitorConfig,
    ) -> Result<Self> {
        config.validate()?;

        let fanout = fanout.with_banner_duration(config.banner_duration());
        Ok(Self {
            inner: Arc::new(Inner {
                store,
                fanout: Arc::new(fanout),
                clock,
                config,
                alarms: RwLock::new(Arc::new(Vec::new())),
                running: AtomicBool::new(false),
                pass_in_flight: AtomicBool::new(false),
                rerun_requested: AtomicBool::new(false),
                fired_this_session: Mutex::new(HashSet::new()),
                deliveries: Mutex::new(Vec::new()),
                passes_completed: AtomicUsize::new(0),
                ticks_dropped: AtomicUsize::new(0),
            }),
            ticker: Mutex::new(None),
        })
    }

    /// Start monitoring
    ///
    /// Arms the timer and runs one pass right away if there are alarms.
    /// Calling `start` on a running monitor does nothing.
    pub async fn start(&self) -> Option<PassReport> {
        if self.inner.running.swap(true, Ordering::AcqRel) {
            debug!("Alarm monitor already running");
            return None;
        }
        info!("Alarm monitor started with {} alarm(s)", self.alarm_count());

        if self.alarm_count() == 0 {
            return None;
        }
        self.arm();
        self.inner.request_pass().await
    }

    /// Stop monitoring
    ///
    /// Cancels the timer and waits for the timer task to exit. An
    /// evaluation pass that is already running completes on its own.
    pub async fn stop(&self) {
        self.inner.running.store(false, Ordering::Release);
        if let Some(handle) = self.disarm() {
            let _ = handle.await;
        }
        info!("Alarm monitor stopped");
    }

    /// Replace the working set with `records`
    ///
    /// Malformed records (lead time below one minute, missing start) are
    /// logged and skipped. On a running monitor this arms or disarms the
    /// timer as needed and evaluates immediately, so an alarm whose window
    /// is already open fires without waiting for the next tick.
    pub async fn sync(&self, records: Vec<AlarmRecord>) -> SyncReport {
        let total = records.len();
        let alarms: Vec<Alarm> = records
            .into_iter()
            .filter_map(|record| match Alarm::try_from(record) {
                Ok(alarm) => Some(alarm),
                Err(e) => {
                    warn!("Skipping malformed alarm: {}", e);
                    None
                }
            })
            .collect();

        let accepted = alarms.len();
        let pass = self.sync_alarms(alarms).await;

        SyncReport {
            accepted,
            rejected: total - accepted,
            pass,
        }
    }

    /// Replace the working set with already-validated alarms
    ///
    /// Same arming and evaluation behavior as [`sync`](Self::sync).
    pub async fn sync_alarms(&self, alarms: Vec<Alarm>) -> Option<PassReport> {
        let count = alarms.len();
        self.inner.forget_removed(&alarms);
        *self
            .inner
            .alarms
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::new(alarms);
        debug!("Alarm set synced: {} alarm(s)", count);

        if !self.is_running() {
            return None;
        }

        if count == 0 {
            if let Some(handle) = self.disarm() {
                let _ = handle.await;
                info!("Alarm set is empty, timer disarmed");
            }
            return None;
        }

        self.arm();
        self.inner.request_pass().await
    }

    /// Run one evaluation pass now
    ///
    /// Returns `None` if a pass is already in flight.
    pub async fn evaluate_now(&self) -> Option<PassReport> {
        let guard = self.inner.try_begin_pass()?;
        Some(self.inner.run_guarded(guard).await)
    }

    /// Wait for delivery tasks still in flight and collect their reports
    ///
    /// Deliveries that had already finished when a later alarm fired are
    /// not kept; the fan-out logs every outcome either way.
    pub async fn wait_for_deliveries(&self) -> Vec<FanoutReport> {
        let handles = std::mem::take(
            &mut *self
                .inner
                .deliveries
                .lock()
                .unwrap_or_else(PoisonError::into_inner),
        );

        let mut reports = Vec::with_capacity(handles.len());
        for handle in handles {
            match handle.await {
                Ok(report) => reports.push(report),
                Err(e) => warn!("Notification delivery task failed: {}", e),
            }
        }
        reports
    }

    /// Delivery tasks spawned and not yet finished
    pub fn deliveries_in_flight(&self) -> usize {
        self.inner
            .deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Flush the dedup store
    pub async fn flush(&self) -> Result<()> {
        self.inner.store.flush().await
    }

    pub fn is_running(&self) -> bool {
        self.inner.running.load(Ordering::Acquire)
    }

    /// Whether the timer task is live
    pub fn is_armed(&self) -> bool {
        self.ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .as_ref()
            .is_some_and(|t| !t.handle.is_finished())
    }

    pub fn alarm_count(&self) -> usize {
        self.alarms().len()
    }

    /// Snapshot of the working set
    pub fn alarms(&self) -> Arc<Vec<Alarm>> {
        self.inner.snapshot()
    }

    pub fn config(&self) -> &MonitorConfig {
        &self.inner.config
    }

    pub fn stats(&self) -> MonitorStats {
        MonitorStats {
            passes_completed: self.inner.passes_completed.load(Ordering::Relaxed),
            ticks_dropped: self.inner.ticks_dropped.load(Ordering::Relaxed),
        }
    }

    /// Spawn the timer task unless one is already live
    fn arm(&self) {
        let mut ticker = self.ticker.lock().unwrap_or_else(PoisonError::into_inner);
        if ticker.as_ref().is_some_and(|t| !t.handle.is_finished()) {
            return;
        }

        let (shutdown_tx, shutdown_rx) = oneshot::channel();
        let handle = tokio::spawn(tick_loop(Arc::clone(&self.inner), shutdown_rx));
        *ticker = Some(Ticker {
            shutdown_tx,
            handle,
        });
        info!(
            "Alarm timer armed (every {}s)",
            self.inner.config.poll_interval_secs
        );
    }

    /// Signal the timer task to exit and hand back its handle
    fn disarm(&self) -> Option<JoinHandle<()>> {
        let ticker = self
            .ticker
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()?;
        let _ = ticker.shutdown_tx.send(());
        debug!("Alarm timer disarmed");
        Some(ticker.handle)
    }
}

impl Drop for AlarmMonitor {
    fn drop(&mut self) {
        let ticker = self
            .ticker
            .get_mut()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        if let Some(ticker) = ticker {
            ticker.handle.abort();
        }
    }
}

/// Timer task: one tick per poll interval, first tick one interval out
async fn tick_loop(inner: Arc<Inner>, mut shutdown_rx: oneshot::Receiver<()>) {
    let period = inner.config.poll_interval();
    let mut interval = tokio::time::interval_at(Instant::now() + period, period);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = interval.tick() => {
                let Some(guard) = inner.try_begin_pass() else {
                    inner.ticks_dropped.fetch_add(1, Ordering::Relaxed);
                    debug!("Previous pass still running, dropping tick");
                    continue;
                };

                let pass_inner = Arc::clone(&inner);
                tokio::spawn(async move {
                    if !pass_inner.running.load(Ordering::Acquire) {
                        return;
                    }
                    pass_inner.run_guarded(guard).await;
                });
            }

            _ = &mut shutdown_rx => {
                debug!("Timer task exiting");
                break;
            }
        }
    }
}

impl Inner {
    fn snapshot(&self) -> Arc<Vec<Alarm>> {
        Arc::clone(&self.alarms.read().unwrap_or_else(PoisonError::into_inner))
    }

    fn try_begin_pass(self: &Arc<Self>) -> Option<PassGuard> {
        self.pass_in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| PassGuard {
                inner: Arc::clone(self),
            })
    }

    /// Run a pass for a sync/start; coalesce into the in-flight pass if busy
    async fn request_pass(self: &Arc<Self>) -> Option<PassReport> {
        if let Some(guard) = self.try_begin_pass() {
            return Some(self.run_guarded(guard).await);
        }

        self.rerun_requested.store(true, Ordering::Release);
        debug!("Pass in flight, queued one follow-up pass");

        // The in-flight pass may have finished before it saw the request
        let guard = self.try_begin_pass()?;
        Some(self.run_guarded(guard).await)
    }

    async fn run_guarded(self: &Arc<Self>, mut guard: PassGuard) -> PassReport {
        loop {
            let report = loop {
                self.rerun_requested.store(false, Ordering::Release);
                let report = self.run_pass().await;
                if !self.rerun_requested.load(Ordering::Acquire) {
                    break report;
                }
                debug!("Working set changed during pass, evaluating again");
            };

            match self.finish_pass(guard) {
                Some(next) => {
                    debug!("Follow-up pass requested while releasing, evaluating again");
                    guard = next;
                }
                None => return report,
            }
        }
    }

    /// Release the pass, taking it straight back if a follow-up was
    /// requested after the last check
    ///
    /// A `sync` that sets the flag in that gap fails to begin its own pass,
    /// so someone has to run it.
    fn finish_pass(self: &Arc<Self>, guard: PassGuard) -> Option<PassGuard> {
        drop(guard);
        if !self.rerun_requested.load(Ordering::Acquire) {
            return None;
        }
        self.try_begin_pass()
    }

    async fn run_pass(&self) -> PassReport {
        let now = self.clock.now();
        let alarms = self.snapshot();
        let mut report = PassReport::new(now);

        for alarm in alarms.iter() {
            report.evaluated += 1;
            match evaluate(now, alarm) {
                TriggerState::Pending => report.pending += 1,
                TriggerState::Expired => report.expired += 1,
                TriggerState::Fire => self.handle_fire(alarm, &mut report).await,
            }
        }

        self.passes_completed.fetch_add(1, Ordering::Relaxed);
        debug!(
            "Pass at {}: {} evaluated, {} fired, {} pending, {} expired, {} suppressed",
            now,
            report.evaluated,
            report.fired.len(),
            report.pending,
            report.expired,
            report.suppressed
        );
        report
    }

    async fn handle_fire(&self, alarm: &Alarm, report: &mut PassReport) {
        let id = alarm.id();

        if self.fired_in_session(id) {
            report.suppressed += 1;
            return;
        }

        match self.store.has_fired(id).await {
            Ok(true) => {
                debug!("Alarm {} already fired, skipping", id);
                self.remember_fired(id);
                report.suppressed += 1;
                return;
            }
            Ok(false) => {}
            Err(e) => {
                warn!("Dedup lookup failed for alarm {}, treating as not fired: {}", id, e);
                report.store_errors += 1;
            }
        }

        self.remember_fired(id);
        if let Err(e) = self.store.mark_fired(id).await {
            warn!("Failed to record fire for alarm {}: {}", id, e);
            report.store_errors += 1;
        }

        info!(
            "Alarm {} fired: '{}' starts at {} ({} min lead)",
            id,
            alarm.event_title(),
            alarm.event_start(),
            alarm.lead_minutes()
        );
        report.fired.push(id.clone());
        self.spawn_delivery(alarm.clone());
    }

    /// Fan `alarm` out on its own task so the pass does not wait on channels
    fn spawn_delivery(&self, alarm: Alarm) {
        let fanout = Arc::clone(&self.fanout);
        let handle = tokio::spawn(async move { fanout.deliver(&alarm).await });

        let mut deliveries = self
            .deliveries
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        deliveries.retain(|h| !h.is_finished());
        deliveries.push(handle);
    }

    /// Drop session memory for alarms no longer in the working set
    fn forget_removed(&self, alarms: &[Alarm]) {
        let keep: HashSet<&AlarmId> = alarms.iter().map(Alarm::id).collect();
        self.fired_this_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id| keep.contains(id));
    }

    fn fired_in_session(&self, id: &AlarmId) -> bool {
        self.fired_this_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(id)
    }

    fn remember_fired(&self, id: &AlarmId) {
        self.fired_this_session
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryDedupStore;
    use crate::traits::StaticPermission;
    use chrono::{DateTime, Duration, Utc};

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    fn t0() -> DateTime<Utc> {
        DateTime::parse_from_rfc3339("2025-06-02T09:50:00Z")
            .unwrap()
            .with_timezone(&Utc)
    }

    fn record(id: &str, start_in_minutes: i64, lead: i64) -> AlarmRecord {
        AlarmRecord {
            id: id.to_string(),
            owner: None,
            event_id: format!("evt-{}", id),
            event_title: format!("Event {}", id),
            event_start: Some((t0() + Duration::minutes(start_in_minutes)).to_rfc3339()),
            alarm_minutes_before: lead,
            created_at: None,
        }
    }

    fn monitor(store: MemoryDedupStore) -> AlarmMonitor {
        AlarmMonitor::new(
            Box::new(store),
            Fanout::new(Arc::new(StaticPermission::denied())),
            Arc::new(FixedClock(t0())),
            MonitorConfig::default(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn sync_on_stopped_monitor_does_not_evaluate() {
        let monitor = monitor(MemoryDedupStore::new());

        let report = monitor.sync(vec![record("a", 5, 10)]).await;

        assert_eq!(report.accepted, 1);
        assert!(report.pass.is_none());
        assert!(!monitor.is_armed());
        assert_eq!(monitor.stats().passes_completed, 0);
    }

    #[tokio::test]
    async fn start_evaluates_and_arms() {
        let store = MemoryDedupStore::new();
        let monitor = monitor(store.clone());
        monitor.sync(vec![record("a", 5, 10), record("b", 60, 10)]).await;

        let pass = monitor.start().await.expect("start runs a pass");

        assert_eq!(pass.fired_ids(), vec![AlarmId::new("a")]);
        assert_eq!(pass.pending, 1);
        assert!(monitor.is_armed());
        assert!(store.has_fired(&AlarmId::new("a")).await.unwrap());

        monitor.stop().await;
        assert!(!monitor.is_armed());
    }

    #[tokio::test]
    async fn start_twice_is_a_no_op() {
        let monitor = monitor(MemoryDedupStore::new());
        monitor.sync(vec![record("a", 30, 10)]).await;

        assert!(monitor.start().await.is_some());
        assert!(monitor.start().await.is_none());
        assert_eq!(monitor.stats().passes_completed, 1);

        monitor.stop().await;
    }

    #[tokio::test]
    async fn invalid_config_is_rejected() {
        let result = AlarmMonitor::new(
            Box::new(MemoryDedupStore::new()),
            Fanout::new(Arc::new(StaticPermission::denied())),
            Arc::new(FixedClock(t0())),
            MonitorConfig {
                poll_interval_secs: 0,
                ..MonitorConfig::default()
            },
        );
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn request_after_last_check_keeps_the_pass() {
        let monitor = monitor(MemoryDedupStore::new());
        let guard = monitor.inner.try_begin_pass().unwrap();

        // A sync that found the pass busy and left the flag for the runner
        monitor.inner.rerun_requested.store(true, Ordering::Release);
        assert!(monitor.inner.try_begin_pass().is_none());

        let next = monitor.inner.finish_pass(guard);
        assert!(next.is_some(), "flag set during release must be picked up");
        assert!(monitor.inner.try_begin_pass().is_none());

        drop(next);
        monitor.inner.rerun_requested.store(false, Ordering::Release);
        let guard = monitor.inner.try_begin_pass().unwrap();
        assert!(monitor.inner.finish_pass(guard).is_none());
        assert!(!monitor.inner.pass_in_flight.load(Ordering::Acquire));
    }

    #[tokio::test]
    async fn sync_forgets_removed_alarms() {
        let store = MemoryDedupStore::new();
        let monitor = monitor(store.clone());
        monitor.sync(vec![record("a", 5, 10), record("b", 5, 10)]).await;
        monitor.start().await;
        assert_eq!(monitor.inner.fired_this_session.lock().unwrap().len(), 2);

        monitor.sync(vec![record("b", 5, 10)]).await;
        let remembered = monitor.inner.fired_this_session.lock().unwrap().clone();
        assert_eq!(remembered, HashSet::from([AlarmId::new("b")]));

        // The store still holds the marker if "a" comes back
        let pass = monitor.sync(vec![record("a", 5, 10)]).await.pass.unwrap();
        assert!(pass.fired.is_empty());
        assert_eq!(pass.suppressed, 1);
        monitor.stop().await;
    }

    #[tokio::test]
    async fn expired_alarm_never_fires() {
        let monitor = monitor(MemoryDedupStore::new());
        monitor.sync(vec![record("late", -1, 10)]).await;

        let pass = monitor.start().await.unwrap();

        assert_eq!(pass.expired, 1);
        assert!(pass.fired.is_empty());
        monitor.stop().await;
    }
}
