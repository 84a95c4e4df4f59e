//! Test doubles and common utilities for contract tests
//!
//! Minimal fakes for the monitor's collaborators: clocks that tests drive,
//! channels that record what they were asked to deliver, a dedup store
//! whose reads and writes can be made to fail, and an alarm source fed by
//! the test.

#![allow(dead_code)]

use async_trait::async_trait;
use calarm_core::error::{Error, Result};
use calarm_core::traits::{
    AlarmNotification, AlarmSource, ChannelKind, Clock, DedupStore, NotificationChannel,
    StaticPermission, TriggerRecord,
};
use calarm_core::{AlarmId, AlarmMonitor, AlarmRecord, Fanout, MemoryDedupStore, MonitorConfig};
use chrono::{DateTime, Duration, Utc};
use std::pin::Pin;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use tokio::sync::mpsc;
use tokio_stream::Stream;

/// 2025-06-02T09:50:00Z
pub fn t0() -> DateTime<Utc> {
    at("2025-06-02T09:50:00Z")
}

pub fn at(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .expect("valid RFC 3339 in test")
        .with_timezone(&Utc)
}

/// An alarm record for an event starting at `start` with `lead` minutes
pub fn record_at(id: &str, start: DateTime<Utc>, lead: i64) -> AlarmRecord {
    AlarmRecord {
        id: id.to_string(),
        owner: Some("owner@example.com".to_string()),
        event_id: format!("evt-{}", id),
        event_title: format!("Event {}", id),
        event_start: Some(start.to_rfc3339()),
        alarm_minutes_before: lead,
        created_at: None,
    }
}

/// An alarm record for an event starting `start_in` after [`t0`]
pub fn record(id: &str, start_in: Duration, lead: i64) -> AlarmRecord {
    record_at(id, t0() + start_in, lead)
}

/// Let spawned tasks run to completion on the current-thread runtime
pub async fn settle() {
    for _ in 0..20 {
        tokio::task::yield_now().await;
    }
}

/// A clock the test sets by hand
#[derive(Clone)]
pub struct ManualClock {
    now: Arc<Mutex<DateTime<Utc>>>,
}

impl ManualClock {
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            now: Arc::new(Mutex::new(now)),
        }
    }

    pub fn set(&self, now: DateTime<Utc>) {
        *self.now.lock().unwrap() = now;
    }

    pub fn advance(&self, by: Duration) {
        *self.now.lock().unwrap() += by;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.lock().unwrap()
    }
}

/// A wall clock that moves with tokio's (pausable) time
///
/// `now()` is `base` plus the tokio time elapsed since construction, so
/// `tokio::time::advance` and auto-advance move it too.
pub struct TokioClock {
    base: DateTime<Utc>,
    started: tokio::time::Instant,
}

impl TokioClock {
    pub fn new(base: DateTime<Utc>) -> Self {
        Self {
            base,
            started: tokio::time::Instant::now(),
        }
    }
}

impl Clock for TokioClock {
    fn now(&self) -> DateTime<Utc> {
        let elapsed = Duration::from_std(self.started.elapsed()).expect("elapsed fits");
        self.base + elapsed
    }
}

/// Shared view of what a [`RecordingChannel`] saw
#[derive(Clone, Default)]
pub struct Deliveries {
    seen: Arc<Mutex<Vec<AlarmNotification>>>,
    active: Arc<AtomicUsize>,
    max_active: Arc<AtomicUsize>,
}

impl Deliveries {
    pub fn count(&self) -> usize {
        self.seen.lock().unwrap().len()
    }

    pub fn ids(&self) -> Vec<String> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .map(|n| n.alarm_id.to_string())
            .collect()
    }

    pub fn notifications(&self) -> Vec<AlarmNotification> {
        self.seen.lock().unwrap().clone()
    }

    /// Highest number of deliveries that were in progress at once
    pub fn max_concurrent(&self) -> usize {
        self.max_active.load(Ordering::SeqCst)
    }
}

/// A channel that records every notification it is given
pub struct RecordingChannel {
    kind: ChannelKind,
    name: String,
    deliveries: Deliveries,
    delay: Option<std::time::Duration>,
    fail: bool,
}

impl RecordingChannel {
    pub fn new(kind: ChannelKind, name: &str) -> Self {
        Self {
            kind,
            name: name.to_string(),
            deliveries: Deliveries::default(),
            delay: None,
            fail: false,
        }
    }

    /// Take `delay` (tokio time) to deliver
    pub fn slow(mut self, delay: std::time::Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Record the notification, then return an error
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }

    pub fn deliveries(&self) -> Deliveries {
        self.deliveries.clone()
    }
}

#[async_trait]
impl NotificationChannel for RecordingChannel {
    fn kind(&self) -> ChannelKind {
        self.kind
    }

    fn name(&self) -> &str {
        &self.name
    }

    async fn deliver(&self, notification: &AlarmNotification) -> Result<()> {
        let active = self.deliveries.active.fetch_add(1, Ordering::SeqCst) + 1;
        self.deliveries.max_active.fetch_max(active, Ordering::SeqCst);

        self.deliveries.seen.lock().unwrap().push(notification.clone());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        self.deliveries.active.fetch_sub(1, Ordering::SeqCst);
        if self.fail {
            Err(Error::channel(&self.name, "simulated failure"))
        } else {
            Ok(())
        }
    }
}

/// Failure switches for a [`FlakyDedupStore`]
#[derive(Clone, Default)]
pub struct StoreFaults {
    fail_reads: Arc<AtomicBool>,
    fail_writes: Arc<AtomicBool>,
    writes: Arc<AtomicUsize>,
    read_delay: Arc<Mutex<Option<std::time::Duration>>>,
    reads_active: Arc<AtomicUsize>,
    max_reads_active: Arc<AtomicUsize>,
}

impl StoreFaults {
    pub fn fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make `has_fired` take `delay` (tokio time); `None` makes it instant
    ///
    /// Reads already waiting keep their delay.
    pub fn delay_reads(&self, delay: Option<std::time::Duration>) {
        *self.read_delay.lock().unwrap() = delay;
    }

    /// Highest number of `has_fired` calls that were in progress at once
    pub fn max_concurrent_reads(&self) -> usize {
        self.max_reads_active.load(Ordering::SeqCst)
    }

    /// `mark_fired` calls, successful or not
    pub fn write_attempts(&self) -> usize {
        self.writes.load(Ordering::SeqCst)
    }
}

/// A dedup store wrapping [`MemoryDedupStore`] with injectable failures
pub struct FlakyDedupStore {
    inner: MemoryDedupStore,
    faults: StoreFaults,
}

impl FlakyDedupStore {
    pub fn new(inner: MemoryDedupStore) -> (Self, StoreFaults) {
        let faults = StoreFaults::default();
        (
            Self {
                inner,
                faults: faults.clone(),
            },
            faults,
        )
    }
}

#[async_trait]
impl DedupStore for FlakyDedupStore {
    async fn has_fired(&self, alarm_id: &AlarmId) -> Result<bool> {
        let active = self.faults.reads_active.fetch_add(1, Ordering::SeqCst) + 1;
        self.faults.max_reads_active.fetch_max(active, Ordering::SeqCst);

        let delay = *self.faults.read_delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        self.faults.reads_active.fetch_sub(1, Ordering::SeqCst);
        if self.faults.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::dedup_store("simulated read failure"));
        }
        self.inner.has_fired(alarm_id).await
    }

    async fn mark_fired(&self, alarm_id: &AlarmId) -> Result<()> {
        self.faults.writes.fetch_add(1, Ordering::SeqCst);
        if self.faults.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::dedup_store("simulated write failure"));
        }
        self.inner.mark_fired(alarm_id).await
    }

    async fn get_record(&self, alarm_id: &AlarmId) -> Result<Option<TriggerRecord>> {
        self.inner.get_record(alarm_id).await
    }

    async fn list_fired(&self) -> Result<Vec<AlarmId>> {
        self.inner.list_fired().await
    }

    async fn flush(&self) -> Result<()> {
        self.inner.flush().await
    }
}

/// An alarm source whose updates are pushed by the test
pub struct ControlledAlarmSource {
    initial: Vec<AlarmRecord>,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Vec<AlarmRecord>>>>,
    load_calls: Arc<AtomicUsize>,
}

impl ControlledAlarmSource {
    pub fn new(initial: Vec<AlarmRecord>) -> (Self, mpsc::UnboundedSender<Vec<AlarmRecord>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                initial,
                rx: Mutex::new(Some(rx)),
                load_calls: Arc::new(AtomicUsize::new(0)),
            },
            tx,
        )
    }

    pub fn load_calls(&self) -> usize {
        self.load_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl AlarmSource for ControlledAlarmSource {
    async fn load(&self) -> Result<Vec<AlarmRecord>> {
        self.load_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.initial.clone())
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = Vec<AlarmRecord>> + Send + 'static>> {
        let rx = self
            .rx
            .lock()
            .unwrap()
            .take()
            .expect("watch() can only be called once");
        Box::pin(tokio_stream::wrappers::UnboundedReceiverStream::new(rx))
    }

    fn source_name(&self) -> &str {
        "controlled"
    }
}

/// Monitor over a [`FlakyDedupStore`] with one in-app recording channel
pub fn flaky_monitor(
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
) -> (AlarmMonitor, MemoryDedupStore, StoreFaults, Deliveries) {
    let store = MemoryDedupStore::new();
    let (flaky, faults) = FlakyDedupStore::new(store.clone());
    let channel = RecordingChannel::new(ChannelKind::InApp, "banner");
    let deliveries = channel.deliveries();
    let monitor = monitor_with(Box::new(flaky), vec![Box::new(channel)], clock, config);
    (monitor, store, faults, deliveries)
}

/// Monitor with the default config, denied OS permission and the given parts
pub fn monitor_with(
    store: Box<dyn DedupStore>,
    channels: Vec<Box<dyn NotificationChannel>>,
    clock: Arc<dyn Clock>,
    config: MonitorConfig,
) -> AlarmMonitor {
    let mut fanout = Fanout::new(Arc::new(StaticPermission::denied()));
    for channel in channels {
        fanout.add_channel(channel);
    }
    AlarmMonitor::new(store, fanout, clock, config).expect("valid monitor config")
}

/// Monitor over a memory store with one in-app recording channel
pub fn recording_monitor(clock: Arc<dyn Clock>) -> (AlarmMonitor, MemoryDedupStore, Deliveries) {
    let store = MemoryDedupStore::new();
    let channel = RecordingChannel::new(ChannelKind::InApp, "banner");
    let deliveries = channel.deliveries();
    let monitor = monitor_with(
        Box::new(store.clone()),
        vec![Box::new(channel)],
        clock,
        MonitorConfig::default(),
    );
    (monitor, store, deliveries)
}
