//! Contract Test: Alarm Set Synchronization
//!
//! `sync` replaces the whole working set and, on a running monitor,
//! evaluates right away instead of waiting for the next tick.
//!
//! Constraints verified:
//! - An alarm whose window is already open fires on the sync itself
//! - Malformed records (lead < 1, missing start) are skipped, the rest kept
//! - Removed alarms are no longer evaluated
//! - An empty set disarms the timer; a non-empty one re-arms it
//! - A sync that lands during a pass is folded into one follow-up pass
//!
//! If this test fails, someone has made sync lazy, let a bad record poison
//! the whole set, or left a timer running with nothing to watch.

mod common;

use calarm_core::traits::DedupStore;
use calarm_core::{AlarmRecord, MonitorConfig};
use chrono::Duration;
use common::*;
use std::sync::Arc;

#[tokio::test]
async fn sync_fires_an_already_open_window_immediately() {
    let clock = ManualClock::new(t0());
    let (monitor, _store, deliveries) = recording_monitor(Arc::new(clock));
    monitor.sync(vec![record("later", Duration::hours(2), 10)]).await;
    assert!(monitor.start().await.unwrap().fired.is_empty());

    // Trigger instant 09:45 is already past, event start 09:55 is not
    let report = monitor
        .sync(vec![
            record("later", Duration::hours(2), 10),
            record("new", Duration::minutes(5), 10),
        ])
        .await;

    let pass = report.pass.expect("sync on a running monitor evaluates");
    assert_eq!(pass.fired_ids(), vec![calarm_core::AlarmId::new("new")]);
    monitor.wait_for_deliveries().await;
    assert_eq!(deliveries.ids(), vec!["new".to_string()]);
    monitor.stop().await;
}

#[tokio::test]
async fn malformed_records_are_skipped() {
    let clock = ManualClock::new(t0());
    let (monitor, _store, deliveries) = recording_monitor(Arc::new(clock));
    monitor.start().await;

    let no_start = AlarmRecord {
        event_start: None,
        ..record("no-start", Duration::minutes(5), 10)
    };
    let report = monitor
        .sync(vec![
            record("zero", Duration::minutes(5), 0),
            record("negative", Duration::minutes(5), -10),
            no_start,
            record("good", Duration::minutes(5), 10),
        ])
        .await;

    assert_eq!(report.accepted, 1);
    assert_eq!(report.rejected, 3);
    assert_eq!(monitor.alarm_count(), 1);
    monitor.wait_for_deliveries().await;
    assert_eq!(deliveries.ids(), vec!["good".to_string()]);
    monitor.stop().await;
}

#[tokio::test]
async fn removed_alarm_is_not_evaluated() {
    let clock = ManualClock::new(t0());
    let (monitor, _store, deliveries) = recording_monitor(Arc::new(clock.clone()));
    monitor
        .sync(vec![
            record("keep", Duration::hours(1), 10),
            record("drop", Duration::minutes(20), 15),
        ])
        .await;
    monitor.start().await;

    monitor.sync(vec![record("keep", Duration::hours(1), 10)]).await;
    // "drop" would be in its window now
    clock.advance(Duration::minutes(10));
    let pass = monitor.evaluate_now().await.unwrap();

    assert_eq!(pass.evaluated, 1);
    monitor.wait_for_deliveries().await;
    assert_eq!(deliveries.count(), 0);
    monitor.stop().await;
}

#[tokio::test]
async fn empty_set_disarms_and_non_empty_rearms() {
    let clock = ManualClock::new(t0());
    let (monitor, _store, _deliveries) = recording_monitor(Arc::new(clock));

    monitor.start().await;
    assert!(!monitor.is_armed(), "nothing to watch, no timer");

    monitor.sync(vec![record("a", Duration::hours(1), 10)]).await;
    assert!(monitor.is_armed());

    let report = monitor.sync(Vec::new()).await;
    assert!(report.pass.is_none());
    assert!(!monitor.is_armed());

    monitor.sync(vec![record("a", Duration::hours(1), 10)]).await;
    assert!(monitor.is_armed());

    monitor.stop().await;
    assert!(!monitor.is_armed());
}

#[tokio::test]
async fn sync_while_stopped_only_stores_the_set() {
    let store = calarm_core::MemoryDedupStore::new();
    let channel = RecordingChannel::new(calarm_core::traits::ChannelKind::InApp, "banner");
    let deliveries = channel.deliveries();
    let monitor = monitor_with(
        Box::new(store),
        vec![Box::new(channel)],
        Arc::new(ManualClock::new(t0())),
        MonitorConfig::default(),
    );

    let report = monitor.sync(vec![record("a", Duration::minutes(5), 10)]).await;
    assert!(report.pass.is_none());
    assert_eq!(deliveries.count(), 0);

    let pass = monitor.start().await.expect("start evaluates the stored set");
    assert_eq!(pass.fired.len(), 1);
    monitor.stop().await;
}

#[tokio::test(start_paused = true)]
async fn sync_during_a_pass_gets_one_follow_up_pass() {
    let config = MonitorConfig {
        poll_interval_secs: 30,
        ..MonitorConfig::default()
    };
    let (monitor, store, faults, deliveries) = flaky_monitor(Arc::new(TokioClock::new(t0())), config);
    let monitor = Arc::new(monitor);
    faults.delay_reads(Some(std::time::Duration::from_secs(25)));
    monitor.sync(vec![record("first", Duration::minutes(5), 10)]).await;

    // The start pass sits on the store read for "first" until 25s
    let starter = {
        let monitor = Arc::clone(&monitor);
        tokio::spawn(async move { monitor.start().await })
    };
    tokio::time::sleep(std::time::Duration::from_secs(1)).await;
    faults.delay_reads(None);

    let report = monitor
        .sync(vec![
            record("first", Duration::minutes(5), 10),
            record("new", Duration::minutes(5), 10),
        ])
        .await;
    assert!(report.pass.is_none(), "the in-flight pass picks the new set up");

    let last = starter.await.unwrap().expect("start ran a pass");
    assert_eq!(last.fired_ids(), vec![calarm_core::AlarmId::new("new")]);
    assert!(store.has_fired(&calarm_core::AlarmId::new("new")).await.unwrap());
    // Both passes done at 25s, before the first tick at 30s
    assert_eq!(monitor.stats().passes_completed, 2);
    assert_eq!(monitor.stats().ticks_dropped, 0);

    monitor.wait_for_deliveries().await;
    assert_eq!(deliveries.ids(), vec!["first".to_string(), "new".to_string()]);
    monitor.stop().await;
}
