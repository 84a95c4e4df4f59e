//! Trigger evaluation
//!
//! Maps `(now, alarm)` to one of three states. Pure and deterministic: the
//! same inputs always give the same answer, and for a fixed alarm the state
//! only ever moves forward (`Pending` → `Fire` → `Expired`) as `now` grows.
//!
//! ```text
//!            trigger_instant              event_start
//!                  │                           │
//!   Pending        │           Fire            │        Expired
//! ─────────────────[───────────────────────────)─────────────────▶ time
//! ```

use chrono::{DateTime, Utc};
use std::ops::Range;

use crate::alarm::Alarm;

/// Outcome of evaluating an alarm at a point in time
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TriggerState {
    /// `now < trigger_instant`
    Pending,
    /// `trigger_instant <= now < event_start`
    Fire,
    /// `now >= event_start`; the window has closed and the alarm must never fire
    Expired,
}

impl TriggerState {
    pub fn is_fire(self) -> bool {
        matches!(self, TriggerState::Fire)
    }
}

/// Evaluate `alarm` at instant `now`
pub fn evaluate(now: DateTime<Utc>, alarm: &Alarm) -> TriggerState {
    if now >= alarm.event_start_utc() {
        TriggerState::Expired
    } else if now >= alarm.trigger_instant() {
        TriggerState::Fire
    } else {
        TriggerState::Pending
    }
}

/// The half-open firing window `[trigger_instant, event_start)`
pub fn firing_window(alarm: &Alarm) -> Range<DateTime<Utc>> {
    alarm.trigger_instant()..alarm.event_start_utc()
}
