//! What a single evaluation pass or sync did

use chrono::{DateTime, Utc};

use crate::alarm::AlarmId;

/// Outcome of one evaluation pass over the working set
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PassReport {
    /// Clock reading the pass evaluated against
    pub evaluated_at: DateTime<Utc>,
    pub evaluated: usize,
    pub pending: usize,
    pub expired: usize,
    /// In the firing window but already fired
    pub suppressed: usize,
    /// Dedup store reads/writes that failed during the pass
    pub store_errors: usize,
    /// Alarms fired in this pass, in working-set order
    ///
    /// Their deliveries run on separate tasks; see
    /// [`AlarmMonitor::wait_for_deliveries`](super::AlarmMonitor::wait_for_deliveries).
    pub fired: Vec<AlarmId>,
}

impl PassReport {
    pub(crate) fn new(evaluated_at: DateTime<Utc>) -> Self {
        Self {
            evaluated_at,
            evaluated: 0,
            pending: 0,
            expired: 0,
            suppressed: 0,
            store_errors: 0,
            fired: Vec::new(),
        }
    }

    pub fn fired_ids(&self) -> Vec<AlarmId> {
        self.fired.clone()
    }
}

/// Outcome of [`AlarmMonitor::sync`](super::AlarmMonitor::sync)
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SyncReport {
    /// Records that made it into the working set
    pub accepted: usize,
    /// Malformed records that were skipped
    pub rejected: usize,
    /// The immediate pass, if one ran
    pub pass: Option<PassReport>,
}

/// Lifetime counters for a monitor
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MonitorStats {
    pub passes_completed: usize,
    /// Timer ticks dropped because a pass was still in flight
    pub ticks_dropped: usize,
}
