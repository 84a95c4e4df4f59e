// # calarm-core
//
// Core library for lead-time calendar alarms.
//
// ## Architecture Overview
//
// A user attaches an alarm to a calendar event ("ten minutes before").
// This library decides when such an alarm is due and makes sure it goes
// off exactly once:
// - **evaluate**: Pure trigger evaluation (Pending / Fire / Expired)
// - **DedupStore**: Trait for durable "already fired" markers
// - **NotificationChannel**: Trait for audio, in-app and OS notifications
// - **Fanout**: Delivers one fired alarm to every channel, isolating failures
// - **AlarmMonitor**: Working set, poll timer and evaluation passes
// - **AlarmSource**: Trait for the externally maintained alarm list
// - **ComponentRegistry**: Plugin-based registry for stores, sources, channels
//
// ## Design Principles
//
// 1. **Pure evaluation**: Deciding what is due never touches I/O
// 2. **Record, then notify**: A fire is persisted before it is announced
// 3. **Plugin-Based**: Components are registered by name, no hard-coded if-else
// 4. **Library-First**: The daemon is a thin shell around this crate

pub mod alarm;
pub mod config;
pub mod error;
pub mod evaluator;
pub mod feed;
pub mod monitor;
pub mod notify;
pub mod registry;
pub mod store;
pub mod traits;

// Re-export core types for convenience
pub use alarm::{Alarm, AlarmId, AlarmRecord, CalendarEvent};
pub use config::{AlarmSourceConfig, CalarmConfig, ChannelConfig, DedupStoreConfig, MonitorConfig};
pub use error::{Error, Result};
pub use evaluator::{TriggerState, evaluate, firing_window};
pub use feed::run_feed;
pub use monitor::{AlarmMonitor, MonitorStats, PassReport, SyncReport};
pub use notify::{ChannelOutcome, Fanout, FanoutReport};
pub use registry::ComponentRegistry;
pub use store::{FileDedupStore, MemoryDedupStore};
pub use traits::{AlarmSource, Clock, DedupStore, NotificationChannel, PermissionQuery, SystemClock};
