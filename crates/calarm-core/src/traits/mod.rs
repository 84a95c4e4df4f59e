//! Core traits for calarm
//!
//! The abstract interfaces the monitor is built against.
//!
//! - [`DedupStore`]: durable "already fired" markers
//! - [`NotificationChannel`] / [`PermissionQuery`]: notification delivery
//! - [`Clock`]: wall-clock time
//! - [`AlarmSource`]: the externally maintained alarm list

pub mod alarm_source;
pub mod channel;
pub mod clock;
pub mod dedup_store;

pub use alarm_source::{AlarmSource, AlarmSourceFactory};
pub use channel::{
    AlarmNotification, ChannelFactory, ChannelKind, NotificationChannel, PermissionQuery,
    StaticPermission, DEFAULT_BANNER_DURATION,
};
pub use clock::{Clock, SystemClock};
pub use dedup_store::{DedupStore, DedupStoreFactory, TriggerRecord};
