// # Notification Channel Trait
//
// A channel is one way of telling the user an alarm fired: an audio
// alert, an in-app banner, an OS-level notification.
//
// Channels are best-effort. A failing channel returns `Err`, the fan-out
// logs it and moves on to the next one; nothing a channel does can affect
// dedup state.

use async_trait::async_trait;
use chrono::{DateTime, FixedOffset};
use std::fmt;
use std::time::Duration;

use crate::alarm::{Alarm, AlarmId};

/// Default visibility of the in-app banner
pub const DEFAULT_BANNER_DURATION: Duration = Duration::from_secs(10);

/// The delivery mechanism a channel represents
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChannelKind {
    /// Looping alert sound
    Audio,
    /// High-salience banner inside the host application
    InApp,
    /// OS-level notification; only used when permission is already granted
    Os,
}

impl fmt::Display for ChannelKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ChannelKind::Audio => "audio",
            ChannelKind::InApp => "in_app",
            ChannelKind::Os => "os",
        };
        f.write_str(name)
    }
}

/// What gets delivered when an alarm fires
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AlarmNotification {
    pub alarm_id: AlarmId,
    pub event_id: String,
    /// Title captured when the alarm was created
    pub event_title: String,
    pub event_start: DateTime<FixedOffset>,
    pub lead_minutes: u32,
    /// Human-readable alert text
    pub message: String,
    /// How long a banner should stay visible
    pub display_for: Duration,
}

impl AlarmNotification {
    pub fn from_alarm(alarm: &Alarm, display_for: Duration) -> Self {
        Self {
            alarm_id: alarm.id().clone(),
            event_id: alarm.event_id().to_string(),
            event_title: alarm.event_title().to_string(),
            event_start: alarm.event_start(),
            lead_minutes: alarm.lead_minutes(),
            message: alert_message(alarm.event_title(), alarm.lead_minutes()),
            display_for,
        }
    }
}

fn alert_message(title: &str, lead_minutes: u32) -> String {
    let unit = if lead_minutes == 1 { "minute" } else { "minutes" };
    format!("⏰ Alarm: {} starts in {} {}!", title, lead_minutes, unit)
}

/// Trait for notification channel implementations
///
/// `deliver` should return promptly: an audio channel starts playback and
/// returns, it does not wait for the sound to finish.
#[async_trait]
pub trait NotificationChannel: Send + Sync {
    /// Which delivery mechanism this is
    fn kind(&self) -> ChannelKind;

    /// Short name for logs
    fn name(&self) -> &str;

    /// Deliver a notification
    async fn deliver(&self, notification: &AlarmNotification) -> Result<(), crate::Error>;
}

/// Reports whether OS-level notifications are currently authorized
///
/// The engine only ever asks; requesting permission is a user action that
/// happens outside the monitoring loop.
pub trait PermissionQuery: Send + Sync {
    fn notifications_granted(&self) -> bool;
}

/// A permission answer fixed at construction time
#[derive(Debug, Clone, Copy, Default)]
pub struct StaticPermission {
    granted: bool,
}

impl StaticPermission {
    pub fn granted() -> Self {
        Self { granted: true }
    }

    pub fn denied() -> Self {
        Self { granted: false }
    }
}

impl PermissionQuery for StaticPermission {
    fn notifications_granted(&self) -> bool {
        self.granted
    }
}

/// Helper trait for constructing channels from configuration
pub trait ChannelFactory: Send + Sync {
    /// Create a channel from its JSON settings
    fn create(&self, settings: &serde_json::Value) -> Result<Box<dyn NotificationChannel>, crate::Error>;
}
