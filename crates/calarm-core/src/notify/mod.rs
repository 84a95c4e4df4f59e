//! Notification fan-out
//!
//! Delivers one fired alarm through every configured channel. Channels are
//! independent: each one runs regardless of what the others did, and a
//! failure is logged and recorded in the [`FanoutReport`], never returned.
//!
//! OS-level channels are only attempted when the [`PermissionQuery`] says
//! notifications are already authorized.

use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use crate::alarm::{Alarm, AlarmId};
use crate::traits::{
    AlarmNotification, ChannelKind, NotificationChannel, PermissionQuery,
    DEFAULT_BANNER_DURATION,
};

/// Result of delivering through one channel
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelOutcome {
    Delivered,
    Failed(String),
    /// Not attempted (OS channel without permission)
    Skipped,
}

/// Per-channel results for one fired alarm
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FanoutReport {
    pub alarm_id: AlarmId,
    /// `(channel name, outcome)` in channel order
    pub outcomes: Vec<(String, ChannelOutcome)>,
}

impl FanoutReport {
    pub fn delivered(&self) -> usize {
        self.count(|o| matches!(o, ChannelOutcome::Delivered))
    }

    pub fn failed(&self) -> usize {
        self.count(|o| matches!(o, ChannelOutcome::Failed(_)))
    }

    pub fn skipped(&self) -> usize {
        self.count(|o| matches!(o, ChannelOutcome::Skipped))
    }

    fn count(&self, pred: impl Fn(&ChannelOutcome) -> bool) -> usize {
        self.outcomes.iter().filter(|(_, o)| pred(o)).count()
    }
}

/// Fans a fired alarm out to every channel
pub struct Fanout {
    channels: Vec<Box<dyn NotificationChannel>>,
    permission: Arc<dyn PermissionQuery>,
    banner_duration: Duration,
}

impl Fanout {
    pub fn new(permission: Arc<dyn PermissionQuery>) -> Self {
        Self {
            channels: Vec::new(),
            permission,
            banner_duration: DEFAULT_BANNER_DURATION,
        }
    }

    /// Add a channel; channels run in the order they were added
    pub fn with_channel(mut self, channel: Box<dyn NotificationChannel>) -> Self {
        self.channels.push(channel);
        self
    }

    pub fn add_channel(&mut self, channel: Box<dyn NotificationChannel>) {
        self.channels.push(channel);
    }

    /// How long in-app banners stay visible
    pub fn with_banner_duration(mut self, duration: Duration) -> Self {
        self.banner_duration = duration;
        self
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }

    /// Deliver `alarm` through every channel
    pub async fn deliver(&self, alarm: &Alarm) -> FanoutReport {
        let notification = AlarmNotification::from_alarm(alarm, self.banner_duration);
        let mut outcomes = Vec::with_capacity(self.channels.len());

        for channel in &self.channels {
            let name = channel.name().to_string();

            if channel.kind() == ChannelKind::Os && !self.permission.notifications_granted() {
                debug!("Notification permission not granted, skipping channel {}", name);
                outcomes.push((name, ChannelOutcome::Skipped));
                continue;
            }

            let outcome = match channel.deliver(&notification).await {
                Ok(()) => {
                    debug!("Alarm {} delivered via {} ({})", alarm.id(), name, channel.kind());
                    ChannelOutcome::Delivered
                }
                Err(e) => {
                    warn!("Channel {} failed for alarm {}: {}", name, alarm.id(), e);
                    ChannelOutcome::Failed(e.to_string())
                }
            };
            outcomes.push((name, outcome));
        }

        FanoutReport {
            alarm_id: alarm.id().clone(),
            outcomes,
        }
    }
}
