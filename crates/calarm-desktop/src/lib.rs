// # Desktop Notification Channels
//
// Notification channels for running calarm on a desktop session:
//
// - `command_audio`: looping alert sound via an external player command
// - `terminal_banner`: in-app banner written to the terminal
// - `notify_send`: OS notification via `notify-send`
//
// Each channel is best-effort. Failures are returned to the fan-out, which
// logs them and carries on with the next channel.
//
// ## Settings
//
// ```json
// { "factory": "command_audio", "settings": { "command": "paplay /usr/share/sounds/alarm.oga", "repeat": 3 } }
// { "factory": "terminal_banner", "settings": { "bell": true } }
// { "factory": "notify_send", "settings": { "program": "notify-send", "app_name": "calarm" } }
// ```

pub mod audio;
pub mod banner;
pub mod os;

pub use audio::CommandAudioChannel;
pub use banner::TerminalBannerChannel;
pub use os::NotifySendChannel;

use calarm_core::ComponentRegistry;
use calarm_core::traits::{ChannelFactory, NotificationChannel};
use calarm_core::{Error, Result};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use std::time::Duration;

/// Parse channel settings; `null` means all defaults
fn parse_settings<T: DeserializeOwned + Default>(channel: &str, settings: &serde_json::Value) -> Result<T> {
    if settings.is_null() {
        return Ok(T::default());
    }
    serde_json::from_value(settings.clone())
        .map_err(|e| Error::config(format!("Invalid settings for {}: {}", channel, e)))
}

#[derive(Debug, Deserialize)]
struct AudioSettings {
    #[serde(default)]
    command: String,
    #[serde(default = "default_repeat")]
    repeat: u32,
    #[serde(default)]
    gap_ms: u64,
}

impl Default for AudioSettings {
    fn default() -> Self {
        Self {
            command: String::new(),
            repeat: default_repeat(),
            gap_ms: 0,
        }
    }
}

fn default_repeat() -> u32 {
    audio::DEFAULT_REPEAT
}

#[derive(Debug, Default, Deserialize)]
struct BannerSettings {
    #[serde(default)]
    bell: bool,
}

#[derive(Debug, Default, Deserialize)]
struct NotifySendSettings {
    #[serde(default)]
    program: Option<String>,
    #[serde(default)]
    app_name: Option<String>,
}

/// Factory for [`CommandAudioChannel`]
pub struct CommandAudioFactory;

impl ChannelFactory for CommandAudioFactory {
    fn create(&self, settings: &serde_json::Value) -> Result<Box<dyn NotificationChannel>> {
        let settings: AudioSettings = parse_settings("command_audio", settings)?;
        let channel = CommandAudioChannel::new(&settings.command)?
            .with_repeat(settings.repeat)
            .with_gap(Duration::from_millis(settings.gap_ms));
        Ok(Box::new(channel))
    }
}

/// Factory for [`TerminalBannerChannel`]
pub struct TerminalBannerFactory;

impl ChannelFactory for TerminalBannerFactory {
    fn create(&self, settings: &serde_json::Value) -> Result<Box<dyn NotificationChannel>> {
        let settings: BannerSettings = parse_settings("terminal_banner", settings)?;
        Ok(Box::new(TerminalBannerChannel::new().with_bell(settings.bell)))
    }
}

/// Factory for [`NotifySendChannel`]
pub struct NotifySendFactory;

impl ChannelFactory for NotifySendFactory {
    fn create(&self, settings: &serde_json::Value) -> Result<Box<dyn NotificationChannel>> {
        let settings: NotifySendSettings = parse_settings("notify_send", settings)?;
        let mut channel = NotifySendChannel::new();
        if let Some(program) = settings.program {
            channel = channel.with_program(program);
        }
        if let Some(app_name) = settings.app_name {
            channel = channel.with_app_name(app_name);
        }
        Ok(Box::new(channel))
    }
}

/// Register the desktop channels with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_channel("command_audio", Box::new(CommandAudioFactory));
    registry.register_channel("terminal_banner", Box::new(TerminalBannerFactory));
    registry.register_channel("notify_send", Box::new(NotifySendFactory));
}
