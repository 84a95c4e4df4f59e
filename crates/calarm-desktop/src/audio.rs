//! Looping alert sound through an external player command
//!
//! The first playback is started inside `deliver` so a missing player is
//! reported to the fan-out; the repeats run in a background task and
//! `deliver` returns without waiting for them.

use async_trait::async_trait;
use calarm_core::traits::{AlarmNotification, ChannelKind, NotificationChannel};
use calarm_core::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::{Child, Command};

/// Times the sound plays per alarm unless configured otherwise
pub const DEFAULT_REPEAT: u32 = 3;

/// Audio alert played by running a command, e.g. `paplay /usr/share/sounds/alarm.oga`
#[derive(Debug, Clone)]
pub struct CommandAudioChannel {
    program: String,
    args: Vec<String>,
    repeat: u32,
    gap: Duration,
}

impl CommandAudioChannel {
    /// Create from a command line
    ///
    /// The line is split on whitespace; there is no shell quoting.
    pub fn new(command_line: &str) -> Result<Self> {
        let mut parts = command_line.split_whitespace().map(str::to_string);
        let program = parts
            .next()
            .ok_or_else(|| Error::config("Sound command cannot be empty"))?;

        Ok(Self {
            program,
            args: parts.collect(),
            repeat: DEFAULT_REPEAT,
            gap: Duration::ZERO,
        })
    }

    /// Play the sound `repeat` times (at least once)
    pub fn with_repeat(mut self, repeat: u32) -> Self {
        self.repeat = repeat.max(1);
        self
    }

    /// Pause between repeats
    pub fn with_gap(mut self, gap: Duration) -> Self {
        self.gap = gap;
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn repeat(&self) -> u32 {
        self.repeat
    }

    fn spawn_player(&self) -> std::io::Result<Child> {
        Command::new(&self.program)
            .args(&self.args)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .spawn()
    }
}

#[async_trait]
impl NotificationChannel for CommandAudioChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Audio
    }

    fn name(&self) -> &str {
        "command_audio"
    }

    async fn deliver(&self, notification: &AlarmNotification) -> Result<()> {
        let first = self.spawn_player().map_err(|e| {
            Error::channel(
                self.name(),
                format!("failed to start {}: {}", self.program, e),
            )
        })?;

        let player = self.clone();
        let alarm_id = notification.alarm_id.clone();
        tokio::spawn(async move {
            let mut child = first;
            for played in 1..=player.repeat {
                match child.wait().await {
                    Ok(status) if status.success() => {}
                    Ok(status) => {
                        tracing::warn!("Sound player exited with {} for alarm {}", status, alarm_id);
                        return;
                    }
                    Err(e) => {
                        tracing::warn!("Failed to wait for sound player: {}", e);
                        return;
                    }
                }

                if played == player.repeat {
                    break;
                }
                if !player.gap.is_zero() {
                    tokio::time::sleep(player.gap).await;
                }
                child = match player.spawn_player() {
                    Ok(child) => child,
                    Err(e) => {
                        tracing::warn!("Failed to restart sound player: {}", e);
                        return;
                    }
                };
            }
            tracing::debug!("Alarm sound for {} finished", alarm_id);
        });

        Ok(())
    }
}
