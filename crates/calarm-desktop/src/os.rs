//! OS notifications through `notify-send`
//!
//! Only ever invoked when the fan-out's permission query says yes; this
//! channel does not ask for permission itself.

use async_trait::async_trait;
use calarm_core::traits::{AlarmNotification, ChannelKind, NotificationChannel};
use calarm_core::{Error, Result};
use std::process::Stdio;
use std::time::Duration;
use tokio::process::Command;

const DEFAULT_PROGRAM: &str = "notify-send";
const DEFAULT_APP_NAME: &str = "calarm";

/// notify-send should return almost immediately
const SEND_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
pub struct NotifySendChannel {
    program: String,
    app_name: String,
}

impl NotifySendChannel {
    pub fn new() -> Self {
        Self {
            program: DEFAULT_PROGRAM.to_string(),
            app_name: DEFAULT_APP_NAME.to_string(),
        }
    }

    /// Use a different binary (a wrapper script, or a stub in tests)
    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    pub fn with_app_name(mut self, app_name: impl Into<String>) -> Self {
        self.app_name = app_name.into();
        self
    }

    fn args(&self, notification: &AlarmNotification) -> Vec<String> {
        vec![
            format!("--app-name={}", self.app_name),
            "--urgency=critical".to_string(),
            format!("--expire-time={}", notification.display_for.as_millis()),
            notification.event_title.clone(),
            notification.message.clone(),
        ]
    }
}

impl Default for NotifySendChannel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationChannel for NotifySendChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::Os
    }

    fn name(&self) -> &str {
        "notify_send"
    }

    async fn deliver(&self, notification: &AlarmNotification) -> Result<()> {
        let status = Command::new(&self.program)
            .args(self.args(notification))
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true)
            .status();

        let status = tokio::time::timeout(SEND_TIMEOUT, status)
            .await
            .map_err(|_| Error::channel(self.name(), "timed out"))?
            .map_err(|e| {
                Error::channel(self.name(), format!("failed to run {}: {}", self.program, e))
            })?;

        if !status.success() {
            return Err(Error::channel(
                self.name(),
                format!("{} exited with {}", self.program, status),
            ));
        }
        Ok(())
    }
}
