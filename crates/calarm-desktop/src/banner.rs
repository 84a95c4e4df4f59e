//! In-app banner rendered to a terminal

use async_trait::async_trait;
use calarm_core::traits::{AlarmNotification, ChannelKind, NotificationChannel};
use calarm_core::{Error, Result};
use std::io::Write;
use std::sync::{Arc, Mutex, PoisonError};

const RULE: &str = "==============================================";

/// High-visibility banner written to stderr (or any writer)
#[derive(Clone)]
pub struct TerminalBannerChannel {
    out: Arc<Mutex<Box<dyn Write + Send>>>,
    bell: bool,
}

impl TerminalBannerChannel {
    /// Banner on stderr
    pub fn new() -> Self {
        Self::with_writer(std::io::stderr())
    }

    pub fn with_writer(writer: impl Write + Send + 'static) -> Self {
        Self {
            out: Arc::new(Mutex::new(Box::new(writer))),
            bell: false,
        }
    }

    /// Ring the terminal bell with each banner
    pub fn with_bell(mut self, bell: bool) -> Self {
        self.bell = bell;
        self
    }
}

impl Default for TerminalBannerChannel {
    fn default() -> Self {
        Self::new()
    }
}

/// Text of the banner for `notification`
pub fn render(notification: &AlarmNotification) -> String {
    let start = notification.event_start.format("%Y-%m-%d %H:%M %:z");
    format!(
        "{rule}\n  {message}\n  {title} at {start}\n  (shown for {secs}s)\n{rule}\n",
        rule = RULE,
        message = notification.message,
        title = notification.event_title,
        start = start,
        secs = notification.display_for.as_secs(),
    )
}

#[async_trait]
impl NotificationChannel for TerminalBannerChannel {
    fn kind(&self) -> ChannelKind {
        ChannelKind::InApp
    }

    fn name(&self) -> &str {
        "terminal_banner"
    }

    async fn deliver(&self, notification: &AlarmNotification) -> Result<()> {
        let mut banner = render(notification);
        if self.bell {
            banner.insert(0, '\u{7}');
        }

        let mut out = self.out.lock().unwrap_or_else(PoisonError::into_inner);
        out.write_all(banner.as_bytes())
            .and_then(|_| out.flush())
            .map_err(|e| Error::channel(self.name(), format!("write failed: {}", e)))
    }
}
