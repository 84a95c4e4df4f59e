// # calarmd - Calendar Alarm Daemon
//
// Thin integration layer: all alarm logic lives in calarm-core.
//
// The calarmd daemon is responsible for:
// 1. Reading configuration from environment variables
// 2. Initializing logging and the runtime
// 3. Registering stores, alarm sources and channels
// 4. Running the alarm feed until SIGTERM/SIGINT
//
// ## Configuration
//
// All configuration is done via environment variables:
//
// ### Alarm list
// - `CALARM_ALARMS_PATH`: JSON file holding the alarm list (required)
// - `CALARM_ALARMS_REFRESH_SECS`: How often the file is re-read (5-3600, default 30)
//
// ### Monitor
// - `CALARM_POLL_INTERVAL_SECS`: Seconds between evaluation passes (1-300, default 10)
//
// ### State Store
// - `CALARM_STATE_STORE_TYPE`: Type of dedup store (file, memory; default file)
// - `CALARM_STATE_STORE_PATH`: Path to state file (for file store)
//
// ### Notifications
// - `CALARM_SOUND_COMMAND`: Player command line for the alert sound (optional)
// - `CALARM_SOUND_REPEAT`: Times the sound plays (1-20, default 3)
// - `CALARM_BANNER_SECS`: Banner visibility in seconds (1-120, default 10)
// - `CALARM_OS_NOTIFICATIONS`: granted or denied (default denied)
//
// ### Logging
// - `CALARM_LOG_LEVEL`: trace, debug, info, warn, error (default info)
//
// ## Example
//
// ```bash
// export CALARM_ALARMS_PATH=$HOME/.local/share/calarm/alarms.json
// export CALARM_STATE_STORE_PATH=$HOME/.local/state/calarm/fired.json
// export CALARM_SOUND_COMMAND="paplay /usr/share/sounds/freedesktop/stereo/alarm-clock-elapsed.oga"
// export CALARM_OS_NOTIFICATIONS=granted
//
// calarmd
// ```

use anyhow::{Context, Result};
use calarm_core::config::{AlarmSourceConfig, CalarmConfig, ChannelConfig, DedupStoreConfig, MonitorConfig};
use calarm_core::traits::StaticPermission;
use calarm_core::{AlarmMonitor, ComponentRegistry, Fanout, SystemClock, run_feed};
use std::env;
use std::future::Future;
use std::process::ExitCode;
use std::str::FromStr;
use std::sync::Arc;
use tracing::{Level, error, info, warn};
use tracing_subscriber::FmtSubscriber;

#[cfg(unix)]
use tokio::signal::unix::{SignalKind, signal};

/// Exit codes for different termination scenarios
///
/// These codes follow systemd conventions:
/// - 0: Clean shutdown
/// - 1: Configuration or startup error
/// - 2: Runtime error (unexpected)
#[derive(Debug, Clone, Copy)]
enum CalarmExitCode {
    CleanShutdown = 0,
    ConfigError = 1,
    RuntimeError = 2,
}

impl From<CalarmExitCode> for ExitCode {
    fn from(code: CalarmExitCode) -> Self {
        ExitCode::from(code as u8)
    }
}

/// Application configuration
#[derive(Debug)]
struct Config {
    alarms_path: String,
    alarms_refresh_secs: u64,
    poll_interval_secs: u64,
    state_store_type: String,
    state_store_path: Option<String>,
    sound_command: Option<String>,
    sound_repeat: u32,
    banner_secs: u64,
    os_notifications: String,
    log_level: String,
}

/// Parse an optional numeric variable, falling back to `default` when unset
fn parse_var<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, name: &str, default: T) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("{} must be a number. Got '{}': {}", name, raw, e)),
    }
}

fn check_range(name: &str, value: u64, range: std::ops::RangeInclusive<u64>) -> Result<()> {
    if !range.contains(&value) {
        anyhow::bail!(
            "{} must be between {} and {}. Got: {}",
            name,
            range.start(),
            range.end(),
            value
        );
    }
    Ok(())
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Result<Self> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any variable lookup
    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let non_empty = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        Ok(Self {
            alarms_path: non_empty("CALARM_ALARMS_PATH").ok_or_else(|| {
                anyhow::anyhow!(
                    "CALARM_ALARMS_PATH is required. \
                    Set it via: export CALARM_ALARMS_PATH=/path/to/alarms.json"
                )
            })?,
            alarms_refresh_secs: parse_var(&lookup, "CALARM_ALARMS_REFRESH_SECS", 30)?,
            poll_interval_secs: parse_var(&lookup, "CALARM_POLL_INTERVAL_SECS", 10)?,
            state_store_type: non_empty("CALARM_STATE_STORE_TYPE")
                .unwrap_or_else(|| "file".to_string()),
            state_store_path: lookup("CALARM_STATE_STORE_PATH"),
            sound_command: non_empty("CALARM_SOUND_COMMAND"),
            sound_repeat: parse_var(&lookup, "CALARM_SOUND_REPEAT", 3)?,
            banner_secs: parse_var(&lookup, "CALARM_BANNER_SECS", 10)?,
            os_notifications: non_empty("CALARM_OS_NOTIFICATIONS")
                .unwrap_or_else(|| "denied".to_string()),
            log_level: non_empty("CALARM_LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
        })
    }

    /// Validate the configuration
    fn validate(&self) -> Result<()> {
        check_range("CALARM_ALARMS_REFRESH_SECS", self.alarms_refresh_secs, 5..=3600)?;
        check_range("CALARM_POLL_INTERVAL_SECS", self.poll_interval_secs, 1..=300)?;
        check_range("CALARM_SOUND_REPEAT", u64::from(self.sound_repeat), 1..=20)?;
        check_range("CALARM_BANNER_SECS", self.banner_secs, 1..=120)?;

        match self.state_store_type.as_str() {
            "file" | "memory" => {}
            _ => anyhow::bail!(
                "CALARM_STATE_STORE_TYPE '{}' is not supported. \
                Supported types: file, memory",
                self.state_store_type
            ),
        }

        if self.state_store_type == "file" {
            match self.state_store_path.as_deref() {
                None => anyhow::bail!(
                    "CALARM_STATE_STORE_PATH is required when CALARM_STATE_STORE_TYPE=file. \
                    Set it via: export CALARM_STATE_STORE_PATH=/var/lib/calarm/fired.json"
                ),
                Some("") => anyhow::bail!(
                    "CALARM_STATE_STORE_PATH cannot be empty when CALARM_STATE_STORE_TYPE=file"
                ),
                Some(_) => {}
            }
        }

        match self.os_notifications.to_lowercase().as_str() {
            "granted" | "denied" => {}
            _ => anyhow::bail!(
                "CALARM_OS_NOTIFICATIONS '{}' is not valid. Valid values: granted, denied",
                self.os_notifications
            ),
        }

        match self.log_level.to_lowercase().as_str() {
            "trace" | "debug" | "info" | "warn" | "error" => {}
            _ => anyhow::bail!(
                "CALARM_LOG_LEVEL '{}' is not valid. \
                Valid levels: trace, debug, info, warn, error",
                self.log_level
            ),
        }

        Ok(())
    }

    fn os_notifications_granted(&self) -> bool {
        self.os_notifications.eq_ignore_ascii_case("granted")
    }

    /// Translate into the library configuration
    fn to_calarm_config(&self) -> CalarmConfig {
        let mut config = CalarmConfig::new(AlarmSourceConfig::File {
            path: self.alarms_path.clone(),
            refresh_secs: self.alarms_refresh_secs,
        });

        config.dedup_store = match (self.state_store_type.as_str(), &self.state_store_path) {
            ("file", Some(path)) => DedupStoreConfig::File { path: path.clone() },
            _ => DedupStoreConfig::Memory,
        };

        config.monitor = MonitorConfig {
            poll_interval_secs: self.poll_interval_secs,
            banner_duration_secs: self.banner_secs,
        };

        if let Some(command) = &self.sound_command {
            config.channels.push(ChannelConfig::new("command_audio").with_settings(
                serde_json::json!({ "command": command, "repeat": self.sound_repeat }),
            ));
        }
        config.channels.push(ChannelConfig::new("terminal_banner"));
        config.channels.push(ChannelConfig::new("notify_send"));

        config
    }
}

fn main() -> ExitCode {
    let config = match Config::from_env() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {}", e);
            return CalarmExitCode::ConfigError.into();
        }
    };

    if let Err(e) = config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return CalarmExitCode::ConfigError.into();
    }

    let calarm_config = config.to_calarm_config();
    if let Err(e) = calarm_config.validate() {
        eprintln!("Configuration validation error: {}", e);
        return CalarmExitCode::ConfigError.into();
    }

    let log_level = match config.log_level.to_lowercase().as_str() {
        "trace" => Level::TRACE,
        "debug" => Level::DEBUG,
        "warn" => Level::WARN,
        "error" => Level::ERROR,
        _ => Level::INFO,
    };

    let subscriber = FmtSubscriber::builder().with_max_level(log_level).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to set tracing subscriber: {}", e);
        return CalarmExitCode::ConfigError.into();
    }

    info!("Starting calarmd daemon");
    info!(
        "Alarm list: {} (re-read every {}s), polling every {}s",
        config.alarms_path, config.alarms_refresh_secs, config.poll_interval_secs
    );

    let rt = match tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("Failed to create tokio runtime: {}", e);
            return CalarmExitCode::RuntimeError.into();
        }
    };

    let granted = config.os_notifications_granted();
    let result = rt.block_on(async {
        if let Err(e) = run_daemon(calarm_config, granted).await {
            error!("Daemon error: {:#}", e);
            CalarmExitCode::RuntimeError
        } else {
            CalarmExitCode::CleanShutdown
        }
    });

    result.into()
}

/// Run the daemon
async fn run_daemon(config: CalarmConfig, os_notifications_granted: bool) -> Result<()> {
    let registry = ComponentRegistry::with_builtin_stores();
    calarm_source_file::register(&registry);

    #[cfg(feature = "desktop")]
    {
        info!("Registering desktop notification channels");
        calarm_desktop::register(&registry);
    }

    let source = registry
        .create_alarm_source(&config.alarm_source)
        .context("Failed to create alarm source")?;
    let store = registry
        .create_dedup_store(&config.dedup_store)
        .await
        .context("Failed to open dedup store")?;

    let permission = if os_notifications_granted {
        StaticPermission::granted()
    } else {
        StaticPermission::denied()
    };
    let mut fanout = Fanout::new(Arc::new(permission));
    for channel in &config.channels {
        if !registry.has_channel(&channel.factory) {
            warn!("Channel {} is not available in this build, skipping", channel.factory);
            continue;
        }
        fanout.add_channel(
            registry
                .create_channel(channel)
                .with_context(|| format!("Failed to create channel {}", channel.factory))?,
        );
    }
    if fanout.channel_count() == 0 {
        warn!("No notification channels configured; fired alarms will only be logged");
    }
    info!(
        "Dedup store: {}, {} channel(s), OS notifications {}",
        config.dedup_store.type_name(),
        fanout.channel_count(),
        if os_notifications_granted { "granted" } else { "denied" }
    );

    let monitor = AlarmMonitor::new(store, fanout, Arc::new(SystemClock), config.monitor.clone())?;

    let shutdown = shutdown_signal()?;
    run_feed(&monitor, source.as_ref(), async {
        let signal = shutdown.await;
        info!("Received shutdown signal: {}", signal);
    })
    .await?;

    info!("calarmd stopped");
    Ok(())
}

/// Resolves on SIGTERM or SIGINT
#[cfg(unix)]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    let mut sigterm = signal(SignalKind::terminate())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGTERM handler: {}", e))?;
    let mut sigint = signal(SignalKind::interrupt())
        .map_err(|e| anyhow::anyhow!("Failed to setup SIGINT handler: {}", e))?;

    Ok(async move {
        tokio::select! {
            _ = sigterm.recv() => "SIGTERM",
            _ = sigint.recv() => "SIGINT",
        }
    })
}

/// Resolves on CTRL-C
///
/// Fallback implementation for non-Unix platforms.
#[cfg(not(unix))]
fn shutdown_signal() -> Result<impl Future<Output = &'static str>> {
    Ok(async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to wait for CTRL-C: {}", e);
        }
        "CTRL-C"
    })
}
