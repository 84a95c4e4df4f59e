//! Configuration types for calarm
//!
//! Everything here is plain serde data; components are built from it by the
//! [`ComponentRegistry`](crate::registry::ComponentRegistry).

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main calarm configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalarmConfig {
    /// Where the alarm list comes from
    pub alarm_source: AlarmSourceConfig,

    /// Where dedup markers are persisted
    #[serde(default)]
    pub dedup_store: DedupStoreConfig,

    /// Notification channels, in delivery order
    #[serde(default)]
    pub channels: Vec<ChannelConfig>,

    #[serde(default)]
    pub monitor: MonitorConfig,
}

impl CalarmConfig {
    pub fn new(alarm_source: AlarmSourceConfig) -> Self {
        Self {
            alarm_source,
            dedup_store: DedupStoreConfig::default(),
            channels: Vec::new(),
            monitor: MonitorConfig::default(),
        }
    }

    /// Validate the configuration
    pub fn validate(&self) -> Result<(), crate::Error> {
        self.alarm_source.validate()?;
        self.dedup_store.validate()?;
        for channel in &self.channels {
            channel.validate()?;
        }
        self.monitor.validate()
    }
}

/// Alarm source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AlarmSourceConfig {
    /// JSON file holding the alarm list
    File {
        path: String,
        /// How often the file is re-read
        #[serde(default = "default_refresh_secs")]
        refresh_secs: u64,
    },

    /// Custom alarm source
    Custom {
        /// Factory name to use
        factory: String,
        /// Custom configuration data
        config: serde_json::Value,
    },
}

impl AlarmSourceConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            AlarmSourceConfig::File { path, refresh_secs } => {
                if path.is_empty() {
                    return Err(crate::Error::config("Alarm file path cannot be empty"));
                }
                if *refresh_secs == 0 {
                    return Err(crate::Error::config("Alarm file refresh interval must be > 0"));
                }
                Ok(())
            }
            AlarmSourceConfig::Custom { factory, .. } => {
                if factory.is_empty() {
                    return Err(crate::Error::config("Custom alarm source factory cannot be empty"));
                }
                Ok(())
            }
        }
    }

    /// Registry key for this source
    pub fn type_name(&self) -> &str {
        match self {
            AlarmSourceConfig::File { .. } => "file",
            AlarmSourceConfig::Custom { factory, .. } => factory,
        }
    }
}

/// Dedup store configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum DedupStoreConfig {
    /// File-based store
    File {
        /// Path to the state file
        path: String,
    },

    /// In-memory store (not persistent)
    #[default]
    Memory,

    /// Custom store
    Custom {
        factory: String,
        config: serde_json::Value,
    },
}

impl DedupStoreConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        match self {
            DedupStoreConfig::File { path } if path.is_empty() => {
                Err(crate::Error::config("Dedup store path cannot be empty"))
            }
            DedupStoreConfig::Custom { factory, .. } if factory.is_empty() => {
                Err(crate::Error::config("Custom dedup store factory cannot be empty"))
            }
            _ => Ok(()),
        }
    }

    /// Registry key for this store
    pub fn type_name(&self) -> &str {
        match self {
            DedupStoreConfig::File { .. } => "file",
            DedupStoreConfig::Memory => "memory",
            DedupStoreConfig::Custom { factory, .. } => factory,
        }
    }
}

/// One notification channel
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChannelConfig {
    /// Registered channel factory name (e.g. "command_audio")
    pub factory: String,

    /// Factory-specific settings
    #[serde(default)]
    pub settings: serde_json::Value,
}

impl ChannelConfig {
    pub fn new(factory: impl Into<String>) -> Self {
        Self {
            factory: factory.into(),
            settings: serde_json::Value::Null,
        }
    }

    pub fn with_settings(mut self, settings: serde_json::Value) -> Self {
        self.settings = settings;
        self
    }

    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.factory.is_empty() {
            return Err(crate::Error::config("Channel factory cannot be empty"));
        }
        Ok(())
    }
}

/// Monitor (poll scheduler) settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MonitorConfig {
    /// Seconds between evaluation passes
    ///
    /// This is also the worst-case delay between a trigger instant and the
    /// alarm actually firing.
    #[serde(default = "default_poll_interval_secs")]
    pub poll_interval_secs: u64,

    /// Seconds the in-app banner stays visible
    #[serde(default = "default_banner_duration_secs")]
    pub banner_duration_secs: u64,
}

impl MonitorConfig {
    pub fn validate(&self) -> Result<(), crate::Error> {
        if self.poll_interval_secs == 0 {
            return Err(crate::Error::config("Poll interval must be > 0"));
        }
        if self.banner_duration_secs == 0 {
            return Err(crate::Error::config("Banner duration must be > 0"));
        }
        Ok(())
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }

    pub fn banner_duration(&self) -> Duration {
        Duration::from_secs(self.banner_duration_secs)
    }

    /// Upper bound on how late an armed, running monitor notices a trigger
    /// instant: one poll interval.
    pub fn worst_case_detection_latency(&self) -> Duration {
        self.poll_interval()
    }
}

impl Default for MonitorConfig {
    fn default() -> Self {
        Self {
            poll_interval_secs: default_poll_interval_secs(),
            banner_duration_secs: default_banner_duration_secs(),
        }
    }
}

fn default_poll_interval_secs() -> u64 {
    10
}

fn default_banner_duration_secs() -> u64 {
    10
}

fn default_refresh_secs() -> u64 {
    30
}
