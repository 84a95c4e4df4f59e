//! Error types for calarm
//!
//! Every fallible operation in the crate returns [`Result`]. None of these
//! errors are fatal to a running monitor: the engine logs and continues.

use thiserror::Error;

/// Result type alias for calarm operations
pub type Result<T> = std::result::Result<T, Error>;

/// Core error type for calarm
#[derive(Error, Debug)]
pub enum Error {
    /// An alarm record failed validation
    #[error("Invalid alarm: {0}")]
    InvalidAlarm(String),

    /// Dedup store read/write failures
    #[error("Dedup store error: {0}")]
    DedupStore(String),

    /// A notification channel failed to deliver
    #[error("Channel error ({channel}): {message}")]
    Channel {
        /// Channel name
        channel: String,
        /// Error message
        message: String,
    },

    /// Alarm source failures (loading or watching the external list)
    #[error("Alarm source error: {0}")]
    AlarmSource(String),

    /// Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),

    /// Filesystem and process I/O errors
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization errors
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Generic error with context
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Create an invalid alarm error
    pub fn invalid_alarm(msg: impl Into<String>) -> Self {
        Self::InvalidAlarm(msg.into())
    }

    /// Create a dedup store error
    pub fn dedup_store(msg: impl Into<String>) -> Self {
        Self::DedupStore(msg.into())
    }

    /// Create a channel error
    pub fn channel(channel: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Channel {
            channel: channel.into(),
            message: message.into(),
        }
    }

    /// Create an alarm source error
    pub fn alarm_source(msg: impl Into<String>) -> Self {
        Self::AlarmSource(msg.into())
    }

    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}

impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Self::Other(err.to_string())
    }
}
