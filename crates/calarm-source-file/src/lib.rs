// # File Alarm Source
//
// Reads the alarm list from a JSON file and re-reads it on a fixed
// cadence, emitting the whole list whenever its contents change.
//
// ## File Format
//
// Either a bare array of alarm records or an object with an `alarms`
// array:
//
// ```json
// [
//   {
//     "id": "alarm-1",
//     "email": "me@example.com",
//     "event_id": "evt-42",
//     "event_title": "Design review",
//     "event_start": "2025-06-02T10:00:00+02:00",
//     "alarm_minutes_before": 15
//   }
// ]
// ```
//
// Entries that do not deserialize are skipped with a warning, so one bad
// entry never hides the rest. Semantic checks (lead time, start) are left
// to the monitor.
//
// A missing file is an empty list: the CRUD side may not have written
// anything yet.

use calarm_core::ComponentRegistry;
use calarm_core::config::AlarmSourceConfig;
use calarm_core::traits::{AlarmSource, AlarmSourceFactory};
use calarm_core::{AlarmRecord, Error, Result};

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio_stream::Stream;
use tokio_stream::wrappers::UnboundedReceiverStream;

/// Default re-read interval
const DEFAULT_REFRESH_SECS: u64 = 30;

/// On-disk shapes accepted for the alarm list
#[derive(Deserialize)]
#[serde(untagged)]
enum AlarmFile {
    List(Vec<serde_json::Value>),
    Wrapped { alarms: Vec<serde_json::Value> },
}

/// Alarm source backed by a JSON file
pub struct FileAlarmSource {
    path: PathBuf,

    /// How often the file is re-read
    refresh_interval: Duration,

    /// Last list handed out, by `load` or `watch`
    last_seen: Arc<Mutex<Option<Vec<AlarmRecord>>>>,

    name: String,
}

impl FileAlarmSource {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self::with_interval(path, Duration::from_secs(DEFAULT_REFRESH_SECS))
    }

    /// Create with a custom re-read interval
    pub fn with_interval(path: impl Into<PathBuf>, refresh_interval: Duration) -> Self {
        let path = path.into();
        let name = format!("file:{}", path.display());
        Self {
            path,
            refresh_interval,
            last_seen: Arc::new(Mutex::new(None)),
            name,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

/// Read and parse the alarm file
async fn read_records(path: &Path) -> Result<Vec<AlarmRecord>> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("Alarm file {} does not exist yet, no alarms", path.display());
            return Ok(Vec::new());
        }
        Err(e) => {
            return Err(Error::alarm_source(format!(
                "Failed to read {}: {}",
                path.display(),
                e
            )));
        }
    };

    if content.trim().is_empty() {
        return Ok(Vec::new());
    }

    let entries = match serde_json::from_str::<AlarmFile>(&content) {
        Ok(AlarmFile::List(entries)) | Ok(AlarmFile::Wrapped { alarms: entries }) => entries,
        Err(e) => {
            return Err(Error::alarm_source(format!(
                "Failed to parse {}: {}",
                path.display(),
                e
            )));
        }
    };

    let records = entries
        .into_iter()
        .enumerate()
        .filter_map(|(index, entry)| match serde_json::from_value::<AlarmRecord>(entry) {
            Ok(record) => Some(record),
            Err(e) => {
                tracing::warn!("Skipping alarm entry #{} in {}: {}", index, path.display(), e);
                None
            }
        })
        .collect();

    Ok(records)
}

#[async_trait::async_trait]
impl AlarmSource for FileAlarmSource {
    async fn load(&self) -> Result<Vec<AlarmRecord>> {
        let records = read_records(&self.path).await?;
        *self.last_seen.lock().await = Some(records.clone());
        Ok(records)
    }

    fn watch(&self) -> Pin<Box<dyn Stream<Item = Vec<AlarmRecord>> + Send + 'static>> {
        let (tx, rx) = tokio::sync::mpsc::unbounded_channel();

        let path = self.path.clone();
        let refresh_interval = self.refresh_interval;
        let last_seen = self.last_seen.clone();

        tokio::spawn(async move {
            tracing::info!(
                "Watching alarm file {} (interval={:?})",
                path.display(),
                refresh_interval
            );

            loop {
                tokio::time::sleep(refresh_interval).await;

                if tx.is_closed() {
                    tracing::debug!("Alarm list receiver dropped, stopping file watch");
                    break;
                }

                let records = match read_records(&path).await {
                    Ok(records) => records,
                    Err(e) => {
                        // Keep the last good list
                        tracing::warn!("{}", e);
                        continue;
                    }
                };

                let mut last = last_seen.lock().await;
                if last.as_ref() == Some(&records) {
                    continue;
                }

                tracing::info!(
                    "Alarm file {} changed: {} record(s)",
                    path.display(),
                    records.len()
                );
                *last = Some(records.clone());
                if tx.send(records).is_err() {
                    tracing::debug!("Alarm list receiver dropped, stopping file watch");
                    break;
                }
            }
        });

        Box::pin(UnboundedReceiverStream::new(rx))
    }

    fn source_name(&self) -> &str {
        &self.name
    }
}

/// Factory for creating file alarm sources
pub struct FileSourceFactory;

impl AlarmSourceFactory for FileSourceFactory {
    fn create(&self, config: &AlarmSourceConfig) -> Result<Box<dyn AlarmSource>> {
        match config {
            AlarmSourceConfig::File { path, refresh_secs } => Ok(Box::new(
                FileAlarmSource::with_interval(path, Duration::from_secs(*refresh_secs)),
            )),
            _ => Err(Error::config("Invalid config for file alarm source")),
        }
    }
}

/// Register the file alarm source with a registry
pub fn register(registry: &ComponentRegistry) {
    registry.register_alarm_source("file", Box::new(FileSourceFactory));
}
