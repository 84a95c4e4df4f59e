// # File Dedup Store
//
// File-based implementation of DedupStore with crash recovery.
//
// ## Durability
//
// Every `mark_fired` is written through before it returns, so a reload
// right after a fire is detected cannot fire the alarm a second time.
//
// ## Crash Recovery
//
// - Atomic writes: write to `.tmp`, then rename over the state file
// - Backup: the previous good file is kept as `.backup`
// - Corruption: if the state file does not parse, fall back to the backup,
//   and to an empty store if that fails too (an empty store can only cause
//   a duplicate alert, never a missed one)
//
// ## File Format
//
// ```json
// {
//   "version": "1.0",
//   "fired": {
//     "alarm-1": {
//       "alarm_id": "alarm-1",
//       "fired_at": "2025-01-09T12:00:00Z"
//     }
//   }
// }
// ```

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::RwLock;

use crate::Error;
use crate::alarm::AlarmId;
use crate::traits::dedup_store::{DedupStore, DedupStoreFactory, TriggerRecord};

/// State file format version
const STATE_FILE_VERSION: &str = "1.0";

/// File-backed dedup store
///
/// # Example
///
/// ```rust,no_run
/// use calarm_core::{AlarmId, DedupStore, FileDedupStore};
///
/// #[tokio::main]
/// async fn main() -> Result<(), Box<dyn std::error::Error>> {
///     let store = FileDedupStore::new("/var/lib/calarm/fired.json").await?;
///
///     store.mark_fired(&AlarmId::new("alarm-1")).await?;
///
///     Ok(())
/// }
/// ```
#[derive(Debug)]
pub struct FileDedupStore {
    path: PathBuf,
    // Writes hold this lock across the disk write so concurrent mark_fired
    // calls cannot interleave their renames.
    state: Arc<RwLock<HashMap<AlarmId, TriggerRecord>>>,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
struct StateFileFormat {
    version: String,
    fired: HashMap<AlarmId, TriggerRecord>,
}

/// Why a state file could not be loaded
enum LoadError {
    /// Present but unreadable as a state file
    Corrupt(Error),
    /// Could not be read at all
    Io(Error),
}

impl FileDedupStore {
    /// Create or load a file dedup store
    ///
    /// Creates parent directories as needed and recovers from a corrupted
    /// state file using its backup.
    pub async fn new<P: AsRef<Path>>(path: P) -> Result<Self, Error> {
        let path = path.as_ref().to_path_buf();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            fs::create_dir_all(parent).await.map_err(|e| {
                Error::config(format!(
                    "Failed to create state directory {}: {}",
                    parent.display(),
                    e
                ))
            })?;
        }

        let fired = Self::load_with_recovery(&path).await?;

        Ok(Self {
            path,
            state: Arc::new(RwLock::new(fired)),
        })
    }

    /// Path of the state file
    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn load_with_recovery(path: &Path) -> Result<HashMap<AlarmId, TriggerRecord>, Error> {
        match Self::load(path).await {
            Ok(fired) => {
                tracing::debug!("Loaded {} trigger record(s) from {}", fired.len(), path.display());
                Ok(fired)
            }
            Err(LoadError::Io(e)) => Err(e),
            Err(LoadError::Corrupt(e)) => {
                tracing::warn!("State file appears corrupted: {}. Attempting recovery from backup.", e);

                let backup_path = Self::backup_path(path);
                if !backup_path.exists() {
                    tracing::warn!("No backup file found. Starting with empty state.");
                    return Ok(HashMap::new());
                }

                match Self::load(&backup_path).await {
                    Ok(fired) => {
                        tracing::info!("Recovered {} trigger record(s) from backup", fired.len());
                        if let Err(e) = fs::copy(&backup_path, path).await {
                            tracing::error!("Failed to restore state file from backup: {}", e);
                        }
                        Ok(fired)
                    }
                    Err(LoadError::Corrupt(e)) | Err(LoadError::Io(e)) => {
                        tracing::error!("Backup also unusable: {}. Starting with empty state.", e);
                        Ok(HashMap::new())
                    }
                }
            }
        }
    }

    async fn load(path: &Path) -> Result<HashMap<AlarmId, TriggerRecord>, LoadError> {
        if !path.exists() {
            tracing::debug!("State file does not exist: {}", path.display());
            return Ok(HashMap::new());
        }

        let content = fs::read_to_string(path).await.map_err(|e| {
            LoadError::Io(Error::dedup_store(format!(
                "Failed to read state file {}: {}",
                path.display(),
                e
            )))
        })?;

        let state_file: StateFileFormat = serde_json::from_str(&content).map_err(|e| {
            LoadError::Corrupt(Error::dedup_store(format!(
                "Failed to parse state file {}: {}",
                path.display(),
                e
            )))
        })?;

        if state_file.version != STATE_FILE_VERSION {
            tracing::warn!(
                "State file version mismatch: expected {}, got {}. Attempting to load anyway.",
                STATE_FILE_VERSION,
                state_file.version
            );
        }

        Ok(state_file.fired)
    }

    /// Write `fired` to disk atomically
    async fn write(&self, fired: &HashMap<AlarmId, TriggerRecord>) -> Result<(), Error> {
        let state_file = StateFileFormat {
            version: STATE_FILE_VERSION.to_string(),
            fired: fired.clone(),
        };
        let json = serde_json::to_string_pretty(&state_file)
            .map_err(|e| Error::dedup_store(format!("Failed to serialize state: {}", e)))?;

        let temp_path = self.temp_path();
        {
            let mut file = fs::File::create(&temp_path).await.map_err(|e| {
                Error::dedup_store(format!(
                    "Failed to create temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.write_all(json.as_bytes()).await.map_err(|e| {
                Error::dedup_store(format!(
                    "Failed to write temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
            file.sync_all().await.map_err(|e| {
                Error::dedup_store(format!(
                    "Failed to sync temp file {}: {}",
                    temp_path.display(),
                    e
                ))
            })?;
        }

        if self.path.exists() {
            let backup_path = Self::backup_path(&self.path);
            if let Err(e) = fs::copy(&self.path, &backup_path).await {
                tracing::warn!("Failed to create backup: {}", e);
            }
        }

        fs::rename(&temp_path, &self.path).await.map_err(|e| {
            Error::dedup_store(format!(
                "Failed to rename {} to {}: {}",
                temp_path.display(),
                self.path.display(),
                e
            ))
        })?;

        tracing::trace!("Dedup state written to {}", self.path.display());
        Ok(())
    }

    fn temp_path(&self) -> PathBuf {
        let mut temp = self.path.clone();
        temp.set_extension("tmp");
        temp
    }

    fn backup_path(path: &Path) -> PathBuf {
        let mut backup = path.to_path_buf();
        backup.set_extension("backup");
        backup
    }
}

#[async_trait]
impl DedupStore for FileDedupStore {
    async fn has_fired(&self, alarm_id: &AlarmId) -> Result<bool, Error> {
        Ok(self.state.read().await.contains_key(alarm_id))
    }

    async fn mark_fired(&self, alarm_id: &AlarmId) -> Result<(), Error> {
        let mut guard = self.state.write().await;
        if guard.contains_key(alarm_id) {
            return Ok(());
        }

        guard.insert(alarm_id.clone(), TriggerRecord::new(alarm_id.clone()));
        if let Err(e) = self.write(&guard).await {
            // Keep memory in line with disk: an unrecorded fire must look unrecorded
            guard.remove(alarm_id);
            return Err(e);
        }
        Ok(())
    }

    async fn get_record(&self, alarm_id: &AlarmId) -> Result<Option<TriggerRecord>, Error> {
        Ok(self.state.read().await.get(alarm_id).cloned())
    }

    async fn list_fired(&self) -> Result<Vec<AlarmId>, Error> {
        Ok(self.state.read().await.keys().cloned().collect())
    }

    async fn flush(&self) -> Result<(), Error> {
        // Writes go through on mark_fired; nothing is buffered
        Ok(())
    }
}

/// Factory for `{"type": "file", "path": "..."}`
pub struct FileDedupStoreFactory;

#[async_trait]
impl DedupStoreFactory for FileDedupStoreFactory {
    async fn create(&self, config: &serde_json::Value) -> Result<Box<dyn DedupStore>, Error> {
        let path = config
            .get("path")
            .and_then(|p| p.as_str())
            .filter(|p| !p.is_empty())
            .ok_or_else(|| Error::config("File dedup store requires a non-empty 'path'"))?;

        Ok(Box::new(FileDedupStore::new(path).await?))
    }
}
