//! Plugin-based component registry
//!
//! Dedup stores, alarm sources and notification channels are registered by
//! name and built from configuration, so the daemon carries no hard-coded
//! list of implementations.
//!
//! ## Registration
//!
//! Plugin crates expose a `register` function:
//!
//! ```rust,ignore
//! // In calarm-desktop
//! pub fn register(registry: &ComponentRegistry) {
//!     registry.register_channel("terminal_banner", Box::new(TerminalBannerFactory));
//! }
//! ```

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use crate::config::{AlarmSourceConfig, ChannelConfig, DedupStoreConfig};
use crate::error::{Error, Result};
use crate::store::{FileDedupStoreFactory, MemoryDedupStoreFactory};
use crate::traits::{
    AlarmSource, AlarmSourceFactory, ChannelFactory, DedupStore, DedupStoreFactory,
    NotificationChannel,
};

/// Registry of component factories
///
/// Interior mutability with `RwLock`: registration takes `&self`.
#[derive(Default)]
pub struct ComponentRegistry {
    dedup_stores: RwLock<HashMap<String, Arc<dyn DedupStoreFactory>>>,
    alarm_sources: RwLock<HashMap<String, Box<dyn AlarmSourceFactory>>>,
    channels: RwLock<HashMap<String, Box<dyn ChannelFactory>>>,
}

impl ComponentRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// A registry with the `memory` and `file` dedup stores registered
    pub fn with_builtin_stores() -> Self {
        let registry = Self::new();
        registry.register_builtin_stores();
        registry
    }

    pub fn register_builtin_stores(&self) {
        self.register_dedup_store("memory", Box::new(MemoryDedupStoreFactory));
        self.register_dedup_store("file", Box::new(FileDedupStoreFactory));
    }

    pub fn register_dedup_store(&self, name: impl Into<String>, factory: Box<dyn DedupStoreFactory>) {
        self.dedup_stores
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), Arc::from(factory));
    }

    pub fn register_alarm_source(&self, name: impl Into<String>, factory: Box<dyn AlarmSourceFactory>) {
        self.alarm_sources
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    pub fn register_channel(&self, name: impl Into<String>, factory: Box<dyn ChannelFactory>) {
        self.channels
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(name.into(), factory);
    }

    /// Create a dedup store from configuration
    ///
    /// The factory receives the configuration serialized as JSON
    /// (e.g. `{"type": "file", "path": "..."}`); for `Custom` it receives the
    /// inner `config` value.
    pub async fn create_dedup_store(&self, config: &DedupStoreConfig) -> Result<Box<dyn DedupStore>> {
        let store_type = config.type_name();
        let factory = self
            .dedup_stores
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(store_type)
            .cloned()
            .ok_or_else(|| Error::config(format!("Unknown dedup store type: {}", store_type)))?;

        let config_json = match config {
            DedupStoreConfig::Custom { config, .. } => config.clone(),
            other => serde_json::to_value(other)?,
        };

        // Lock is released before the async create
        factory.create(&config_json).await
    }

    /// Create an alarm source from configuration
    pub fn create_alarm_source(&self, config: &AlarmSourceConfig) -> Result<Box<dyn AlarmSource>> {
        let source_type = config.type_name();
        let sources = self
            .alarm_sources
            .read()
            .unwrap_or_else(PoisonError::into_inner);

        let factory = sources
            .get(source_type)
            .ok_or_else(|| Error::config(format!("Unknown alarm source type: {}", source_type)))?;

        factory.create(config)
    }

    /// Create a notification channel from configuration
    pub fn create_channel(&self, config: &ChannelConfig) -> Result<Box<dyn NotificationChannel>> {
        let channels = self.channels.read().unwrap_or_else(PoisonError::into_inner);

        let factory = channels
            .get(&config.factory)
            .ok_or_else(|| Error::config(format!("Unknown channel type: {}", config.factory)))?;

        factory.create(&config.settings)
    }

    pub fn list_dedup_stores(&self) -> Vec<String> {
        Self::names(&self.dedup_stores)
    }

    pub fn list_alarm_sources(&self) -> Vec<String> {
        Self::names(&self.alarm_sources)
    }

    pub fn list_channels(&self) -> Vec<String> {
        Self::names(&self.channels)
    }

    pub fn has_dedup_store(&self, name: &str) -> bool {
        Self::contains(&self.dedup_stores, name)
    }

    pub fn has_alarm_source(&self, name: &str) -> bool {
        Self::contains(&self.alarm_sources, name)
    }

    pub fn has_channel(&self, name: &str) -> bool {
        Self::contains(&self.channels, name)
    }

    fn names<V>(map: &RwLock<HashMap<String, V>>) -> Vec<String> {
        let mut names: Vec<String> = map
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        names.sort();
        names
    }

    fn contains<V>(map: &RwLock<HashMap<String, V>>, name: &str) -> bool {
        map.read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(name)
    }
}
