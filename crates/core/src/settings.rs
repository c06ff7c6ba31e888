//! Read-only key/value settings source.
//!
//! Provider credentials and tunables come from the embedding
//! application. [`SettingsSource`] is the narrow seam: the environment
//! in production ([`EnvSettings`]), a plain map in tests
//! ([`MapSettings`]). A missing required key is a configuration error,
//! never a panic.

use std::collections::BTreeMap;

use crate::error::CoreError;

/// Read-only access to configuration values.
pub trait SettingsSource: Send + Sync {
    /// Look up a value by key, `None` when absent or empty.
    fn get(&self, key: &str) -> Option<String>;

    /// Look up a required value, failing with
    /// [`CoreError::Configuration`] when absent.
    fn require(&self, key: &str) -> Result<String, CoreError> {
        self.get(key)
            .ok_or_else(|| CoreError::Configuration(format!("missing required setting '{key}'")))
    }
}

/// Settings backed by process environment variables.
#[derive(Debug, Clone, Copy, Default)]
pub struct EnvSettings;

impl SettingsSource for EnvSettings {
    fn get(&self, key: &str) -> Option<String> {
        std::env::var(key).ok().filter(|v| !v.trim().is_empty())
    }
}

/// Settings backed by an in-memory map, for tests and embedding.
#[derive(Debug, Clone, Default)]
pub struct MapSettings {
    values: BTreeMap<String, String>,
}

impl MapSettings {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style insert.
    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.values.insert(key.into(), value.into());
        self
    }
}

impl SettingsSource for MapSettings {
    fn get(&self, key: &str) -> Option<String> {
        self.values.get(key).cloned().filter(|v| !v.trim().is_empty())
    }
}
