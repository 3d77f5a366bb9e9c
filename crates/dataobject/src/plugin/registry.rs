//! Plugin registry
//!
//! Maps plugin names to constructors. A registry is meant to live in a
//! `static` next to the factory it serves and is filled once: the first
//! `init` wins and later calls change nothing.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;

use super::PluginFactory;
use crate::connection::Connection;
use crate::error::{ModelError, ModelResult};

/// Builds the factory of one plugin on a connection
pub type PluginConstructor =
    Arc<dyn Fn(&Connection) -> ModelResult<Arc<dyn PluginFactory>> + Send + Sync>;

/// Wrap a closure as a [`PluginConstructor`]
pub fn plugin_constructor<F>(build: F) -> PluginConstructor
where
    F: Fn(&Connection) -> ModelResult<Arc<dyn PluginFactory>> + Send + Sync + 'static,
{
    Arc::new(build)
}

pub struct PluginRegistry {
    entries: OnceCell<HashMap<String, PluginConstructor>>,
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginRegistry")
            .field("names", &self.names())
            .finish()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl PluginRegistry {
    pub const fn new() -> Self {
        Self {
            entries: OnceCell::new(),
        }
    }

    /// Fill the registry; returns `false` when it was already filled
    pub fn init<I, S>(&self, entries: I) -> bool
    where
        I: IntoIterator<Item = (S, PluginConstructor)>,
        S: Into<String>,
    {
        let entries = entries
            .into_iter()
            .map(|(name, constructor)| (name.into(), constructor))
            .collect();
        let set = self.entries.set(entries).is_ok();
        if !set {
            tracing::debug!("plugin registry already initialised, ignoring init");
        }
        set
    }

    /// Like [`PluginRegistry::init`] but fails when already filled
    pub fn try_init<I, S>(&self, entries: I) -> ModelResult<()>
    where
        I: IntoIterator<Item = (S, PluginConstructor)>,
        S: Into<String>,
    {
        if self.init(entries) {
            Ok(())
        } else {
            Err(ModelError::StructureLocked("plugin registry".to_string()))
        }
    }

    pub fn is_initialised(&self) -> bool {
        self.entries.get().is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries
            .get()
            .map_or(false, |entries| entries.contains_key(name))
    }

    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .entries
            .get()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        names.sort();
        names
    }

    pub fn constructor(&self, name: &str) -> ModelResult<PluginConstructor> {
        self.entries
            .get()
            .and_then(|entries| entries.get(name))
            .cloned()
            .ok_or_else(|| ModelError::UnknownExtension(name.to_string()))
    }
}
