//! Owner side of plugins
//!
//! `PluginableFactory` wraps any entity repository. Loaded plugin factories add
//! their LEFT JOIN to every selection; materialization splits the
//! `<plugin>.<field>` columns off and attaches one plugin per loaded name to
//! the resulting `PluginableEntity`.

use std::collections::HashMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use super::{Plugin, PluginFactory, PluginRegistry};
use crate::backends::Row;
use crate::error::{ModelError, ModelResult};
use crate::model::traits::{Cascadable, Identifiable};
use crate::model::Entity;
use crate::query::Select;
use crate::repository::{Factory, Persistence, Repository};

/// Entity with its attached plugins, in attachment order
#[derive(Debug)]
pub struct PluginableEntity {
    entity: Entity,
    plugins: Vec<Plugin>,
}

impl PluginableEntity {
    pub fn new(entity: Entity) -> Self {
        Self {
            entity,
            plugins: Vec::new(),
        }
    }

    pub fn entity(&self) -> &Entity {
        &self.entity
    }

    pub fn into_entity(self) -> Entity {
        self.entity
    }

    /// Attach a plugin built for this entity, replacing one of the same name
    pub fn attach(&mut self, plugin: Plugin) -> ModelResult<()> {
        if plugin.owner_id() != self.entity.instance_id() {
            return Err(ModelError::NotPluginOwner(plugin.name().to_string()));
        }

        match self.plugins.iter_mut().find(|p| p.name() == plugin.name()) {
            Some(existing) => *existing = plugin,
            None => self.plugins.push(plugin),
        }
        Ok(())
    }

    pub fn detach(&mut self, name: &str) -> Option<Plugin> {
        let position = self.plugins.iter().position(|p| p.name() == name)?;
        Some(self.plugins.remove(position))
    }

    pub fn has_plugin(&self, name: &str) -> bool {
        self.plugins.iter().any(|p| p.name() == name)
    }

    pub fn plugins(&self) -> &[Plugin] {
        &self.plugins
    }

    pub fn plugin(&self, name: &str) -> ModelResult<&Plugin> {
        self.plugins
            .iter()
            .find(|p| p.name() == name)
            .ok_or_else(|| ModelError::ExtensionNotLoaded(name.to_string()))
    }

    pub fn plugin_mut(&mut self, name: &str) -> ModelResult<&mut Plugin> {
        self.plugins
            .iter_mut()
            .find(|p| p.name() == name)
            .ok_or_else(|| ModelError::ExtensionNotLoaded(name.to_string()))
    }

    /// Save every plugin, then the owner
    pub async fn save(&mut self) -> ModelResult<()> {
        if self.entity.is_deleted() {
            return Err(ModelError::AlreadyDeleted);
        }

        let owner_key = self.entity.primary_key().to_value();
        for plugin in self.plugins.iter_mut() {
            plugin.save(&owner_key).await?;
        }
        self.entity.save().await
    }

    /// Delete every plugin, then the owner; the first failure stops the cascade
    pub async fn delete(&mut self) -> ModelResult<()> {
        if self.entity.is_deleted() {
            return Err(ModelError::AlreadyDeleted);
        }

        for plugin in self.plugins.iter_mut() {
            plugin.delete().await?;
        }
        self.entity.delete().await
    }
}

impl Deref for PluginableEntity {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        &self.entity
    }
}

impl DerefMut for PluginableEntity {
    fn deref_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

#[async_trait]
impl Cascadable for PluginableEntity {
    async fn save(&mut self) -> ModelResult<()> {
        PluginableEntity::save(self).await
    }

    async fn delete(&mut self) -> ModelResult<()> {
        PluginableEntity::delete(self).await
    }

    fn is_deleted(&self) -> bool {
        self.entity.is_deleted()
    }
}

type LoadedPlugins = Vec<(String, Arc<dyn PluginFactory>)>;

/// Repository whose entities carry plugins
pub struct PluginableFactory<R = Factory>
where
    R: Repository<Object = Entity>,
{
    repository: R,
    registry: &'static PluginRegistry,
    loaded: Arc<RwLock<LoadedPlugins>>,
}

impl<R: Repository<Object = Entity>> Clone for PluginableFactory<R> {
    fn clone(&self) -> Self {
        Self {
            repository: self.repository.clone(),
            registry: self.registry,
            loaded: self.loaded.clone(),
        }
    }
}

impl<R: Repository<Object = Entity>> fmt::Debug for PluginableFactory<R> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PluginableFactory")
            .field("repository", &self.repository.name())
            .field("registered", &self.registry.names())
            .field("loaded", &self.loaded_plugins())
            .finish()
    }
}

impl<R: Repository<Object = Entity>> PluginableFactory<R> {
    pub fn new(repository: R, registry: &'static PluginRegistry) -> Self {
        Self {
            repository,
            registry,
            loaded: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn registry(&self) -> &'static PluginRegistry {
        self.registry
    }

    fn loaded(&self) -> LoadedPlugins {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn loaded_factory(&self, name: &str) -> Option<Arc<dyn PluginFactory>> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .find(|(loaded, _)| loaded == name)
            .map(|(_, factory)| factory.clone())
    }

    /// Names of the loaded plugins, in load order
    pub fn loaded_plugins(&self) -> Vec<String> {
        self.loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, _)| name.clone())
            .collect()
    }

    pub fn plugin_is_loaded(&self, name: &str) -> bool {
        self.loaded_factory(name).is_some()
    }

    /// Load plugins by name; already loaded names are left as they are
    pub fn plugin_load(&self, names: &[&str]) -> ModelResult<()> {
        if let Some(unknown) = names.iter().find(|name| !self.registry.contains(name)) {
            return Err(ModelError::UnknownExtension(unknown.to_string()));
        }

        let connection = self.repository.factory().connection();
        for name in names {
            if self.plugin_is_loaded(name) {
                continue;
            }
            let factory = (self.registry.constructor(name)?)(connection)?;
            self.loaded
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .push((name.to_string(), factory));
            tracing::debug!("plugin '{}' loaded on '{}'", name, self.repository.name());
        }
        Ok(())
    }

    /// Unload the named plugins, or every plugin with `None`
    pub fn plugin_unload(&self, names: Option<&[&str]>) {
        let mut loaded = self.loaded.write().unwrap_or_else(PoisonError::into_inner);
        match names {
            Some(names) => loaded.retain(|(name, _)| !names.contains(&name.as_str())),
            None => loaded.clear(),
        }
    }

    /// Plugin `name` of `owner`, loading its factory for this call if needed
    pub async fn plugin_get(&self, name: &str, owner: &Entity) -> ModelResult<Plugin> {
        let factory = match self.loaded_factory(name) {
            Some(factory) => factory,
            None => (self.registry.constructor(name)?)(self.repository.factory().connection())?,
        };
        factory.plugin_by_owner(owner).await
    }

    /// Attach the plugins found as `_<name>` maps in `raw`
    ///
    /// Maps of names that are not registered plugins are ignored.
    pub fn load_into(&self, entity: &mut PluginableEntity, raw: &Row) -> ModelResult<()> {
        for (key, value) in raw {
            let name = match key.strip_prefix('_') {
                Some(name) if self.registry.contains(name) => name,
                _ => continue,
            };
            let factory = self
                .loaded_factory(name)
                .ok_or_else(|| ModelError::ExtensionNotLoaded(name.to_string()))?;

            let data = match value {
                Value::Object(data) => data.clone(),
                _ => Row::new(),
            };
            let plugin = factory.plugin_object(entity.entity(), data)?;
            entity.attach(plugin)?;
        }
        Ok(())
    }
}

#[async_trait]
impl<R: Repository<Object = Entity>> Persistence for PluginableFactory<R> {
    fn name(&self) -> &str {
        self.repository.name()
    }

    async fn insert(&self, data: Row) -> ModelResult<Value> {
        self.repository.insert(data).await
    }

    async fn update(&self, key: &Value, data: Row) -> ModelResult<u64> {
        self.repository.update(key, data).await
    }

    async fn delete(&self, key: &Value) -> ModelResult<u64> {
        self.repository.delete(key).await
    }
}

impl<R: Repository<Object = Entity>> Repository for PluginableFactory<R> {
    type Object = PluginableEntity;

    fn factory(&self) -> &Factory {
        self.repository.factory()
    }

    fn select(&self) -> ModelResult<Select> {
        let owner = self.factory().structure()?;
        self.loaded()
            .iter()
            .try_fold(self.repository.select()?, |select, (_, factory)| {
                factory.add_to_select(select, owner)
            })
    }

    fn create_object(&self, row: Row) -> ModelResult<PluginableEntity> {
        let loaded = self.loaded();

        let mut base = Row::new();
        let mut parts: HashMap<String, Row> = HashMap::new();
        for (column, value) in row {
            if let Some((prefix, field)) = column.split_once('.') {
                if loaded.iter().any(|(name, _)| name == prefix) {
                    parts
                        .entry(prefix.to_string())
                        .or_default()
                        .insert(field.to_string(), value);
                    continue;
                }
            }
            base.insert(column, value);
        }

        let mut owner = PluginableEntity::new(self.repository.create_object(base)?);
        for (name, factory) in &loaded {
            let data = parts.remove(name).unwrap_or_default();
            let plugin = factory.plugin_object(owner.entity(), data)?;
            owner.attach(plugin)?;
        }
        Ok(owner)
    }
}
