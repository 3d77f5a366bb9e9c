//! Table-backed plugins
//!
//! A `TablePluginFactory` stores one plugin row per owner in its own table,
//! linked through an owner key column. Owner selections LEFT JOIN the plugin
//! table, so owners without a plugin row get an unsaved plugin that is
//! inserted on the first save that touches it.

use std::ops::{Deref, DerefMut};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use uuid::Uuid;

use super::PluginFactory;
use crate::backends::Row;
use crate::connection::Connection;
use crate::error::{ModelError, ModelResult};
use crate::model::traits::{Identifiable, Trackable};
use crate::model::Entity;
use crate::query::{JoinType, Select, Where};
use crate::repository::{Factory, Persistence, TableStructure};
use crate::structure::prefix_add;

/// Secondary entity attached to an owner
#[derive(Debug)]
pub struct Plugin {
    name: String,
    entity: Entity,
    owner: Uuid,
    owner_key: String,
    saved: bool,
}

impl Plugin {
    pub fn new(name: &str, entity: Entity, owner: &Entity, owner_key: &str, saved: bool) -> Self {
        Self {
            name: name.to_string(),
            entity,
            owner: owner.instance_id(),
            owner_key: owner_key.to_string(),
            saved,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Instance id of the owning entity
    pub fn owner_id(&self) -> Uuid {
        self.owner
    }

    pub fn is_saved(&self) -> bool {
        self.saved
    }

    pub fn into_entity(self) -> Entity {
        self.entity
    }

    /// Insert when new and modified, else save the pending fields
    pub(crate) async fn save(&mut self, owner_key: &Value) -> ModelResult<()> {
        if self.saved {
            return self.entity.save().await;
        }
        if !self.entity.has_modified_fields() {
            return Ok(());
        }
        if owner_key.is_null() {
            return Err(ModelError::MissingKeyPart(self.owner_key.clone()));
        }

        self.entity.set_clean(&self.owner_key, owner_key.clone());
        self.entity.insert_new().await?;
        self.saved = true;
        tracing::debug!("plugin '{}' inserted for owner {}", self.name, owner_key);
        Ok(())
    }

    pub(crate) async fn delete(&mut self) -> ModelResult<()> {
        if self.saved && !self.entity.is_deleted() {
            self.entity.delete().await?;
        }
        Ok(())
    }
}

impl Deref for Plugin {
    type Target = Entity;

    fn deref(&self) -> &Entity {
        &self.entity
    }
}

impl DerefMut for Plugin {
    fn deref_mut(&mut self) -> &mut Entity {
        &mut self.entity
    }
}

/// Plugin stored in its own table, one row per owner
#[derive(Debug, Clone)]
pub struct TablePluginFactory {
    factory: Factory,
    name: String,
    owner_key: String,
}

impl TablePluginFactory {
    /// Plugin `name` over `table`, keyed by `primary` and linked through `owner_key`
    pub fn new(
        connection: &Connection,
        name: &str,
        table: &str,
        primary: &[&str],
        owner_key: &str,
        fields: &[&str],
    ) -> ModelResult<Self> {
        if fields.is_empty() || fields.contains(&"*") {
            return Err(ModelError::Configuration(format!(
                "plugin '{}' needs an explicit field list",
                name
            )));
        }

        let mut fields: Vec<&str> = fields.to_vec();
        for column in primary.iter().copied().chain(std::iter::once(owner_key)) {
            if !fields.contains(&column) {
                fields.push(column);
            }
        }

        let factory = Factory::new(connection, table);
        factory.init_table(table, primary, &fields)?;

        Ok(Self {
            factory,
            name: name.to_string(),
            owner_key: owner_key.to_string(),
        })
    }

    pub fn factory(&self) -> &Factory {
        &self.factory
    }

    fn plugin(&self, owner: &Entity, data: Row, saved: bool) -> ModelResult<Plugin> {
        let primary = self.factory.structure()?.primary.clone();
        let entity = Entity::new(Arc::new(self.factory.clone()), primary, data);
        Ok(Plugin::new(&self.name, entity, owner, &self.owner_key, saved))
    }
}

#[async_trait]
impl Persistence for TablePluginFactory {
    fn name(&self) -> &str {
        &self.name
    }

    async fn insert(&self, data: Row) -> ModelResult<Value> {
        self.factory.insert(data).await
    }

    async fn update(&self, key: &Value, data: Row) -> ModelResult<u64> {
        self.factory.update(key, data).await
    }

    async fn delete(&self, key: &Value) -> ModelResult<u64> {
        self.factory.delete(key).await
    }
}

#[async_trait]
impl PluginFactory for TablePluginFactory {
    fn plugin_name(&self) -> &str {
        &self.name
    }

    fn add_to_select(&self, select: Select, owner: &TableStructure) -> ModelResult<Select> {
        let owner_primary = match owner.primary.as_slice() {
            [primary] => owner.qualify(primary),
            _ => {
                return Err(ModelError::Configuration(format!(
                    "plugin '{}' needs an owner with a single primary key",
                    self.name
                )))
            }
        };

        let structure = self.factory.structure()?;
        let on = Where::columns_eq(&owner_primary, &structure.qualify(&self.owner_key));
        Ok(select.join(
            JoinType::Left,
            &structure.table,
            on,
            prefix_add(&structure.table, &self.name, &structure.fields),
        ))
    }

    fn plugin_object(&self, owner: &Entity, data: Row) -> ModelResult<Plugin> {
        let saved = data
            .get(&self.owner_key)
            .map_or(false, |value| !value.is_null());
        if saved {
            self.plugin(owner, data, true)
        } else {
            self.plugin(owner, Row::new(), false)
        }
    }

    async fn plugin_by_owner(&self, owner: &Entity) -> ModelResult<Plugin> {
        let key = owner.primary_key().to_value();
        if key.is_null() {
            return self.plugin(owner, Row::new(), false);
        }

        let structure = self.factory.structure()?;
        let select = self
            .factory
            .base_select()?
            .where_clause(Where::eq(&structure.qualify(&self.owner_key), key))
            .limit(1);

        match self.factory.fetch(&select).await?.into_iter().next() {
            Some(row) => self.plugin(owner, row, true),
            None => self.plugin(owner, Row::new(), false),
        }
    }
}
