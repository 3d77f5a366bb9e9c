//! Composite (multitable) structures
//!
//! An `ExtendedFactory` joins its base table with auxiliary tables keyed by
//! the base primary key. Auxiliary fields are read into `_<table>` maps and
//! written back with their own statements: on insert after the base row (to
//! learn the key), on update before the base row.
//!
//! The `JoinScope` parameter narrows the joins and auxiliary writes;
//! `Unscoped` leaves them as they are, `LocaleScope` adds a locale clause.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use serde_json::Value;

use super::multitable::{prefix_add, prefix_remove};
use crate::backends::Row;
use crate::connection::Connection;
use crate::error::{ModelError, ModelResult};
use crate::model::traits::Joinable;
use crate::model::{nested_key, Entity};
use crate::query::{key_clause, JoinClause, JoinType, Select, Where};
use crate::repository::{Factory, Persistence, Repository};

/// Auxiliary table joined onto a base table
#[derive(Debug, Clone, PartialEq)]
pub struct Extension {
    pub table: String,
    /// Column of the auxiliary table holding the base primary key
    pub key: String,
    pub fields: Vec<String>,
}

impl Extension {
    pub fn column(&self, field: &str) -> String {
        format!("{}.{}", self.table, field)
    }
}

/// Narrows the joins and auxiliary writes of an `ExtendedFactory`
pub trait JoinScope: Default + Send + Sync + 'static {
    /// Fails when the scope can not be resolved
    fn check(&self, connection: &Connection, table: &str) -> ModelResult<()>;

    fn scoped_joins(
        &self,
        connection: &Connection,
        table: &str,
        base: Vec<JoinClause>,
    ) -> ModelResult<Vec<JoinClause>>;

    /// Extra predicate for auxiliary updates
    fn write_scope(
        &self,
        connection: &Connection,
        extension: &Extension,
    ) -> ModelResult<Option<Where>>;

    /// Complete an auxiliary row before it is inserted
    fn prepare_insert(
        &self,
        connection: &Connection,
        extension: &Extension,
        row: &mut Row,
    ) -> ModelResult<()>;
}

/// Joins and writes exactly as declared
#[derive(Debug, Default)]
pub struct Unscoped;

impl JoinScope for Unscoped {
    fn check(&self, _connection: &Connection, _table: &str) -> ModelResult<()> {
        Ok(())
    }

    fn scoped_joins(
        &self,
        _connection: &Connection,
        _table: &str,
        base: Vec<JoinClause>,
    ) -> ModelResult<Vec<JoinClause>> {
        Ok(base)
    }

    fn write_scope(
        &self,
        _connection: &Connection,
        _extension: &Extension,
    ) -> ModelResult<Option<Where>> {
        Ok(None)
    }

    fn prepare_insert(
        &self,
        _connection: &Connection,
        _extension: &Extension,
        _row: &mut Row,
    ) -> ModelResult<()> {
        Ok(())
    }
}

struct ExtendedInner<S> {
    extensions: RwLock<Vec<Extension>>,
    scope: S,
}

/// Repository over a base table plus joined auxiliary tables
pub struct ExtendedFactory<S: JoinScope = Unscoped> {
    base: Factory,
    inner: Arc<ExtendedInner<S>>,
}

impl<S: JoinScope> Clone for ExtendedFactory<S> {
    fn clone(&self) -> Self {
        Self {
            base: self.base.clone(),
            inner: self.inner.clone(),
        }
    }
}

impl<S: JoinScope> fmt::Debug for ExtendedFactory<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ExtendedFactory")
            .field("base", &self.base)
            .field("extensions", &self.extensions())
            .finish()
    }
}

impl<S: JoinScope> ExtendedFactory<S> {
    pub fn new(connection: &Connection, name: &str) -> Self {
        let factory = Self {
            base: Factory::unregistered(connection, name),
            inner: Arc::new(ExtendedInner {
                extensions: RwLock::new(Vec::new()),
                scope: S::default(),
            }),
        };
        connection.register(Arc::new(factory.clone()));
        factory
    }

    /// Structure of the base table, see [`Factory::init_table`]
    pub fn init_table(&self, table: &str, primary: &[&str], fields: &[&str]) -> ModelResult<()> {
        self.base.init_table(table, primary, fields)
    }

    /// Join `table` on `table.key = base.primary`, selecting `fields`
    pub fn init_extended(&self, table: &str, key: &str, fields: &[&str]) -> ModelResult<()> {
        if fields.is_empty() || fields.contains(&"*") {
            return Err(ModelError::Configuration(format!(
                "auxiliary table '{}' needs an explicit field list",
                table
            )));
        }

        let mut extensions = self
            .inner
            .extensions
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        if extensions.iter().any(|extension| extension.table == table) {
            return Err(ModelError::StructureLocked(table.to_string()));
        }

        extensions.push(Extension {
            table: table.to_string(),
            key: key.to_string(),
            fields: fields.iter().map(|field| field.to_string()).collect(),
        });
        tracing::debug!("'{}' extended with table '{}'", self.base.name(), table);
        Ok(())
    }

    pub fn base(&self) -> &Factory {
        &self.base
    }

    pub fn scope(&self) -> &S {
        &self.inner.scope
    }

    fn connection(&self) -> &Connection {
        self.base.connection()
    }

    fn check_scope(&self) -> ModelResult<()> {
        let table = self.base.display_name();
        self.inner.scope.check(self.connection(), &table)
    }

    /// Unscoped join of every auxiliary table
    pub fn base_join(&self) -> ModelResult<Vec<JoinClause>> {
        let structure = self.base.structure()?;
        let primary = match structure.primary.as_slice() {
            [primary] => structure.qualify(primary),
            _ => {
                return Err(ModelError::Configuration(format!(
                    "'{}' must have a single primary key to be extended",
                    structure.table
                )))
            }
        };

        Ok(self
            .extensions()
            .iter()
            .map(|extension| JoinClause {
                join_type: JoinType::Inner,
                table: extension.table.clone(),
                on: Where::columns_eq(&primary, &extension.column(&extension.key)),
            })
            .collect())
    }
}

impl<S: JoinScope> Joinable for ExtendedFactory<S> {
    fn extensions(&self) -> Vec<Extension> {
        self.inner
            .extensions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn joins(&self) -> ModelResult<Vec<JoinClause>> {
        let table = self.base.display_name();
        self.inner
            .scope
            .scoped_joins(self.connection(), &table, self.base_join()?)
    }
}

#[async_trait]
impl<S: JoinScope> Persistence for ExtendedFactory<S> {
    fn name(&self) -> &str {
        self.base.name()
    }

    async fn insert(&self, data: Row) -> ModelResult<Value> {
        self.check_scope()?;

        let mut data = data;
        let mut auxiliary = Vec::new();
        for extension in self.extensions() {
            if let Some(Value::Object(values)) = data.remove(&nested_key(&extension.table)) {
                auxiliary.push((extension, values));
            }
        }

        let key = self.base.insert(data).await?;

        for (extension, mut values) in auxiliary {
            if values.is_empty() {
                continue;
            }
            values.insert(extension.key.clone(), key.clone());
            self.inner
                .scope
                .prepare_insert(self.connection(), &extension, &mut values)?;
            self.base.insert_into(&extension.table, values, None).await?;
        }

        Ok(key)
    }

    async fn update(&self, key: &Value, data: Row) -> ModelResult<u64> {
        self.check_scope()?;

        let mut data = data;
        for extension in self.extensions() {
            let values = match data.remove(&nested_key(&extension.table)) {
                Some(Value::Object(values)) if !values.is_empty() => values,
                _ => continue,
            };

            let mut predicate = key_clause(&extension.column(&extension.key), key);
            if let Some(scope) = self
                .inner
                .scope
                .write_scope(self.connection(), &extension)?
            {
                predicate = predicate.and_where(scope);
            }
            self.base
                .update_table(&extension.table, values, predicate)
                .await?;
        }

        self.base.update(key, data).await
    }

    async fn delete(&self, key: &Value) -> ModelResult<u64> {
        self.check_scope()?;

        for extension in self.extensions() {
            let predicate = key_clause(&extension.column(&extension.key), key);
            self.base.delete_from(&extension.table, predicate).await?;
        }

        self.base.delete(key).await
    }
}

impl<S: JoinScope> Repository for ExtendedFactory<S> {
    type Object = Entity;

    fn factory(&self) -> &Factory {
        &self.base
    }

    fn select(&self) -> ModelResult<Select> {
        let mut select = self.base.base_select()?;
        let extensions = self.extensions();

        for (join, extension) in self.joins()?.into_iter().zip(extensions.iter()) {
            select = select.join(
                join.join_type,
                &join.table,
                join.on,
                prefix_add(&extension.table, &extension.table, &extension.fields),
            );
        }

        Ok(select)
    }

    fn create_object(&self, row: Row) -> ModelResult<Entity> {
        let primary = self.base.structure()?.primary.clone();
        Ok(Entity::new(
            Arc::new(self.clone()),
            primary,
            prefix_remove(row),
        ))
    }
}
