//! Repositories
//!
//! `Persistence` is the write side an entity calls back into. `Repository`
//! adds the read side: selections, materialization and paging. `Factory` is
//! the plain single-table repository; the structure and plugin extensions wrap
//! it.

use async_trait::async_trait;
use serde_json::Value;

use crate::backends::Row;
use crate::error::{ModelError, ModelResult};
use crate::query::{OrderBy, Select, Where, COUNT_ALIAS};

pub mod factory;
pub mod paginator;

pub use factory::{Factory, TableStructure};
pub use paginator::{PageSource, Paginator};

/// Write operations keyed by primary key
#[async_trait]
pub trait Persistence: Send + Sync {
    /// Name the repository is registered under on its connection
    fn name(&self) -> &str;

    /// Insert one object and return its generated key
    async fn insert(&self, data: Row) -> ModelResult<Value>;

    async fn update(&self, key: &Value, data: Row) -> ModelResult<u64>;

    async fn delete(&self, key: &Value) -> ModelResult<u64>;
}

/// Read side of a repository
#[async_trait]
pub trait Repository: Persistence + Clone + Sized + 'static {
    type Object: Send;

    /// Underlying table factory
    fn factory(&self) -> &Factory;

    /// Selection with every join and projection this repository needs
    fn select(&self) -> ModelResult<Select>;

    fn create_object(&self, row: Row) -> ModelResult<Self::Object>;

    fn primary_where(&self, key: &Value) -> ModelResult<Where> {
        self.factory().primary_where(key)
    }

    fn count_select(&self) -> ModelResult<Select> {
        Ok(self.select()?.into_count())
    }

    fn create_list(&self, rows: Vec<Row>) -> ModelResult<Vec<Self::Object>> {
        rows.into_iter().map(|row| self.create_object(row)).collect()
    }

    /// First object matching `key`
    async fn get_one(&self, key: &Value) -> ModelResult<Self::Object> {
        let select = self.select()?.where_clause(self.primary_where(key)?);
        let row = self
            .factory()
            .fetch(&select)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::NotFound(self.factory().display_name()))?;
        self.create_object(row)
    }

    async fn get_from_ids(&self, keys: &[Value], order: &[OrderBy]) -> ModelResult<Vec<Self::Object>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let select = self
            .select()?
            .where_clause(self.primary_where(&Value::Array(keys.to_vec()))?)
            .order_by(order.to_vec());
        let rows = self.factory().fetch(&select).await?;
        self.create_list(rows)
    }

    async fn get_from_where(
        &self,
        predicate: Option<Where>,
        order: &[OrderBy],
    ) -> ModelResult<Vec<Self::Object>> {
        let select = self.select()?.where_opt(predicate).order_by(order.to_vec());
        let rows = self.factory().fetch(&select).await?;
        self.create_list(rows)
    }

    /// One page of objects; `page` is 1-based
    async fn get_page(
        &self,
        page: i64,
        page_size: i64,
        order: &[OrderBy],
        predicate: Option<Where>,
    ) -> ModelResult<Vec<Self::Object>> {
        if page < 1 || page_size < 1 {
            return Err(ModelError::InvalidPage { page, page_size });
        }
        let select = self
            .select()?
            .where_opt(predicate)
            .order_by(order.to_vec())
            .paginate(page_size as u64, page as u64);
        let rows = self.factory().fetch(&select).await?;
        self.create_list(rows)
    }

    async fn count(&self, predicate: Option<Where>) -> ModelResult<u64> {
        let select = self.count_select()?.where_opt(predicate);
        let rows = self.factory().fetch(&select).await?;
        Ok(rows
            .first()
            .and_then(|row| row.get(COUNT_ALIAS))
            .and_then(Value::as_u64)
            .unwrap_or(0))
    }

    fn get_paginator(
        &self,
        page: i64,
        page_size: i64,
        order: Vec<OrderBy>,
        predicate: Option<Where>,
    ) -> Paginator<Self> {
        Paginator::new(self.clone(), page, page_size, order, predicate)
    }

    /// Insert `data` and return the materialized object with its key
    async fn create(&self, data: Row) -> ModelResult<Self::Object> {
        let key = Persistence::insert(self, data.clone()).await?;
        let mut row = data;
        if let [field] = self.factory().structure()?.primary.as_slice() {
            if !key.is_null() {
                row.insert(field.clone(), key);
            }
        }
        self.create_object(row)
    }
}

#[async_trait]
impl<R: Repository> PageSource for R {
    type Item = R::Object;
    type Filter = Where;

    async fn count_matching(&self, filter: Option<&Where>) -> ModelResult<u64> {
        self.count(filter.cloned()).await
    }

    async fn page(
        &self,
        page: i64,
        page_size: i64,
        order: &[OrderBy],
        filter: Option<&Where>,
    ) -> ModelResult<Vec<R::Object>> {
        self.get_page(page, page_size, order, filter.cloned()).await
    }
}
