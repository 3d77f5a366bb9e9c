//! Document factory
//!
//! Reads and creates documents of one collection. Modules are declared once
//! with `init_modules`; only loaded modules can be opened on the documents
//! this factory returns, and the paths of the others are left out of reads.

use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde_json::Value;
use uuid::Uuid;

use super::record::Document;
use super::store::{DocumentQuery, DocumentStore, ID_FIELD};
use crate::backends::Row;
use crate::connection::Connection;
use crate::error::{ModelError, ModelResult, Operation};
use crate::query::OrderBy;
use crate::repository::{PageSource, Paginator};

struct DocumentFactoryInner {
    connection: Connection,
    collection: String,
    modules: OnceCell<BTreeMap<String, String>>,
    loaded: RwLock<BTreeSet<String>>,
}

#[derive(Clone)]
pub struct DocumentFactory {
    inner: Arc<DocumentFactoryInner>,
}

impl fmt::Debug for DocumentFactory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DocumentFactory")
            .field("collection", &self.inner.collection)
            .field("modules", &self.inner.modules.get())
            .field("loaded", &self.loaded_modules())
            .finish()
    }
}

impl DocumentFactory {
    pub fn new(connection: &Connection, collection: &str) -> Self {
        Self {
            inner: Arc::new(DocumentFactoryInner {
                connection: connection.clone(),
                collection: collection.to_string(),
                modules: OnceCell::new(),
                loaded: RwLock::new(BTreeSet::new()),
            }),
        }
    }

    pub fn collection(&self) -> &str {
        &self.inner.collection
    }

    fn store(&self) -> ModelResult<Arc<dyn DocumentStore>> {
        self.inner.connection.document_store()
    }

    /// Declare the modules of this collection as `(name, path)` pairs
    pub fn init_modules(&self, modules: &[(&str, &str)]) -> ModelResult<()> {
        let modules = modules
            .iter()
            .map(|(name, path)| (name.to_string(), path.to_string()))
            .collect();
        self.inner
            .modules
            .set(modules)
            .map_err(|_| ModelError::StructureLocked(self.inner.collection.clone()))
    }

    fn registered(&self) -> BTreeMap<String, String> {
        self.inner.modules.get().cloned().unwrap_or_default()
    }

    fn check_registered(&self, names: &[&str]) -> ModelResult<()> {
        let registered = self.registered();
        match names.iter().find(|name| !registered.contains_key(**name)) {
            Some(unknown) => Err(ModelError::UnknownExtension(unknown.to_string())),
            None => Ok(()),
        }
    }

    pub fn module_load(&self, names: &[&str]) -> ModelResult<()> {
        self.check_registered(names)?;
        let mut loaded = self.inner.loaded.write().unwrap_or_else(PoisonError::into_inner);
        loaded.extend(names.iter().map(|name| name.to_string()));
        Ok(())
    }

    pub fn module_remove(&self, names: &[&str]) -> ModelResult<()> {
        self.check_registered(names)?;
        let mut loaded = self.inner.loaded.write().unwrap_or_else(PoisonError::into_inner);
        for name in names {
            loaded.remove(*name);
        }
        Ok(())
    }

    /// Unload every module
    pub fn module_reset(&self) {
        self.inner
            .loaded
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    pub fn module_is_loaded(&self, name: &str) -> bool {
        self.inner
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains(name)
    }

    pub fn loaded_modules(&self) -> Vec<String> {
        self.inner
            .loaded
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .cloned()
            .collect()
    }

    fn partition_modules(&self) -> (BTreeMap<String, String>, Vec<String>) {
        let mut loaded = BTreeMap::new();
        let mut excluded = Vec::new();
        for (name, path) in self.registered() {
            if self.module_is_loaded(&name) {
                loaded.insert(name, path);
            } else {
                excluded.push(path);
            }
        }
        (loaded, excluded)
    }

    fn query(&self, filter: Row, sort: &[OrderBy], skip: u64, limit: Option<u64>) -> DocumentQuery {
        DocumentQuery {
            filter,
            exclude: self.partition_modules().1,
            sort: sort.to_vec(),
            skip,
            limit,
        }
    }

    /// Wrap a stored map as a document of this collection
    pub fn create_object(&self, data: Row) -> ModelResult<Document> {
        let loaded = Arc::new(self.partition_modules().0);
        Ok(Document::new(&self.inner.collection, data, loaded, self.store()?))
    }

    async fn find_with(&self, query: DocumentQuery) -> ModelResult<Vec<Document>> {
        tracing::debug!("find in {}: {:?}", self.inner.collection, query.filter);
        let rows = self.store()?.find(&self.inner.collection, &query).await?;
        rows.into_iter().map(|row| self.create_object(row)).collect()
    }

    pub async fn find(&self, filter: Row, sort: &[OrderBy]) -> ModelResult<Vec<Document>> {
        self.find_with(self.query(filter, sort, 0, None)).await
    }

    pub async fn find_one(&self, filter: Row) -> ModelResult<Document> {
        self.find_with(self.query(filter, &[], 0, Some(1)))
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| ModelError::NotFound(self.inner.collection.clone()))
    }

    pub async fn get_one(&self, id: &Value) -> ModelResult<Document> {
        let mut filter = Row::new();
        filter.insert(ID_FIELD.to_string(), id.clone());
        self.find_one(filter).await
    }

    /// One page of documents; `page` is 1-based
    pub async fn get_page(
        &self,
        page: i64,
        page_size: i64,
        sort: &[OrderBy],
        filter: Option<Row>,
    ) -> ModelResult<Vec<Document>> {
        if page < 1 || page_size < 1 {
            return Err(ModelError::InvalidPage { page, page_size });
        }
        let skip = ((page - 1) * page_size) as u64;
        let query = self.query(filter.unwrap_or_default(), sort, skip, Some(page_size as u64));
        self.find_with(query).await
    }

    pub async fn count(&self, filter: Option<&Row>) -> ModelResult<u64> {
        let empty = Row::new();
        let count = self
            .store()?
            .count(&self.inner.collection, filter.unwrap_or(&empty))
            .await?;
        Ok(count)
    }

    pub fn get_paginator(
        &self,
        page: i64,
        page_size: i64,
        sort: Vec<OrderBy>,
        filter: Option<Row>,
    ) -> Paginator<Self> {
        Paginator::new(self.clone(), page, page_size, sort, filter)
    }

    /// Store `data` and return its `_id`, generating a uuid when it has none
    pub async fn insert(&self, data: Row) -> ModelResult<Value> {
        let mut data = data;
        let id = match data.get(ID_FIELD) {
            Some(id) if !id.is_null() => id.clone(),
            _ => {
                let id = Value::from(Uuid::new_v4().to_string());
                data.insert(ID_FIELD.to_string(), id.clone());
                id
            }
        };

        self.store()?
            .insert(&self.inner.collection, data)
            .await
            .map_err(ModelError::persistence(Operation::Insert))?;
        tracing::debug!("inserted {} into {}", id, self.inner.collection);
        Ok(id)
    }

    /// Insert `data` and return it as a document
    pub async fn create(&self, data: Row) -> ModelResult<Document> {
        let id = self.insert(data.clone()).await?;
        let mut data = data;
        data.insert(ID_FIELD.to_string(), id);
        self.create_object(data)
    }
}

#[async_trait]
impl PageSource for DocumentFactory {
    type Item = Document;
    type Filter = Row;

    async fn count_matching(&self, filter: Option<&Row>) -> ModelResult<u64> {
        self.count(filter).await
    }

    async fn page(
        &self,
        page: i64,
        page_size: i64,
        order: &[OrderBy],
        filter: Option<&Row>,
    ) -> ModelResult<Vec<Document>> {
        self.get_page(page, page_size, order, filter.cloned()).await
    }
}
