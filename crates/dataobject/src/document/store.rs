//! Document store boundary
//!
//! `DocumentStore` is the document counterpart of `Driver`: collections of
//! maps addressed by `_id`, updated with change logs. `MemoryDocumentStore`
//! keeps collections in process memory, records every update document and
//! supports per-collection failure injection.

use std::cmp::Ordering;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::change_log::ChangeLog;
use super::operations::{apply, get_path, unset_path};
use crate::backends::memory::compare;
use crate::backends::{FailOn, Row};
use crate::error::DriverError;
use crate::query::{OrderBy, OrderDirection};

/// Document id field
pub const ID_FIELD: &str = "_id";

/// Criteria of a `find`
#[derive(Debug, Clone, Default, PartialEq)]
pub struct DocumentQuery {
    /// Equality on dotted paths
    pub filter: Row,
    /// Paths left out of returned documents
    pub exclude: Vec<String>,
    pub sort: Vec<OrderBy>,
    pub skip: u64,
    pub limit: Option<u64>,
}

#[async_trait]
pub trait DocumentStore: Send + Sync {
    async fn find(&self, collection: &str, query: &DocumentQuery) -> Result<Vec<Row>, DriverError>;

    async fn count(&self, collection: &str, filter: &Row) -> Result<u64, DriverError>;

    async fn insert(&self, collection: &str, document: Row) -> Result<(), DriverError>;

    /// Apply `changes` to the document `id`; returns the number of documents matched
    async fn update(
        &self,
        collection: &str,
        id: &Value,
        changes: &ChangeLog,
    ) -> Result<u64, DriverError>;

    async fn remove(&self, collection: &str, id: &Value) -> Result<u64, DriverError>;
}

/// Document store keeping collections in process memory
#[derive(Debug, Default)]
pub struct MemoryDocumentStore {
    collections: DashMap<String, Vec<Row>>,
    failures: DashMap<(String, FailOn), ()>,
    updates: Mutex<Vec<(String, Value)>>,
}

impl MemoryDocumentStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn seed(&self, collection: &str, documents: Vec<Row>) {
        self.collections
            .entry(collection.to_string())
            .or_default()
            .extend(documents);
    }

    pub fn documents(&self, collection: &str) -> Vec<Row> {
        self.collections
            .get(collection)
            .map(|documents| documents.clone())
            .unwrap_or_default()
    }

    pub fn fail_on(&self, collection: &str, kind: FailOn) {
        self.failures.insert((collection.to_string(), kind), ());
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    /// Update documents sent so far, with their collection
    pub fn updates(&self) -> Vec<(String, Value)> {
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    fn check_failure(&self, collection: &str, kind: FailOn) -> Result<(), DriverError> {
        if self.failures.contains_key(&(collection.to_string(), kind)) {
            return Err(DriverError::Store {
                target: collection.to_string(),
                message: format!("injected {:?} failure", kind),
            });
        }
        Ok(())
    }
}

fn matches(document: &Row, filter: &Row) -> bool {
    filter
        .iter()
        .all(|(path, expected)| get_path(document, path) == Some(expected))
}

fn has_id(document: &Row, id: &Value) -> bool {
    document.get(ID_FIELD) == Some(id)
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn find(&self, collection: &str, query: &DocumentQuery) -> Result<Vec<Row>, DriverError> {
        self.check_failure(collection, FailOn::Select)?;

        let mut found: Vec<Row> = self
            .documents(collection)
            .into_iter()
            .filter(|document| matches(document, &query.filter))
            .collect();

        if !query.sort.is_empty() {
            found.sort_by(|left, right| {
                for order in &query.sort {
                    let a = get_path(left, &order.column).cloned().unwrap_or(Value::Null);
                    let b = get_path(right, &order.column).cloned().unwrap_or(Value::Null);
                    let ordering = compare(&a, &b).unwrap_or(Ordering::Equal);
                    let ordering = match order.direction {
                        OrderDirection::Asc => ordering,
                        OrderDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let limit = query.limit.map_or(usize::MAX, |limit| limit as usize);
        Ok(found
            .into_iter()
            .skip(query.skip as usize)
            .take(limit)
            .map(|mut document| {
                for path in &query.exclude {
                    unset_path(&mut document, path);
                }
                document
            })
            .collect())
    }

    async fn count(&self, collection: &str, filter: &Row) -> Result<u64, DriverError> {
        self.check_failure(collection, FailOn::Select)?;
        Ok(self
            .documents(collection)
            .iter()
            .filter(|document| matches(document, filter))
            .count() as u64)
    }

    async fn insert(&self, collection: &str, document: Row) -> Result<(), DriverError> {
        self.check_failure(collection, FailOn::Insert)?;
        tracing::debug!("memory store: insert into {}", collection);
        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
        Ok(())
    }

    async fn update(
        &self,
        collection: &str,
        id: &Value,
        changes: &ChangeLog,
    ) -> Result<u64, DriverError> {
        self.check_failure(collection, FailOn::Update)?;

        let update = changes.to_update();
        tracing::debug!("memory store: update {} {} {}", collection, id, update);
        self.updates
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((collection.to_string(), update));

        let mut documents = match self.collections.get_mut(collection) {
            Some(documents) => documents,
            None => return Ok(0),
        };
        let mut matched = 0;
        for document in documents.iter_mut().filter(|document| has_id(document, id)) {
            for (operation, fields) in changes.changes() {
                for (path, value) in fields {
                    apply(document, *operation, path, value).map_err(|err| {
                        DriverError::Store {
                            target: collection.to_string(),
                            message: err.to_string(),
                        }
                    })?;
                }
            }
            matched += 1;
        }
        Ok(matched)
    }

    async fn remove(&self, collection: &str, id: &Value) -> Result<u64, DriverError> {
        self.check_failure(collection, FailOn::Delete)?;

        let mut documents = match self.collections.get_mut(collection) {
            Some(documents) => documents,
            None => return Ok(0),
        };
        let before = documents.len();
        documents.retain(|document| !has_id(document, id));
        Ok((before - documents.len()) as u64)
    }
}
