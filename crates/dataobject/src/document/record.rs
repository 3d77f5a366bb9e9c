//! Documents
//!
//! A `Document` is a nested map plus the change log of everything done to it
//! since the last save. Modules loaded by the factory can be opened as
//! sub-documents; their changes ride along with the parent's save.

use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::change_log::ChangeLog;
use super::module::Module;
use super::operations::{apply, get_path, set_path, UpdateOperation, UpdateOperations};
use super::store::{DocumentStore, ID_FIELD};
use crate::backends::Row;
use crate::error::{ModelError, ModelResult, Operation};

pub struct Document {
    collection: String,
    data: Row,
    changes: ChangeLog,
    /// Loaded modules: name to path
    module_paths: Arc<BTreeMap<String, String>>,
    modules: BTreeMap<String, Module>,
    deleted: bool,
    store: Arc<dyn DocumentStore>,
}

impl fmt::Debug for Document {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Document")
            .field("collection", &self.collection)
            .field("data", &self.data)
            .field("changes", &self.changes)
            .field("modules", &self.modules.keys().collect::<Vec<_>>())
            .field("deleted", &self.deleted)
            .finish()
    }
}

impl Document {
    pub(crate) fn new(
        collection: &str,
        data: Row,
        module_paths: Arc<BTreeMap<String, String>>,
        store: Arc<dyn DocumentStore>,
    ) -> Self {
        Self {
            collection: collection.to_string(),
            data,
            changes: ChangeLog::new(),
            module_paths,
            modules: BTreeMap::new(),
            deleted: false,
            store,
        }
    }

    pub fn collection(&self) -> &str {
        &self.collection
    }

    pub fn id(&self) -> Option<&Value> {
        self.data.get(ID_FIELD)
    }

    pub fn data(&self) -> &Row {
        &self.data
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        self.data.get(field)
    }

    pub fn get_path(&self, path: &str) -> ModelResult<&Value> {
        get_path(&self.data, path).ok_or_else(|| ModelError::PathNotFound(path.to_string()))
    }

    pub fn changes(&self) -> &ChangeLog {
        &self.changes
    }

    pub fn is_deleted(&self) -> bool {
        self.deleted
    }

    pub fn to_json(&self) -> Value {
        Value::Object(self.data.clone())
    }

    /// Sub-document `name`, opened on first access
    pub fn module(&mut self, name: &str) -> ModelResult<&mut Module> {
        let path = self
            .module_paths
            .get(name)
            .ok_or_else(|| ModelError::ExtensionNotLoaded(name.to_string()))?;

        if !self.modules.contains_key(name) {
            let module = match get_path(&self.data, path) {
                None => Module::new(name, path, Row::new(), true),
                Some(Value::Null) => Module::new(name, path, Row::new(), false),
                Some(Value::Object(data)) => Module::new(name, path, data.clone(), false),
                Some(_) => {
                    return Err(ModelError::Configuration(format!(
                        "module '{}' path '{}' does not hold a map",
                        name, path
                    )))
                }
            };
            self.modules.insert(name.to_string(), module);
        }

        self.modules
            .get_mut(name)
            .ok_or_else(|| ModelError::ExtensionNotLoaded(name.to_string()))
    }

    /// Own changes merged with those of every opened module
    pub fn pending_changes(&self) -> ChangeLog {
        let mut changes = self.changes.clone();
        for module in self.modules.values() {
            changes.merge(&module.pending_changes());
        }
        changes
    }

    fn require_id(&self) -> ModelResult<Value> {
        self.id()
            .cloned()
            .ok_or_else(|| ModelError::MissingKeyPart(ID_FIELD.to_string()))
    }

    /// Send pending changes; the log is cleared only when the store accepted them
    pub async fn save(&mut self) -> ModelResult<()> {
        if self.deleted {
            return Err(ModelError::AlreadyDeleted);
        }

        let changes = self.pending_changes();
        if changes.is_empty() {
            return Ok(());
        }

        let id = self.require_id()?;
        self.store
            .update(&self.collection, &id, &changes)
            .await
            .map_err(ModelError::persistence(Operation::Update))?;

        self.changes.clear();
        for module in self.modules.values_mut().filter(|module| module.has_changes()) {
            set_path(&mut self.data, module.path(), Value::Object(module.data().clone()));
            module.commit();
        }
        Ok(())
    }

    pub async fn delete(&mut self) -> ModelResult<()> {
        if self.deleted {
            return Err(ModelError::AlreadyDeleted);
        }

        let id = self.require_id()?;
        self.store
            .remove(&self.collection, &id)
            .await
            .map_err(ModelError::persistence(Operation::Delete))?;

        self.data.clear();
        self.changes.clear();
        self.modules.clear();
        self.deleted = true;
        Ok(())
    }
}

impl UpdateOperations for Document {
    fn apply_operation(
        &mut self,
        operation: UpdateOperation,
        path: &str,
        value: Value,
    ) -> ModelResult<()> {
        if self.deleted {
            return Err(ModelError::AlreadyDeleted);
        }
        apply(&mut self.data, operation, path, &value)?;
        self.changes.save_operation(path, value, operation);
        Ok(())
    }
}
