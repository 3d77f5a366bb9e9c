//! Sub-documents
//!
//! A `Module` edits the map found at a dotted path of its parent document.
//! Its changes are logged with full paths. A module created on a document
//! that had nothing at its path is written with one `$set` of the whole map
//! on the first save; after that only field changes are sent.

use serde_json::Value;

use super::change_log::ChangeLog;
use super::operations::{apply, get_path, UpdateOperation, UpdateOperations};
use crate::backends::Row;
use crate::error::{ModelError, ModelResult};

#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    path: String,
    data: Row,
    changes: ChangeLog,
    create: bool,
}

impl Module {
    pub(crate) fn new(name: &str, path: &str, data: Row, create: bool) -> Self {
        Self {
            name: name.to_string(),
            path: path.to_string(),
            data,
            changes: ChangeLog::new(),
            create,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Path of the sub-document in its parent
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn data(&self) -> &Row {
        &self.data
    }

    pub fn get(&self, field: &str) -> Option<&Value> {
        get_path(&self.data, field)
    }

    /// Not yet stored in the parent document
    pub fn is_new(&self) -> bool {
        self.create
    }

    pub fn has_changes(&self) -> bool {
        !self.changes.is_empty()
    }

    /// Changes to send with the parent's next save
    pub fn pending_changes(&self) -> ChangeLog {
        if self.changes.is_empty() || !self.create {
            return self.changes.clone();
        }

        let mut initial = ChangeLog::new();
        initial.save_operation(
            &self.path,
            Value::Object(self.data.clone()),
            UpdateOperation::Set,
        );
        initial
    }

    pub(crate) fn commit(&mut self) {
        self.changes.clear();
        self.create = false;
    }
}

impl UpdateOperations for Module {
    fn apply_operation(
        &mut self,
        operation: UpdateOperation,
        path: &str,
        value: Value,
    ) -> ModelResult<()> {
        if path.is_empty() {
            return Err(ModelError::PathNotFound(self.path.clone()));
        }
        apply(&mut self.data, operation, path, &value)?;
        self.changes
            .save_operation(&format!("{}.{}", self.path, path), value, operation);
        Ok(())
    }
}
