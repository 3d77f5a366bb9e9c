//! Pending document changes, grouped by operator
//!
//! Recording merges operations on the same path so the emitted update stays
//! minimal: repeated `$addToSet` becomes `$each`, repeated `$pull` becomes
//! `$pullAll`, everything else keeps the last value.

use std::collections::BTreeMap;

use serde_json::Value;

use super::operations::UpdateOperation;
use crate::backends::Row;

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChangeLog {
    operations: BTreeMap<UpdateOperation, Row>,
}

impl ChangeLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn save_operation(&mut self, path: &str, value: Value, operation: UpdateOperation) {
        match operation {
            UpdateOperation::AddToSet => self.save_add_to_set(path, value),
            UpdateOperation::Pull => self.save_pull(path, value),
            other => {
                self.bucket(other).insert(path.to_string(), value);
            }
        }
    }

    fn bucket(&mut self, operation: UpdateOperation) -> &mut Row {
        self.operations.entry(operation).or_default()
    }

    fn save_add_to_set(&mut self, path: &str, value: Value) {
        let bucket = self.bucket(UpdateOperation::AddToSet);
        let Some(existing) = bucket.get_mut(path) else {
            bucket.insert(path.to_string(), value);
            return;
        };

        if let Some(Value::Array(each)) = existing.get_mut("$each") {
            each.push(value);
            return;
        }
        let previous = existing.take();
        let mut each = Row::new();
        each.insert("$each".to_string(), Value::Array(vec![previous, value]));
        *existing = Value::Object(each);
    }

    fn save_pull(&mut self, path: &str, value: Value) {
        if let Some(Value::Array(values)) = self
            .operations
            .get_mut(&UpdateOperation::PullAll)
            .and_then(|bucket| bucket.get_mut(path))
        {
            values.push(value);
            return;
        }

        let previous = self
            .operations
            .get_mut(&UpdateOperation::Pull)
            .and_then(|bucket| bucket.remove(path));

        match previous {
            Some(previous) => {
                if self
                    .operations
                    .get(&UpdateOperation::Pull)
                    .map_or(false, Row::is_empty)
                {
                    self.operations.remove(&UpdateOperation::Pull);
                }
                self.bucket(UpdateOperation::PullAll)
                    .insert(path.to_string(), Value::Array(vec![previous, value]));
            }
            None => {
                self.bucket(UpdateOperation::Pull)
                    .insert(path.to_string(), value);
            }
        }
    }

    pub fn changes(&self) -> &BTreeMap<UpdateOperation, Row> {
        &self.operations
    }

    pub fn get(&self, operation: UpdateOperation) -> Option<&Row> {
        self.operations.get(&operation)
    }

    pub fn is_empty(&self) -> bool {
        self.operations.values().all(Row::is_empty)
    }

    pub fn clear(&mut self) {
        self.operations.clear();
    }

    /// Record every change of `other` as if it had been saved here
    pub fn merge(&mut self, other: &ChangeLog) {
        for (operation, changes) in &other.operations {
            for (path, value) in changes {
                self.save_operation(path, value.clone(), *operation);
            }
        }
    }

    /// Update document: `{"$set": {...}, "$pull": {...}}`
    pub fn to_update(&self) -> Value {
        Value::Object(
            self.operations
                .iter()
                .filter(|(_, changes)| !changes.is_empty())
                .map(|(operation, changes)| {
                    (operation.as_str().to_string(), Value::Object(changes.clone()))
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_repeated_pull_becomes_pull_all() {
        let mut log = ChangeLog::new();
        log.save_operation("tags", json!("a"), UpdateOperation::Pull);
        log.save_operation("tags", json!("b"), UpdateOperation::Pull);

        assert!(log.get(UpdateOperation::Pull).is_none());
        assert_eq!(log.to_update(), json!({"$pullAll": {"tags": ["a", "b"]}}));

        log.save_operation("tags", json!("c"), UpdateOperation::Pull);
        assert_eq!(log.to_update(), json!({"$pullAll": {"tags": ["a", "b", "c"]}}));
    }

    #[test]
    fn test_pull_keeps_other_paths() {
        let mut log = ChangeLog::new();
        log.save_operation("tags", json!("a"), UpdateOperation::Pull);
        log.save_operation("labels", json!("x"), UpdateOperation::Pull);
        log.save_operation("tags", json!("b"), UpdateOperation::Pull);

        assert_eq!(
            log.to_update(),
            json!({"$pull": {"labels": "x"}, "$pullAll": {"tags": ["a", "b"]}})
        );
    }

    #[test]
    fn test_add_to_set_collects_each() {
        let mut log = ChangeLog::new();
        log.save_operation("tags", json!("a"), UpdateOperation::AddToSet);
        log.save_operation("tags", json!("b"), UpdateOperation::AddToSet);
        log.save_operation("tags", json!("c"), UpdateOperation::AddToSet);

        assert_eq!(
            log.to_update(),
            json!({"$addToSet": {"tags": {"$each": ["a", "b", "c"]}}})
        );
    }

    #[test]
    fn test_last_write_wins() {
        let mut log = ChangeLog::new();
        log.save_operation("name", json!("a"), UpdateOperation::Set);
        log.save_operation("name", json!("b"), UpdateOperation::Set);
        assert_eq!(log.to_update(), json!({"$set": {"name": "b"}}));

        log.clear();
        assert!(log.is_empty());
    }
}
