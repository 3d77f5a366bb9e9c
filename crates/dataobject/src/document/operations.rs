//! Update operators and their effect on nested data
//!
//! Paths are dotted (`"profile.address.city"`). The same `apply` is used for
//! the local copy of a document and by the in-memory store when it executes
//! a change log.

use std::fmt;

use serde_json::{Number, Value};

use crate::backends::Row;
use crate::error::{ModelError, ModelResult};

/// Kind of a logged document change
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum UpdateOperation {
    Set,
    Unset,
    Inc,
    AddToSet,
    Pop,
    Pull,
    PullAll,
    Push,
    PushAll,
}

impl UpdateOperation {
    pub fn as_str(&self) -> &'static str {
        match self {
            UpdateOperation::Set => "$set",
            UpdateOperation::Unset => "$unset",
            UpdateOperation::Inc => "$inc",
            UpdateOperation::AddToSet => "$addToSet",
            UpdateOperation::Pop => "$pop",
            UpdateOperation::Pull => "$pull",
            UpdateOperation::PullAll => "$pullAll",
            UpdateOperation::Push => "$push",
            UpdateOperation::PushAll => "$pushAll",
        }
    }
}

impl fmt::Display for UpdateOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

pub fn get_path<'a>(data: &'a Row, path: &str) -> Option<&'a Value> {
    let mut parts = path.split('.');
    let mut current = data.get(parts.next()?)?;
    for part in parts {
        current = match current {
            Value::Object(map) => map.get(part)?,
            Value::Array(items) => items.get(part.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

/// Set `path`, creating intermediate maps and replacing non-map values on the way
pub fn set_path(data: &mut Row, path: &str, value: Value) {
    match path.split_once('.') {
        None => {
            data.insert(path.to_string(), value);
        }
        Some((head, rest)) => {
            let child = data
                .entry(head.to_string())
                .or_insert_with(|| Value::Object(Row::new()));
            if !child.is_object() {
                *child = Value::Object(Row::new());
            }
            if let Value::Object(child) = child {
                set_path(child, rest, value);
            }
        }
    }
}

pub fn unset_path(data: &mut Row, path: &str) -> Option<Value> {
    match path.split_once('.') {
        None => data.remove(path),
        Some((head, rest)) => match data.get_mut(head) {
            Some(Value::Object(child)) => unset_path(child, rest),
            _ => None,
        },
    }
}

fn array_at<'a>(data: &'a mut Row, path: &str) -> ModelResult<&'a mut Vec<Value>> {
    if get_path(data, path).map_or(true, Value::is_null) {
        set_path(data, path, Value::Array(Vec::new()));
    }
    match get_path_mut(data, path) {
        Some(Value::Array(items)) => Ok(items),
        _ => Err(ModelError::Unsupported(format!("'{}' is not an array", path))),
    }
}

fn get_path_mut<'a>(data: &'a mut Row, path: &str) -> Option<&'a mut Value> {
    match path.split_once('.') {
        None => data.get_mut(path),
        Some((head, rest)) => match data.get_mut(head)? {
            Value::Object(child) => get_path_mut(child, rest),
            _ => None,
        },
    }
}

fn values_of(value: &Value) -> Vec<Value> {
    match value {
        Value::Array(items) => items.clone(),
        Value::Object(map) => match map.get("$each") {
            Some(Value::Array(items)) => items.clone(),
            _ => vec![value.clone()],
        },
        other => vec![other.clone()],
    }
}

fn add(current: Option<&Value>, delta: &Value, path: &str) -> ModelResult<Value> {
    let not_numeric = || ModelError::Unsupported(format!("'{}' is not numeric", path));
    let delta_number = delta.as_f64().ok_or_else(not_numeric)?;

    match current {
        None | Some(Value::Null) => Ok(delta.clone()),
        Some(Value::Number(current)) => match (current.as_i64(), delta.as_i64()) {
            (Some(a), Some(b)) => a.checked_add(b).map(Value::from).ok_or_else(|| {
                ModelError::Unsupported(format!("increment of '{}' overflows", path))
            }),
            _ => {
                let sum = current.as_f64().ok_or_else(not_numeric)? + delta_number;
                Number::from_f64(sum).map(Value::Number).ok_or_else(not_numeric)
            }
        },
        Some(_) => Err(not_numeric()),
    }
}

/// Apply one operation to `data`
pub fn apply(data: &mut Row, operation: UpdateOperation, path: &str, value: &Value) -> ModelResult<()> {
    match operation {
        UpdateOperation::Set => set_path(data, path, value.clone()),
        UpdateOperation::Unset => {
            unset_path(data, path);
        }
        UpdateOperation::Inc => {
            let sum = add(get_path(data, path), value, path)?;
            set_path(data, path, sum);
        }
        UpdateOperation::AddToSet => {
            let items = array_at(data, path)?;
            let additions = match value {
                Value::Object(map) if map.contains_key("$each") => values_of(value),
                single => vec![single.clone()],
            };
            for addition in additions {
                if !items.contains(&addition) {
                    items.push(addition);
                }
            }
        }
        UpdateOperation::Push => array_at(data, path)?.push(value.clone()),
        UpdateOperation::PushAll => array_at(data, path)?.extend(values_of(value)),
        UpdateOperation::Pull => array_at(data, path)?.retain(|item| item != value),
        UpdateOperation::PullAll => {
            let removed = values_of(value);
            array_at(data, path)?.retain(|item| !removed.contains(item));
        }
        UpdateOperation::Pop => {
            let items = array_at(data, path)?;
            if items.is_empty() {
                return Ok(());
            }
            if value.as_i64().unwrap_or(1) < 0 {
                items.remove(0);
            } else {
                items.pop();
            }
        }
    }
    Ok(())
}

/// Field operations shared by documents and modules
///
/// Each call updates the local data and logs the operation.
pub trait UpdateOperations {
    fn apply_operation(
        &mut self,
        operation: UpdateOperation,
        path: &str,
        value: Value,
    ) -> ModelResult<()>;

    fn set(&mut self, path: &str, value: impl Into<Value>) -> ModelResult<()> {
        self.apply_operation(UpdateOperation::Set, path, value.into())
    }

    fn unset(&mut self, path: &str) -> ModelResult<()> {
        self.apply_operation(UpdateOperation::Unset, path, Value::from(1))
    }

    fn inc(&mut self, path: &str, delta: impl Into<Value>) -> ModelResult<()> {
        self.apply_operation(UpdateOperation::Inc, path, delta.into())
    }

    fn add_to_set(&mut self, path: &str, value: impl Into<Value>) -> ModelResult<()> {
        self.apply_operation(UpdateOperation::AddToSet, path, value.into())
    }

    fn push(&mut self, path: &str, value: impl Into<Value>) -> ModelResult<()> {
        self.apply_operation(UpdateOperation::Push, path, value.into())
    }

    fn push_all(&mut self, path: &str, values: Vec<Value>) -> ModelResult<()> {
        self.apply_operation(UpdateOperation::PushAll, path, Value::Array(values))
    }

    fn pull(&mut self, path: &str, value: impl Into<Value>) -> ModelResult<()> {
        self.apply_operation(UpdateOperation::Pull, path, value.into())
    }

    fn pull_all(&mut self, path: &str, values: Vec<Value>) -> ModelResult<()> {
        self.apply_operation(UpdateOperation::PullAll, path, Value::Array(values))
    }

    /// Remove the last element, or the first with a negative `direction`
    fn pop(&mut self, path: &str, direction: i64) -> ModelResult<()> {
        self.apply_operation(UpdateOperation::Pop, path, Value::from(direction))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn doc(value: Value) -> Row {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_paths() {
        let mut data = doc(json!({"profile": {"name": "Ann"}, "tags": ["a", "b"]}));
        assert_eq!(get_path(&data, "profile.name"), Some(&json!("Ann")));
        assert_eq!(get_path(&data, "tags.1"), Some(&json!("b")));
        assert_eq!(get_path(&data, "profile.age"), None);

        set_path(&mut data, "profile.address.city", json!("Oslo"));
        assert_eq!(get_path(&data, "profile.address.city"), Some(&json!("Oslo")));

        assert_eq!(unset_path(&mut data, "profile.name"), Some(json!("Ann")));
        assert_eq!(get_path(&data, "profile.name"), None);
    }

    #[test]
    fn test_array_operations() {
        let mut data = doc(json!({"tags": ["a"]}));
        apply(&mut data, UpdateOperation::AddToSet, "tags", &json!("a")).unwrap();
        apply(&mut data, UpdateOperation::AddToSet, "tags", &json!({"$each": ["b", "c"]})).unwrap();
        apply(&mut data, UpdateOperation::PullAll, "tags", &json!(["a", "c"])).unwrap();
        assert_eq!(data["tags"], json!(["b"]));

        apply(&mut data, UpdateOperation::PushAll, "tags", &json!(["x", "y"])).unwrap();
        apply(&mut data, UpdateOperation::Pop, "tags", &json!(-1)).unwrap();
        assert_eq!(data["tags"], json!(["x", "y"]));
    }

    #[test]
    fn test_inc() {
        let mut data = doc(json!({"views": 2}));
        apply(&mut data, UpdateOperation::Inc, "views", &json!(3)).unwrap();
        apply(&mut data, UpdateOperation::Inc, "stats.score", &json!(1.5)).unwrap();
        assert_eq!(data["views"], json!(5));
        assert_eq!(data["stats"]["score"], json!(1.5));

        data.insert("name".into(), json!("n"));
        assert!(apply(&mut data, UpdateOperation::Inc, "name", &json!(1)).is_err());
    }

    #[test]
    fn test_inc_overflow_is_rejected() {
        let mut data = doc(json!({"count": i64::MAX}));
        assert!(matches!(
            apply(&mut data, UpdateOperation::Inc, "count", &json!(1)),
            Err(ModelError::Unsupported(_))
        ));
        assert_eq!(data["count"], json!(i64::MAX));

        apply(&mut data, UpdateOperation::Inc, "count", &json!(-1)).unwrap();
        assert_eq!(data["count"], json!(i64::MAX - 1));
    }
}
