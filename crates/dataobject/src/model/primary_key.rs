//! Primary key values
//!
//! A key is either one value (for single-column keys) or a mapping of key
//! fields (for composite keys). `to_value` produces the shape that
//! `Factory::primary_where` accepts.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::backends::Row;

/// Primary key of a persisted object
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum PrimaryKey {
    Single(Value),
    Composite(Row),
}

impl std::fmt::Display for PrimaryKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        fn plain(value: &Value) -> String {
            match value {
                Value::String(text) => text.clone(),
                other => other.to_string(),
            }
        }

        match self {
            PrimaryKey::Single(value) => write!(f, "{}", plain(value)),
            PrimaryKey::Composite(fields) => {
                let pairs: Vec<String> = fields
                    .iter()
                    .map(|(k, v)| format!("{}:{}", k, plain(v)))
                    .collect();
                write!(f, "{}", pairs.join(","))
            }
        }
    }
}

impl Default for PrimaryKey {
    fn default() -> Self {
        PrimaryKey::Single(Value::Null)
    }
}

impl PrimaryKey {
    /// Read the key fields out of a row
    pub fn from_row(fields: &[String], row: &Row) -> Self {
        match fields {
            [single] => PrimaryKey::Single(row.get(single).cloned().unwrap_or(Value::Null)),
            many => PrimaryKey::Composite(
                many.iter()
                    .map(|field| {
                        (
                            field.clone(),
                            row.get(field).cloned().unwrap_or(Value::Null),
                        )
                    })
                    .collect(),
            ),
        }
    }

    /// Value form accepted by primary key predicates
    pub fn to_value(&self) -> Value {
        match self {
            PrimaryKey::Single(value) => value.clone(),
            PrimaryKey::Composite(fields) => Value::Object(fields.clone()),
        }
    }

    /// Every key part is present
    pub fn is_valid(&self) -> bool {
        match self {
            PrimaryKey::Single(value) => !value.is_null(),
            PrimaryKey::Composite(fields) => {
                !fields.is_empty() && fields.values().all(|value| !value.is_null())
            }
        }
    }

    /// First of `fields` without a value in this key
    pub fn missing_part<'a>(&self, fields: &'a [String]) -> Option<&'a str> {
        let missing = |field: &String| match self {
            PrimaryKey::Single(value) => value.is_null(),
            PrimaryKey::Composite(parts) => parts.get(field).map_or(true, Value::is_null),
        };
        fields.iter().find(|field| missing(field)).map(String::as_str)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(names: &[&str]) -> Vec<String> {
        names.iter().map(|name| name.to_string()).collect()
    }

    #[test]
    fn test_primary_key_display() {
        assert_eq!(PrimaryKey::Single(json!(123)).to_string(), "123");
        assert_eq!(PrimaryKey::Single(json!("abc")).to_string(), "abc");

        let row = json!({"user_id": 1, "role_id": 2}).as_object().cloned().unwrap();
        let key = PrimaryKey::from_row(&fields(&["user_id", "role_id"]), &row);
        let display = key.to_string();
        assert!(display.contains("user_id:1") && display.contains("role_id:2"));
    }

    #[test]
    fn test_primary_key_validation() {
        assert!(!PrimaryKey::default().is_valid());
        assert!(PrimaryKey::Single(json!(1)).is_valid());

        let row = json!({"a": 1}).as_object().cloned().unwrap();
        let key = PrimaryKey::from_row(&fields(&["a", "b"]), &row);
        assert!(!key.is_valid());
        assert_eq!(key.to_value(), json!({"a": 1, "b": null}));
        assert_eq!(key.missing_part(&fields(&["a", "b"])), Some("b"));
        assert_eq!(
            PrimaryKey::Single(json!(3)).missing_part(&fields(&["id"])),
            None
        );
    }
}
