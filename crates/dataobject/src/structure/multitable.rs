//! Column prefixing for joined tables
//!
//! Joined columns are selected as `"<prefix>.<field>"` and folded back into a
//! nested `_<prefix>` map when a row is materialized.

use serde_json::Value;

use crate::backends::Row;
use crate::model::nested_key;
use crate::query::SelectColumn;

/// Columns `source.field` aliased `prefix.field`
pub fn prefix_add(source: &str, prefix: &str, fields: &[String]) -> Vec<SelectColumn> {
    fields
        .iter()
        .map(|field| {
            SelectColumn::aliased(format!("{}.{}", source, field), format!("{}.{}", prefix, field))
        })
        .collect()
}

/// Move every `prefix.field` key into the nested map `_prefix`
pub fn prefix_remove(row: Row) -> Row {
    let mut result = Row::new();
    for (column, value) in row {
        match column.split_once('.') {
            Some((prefix, field)) => {
                let nested = result
                    .entry(nested_key(prefix))
                    .or_insert_with(|| Value::Object(Row::new()));
                if !nested.is_object() {
                    *nested = Value::Object(Row::new());
                }
                if let Value::Object(nested) = nested {
                    nested.insert(field.to_string(), value);
                }
            }
            None => {
                result.insert(column, value);
            }
        }
    }
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_prefix_add() {
        let columns = prefix_add("article_lang", "lang", &["title".to_string()]);
        assert_eq!(
            columns,
            vec![SelectColumn::aliased("article_lang.title", "lang.title")]
        );
    }

    #[test]
    fn test_prefix_remove_nests_prefixed_keys() {
        let row = json!({"id": 1, "lang.title": "Hello", "lang.locale": "en"})
            .as_object()
            .cloned()
            .unwrap();

        assert_eq!(
            Value::Object(prefix_remove(row)),
            json!({"id": 1, "_lang": {"title": "Hello", "locale": "en"}})
        );
    }
}
