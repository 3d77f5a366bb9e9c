//! Aggregated repositories
//!
//! Any repository can be joined into another repository's selection. Its
//! columns come back as `<table>.<field>` and `aggregate_object` builds its
//! own object out of that slice of the joined row.

use serde_json::Value;

use super::multitable::prefix_add;
use crate::backends::Row;
use crate::error::{ModelError, ModelResult};
use crate::model::nested_key;
use crate::query::{JoinType, Select, Where};
use crate::repository::Repository;

pub trait Aggregate: Repository {
    /// Table and fields joined by `aggregate_select`
    fn aggregate_config(&self) -> ModelResult<(String, Vec<String>)> {
        let structure = self.factory().structure()?;
        if structure.selects_all() {
            return Err(ModelError::Configuration(format!(
                "'{}' needs an explicit field list to be aggregated",
                structure.table
            )));
        }
        Ok((structure.table.clone(), structure.fields.clone()))
    }

    /// Join this table into `select` where its primary key equals `primary`
    ///
    /// `primary` is a qualified column of the selection, e.g. `article.author_id`.
    fn aggregate_select(
        &self,
        select: Select,
        primary: &str,
        join_type: JoinType,
    ) -> ModelResult<Select> {
        let (table, fields) = self.aggregate_config()?;
        let structure = self.factory().structure()?;
        let key = match structure.primary.as_slice() {
            [key] => structure.qualify(key),
            _ => {
                return Err(ModelError::Configuration(format!(
                    "'{}' must have a single primary key to be aggregated",
                    table
                )))
            }
        };

        Ok(select.join(
            join_type,
            &table,
            Where::columns_eq(primary, &key),
            prefix_add(&table, &table, &fields),
        ))
    }

    /// Object of this repository out of a row selected with `aggregate_select`
    ///
    /// Accepts the joined columns either flat (`<table>.<field>`) or folded
    /// into the `_<table>` map.
    fn aggregate_object(&self, row: &Row) -> ModelResult<Self::Object> {
        let (table, fields) = self.aggregate_config()?;

        let data: Row = match row.get(&nested_key(&table)) {
            Some(Value::Object(nested)) => nested.clone(),
            _ => {
                let prefix = format!("{}.", table);
                row.iter()
                    .filter_map(|(column, value)| {
                        column
                            .strip_prefix(&prefix)
                            .map(|field| (field.to_string(), value.clone()))
                    })
                    .collect()
            }
        };

        if data.values().all(Value::is_null) {
            return Err(ModelError::NotFound(table));
        }
        if let Some(field) = fields.iter().find(|field| !data.contains_key(*field)) {
            return Err(ModelError::PathNotFound(format!("{}.{}", table, field)));
        }

        self.create_object(data)
    }
}

impl<R: Repository> Aggregate for R {}
