//! Table factory
//!
//! A `Factory` knows one table: its name, its primary key fields and its
//! default projection. The structure is set once with `init_table`; every
//! later attempt fails with `StructureLocked`.

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use once_cell::sync::OnceCell;
use serde_json::Value;

use super::{Persistence, Repository};
use crate::backends::Row;
use crate::connection::Connection;
use crate::error::{ModelError, ModelResult, Operation};
use crate::model::{Entity, PrimaryKey};
use crate::query::{key_clause, Delete, Insert, Select, SelectColumn, Statement, Update, Where};

/// Table name, key and projection of a factory
#[derive(Debug, Clone, PartialEq)]
pub struct TableStructure {
    pub table: String,
    pub primary: Vec<String>,
    /// Default projection; `["*"]` selects every column
    pub fields: Vec<String>,
}

impl TableStructure {
    /// `table.field`
    pub fn qualify(&self, field: &str) -> String {
        format!("{}.{}", self.table, field)
    }

    pub fn selects_all(&self) -> bool {
        self.fields.iter().any(|field| field == "*")
    }
}

struct FactoryInner {
    name: String,
    connection: Connection,
    structure: OnceCell<TableStructure>,
}

/// Single-table repository
#[derive(Clone)]
pub struct Factory {
    inner: Arc<FactoryInner>,
}

impl fmt::Debug for Factory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Factory")
            .field("name", &self.inner.name)
            .field("structure", &self.inner.structure.get())
            .finish()
    }
}

impl Factory {
    /// Create a factory registered on `connection` under `name`
    pub fn new(connection: &Connection, name: &str) -> Self {
        let factory = Self::unregistered(connection, name);
        connection.register(Arc::new(factory.clone()));
        factory
    }

    /// Factory used inside a wrapping repository that registers itself
    pub(crate) fn unregistered(connection: &Connection, name: &str) -> Self {
        Self {
            inner: Arc::new(FactoryInner {
                name: name.to_string(),
                connection: connection.clone(),
                structure: OnceCell::new(),
            }),
        }
    }

    /// Set table, key fields and projection; empty `fields` selects every column
    pub fn init_table(&self, table: &str, primary: &[&str], fields: &[&str]) -> ModelResult<()> {
        if primary.is_empty() {
            return Err(ModelError::Configuration(format!(
                "table '{}' needs at least one primary key field",
                table
            )));
        }

        let fields = if fields.is_empty() { &["*"][..] } else { fields };
        let structure = TableStructure {
            table: table.to_string(),
            primary: primary.iter().map(|field| field.to_string()).collect(),
            fields: fields.iter().map(|field| field.to_string()).collect(),
        };

        self.inner
            .structure
            .set(structure)
            .map_err(|_| ModelError::StructureLocked(self.inner.name.clone()))?;
        tracing::debug!("factory '{}' bound to table '{}'", self.inner.name, table);
        Ok(())
    }

    pub fn is_initialised(&self) -> bool {
        self.inner.structure.get().is_some()
    }

    pub fn structure(&self) -> ModelResult<&TableStructure> {
        self.inner
            .structure
            .get()
            .ok_or_else(|| ModelError::StructureNotInitialised(self.inner.name.clone()))
    }

    pub fn table(&self) -> ModelResult<&str> {
        Ok(&self.structure()?.table)
    }

    pub(crate) fn display_name(&self) -> String {
        self.inner
            .structure
            .get()
            .map(|structure| structure.table.clone())
            .unwrap_or_else(|| self.inner.name.clone())
    }

    pub fn connection(&self) -> &Connection {
        &self.inner.connection
    }

    /// Predicate selecting the rows identified by `key`
    ///
    /// Single keys take a scalar (equality) or an array (IN). Composite keys
    /// take one tuple or a list of tuples; each tuple is an AND of per-field
    /// equality or IN clauses, and tuples are OR-combined.
    pub fn primary_where(&self, key: &Value) -> ModelResult<Where> {
        let structure = self.structure()?;

        if let [field] = structure.primary.as_slice() {
            return Ok(key_clause(&structure.qualify(field), key));
        }

        let tuples: Vec<&Value> = match key {
            Value::Array(tuples) => tuples.iter().collect(),
            single => vec![single],
        };

        let mut any = Vec::with_capacity(tuples.len());
        for tuple in tuples {
            let mut all = Vec::with_capacity(structure.primary.len());
            for field in &structure.primary {
                let part = tuple
                    .get(field)
                    .filter(|part| !part.is_null())
                    .ok_or_else(|| ModelError::MissingKeyPart(field.clone()))?;
                all.push(key_clause(&structure.qualify(field), part));
            }
            any.push(Where::and(all));
        }

        Ok(Where::or(any))
    }

    /// Selection of the base table with its default projection
    pub fn base_select(&self) -> ModelResult<Select> {
        let structure = self.structure()?;
        let select = Select::from(&structure.table);

        if structure.selects_all() {
            return Ok(select.column(SelectColumn::All(structure.table.clone())));
        }

        Ok(select.columns(
            structure
                .fields
                .iter()
                .map(|field| SelectColumn::aliased(structure.qualify(field), field.clone())),
        ))
    }

    pub async fn fetch(&self, select: &Select) -> ModelResult<Vec<Row>> {
        tracing::debug!("{}", select);
        let rows = self.connection().driver()?.fetch_all(select).await?;
        Ok(rows)
    }

    /// Rows of `select` without materialization
    pub async fn fetch_raw_all(&self, select: &Select) -> ModelResult<Vec<Row>> {
        self.fetch(select).await
    }

    /// `(key, value)` pairs read from two columns of each row
    pub async fn fetch_raw_pairs(
        &self,
        select: &Select,
        key: &str,
        value: &str,
    ) -> ModelResult<Vec<(Value, Value)>> {
        Ok(self
            .fetch(select)
            .await?
            .into_iter()
            .map(|mut row| {
                (
                    row.remove(key).unwrap_or(Value::Null),
                    row.remove(value).unwrap_or(Value::Null),
                )
            })
            .collect())
    }

    /// One column of each row
    pub async fn fetch_raw_column(&self, select: &Select, column: &str) -> ModelResult<Vec<Value>> {
        Ok(self
            .fetch(select)
            .await?
            .into_iter()
            .map(|mut row| row.remove(column).unwrap_or(Value::Null))
            .collect())
    }

    pub(crate) async fn insert_into(
        &self,
        table: &str,
        values: Row,
        returning: Option<String>,
    ) -> ModelResult<Value> {
        let insert = Insert {
            table: table.to_string(),
            values,
            returning,
        };
        tracing::debug!("{}", insert);
        let generated = self
            .connection()
            .driver()?
            .insert(&insert)
            .await
            .map_err(ModelError::persistence(Operation::Insert))?;
        Ok(generated.unwrap_or(Value::Null))
    }

    pub(crate) async fn execute(&self, statement: Statement) -> ModelResult<u64> {
        let operation = match statement {
            Statement::Update(_) => Operation::Update,
            Statement::Delete(_) => Operation::Delete,
        };
        tracing::debug!("{}", statement);
        self.connection()
            .driver()?
            .execute(&statement)
            .await
            .map_err(ModelError::persistence(operation))
    }

    pub(crate) async fn update_table(&self, table: &str, values: Row, predicate: Where) -> ModelResult<u64> {
        if values.is_empty() {
            return Ok(0);
        }
        self.execute(Statement::Update(Update {
            table: table.to_string(),
            values,
            where_clause: predicate,
        }))
        .await
    }

    pub(crate) async fn delete_from(&self, table: &str, predicate: Where) -> ModelResult<u64> {
        self.execute(Statement::Delete(Delete {
            table: table.to_string(),
            where_clause: predicate,
        }))
        .await
    }
}

#[async_trait]
impl Persistence for Factory {
    fn name(&self) -> &str {
        &self.inner.name
    }

    async fn insert(&self, data: Row) -> ModelResult<Value> {
        let structure = self.structure()?;
        let returning = match structure.primary.as_slice() {
            [field] => Some(field.clone()),
            _ => None,
        };

        let generated = self
            .insert_into(&structure.table, data.clone(), returning)
            .await?;

        if structure.primary.len() == 1 {
            Ok(generated)
        } else {
            Ok(PrimaryKey::from_row(&structure.primary, &data).to_value())
        }
    }

    async fn update(&self, key: &Value, data: Row) -> ModelResult<u64> {
        let structure = self.structure()?;
        let predicate = self.primary_where(key)?;
        self.update_table(&structure.table, data, predicate).await
    }

    async fn delete(&self, key: &Value) -> ModelResult<u64> {
        let structure = self.structure()?;
        let predicate = self.primary_where(key)?;
        self.delete_from(&structure.table, predicate).await
    }
}

impl Repository for Factory {
    type Object = Entity;

    fn factory(&self) -> &Factory {
        self
    }

    fn select(&self) -> ModelResult<Select> {
        self.base_select()
    }

    fn create_object(&self, row: Row) -> ModelResult<Entity> {
        let primary = self.structure()?.primary.clone();
        Ok(Entity::new(Arc::new(self.clone()), primary, row))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backends::MemoryDriver;
    use serde_json::json;

    fn factory(primary: &[&str]) -> Factory {
        let connection = Connection::new(Arc::new(MemoryDriver::new()));
        let factory = Factory::new(&connection, "membership");
        factory.init_table("membership", primary, &[]).unwrap();
        factory
    }

    #[test]
    fn test_structure_is_set_once() {
        let factory = factory(&["id"]);
        let err = factory.init_table("other", &["id"], &[]).unwrap_err();
        assert!(matches!(err, ModelError::StructureLocked(name) if name == "membership"));
        assert_eq!(factory.table().unwrap(), "membership");
    }

    #[test]
    fn test_uninitialised_structure() {
        let connection = Connection::new(Arc::new(MemoryDriver::new()));
        let factory = Factory::new(&connection, "late");
        assert!(matches!(
            factory.primary_where(&json!(1)),
            Err(ModelError::StructureNotInitialised(_))
        ));
    }

    #[test]
    fn test_single_key_predicate() {
        let factory = factory(&["id"]);
        assert_eq!(factory.primary_where(&json!(4)).unwrap(), Where::eq("membership.id", 4));
        assert_eq!(
            factory.primary_where(&json!([4, 5])).unwrap(),
            Where::in_list("membership.id", vec![4, 5])
        );
    }

    #[test]
    fn test_composite_key_predicate() {
        let factory = factory(&["a", "b"]);

        let predicate = factory
            .primary_where(&json!([{"a": 1, "b": 2}, {"a": 3, "b": 4}]))
            .unwrap();
        assert_eq!(
            predicate,
            Where::Or(vec![
                Where::And(vec![Where::eq("membership.a", 1), Where::eq("membership.b", 2)]),
                Where::And(vec![Where::eq("membership.a", 3), Where::eq("membership.b", 4)]),
            ])
        );

        let single = factory.primary_where(&json!({"a": 1, "b": [2, 3]})).unwrap();
        assert_eq!(
            single,
            Where::And(vec![
                Where::eq("membership.a", 1),
                Where::in_list("membership.b", vec![2, 3]),
            ])
        );
    }

    #[test]
    fn test_composite_key_missing_part() {
        let factory = factory(&["a", "b"]);

        let err = factory.primary_where(&json!({"a": 1})).unwrap_err();
        assert!(matches!(err, ModelError::MissingKeyPart(field) if field == "b"));

        let err = factory.primary_where(&json!({"a": 1, "b": null})).unwrap_err();
        assert!(matches!(err, ModelError::MissingKeyPart(field) if field == "b"));

        let err = factory.primary_where(&json!(7)).unwrap_err();
        assert!(matches!(err, ModelError::MissingKeyPart(field) if field == "a"));
    }

    #[test]
    fn test_base_select_projection() {
        let connection = Connection::new(Arc::new(MemoryDriver::new()));
        let factory = Factory::new(&connection, "article");
        factory.init_table("article", &["id"], &["id", "title"]).unwrap();

        assert_eq!(
            factory.base_select().unwrap().to_string(),
            "SELECT article.id AS \"id\", article.title AS \"title\" FROM article"
        );
    }
}
