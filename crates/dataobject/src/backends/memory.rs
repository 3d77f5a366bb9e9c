//! In-memory driver
//!
//! Evaluates `Select`/`Insert`/`Statement` values directly against rows held
//! in a `DashMap`, including inner and left joins, ordering, paging and
//! `COUNT(*)`. Every statement is logged in its inline SQL form so callers can
//! assert on what was issued, and failures can be injected per table.

use std::cmp::Ordering;
use std::sync::{Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;

use super::{Driver, Row, SqlDialect};
use crate::error::DriverError;
use crate::query::{
    Insert, JoinType, Operand, QueryOperator, Select, SelectColumn, Statement, Where,
    WhereCondition,
};

/// Statement kind to inject a failure for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FailOn {
    Select,
    Insert,
    Update,
    Delete,
}

#[derive(Debug, Default)]
struct MemoryTable {
    key: Option<String>,
    rows: Vec<Row>,
    next_id: i64,
}

/// Driver keeping tables in process memory
#[derive(Debug, Default)]
pub struct MemoryDriver {
    tables: DashMap<String, MemoryTable>,
    failures: DashMap<(String, FailOn), ()>,
    log: Mutex<Vec<String>>,
}

impl MemoryDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Declare a table; `key` gets auto-increment values when omitted on insert
    pub fn create_table(&self, table: &str, key: Option<&str>) {
        self.tables.insert(
            table.to_string(),
            MemoryTable {
                key: key.map(str::to_string),
                rows: Vec::new(),
                next_id: 0,
            },
        );
    }

    /// Store rows without logging a statement
    pub fn seed(&self, table: &str, rows: Vec<Row>) {
        let mut entry = self.tables.entry(table.to_string()).or_default();
        for row in rows {
            entry.store(row);
        }
    }

    /// Current rows of `table`
    pub fn rows(&self, table: &str) -> Vec<Row> {
        self.tables
            .get(table)
            .map(|table| table.rows.clone())
            .unwrap_or_default()
    }

    pub fn fail_on(&self, table: &str, kind: FailOn) {
        self.failures.insert((table.to_string(), kind), ());
    }

    pub fn clear_failures(&self) {
        self.failures.clear();
    }

    /// Issued statements in inline SQL form
    pub fn statements(&self) -> Vec<String> {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn call_count(&self) -> usize {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn clear_log(&self) {
        self.log.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    fn record(&self, sql: String) {
        tracing::debug!("memory driver: {}", sql);
        self.log.lock().unwrap_or_else(PoisonError::into_inner).push(sql);
    }

    fn check_failure(&self, table: &str, kind: FailOn) -> Result<(), DriverError> {
        if self.failures.contains_key(&(table.to_string(), kind)) {
            return Err(DriverError::Store {
                target: table.to_string(),
                message: format!("injected {:?} failure", kind),
            });
        }
        Ok(())
    }

    fn qualified_rows(&self, table: &str) -> Vec<Row> {
        self.rows(table)
            .into_iter()
            .map(|row| qualify(table, &row))
            .collect()
    }
}

impl MemoryTable {
    fn store(&mut self, mut row: Row) -> Row {
        if let Some(key) = &self.key {
            match row.get(key).and_then(Value::as_i64) {
                Some(id) => self.next_id = self.next_id.max(id),
                None if row.get(key).map_or(true, Value::is_null) => {
                    self.next_id += 1;
                    row.insert(key.clone(), Value::from(self.next_id));
                }
                None => {}
            }
        }
        self.rows.push(row.clone());
        row
    }
}

#[async_trait]
impl Driver for MemoryDriver {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }

    async fn fetch_all(&self, select: &Select) -> Result<Vec<Row>, DriverError> {
        self.record(select.to_string());
        self.check_failure(&select.table, FailOn::Select)?;

        let mut tables = vec![select.table.clone()];
        let mut rows = self.qualified_rows(&select.table);

        for join in &select.joins {
            self.check_failure(&join.table, FailOn::Select)?;
            tables.push(join.table.clone());
            let candidates = self.qualified_rows(&join.table);

            let mut joined = Vec::with_capacity(rows.len());
            for row in rows {
                let mut matched = false;
                for candidate in &candidates {
                    let mut merged = row.clone();
                    merged.extend(candidate.clone());
                    if matches(&join.on, &merged, &tables) {
                        matched = true;
                        joined.push(merged);
                    }
                }
                if !matched && join.join_type == JoinType::Left {
                    joined.push(row);
                }
            }
            rows = joined;
        }

        if let Some(clause) = &select.where_clause {
            rows.retain(|row| matches(clause, row, &tables));
        }

        if let Some(SelectColumn::CountAll { alias }) = select
            .columns
            .iter()
            .find(|column| matches!(column, SelectColumn::CountAll { .. }))
        {
            let mut count = Row::new();
            count.insert(alias.clone(), Value::from(rows.len() as u64));
            return Ok(vec![count]);
        }

        if !select.order_by.is_empty() {
            rows.sort_by(|left, right| {
                for order in &select.order_by {
                    let a = resolve(left, &order.column, &tables);
                    let b = resolve(right, &order.column, &tables);
                    let ordering = compare(&a, &b).unwrap_or(Ordering::Equal);
                    let ordering = match order.direction {
                        crate::query::OrderDirection::Asc => ordering,
                        crate::query::OrderDirection::Desc => ordering.reverse(),
                    };
                    if ordering != Ordering::Equal {
                        return ordering;
                    }
                }
                Ordering::Equal
            });
        }

        let offset = select.offset.unwrap_or(0) as usize;
        let limit = select.limit.map(|limit| limit as usize).unwrap_or(usize::MAX);

        Ok(rows
            .into_iter()
            .skip(offset)
            .take(limit)
            .map(|row| project(&row, select, &tables))
            .collect())
    }

    async fn insert(&self, insert: &Insert) -> Result<Option<Value>, DriverError> {
        self.record(insert.to_string());
        self.check_failure(&insert.table, FailOn::Insert)?;

        let mut table = self.tables.entry(insert.table.clone()).or_default();
        let stored = table.store(insert.values.clone());

        Ok(insert
            .returning
            .as_ref()
            .map(|column| stored.get(column).cloned().unwrap_or(Value::Null)))
    }

    async fn execute(&self, statement: &Statement) -> Result<u64, DriverError> {
        self.record(statement.to_string());

        let table_name = statement.table().to_string();
        let tables = vec![table_name.clone()];

        match statement {
            Statement::Update(update) => {
                self.check_failure(&table_name, FailOn::Update)?;
                let mut affected = 0;
                if let Some(mut table) = self.tables.get_mut(&table_name) {
                    for row in table.rows.iter_mut() {
                        if matches(&update.where_clause, &qualify(&table_name, row), &tables) {
                            for (column, value) in &update.values {
                                row.insert(unqualified(column).to_string(), value.clone());
                            }
                            affected += 1;
                        }
                    }
                }
                Ok(affected)
            }
            Statement::Delete(delete) => {
                self.check_failure(&table_name, FailOn::Delete)?;
                let mut affected = 0;
                if let Some(mut table) = self.tables.get_mut(&table_name) {
                    let before = table.rows.len();
                    table.rows.retain(|row| {
                        !matches(&delete.where_clause, &qualify(&table_name, row), &tables)
                    });
                    affected = (before - table.rows.len()) as u64;
                }
                Ok(affected)
            }
        }
    }
}

fn qualify(table: &str, row: &Row) -> Row {
    row.iter()
        .map(|(column, value)| (format!("{}.{}", table, column), value.clone()))
        .collect()
}

fn unqualified(column: &str) -> &str {
    column.rsplit_once('.').map_or(column, |(_, name)| name)
}

/// Look a column up in a joined row; bare names resolve against tables in FROM/JOIN order
fn resolve(row: &Row, column: &str, tables: &[String]) -> Value {
    if let Some(value) = row.get(column) {
        return value.clone();
    }
    if !column.contains('.') {
        for table in tables {
            if let Some(value) = row.get(&format!("{}.{}", table, column)) {
                return value.clone();
            }
        }
    }
    Value::Null
}

pub(crate) fn compare(left: &Value, right: &Value) -> Option<Ordering> {
    match (left, right) {
        (Value::Null, Value::Null) => Some(Ordering::Equal),
        (Value::Null, _) => Some(Ordering::Less),
        (_, Value::Null) => Some(Ordering::Greater),
        (Value::Number(a), Value::Number(b)) => a.as_f64()?.partial_cmp(&b.as_f64()?),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        (Value::Bool(a), Value::Bool(b)) => Some(a.cmp(b)),
        (a, b) if a == b => Some(Ordering::Equal),
        _ => None,
    }
}

/// SQL comparison: anything against NULL is unknown
fn ordered(left: &Value, right: &Value) -> Option<Ordering> {
    if left.is_null() || right.is_null() {
        return None;
    }
    compare(left, right)
}

fn equal(left: &Value, right: &Value) -> bool {
    ordered(left, right) == Some(Ordering::Equal)
}

fn like(text: &str, pattern: &str) -> bool {
    fn walk(text: &[char], pattern: &[char]) -> bool {
        match pattern.split_first() {
            None => text.is_empty(),
            Some(('%', rest)) => (0..=text.len()).any(|skip| walk(&text[skip..], rest)),
            Some(('_', rest)) => !text.is_empty() && walk(&text[1..], rest),
            Some((expected, rest)) => {
                text.first() == Some(expected) && walk(&text[1..], rest)
            }
        }
    }
    let text: Vec<char> = text.chars().collect();
    let pattern: Vec<char> = pattern.chars().collect();
    walk(&text, &pattern)
}

fn matches_condition(condition: &WhereCondition, row: &Row, tables: &[String]) -> bool {
    let actual = resolve(row, &condition.column, tables);
    let expected = match &condition.value {
        Some(Operand::Value(value)) => value.clone(),
        Some(Operand::Column(column)) => resolve(row, column, tables),
        None => Value::Null,
    };

    match condition.operator {
        QueryOperator::Equal => equal(&actual, &expected),
        QueryOperator::NotEqual => {
            !actual.is_null() && !expected.is_null() && !equal(&actual, &expected)
        }
        QueryOperator::GreaterThan => ordered(&actual, &expected) == Some(Ordering::Greater),
        QueryOperator::GreaterThanOrEqual => {
            matches!(ordered(&actual, &expected), Some(Ordering::Greater | Ordering::Equal))
        }
        QueryOperator::LessThan => ordered(&actual, &expected) == Some(Ordering::Less),
        QueryOperator::LessThanOrEqual => {
            matches!(ordered(&actual, &expected), Some(Ordering::Less | Ordering::Equal))
        }
        QueryOperator::Like => match (&actual, &expected) {
            (Value::String(text), Value::String(pattern)) => like(text, pattern),
            _ => false,
        },
        QueryOperator::In => condition.values.iter().any(|value| equal(&actual, value)),
        QueryOperator::NotIn => {
            !actual.is_null() && !condition.values.iter().any(|value| equal(&actual, value))
        }
        QueryOperator::IsNull => actual.is_null(),
        QueryOperator::IsNotNull => !actual.is_null(),
    }
}

fn matches(clause: &Where, row: &Row, tables: &[String]) -> bool {
    match clause {
        Where::Condition(condition) => matches_condition(condition, row, tables),
        Where::And(parts) => parts.iter().all(|part| matches(part, row, tables)),
        Where::Or(parts) => parts.iter().any(|part| matches(part, row, tables)),
    }
}

fn project(row: &Row, select: &Select, tables: &[String]) -> Row {
    let mut projected = Row::new();
    let all_of = |table: &str, projected: &mut Row| {
        let prefix = format!("{}.", table);
        for (column, value) in row {
            if let Some(name) = column.strip_prefix(&prefix) {
                projected.entry(name.to_string()).or_insert_with(|| value.clone());
            }
        }
    };

    if select.columns.is_empty() {
        all_of(&select.table, &mut projected);
        return projected;
    }

    for column in &select.columns {
        match column {
            SelectColumn::All(table) => all_of(table, &mut projected),
            SelectColumn::Column { expr, alias } => {
                let name = alias.clone().unwrap_or_else(|| unqualified(expr).to_string());
                projected.insert(name, resolve(row, expr, tables));
            }
            SelectColumn::CountAll { .. } => {}
        }
    }
    projected
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::{OrderBy, Update};
    use serde_json::json;

    fn row(value: Value) -> Row {
        value.as_object().cloned().unwrap_or_default()
    }

    #[tokio::test]
    async fn test_insert_assigns_auto_increment_key() {
        let driver = MemoryDriver::new();
        driver.create_table("article", Some("id"));

        let insert = Insert {
            table: "article".into(),
            values: row(json!({"title": "first"})),
            returning: Some("id".into()),
        };
        assert_eq!(driver.insert(&insert).await.unwrap(), Some(json!(1)));
        assert_eq!(driver.insert(&insert).await.unwrap(), Some(json!(2)));
        assert_eq!(driver.rows("article").len(), 2);
    }

    #[tokio::test]
    async fn test_inner_and_left_join() {
        let driver = MemoryDriver::new();
        driver.seed("article", vec![row(json!({"id": 1})), row(json!({"id": 2}))]);
        driver.seed("article_lang", vec![row(json!({"article_id": 1, "title": "Hello"}))]);

        let on = Where::columns_eq("article.id", "article_lang.article_id");
        let inner = Select::from("article")
            .column(SelectColumn::All("article".into()))
            .join(
                JoinType::Inner,
                "article_lang",
                on.clone(),
                vec![SelectColumn::aliased("article_lang.title", "article_lang.title")],
            );
        let rows = driver.fetch_all(&inner).await.unwrap();
        assert_eq!(rows, vec![row(json!({"id": 1, "article_lang.title": "Hello"}))]);

        let mut left = inner.clone();
        left.joins[0].join_type = JoinType::Left;
        let left = left.order_by(vec![OrderBy::desc("article.id")]);
        let rows = driver.fetch_all(&left).await.unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0], row(json!({"id": 2, "article_lang.title": null})));
    }

    #[tokio::test]
    async fn test_count_and_paging() {
        let driver = MemoryDriver::new();
        driver.seed(
            "item",
            (1..=5).map(|id| row(json!({"id": id}))).collect(),
        );

        let count = driver
            .fetch_all(&Select::from("item").where_clause(Where::gt("id", 1)).into_count())
            .await
            .unwrap();
        assert_eq!(count[0]["count"], json!(4));

        let page = driver
            .fetch_all(&Select::from("item").order_by(vec![OrderBy::asc("id")]).paginate(2, 2))
            .await
            .unwrap();
        let ids: Vec<Value> = page.iter().map(|row| row["id"].clone()).collect();
        assert_eq!(ids, vec![json!(3), json!(4)]);
    }

    #[tokio::test]
    async fn test_update_and_injected_failure() {
        let driver = MemoryDriver::new();
        driver.seed("item", vec![row(json!({"id": 1, "name": "a"}))]);

        let update = Statement::Update(Update {
            table: "item".into(),
            values: row(json!({"name": "b"})),
            where_clause: Where::eq("item.id", 1),
        });
        assert_eq!(driver.execute(&update).await.unwrap(), 1);
        assert_eq!(driver.rows("item")[0]["name"], json!("b"));

        driver.fail_on("item", FailOn::Update);
        assert!(driver.execute(&update).await.is_err());
        assert_eq!(driver.call_count(), 2);
    }

    #[test]
    fn test_like_patterns() {
        assert!(like("hello world", "hello%"));
        assert!(like("hello", "h_llo"));
        assert!(!like("hello", "world%"));
    }
}
