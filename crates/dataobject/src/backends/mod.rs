//! Database Backends
//!
//! The driver boundary: repositories hand statements to a `Driver` and get
//! rows, generated keys or affected-row counts back. `MemoryDriver` evaluates
//! statements in-process, `PostgresDriver` renders them to SQL for sqlx.

use async_trait::async_trait;
use serde_json::{Map, Value};

use crate::error::DriverError;
use crate::query::{Insert, Select, Statement};

pub mod memory;
pub mod postgres;

pub use memory::{FailOn, MemoryDriver};
pub use postgres::PostgresDriver;

/// Raw row or document: column name to value
pub type Row = Map<String, Value>;

/// SQL dialect for a driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SqlDialect {
    PostgreSQL,
    MySQL,
    SQLite,
}

impl SqlDialect {
    /// Get the parameter placeholder style for this dialect
    pub fn parameter_placeholder(&self, index: usize) -> String {
        match self {
            SqlDialect::PostgreSQL => format!("${}", index + 1),
            SqlDialect::MySQL | SqlDialect::SQLite => "?".to_string(),
        }
    }

    /// Get the quote character for identifiers in this dialect
    pub fn identifier_quote(&self) -> char {
        match self {
            SqlDialect::PostgreSQL => '"',
            SqlDialect::MySQL => '`',
            SqlDialect::SQLite => '"',
        }
    }
}

/// Relational driver used by every table repository
#[async_trait]
pub trait Driver: Send + Sync {
    fn dialect(&self) -> SqlDialect;

    /// Execute a selection and return all rows
    async fn fetch_all(&self, select: &Select) -> Result<Vec<Row>, DriverError>;

    /// Insert one row and return the generated key, if the statement asks for one
    async fn insert(&self, insert: &Insert) -> Result<Option<Value>, DriverError>;

    /// Execute an update or delete and return the affected row count
    async fn execute(&self, statement: &Statement) -> Result<u64, DriverError>;
}
