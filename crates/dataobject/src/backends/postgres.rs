//! PostgreSQL Driver Implementation
//!
//! Renders statements with `$n` placeholders and executes them on a sqlx
//! `PgPool`. Rows come back as JSON maps keyed by column name or alias.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::{PgArguments, PgPool, PgPoolOptions, PgRow};
use sqlx::query::Query;
use sqlx::{Column, Postgres, Row as SqlxRow, TypeInfo};

use super::{Driver, Row, SqlDialect};
use crate::config::DataObjectConfig;
use crate::error::{DriverError, ModelError, ModelResult};
use crate::query::{Insert, Select, Statement};

/// PostgreSQL driver on a shared sqlx pool
#[derive(Debug, Clone)]
pub struct PostgresDriver {
    pool: Arc<PgPool>,
    log_statements: bool,
}

impl PostgresDriver {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
            log_statements: false,
        }
    }

    /// Open a pool from configuration
    pub async fn connect(config: &DataObjectConfig) -> ModelResult<Self> {
        config.validate()?;
        let database_url = config
            .database_url
            .as_deref()
            .ok_or_else(|| ModelError::Configuration("DATABASE_URL is not set".to_string()))?;

        let mut options = PgPoolOptions::new()
            .max_connections(config.max_connections)
            .min_connections(config.min_connections)
            .acquire_timeout(Duration::from_secs(config.acquire_timeout_seconds));

        if let Some(idle_timeout) = config.idle_timeout_seconds {
            options = options.idle_timeout(Duration::from_secs(idle_timeout));
        }

        let pool = options.connect(database_url).await?;
        tracing::info!(
            "PostgreSQL pool ready (max_connections = {})",
            config.max_connections
        );

        Ok(Self {
            pool: Arc::new(pool),
            log_statements: config.log_statements,
        })
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    fn prepare<'q>(&self, sql: &'q str, params: &[Value]) -> Query<'q, Postgres, PgArguments> {
        if self.log_statements {
            tracing::debug!("{} -- {:?}", sql, params);
        }
        params
            .iter()
            .fold(sqlx::query(sql), |query, value| bind_json_value(query, value))
    }
}

#[async_trait]
impl Driver for PostgresDriver {
    fn dialect(&self) -> SqlDialect {
        SqlDialect::PostgreSQL
    }

    async fn fetch_all(&self, select: &Select) -> Result<Vec<Row>, DriverError> {
        let (sql, params) = select.to_sql_with_params(SqlDialect::PostgreSQL);
        let rows = self.prepare(&sql, &params).fetch_all(&*self.pool).await?;
        rows.iter().map(row_to_map).collect()
    }

    async fn insert(&self, insert: &Insert) -> Result<Option<Value>, DriverError> {
        let (sql, params) = insert.to_sql_with_params(SqlDialect::PostgreSQL);
        let query = self.prepare(&sql, &params);

        if insert.returning.is_none() {
            query.execute(&*self.pool).await?;
            return Ok(None);
        }

        match query.fetch_optional(&*self.pool).await? {
            Some(row) => Ok(Some(postgres_value_to_json(&row, 0)?)),
            None => Ok(None),
        }
    }

    async fn execute(&self, statement: &Statement) -> Result<u64, DriverError> {
        let (sql, params) = statement.to_sql_with_params(SqlDialect::PostgreSQL);
        let result = self.prepare(&sql, &params).execute(&*self.pool).await?;
        Ok(result.rows_affected())
    }
}

/// Bind a JSON value to a sqlx query
fn bind_json_value<'q>(
    query: Query<'q, Postgres, PgArguments>,
    value: &Value,
) -> Query<'q, Postgres, PgArguments> {
    match value {
        Value::Null => query.bind(Option::<String>::None),
        Value::Bool(b) => query.bind(*b),
        Value::Number(n) => {
            if let Some(i) = n.as_i64() {
                query.bind(i)
            } else if let Some(f) = n.as_f64() {
                query.bind(f)
            } else {
                query.bind(n.to_string())
            }
        }
        Value::String(s) => query.bind(s.clone()),
        Value::Array(_) | Value::Object(_) => query.bind(value.clone()),
    }
}

fn row_to_map(row: &PgRow) -> Result<Row, DriverError> {
    let mut map = Row::new();
    for (index, column) in row.columns().iter().enumerate() {
        map.insert(column.name().to_string(), postgres_value_to_json(row, index)?);
    }
    Ok(map)
}

/// Convert a PostgreSQL column value to JSON
fn postgres_value_to_json(row: &PgRow, index: usize) -> Result<Value, DriverError> {
    let column = &row.columns()[index];
    let type_name = column.type_info().name();

    let value = match type_name {
        "BOOL" => row.try_get::<Option<bool>, _>(index)?.map(Value::from),
        "INT2" => row.try_get::<Option<i16>, _>(index)?.map(Value::from),
        "INT4" => row.try_get::<Option<i32>, _>(index)?.map(Value::from),
        "INT8" => row.try_get::<Option<i64>, _>(index)?.map(Value::from),
        "FLOAT4" => row.try_get::<Option<f32>, _>(index)?.map(Value::from),
        "FLOAT8" => row.try_get::<Option<f64>, _>(index)?.map(Value::from),
        "TEXT" | "VARCHAR" | "BPCHAR" | "NAME" => {
            row.try_get::<Option<String>, _>(index)?.map(Value::from)
        }
        "UUID" => row
            .try_get::<Option<uuid::Uuid>, _>(index)?
            .map(|id| Value::from(id.to_string())),
        "TIMESTAMPTZ" => row
            .try_get::<Option<chrono::DateTime<chrono::Utc>>, _>(index)?
            .map(|at| Value::from(at.to_rfc3339())),
        "TIMESTAMP" => row
            .try_get::<Option<chrono::NaiveDateTime>, _>(index)?
            .map(|at| Value::from(at.to_string())),
        "DATE" => row
            .try_get::<Option<chrono::NaiveDate>, _>(index)?
            .map(|day| Value::from(day.to_string())),
        "JSON" | "JSONB" => row.try_get::<Option<Value>, _>(index)?,
        other => {
            let value = row.try_get::<Option<String>, _>(index).map_err(|e| {
                DriverError::UnsupportedValue {
                    column: column.name().to_string(),
                    reason: format!("type '{}': {}", other, e),
                }
            })?;
            value.map(Value::from)
        }
    };

    Ok(value.unwrap_or(Value::Null))
}
