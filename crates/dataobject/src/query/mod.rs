//! Query building
//!
//! Statements are plain values; drivers render them through
//! `to_sql_with_params` or evaluate them directly.

pub mod sql_generation;
pub mod statement;
pub mod types;
pub mod where_clause;

pub use statement::{Delete, Insert, JoinClause, Select, Statement, Update};
pub use types::{
    JoinType, Operand, OrderBy, OrderDirection, QueryOperator, SelectColumn, WhereCondition,
    COUNT_ALIAS,
};
pub use where_clause::{key_clause, Where};
