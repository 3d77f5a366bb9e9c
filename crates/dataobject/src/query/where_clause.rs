//! WHERE predicate tree
//!
//! Predicates are built as a small tree so composite primary keys can be
//! expressed as `(a = ? AND b = ?) OR (a = ? AND b = ?)` and join predicates
//! can be extended with extra clauses (the locale column) without string
//! concatenation.

use super::types::*;
use serde_json::Value;

/// Boolean predicate over columns
#[derive(Debug, Clone, PartialEq)]
pub enum Where {
    Condition(WhereCondition),
    And(Vec<Where>),
    Or(Vec<Where>),
}

impl Where {
    fn compare(column: &str, operator: QueryOperator, value: Value) -> Self {
        Where::Condition(WhereCondition {
            column: column.to_string(),
            operator,
            value: Some(Operand::Value(value)),
            values: Vec::new(),
        })
    }

    /// `column = value`
    pub fn eq<T: Into<Value>>(column: &str, value: T) -> Self {
        Self::compare(column, QueryOperator::Equal, value.into())
    }

    /// `column != value`
    pub fn ne<T: Into<Value>>(column: &str, value: T) -> Self {
        Self::compare(column, QueryOperator::NotEqual, value.into())
    }

    /// `column > value`
    pub fn gt<T: Into<Value>>(column: &str, value: T) -> Self {
        Self::compare(column, QueryOperator::GreaterThan, value.into())
    }

    /// `column >= value`
    pub fn gte<T: Into<Value>>(column: &str, value: T) -> Self {
        Self::compare(column, QueryOperator::GreaterThanOrEqual, value.into())
    }

    /// `column < value`
    pub fn lt<T: Into<Value>>(column: &str, value: T) -> Self {
        Self::compare(column, QueryOperator::LessThan, value.into())
    }

    /// `column <= value`
    pub fn lte<T: Into<Value>>(column: &str, value: T) -> Self {
        Self::compare(column, QueryOperator::LessThanOrEqual, value.into())
    }

    pub fn like(column: &str, pattern: &str) -> Self {
        Self::compare(column, QueryOperator::Like, Value::String(pattern.to_string()))
    }

    /// `column IN (values...)`
    pub fn in_list<I, T>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Where::Condition(WhereCondition {
            column: column.to_string(),
            operator: QueryOperator::In,
            value: None,
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    /// `column NOT IN (values...)`
    pub fn not_in<I, T>(column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = T>,
        T: Into<Value>,
    {
        Where::Condition(WhereCondition {
            column: column.to_string(),
            operator: QueryOperator::NotIn,
            value: None,
            values: values.into_iter().map(Into::into).collect(),
        })
    }

    pub fn is_null(column: &str) -> Self {
        Where::Condition(WhereCondition {
            column: column.to_string(),
            operator: QueryOperator::IsNull,
            value: None,
            values: Vec::new(),
        })
    }

    pub fn is_not_null(column: &str) -> Self {
        Where::Condition(WhereCondition {
            column: column.to_string(),
            operator: QueryOperator::IsNotNull,
            value: None,
            values: Vec::new(),
        })
    }

    /// `left = right` between two columns (join predicates)
    pub fn columns_eq(left: &str, right: &str) -> Self {
        Where::Condition(WhereCondition {
            column: left.to_string(),
            operator: QueryOperator::Equal,
            value: Some(Operand::Column(right.to_string())),
            values: Vec::new(),
        })
    }

    /// Conjunction; a single member collapses to itself.
    pub fn and(mut parts: Vec<Where>) -> Self {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Where::And(parts)
        }
    }

    /// Disjunction; a single member collapses to itself.
    pub fn or(mut parts: Vec<Where>) -> Self {
        if parts.len() == 1 {
            parts.remove(0)
        } else {
            Where::Or(parts)
        }
    }

    /// Append a clause with AND, flattening into an existing conjunction
    pub fn and_where(self, other: Where) -> Self {
        match self {
            Where::And(mut parts) => {
                parts.push(other);
                Where::And(parts)
            }
            single => Where::And(vec![single, other]),
        }
    }

    /// Append a clause with OR
    pub fn or_where(self, other: Where) -> Self {
        match self {
            Where::Or(mut parts) => {
                parts.push(other);
                Where::Or(parts)
            }
            single => Where::Or(vec![single, other]),
        }
    }

    /// Visit every leaf condition
    pub fn conditions(&self) -> Vec<&WhereCondition> {
        let mut found = Vec::new();
        self.collect_conditions(&mut found);
        found
    }

    fn collect_conditions<'a>(&'a self, found: &mut Vec<&'a WhereCondition>) {
        match self {
            Where::Condition(condition) => found.push(condition),
            Where::And(parts) | Where::Or(parts) => {
                for part in parts {
                    part.collect_conditions(found);
                }
            }
        }
    }
}

/// Equality for scalars and IN for arrays, as used by primary key lookups
pub fn key_clause(column: &str, value: &Value) -> Where {
    match value {
        Value::Array(values) => Where::in_list(column, values.iter().cloned()),
        other => Where::eq(column, other.clone()),
    }
}
