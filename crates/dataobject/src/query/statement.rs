//! Select and DML statement values handed to a `Driver`

use super::types::*;
use super::where_clause::Where;
use crate::backends::Row;

/// Join clause
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub join_type: JoinType,
    pub table: String,
    pub on: Where,
}

/// SELECT statement
#[derive(Debug, Clone, PartialEq)]
pub struct Select {
    pub table: String,
    pub columns: Vec<SelectColumn>,
    pub joins: Vec<JoinClause>,
    pub where_clause: Option<Where>,
    pub order_by: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: Option<u64>,
}

impl Select {
    /// Start a select on `table` with no projection (renders as `*`)
    pub fn from(table: &str) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            joins: Vec::new(),
            where_clause: None,
            order_by: Vec::new(),
            limit: None,
            offset: None,
        }
    }

    pub fn column(mut self, column: SelectColumn) -> Self {
        self.columns.push(column);
        self
    }

    pub fn columns<I: IntoIterator<Item = SelectColumn>>(mut self, columns: I) -> Self {
        self.columns.extend(columns);
        self
    }

    /// Add a join with its projected columns
    pub fn join<I>(mut self, join_type: JoinType, table: &str, on: Where, columns: I) -> Self
    where
        I: IntoIterator<Item = SelectColumn>,
    {
        self.joins.push(JoinClause {
            join_type,
            table: table.to_string(),
            on,
        });
        self.columns.extend(columns);
        self
    }

    /// AND a predicate onto the current WHERE
    pub fn where_clause(mut self, clause: Where) -> Self {
        self.where_clause = Some(match self.where_clause.take() {
            Some(existing) => existing.and_where(clause),
            None => clause,
        });
        self
    }

    pub fn where_opt(self, clause: Option<Where>) -> Self {
        match clause {
            Some(clause) => self.where_clause(clause),
            None => self,
        }
    }

    pub fn order_by<I: IntoIterator<Item = OrderBy>>(mut self, order: I) -> Self {
        self.order_by.extend(order);
        self
    }

    pub fn limit(mut self, count: u64) -> Self {
        self.limit = Some(count);
        self
    }

    pub fn offset(mut self, count: u64) -> Self {
        self.offset = Some(count);
        self
    }

    /// Add pagination (LIMIT + OFFSET), `page` is 1-based
    pub fn paginate(self, per_page: u64, page: u64) -> Self {
        self.limit(per_page).offset(page.saturating_sub(1) * per_page)
    }

    /// Same source and predicate, projecting `COUNT(*)` instead of rows
    pub fn into_count(mut self) -> Self {
        self.columns = vec![SelectColumn::CountAll {
            alias: COUNT_ALIAS.to_string(),
        }];
        self.order_by.clear();
        self.limit = None;
        self.offset = None;
        self
    }
}

/// INSERT of a single row
#[derive(Debug, Clone, PartialEq)]
pub struct Insert {
    pub table: String,
    pub values: Row,
    /// Column whose stored value is returned as the generated key
    pub returning: Option<String>,
}

/// UPDATE scoped by a predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Update {
    pub table: String,
    pub values: Row,
    pub where_clause: Where,
}

/// DELETE scoped by a predicate
#[derive(Debug, Clone, PartialEq)]
pub struct Delete {
    pub table: String,
    pub where_clause: Where,
}

/// Statements executed for an affected-row count
#[derive(Debug, Clone, PartialEq)]
pub enum Statement {
    Update(Update),
    Delete(Delete),
}

impl Statement {
    pub fn table(&self) -> &str {
        match self {
            Statement::Update(update) => &update.table,
            Statement::Delete(delete) => &delete.table,
        }
    }
}
