//! SQL generation
//!
//! Every statement renders two ways: with dialect placeholders and a parameter
//! list for execution, or with inline literals through `Display` for logging
//! and assertions.

use super::statement::*;
use super::types::*;
use super::where_clause::Where;
use crate::backends::SqlDialect;
use serde_json::Value;
use std::fmt;

struct SqlWriter {
    dialect: Option<SqlDialect>,
    params: Vec<Value>,
}

impl SqlWriter {
    fn bound(dialect: SqlDialect) -> Self {
        Self {
            dialect: Some(dialect),
            params: Vec::new(),
        }
    }

    fn inline() -> Self {
        Self {
            dialect: None,
            params: Vec::new(),
        }
    }

    fn placeholder(&mut self, value: &Value) -> String {
        match self.dialect {
            Some(dialect) => {
                let index = self.params.len();
                self.params.push(value.clone());
                dialect.parameter_placeholder(index)
            }
            None => literal(value),
        }
    }

    fn quote(&self, identifier: &str) -> String {
        let quote = self
            .dialect
            .map(|dialect| dialect.identifier_quote())
            .unwrap_or('"');
        format!("{}{}{}", quote, identifier, quote)
    }
}

fn literal(value: &Value) -> String {
    match value {
        Value::Null => "NULL".to_string(),
        Value::Bool(true) => "TRUE".to_string(),
        Value::Bool(false) => "FALSE".to_string(),
        Value::Number(number) => number.to_string(),
        Value::String(text) => format!("'{}'", text.replace('\'', "''")),
        other => format!("'{}'", other.to_string().replace('\'', "''")),
    }
}

fn build_where(clause: &Where, writer: &mut SqlWriter) -> String {
    match clause {
        Where::Condition(condition) => {
            let mut sql = format!("{} ", condition.column);
            match condition.operator {
                QueryOperator::In | QueryOperator::NotIn => {
                    if condition.values.is_empty() {
                        // an empty IN list matches nothing, an empty NOT IN everything
                        return if condition.operator == QueryOperator::In {
                            "1 = 0".to_string()
                        } else {
                            "1 = 1".to_string()
                        };
                    }
                    let placeholders: Vec<String> = condition
                        .values
                        .iter()
                        .map(|value| writer.placeholder(value))
                        .collect();
                    sql.push_str(&format!("{} ({})", condition.operator, placeholders.join(", ")));
                }
                QueryOperator::IsNull | QueryOperator::IsNotNull => {
                    sql.push_str(&condition.operator.to_string());
                }
                _ => {
                    sql.push_str(&condition.operator.to_string());
                    match &condition.value {
                        Some(Operand::Value(value)) => {
                            sql.push_str(&format!(" {}", writer.placeholder(value)));
                        }
                        Some(Operand::Column(column)) => {
                            sql.push_str(&format!(" {}", column));
                        }
                        None => sql.push_str(" NULL"),
                    }
                }
            }
            sql
        }
        Where::And(parts) => build_group(parts, " AND ", "1 = 1", writer),
        Where::Or(parts) => build_group(parts, " OR ", "1 = 0", writer),
    }
}

fn build_group(parts: &[Where], glue: &str, empty: &str, writer: &mut SqlWriter) -> String {
    if parts.is_empty() {
        return empty.to_string();
    }
    let rendered: Vec<String> = parts
        .iter()
        .map(|part| match part {
            Where::And(inner) | Where::Or(inner) if inner.len() > 1 => {
                format!("({})", build_where(part, writer))
            }
            _ => build_where(part, writer),
        })
        .collect();
    rendered.join(glue)
}

fn build_select(select: &Select, writer: &mut SqlWriter) -> String {
    let mut sql = String::from("SELECT ");

    if select.columns.is_empty() {
        sql.push('*');
    } else {
        let columns: Vec<String> = select
            .columns
            .iter()
            .map(|column| match column {
                SelectColumn::All(table) => format!("{}.*", table),
                SelectColumn::Column { expr, alias: None } => expr.clone(),
                SelectColumn::Column {
                    expr,
                    alias: Some(alias),
                } => format!("{} AS {}", expr, writer.quote(alias)),
                SelectColumn::CountAll { alias } => format!("COUNT(*) AS {}", writer.quote(alias)),
            })
            .collect();
        sql.push_str(&columns.join(", "));
    }

    sql.push_str(&format!(" FROM {}", select.table));

    for join in &select.joins {
        let on = build_where(&join.on, writer);
        sql.push_str(&format!(" {} {} ON {}", join.join_type, join.table, on));
    }

    if let Some(clause) = &select.where_clause {
        sql.push_str(" WHERE ");
        sql.push_str(&build_where(clause, writer));
    }

    if !select.order_by.is_empty() {
        let order: Vec<String> = select
            .order_by
            .iter()
            .map(|order| format!("{} {}", order.column, order.direction))
            .collect();
        sql.push_str(" ORDER BY ");
        sql.push_str(&order.join(", "));
    }

    if let Some(limit) = select.limit {
        sql.push_str(&format!(" LIMIT {}", limit));
    }

    if let Some(offset) = select.offset {
        sql.push_str(&format!(" OFFSET {}", offset));
    }

    sql
}

fn build_insert(insert: &Insert, writer: &mut SqlWriter) -> String {
    let mut sql = format!("INSERT INTO {}", insert.table);

    if insert.values.is_empty() {
        sql.push_str(" DEFAULT VALUES");
    } else {
        let columns: Vec<&str> = insert.values.keys().map(String::as_str).collect();
        let placeholders: Vec<String> = insert
            .values
            .values()
            .map(|value| writer.placeholder(value))
            .collect();
        sql.push_str(&format!(" ({}) VALUES ({})", columns.join(", "), placeholders.join(", ")));
    }

    if let Some(returning) = &insert.returning {
        sql.push_str(&format!(" RETURNING {}", returning));
    }

    sql
}

fn build_update(update: &Update, writer: &mut SqlWriter) -> String {
    let assignments: Vec<String> = update
        .values
        .iter()
        .map(|(column, value)| format!("{} = {}", column, writer.placeholder(value)))
        .collect();
    let predicate = build_where(&update.where_clause, writer);

    format!(
        "UPDATE {} SET {} WHERE {}",
        update.table,
        assignments.join(", "),
        predicate
    )
}

fn build_delete(delete: &Delete, writer: &mut SqlWriter) -> String {
    let predicate = build_where(&delete.where_clause, writer);
    format!("DELETE FROM {} WHERE {}", delete.table, predicate)
}

macro_rules! sql_rendering {
    ($ty:ty, $build:ident) => {
        impl $ty {
            /// Generate SQL with parameter placeholders and return parameters
            pub fn to_sql_with_params(&self, dialect: SqlDialect) -> (String, Vec<Value>) {
                let mut writer = SqlWriter::bound(dialect);
                let sql = $build(self, &mut writer);
                (sql, writer.params)
            }
        }

        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let mut writer = SqlWriter::inline();
                write!(f, "{}", $build(self, &mut writer))
            }
        }
    };
}

sql_rendering!(Where, build_where);
sql_rendering!(Select, build_select);
sql_rendering!(Insert, build_insert);
sql_rendering!(Update, build_update);
sql_rendering!(Delete, build_delete);

impl Statement {
    pub fn to_sql_with_params(&self, dialect: SqlDialect) -> (String, Vec<Value>) {
        match self {
            Statement::Update(update) => update.to_sql_with_params(dialect),
            Statement::Delete(delete) => delete.to_sql_with_params(dialect),
        }
    }
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Update(update) => fmt::Display::fmt(update, f),
            Statement::Delete(delete) => fmt::Display::fmt(delete, f),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_composite_key_predicate_rendering() {
        let clause = Where::or(vec![
            Where::and(vec![Where::eq("t.a", 1), Where::eq("t.b", 2)]),
            Where::and(vec![Where::eq("t.a", 3), Where::eq("t.b", 4)]),
        ]);

        assert_eq!(
            clause.to_string(),
            "(t.a = 1 AND t.b = 2) OR (t.a = 3 AND t.b = 4)"
        );

        let (sql, params) = clause.to_sql_with_params(SqlDialect::PostgreSQL);
        assert_eq!(sql, "(t.a = $1 AND t.b = $2) OR (t.a = $3 AND t.b = $4)");
        assert_eq!(params, vec![json!(1), json!(2), json!(3), json!(4)]);
    }

    #[test]
    fn test_select_with_join_and_pagination() {
        let select = Select::from("article")
            .column(SelectColumn::All("article".into()))
            .join(
                JoinType::Inner,
                "article_lang",
                Where::columns_eq("article.id", "article_lang.article_id")
                    .and_where(Where::eq("article_lang.locale", "en")),
                vec![SelectColumn::aliased("article_lang.title", "article_lang.title")],
            )
            .where_clause(Where::gt("article.id", 10))
            .order_by(vec![OrderBy::desc("article.id")])
            .paginate(20, 3);

        let (sql, params) = select.to_sql_with_params(SqlDialect::PostgreSQL);
        assert_eq!(
            sql,
            "SELECT article.*, article_lang.title AS \"article_lang.title\" FROM article \
             INNER JOIN article_lang ON article.id = article_lang.article_id AND article_lang.locale = $1 \
             WHERE article.id > $2 ORDER BY article.id DESC LIMIT 20 OFFSET 40"
        );
        assert_eq!(params, vec![json!("en"), json!(10)]);
    }

    #[test]
    fn test_count_select_drops_paging() {
        let select = Select::from("article")
            .where_clause(Where::eq("article.visible", true))
            .order_by(vec![OrderBy::asc("article.id")])
            .limit(5)
            .into_count();

        assert_eq!(
            select.to_string(),
            "SELECT COUNT(*) AS \"count\" FROM article WHERE article.visible = TRUE"
        );
    }

    #[test]
    fn test_dml_rendering() {
        let mut values = crate::backends::Row::new();
        values.insert("title".into(), json!("it's"));

        let insert = Insert {
            table: "article".into(),
            values: values.clone(),
            returning: Some("id".into()),
        };
        let (sql, params) = insert.to_sql_with_params(SqlDialect::PostgreSQL);
        assert_eq!(sql, "INSERT INTO article (title) VALUES ($1) RETURNING id");
        assert_eq!(params, vec![json!("it's")]);

        let update = Update {
            table: "article".into(),
            values,
            where_clause: Where::in_list("article.id", vec![1, 2]),
        };
        assert_eq!(
            update.to_string(),
            "UPDATE article SET title = 'it''s' WHERE article.id IN (1, 2)"
        );

        let delete = Delete {
            table: "article".into(),
            where_clause: Where::in_list("article.id", Vec::<i64>::new()),
        };
        assert_eq!(delete.to_string(), "DELETE FROM article WHERE 1 = 0");
    }

    #[test]
    fn test_mysql_placeholders() {
        let (sql, _) = Where::eq("a", 1)
            .and_where(Where::eq("b", 2))
            .to_sql_with_params(SqlDialect::MySQL);
        assert_eq!(sql, "a = ? AND b = ?");
    }
}
