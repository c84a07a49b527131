//! Statement rendering for the CRUD facade.
//!
//! Statements are built from an entity's table, key column and serialized
//! columns plus [`StatementOptions`]. Caller-supplied fragments (filters,
//! ordering, join conditions) are written with `[bracketed]` identifiers and
//! `?` placeholders and rendered for the target dialect.

use crate::db::dialect::SqlDialect;
use crate::db::params::QueryParam;
use crate::error::{DbError, DbResult};
use std::time::Duration;

/// A WHERE-clause fragment with its positional parameters.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Filter {
    sql: String,
    params: Vec<QueryParam>,
}

impl Filter {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            params: Vec::new(),
        }
    }

    /// Bind the next `?` placeholder.
    pub fn bind(mut self, param: impl Into<QueryParam>) -> Self {
        self.params.push(param.into());
        self
    }

    /// `[column] IN (?, ?, ...)` over the given values.
    pub fn is_in<P: Into<QueryParam>>(column: &str, values: impl IntoIterator<Item = P>) -> Self {
        let params: Vec<QueryParam> = values.into_iter().map(Into::into).collect();
        let placeholders = vec!["?"; params.len()].join(", ");
        Self {
            sql: format!("[{column}] IN ({placeholders})"),
            params,
        }
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    LeftOuter,
}

impl JoinKind {
    fn keyword(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::LeftOuter => "LEFT OUTER JOIN",
        }
    }
}

/// A join against another table with an explicit `ON` condition.
#[derive(Debug, Clone, PartialEq)]
pub struct Join {
    pub kind: JoinKind,
    pub table: String,
    /// Condition using `[bracketed]` identifiers, e.g. `[A].[Id] = [B].[AId]`
    pub on: String,
}

/// Per-call customization of a CRUD statement.
#[derive(Debug, Clone, Default)]
pub struct StatementOptions {
    /// Overwritten with the wrapper's dialect after customization
    pub dialect: Option<SqlDialect>,
    pub use_transaction: bool,
    pub filter: Option<Filter>,
    pub order_by: Option<String>,
    pub top: Option<u64>,
    pub skip: Option<u64>,
    pub command_timeout: Option<Duration>,
    pub joins: Vec<Join>,
}

impl StatementOptions {
    pub fn dialect(&mut self, dialect: SqlDialect) -> &mut Self {
        self.dialect = Some(dialect);
        self
    }

    /// Run the statement on the transactional connection.
    pub fn use_transaction(&mut self, use_transaction: bool) -> &mut Self {
        self.use_transaction = use_transaction;
        self
    }

    pub fn filter(&mut self, filter: Filter) -> &mut Self {
        self.filter = Some(filter);
        self
    }

    pub fn order_by(&mut self, order_by: impl Into<String>) -> &mut Self {
        self.order_by = Some(order_by.into());
        self
    }

    pub fn top(&mut self, top: u64) -> &mut Self {
        self.top = Some(top);
        self
    }

    pub fn skip(&mut self, skip: u64) -> &mut Self {
        self.skip = Some(skip);
        self
    }

    pub fn command_timeout(&mut self, timeout: Duration) -> &mut Self {
        self.command_timeout = Some(timeout);
        self
    }

    pub fn inner_join(&mut self, table: impl Into<String>, on: impl Into<String>) -> &mut Self {
        self.joins.push(Join {
            kind: JoinKind::Inner,
            table: table.into(),
            on: on.into(),
        });
        self
    }

    pub fn left_outer_join(
        &mut self,
        table: impl Into<String>,
        on: impl Into<String>,
    ) -> &mut Self {
        self.joins.push(Join {
            kind: JoinKind::LeftOuter,
            table: table.into(),
            on: on.into(),
        });
        self
    }
}

/// Rendered SQL and its parameters.
#[derive(Debug, Clone, PartialEq)]
pub struct Statement {
    pub sql: String,
    pub params: Vec<QueryParam>,
}

/// Accumulates SQL text and numbers placeholders as parameters are pushed.
struct StatementBuilder {
    dialect: SqlDialect,
    sql: String,
    params: Vec<QueryParam>,
}

impl StatementBuilder {
    fn new(dialect: SqlDialect) -> Self {
        Self {
            dialect,
            sql: String::new(),
            params: Vec::new(),
        }
    }

    fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    fn push_identifier(&mut self, name: &str) -> &mut Self {
        let quoted = self.dialect.quote_identifier(name);
        self.push(&quoted)
    }

    /// Push a value as a placeholder, or as a `NULL` literal so no type has
    /// to be inferred for it.
    fn push_value(&mut self, value: QueryParam) -> &mut Self {
        if value.is_null() {
            return self.push("NULL");
        }
        self.params.push(value);
        let placeholder = self.dialect.placeholder(self.params.len());
        self.push(&placeholder)
    }

    fn push_filter(&mut self, filter: &Filter) -> DbResult<&mut Self> {
        let (sql, count) = self
            .dialect
            .render_fragment(filter.sql(), self.params.len() + 1);
        if count != filter.params().len() {
            return Err(DbError::invalid_input(format!(
                "Filter has {} placeholders but {} parameters were bound: {}",
                count,
                filter.params().len(),
                filter.sql()
            )));
        }
        self.params.extend(filter.params().iter().cloned());
        Ok(self.push(" WHERE ").push(&sql))
    }

    fn push_joins(&mut self, joins: &[Join]) -> &mut Self {
        for join in joins {
            let on = self.dialect.switch_dialect(&join.on);
            self.push(" ")
                .push(join.kind.keyword())
                .push(" ")
                .push_identifier(&join.table)
                .push(" ON ")
                .push(&on);
        }
        self
    }

    fn finish(self) -> Statement {
        Statement {
            sql: self.sql,
            params: self.params,
        }
    }
}

fn push_select_tail(
    builder: &mut StatementBuilder,
    table: &str,
    options: &StatementOptions,
) -> DbResult<()> {
    builder.push(" FROM ").push_identifier(table);
    builder.push_joins(&options.joins);
    if let Some(filter) = &options.filter {
        builder.push_filter(filter)?;
    }
    Ok(())
}

/// `SELECT` of every column of `table`, honoring filter, joins, order and paging.
pub fn select(dialect: SqlDialect, table: &str, options: &StatementOptions) -> DbResult<Statement> {
    let mut builder = StatementBuilder::new(dialect);
    builder.push("SELECT ");
    if let Some(top) = dialect.top_prefix(options.top, options.skip) {
        builder.push(&top);
    }
    if options.joins.is_empty() {
        builder.push("*");
    } else {
        builder.push_identifier(table).push(".*");
    }
    push_select_tail(&mut builder, table, options)?;
    if let Some(order_by) = &options.order_by {
        let order_by = dialect.switch_dialect(order_by);
        builder.push(" ORDER BY ").push(&order_by);
    } else if dialect.paging_requires_order(options.skip) {
        builder.push(" ORDER BY (SELECT NULL)");
    }
    let paging = dialect.paging_clause(options.top, options.skip);
    builder.push(&paging);
    Ok(builder.finish())
}

/// `SELECT` of one column over the rows matching `filter`.
pub fn select_column(
    dialect: SqlDialect,
    table: &str,
    column: &str,
    filter: &Filter,
) -> DbResult<Statement> {
    let mut builder = StatementBuilder::new(dialect);
    builder
        .push("SELECT ")
        .push_identifier(column)
        .push(" FROM ")
        .push_identifier(table);
    builder.push_filter(filter)?;
    Ok(builder.finish())
}

/// `SELECT` of the single row matching `key`.
pub fn select_by_key(
    dialect: SqlDialect,
    table: &str,
    key_column: &str,
    key: QueryParam,
) -> Statement {
    let mut builder = StatementBuilder::new(dialect);
    builder
        .push("SELECT * FROM ")
        .push_identifier(table)
        .push(" WHERE ")
        .push_identifier(key_column)
        .push(" = ")
        .push_value(key);
    builder.finish()
}

/// `SELECT COUNT(*)` over `table` with the options' filter and joins.
pub fn count(dialect: SqlDialect, table: &str, options: &StatementOptions) -> DbResult<Statement> {
    let mut builder = StatementBuilder::new(dialect);
    builder.push("SELECT COUNT(*) AS ").push_identifier("total");
    push_select_tail(&mut builder, table, options)?;
    Ok(builder.finish())
}

/// `INSERT` of the given columns.
///
/// With `returning` set, PostgreSQL gets a `RETURNING` clause for the key and
/// SQL Server a trailing `SCOPE_IDENTITY()` select. MySQL and SQLite report
/// the key through the driver.
pub fn insert(
    dialect: SqlDialect,
    table: &str,
    columns: Vec<(String, QueryParam)>,
    returning: Option<&str>,
) -> Statement {
    let mut builder = StatementBuilder::new(dialect);
    builder.push("INSERT INTO ").push_identifier(table);
    if columns.is_empty() {
        match dialect {
            SqlDialect::MySql => builder.push(" () VALUES ()"),
            SqlDialect::PostgreSql | SqlDialect::Sqlite | SqlDialect::MsSql => {
                builder.push(" DEFAULT VALUES")
            }
        };
    } else {
        let names = columns
            .iter()
            .map(|(name, _)| dialect.quote_identifier(name))
            .collect::<Vec<_>>()
            .join(", ");
        builder.push(" (").push(&names).push(") VALUES (");
        for (idx, (_, value)) in columns.into_iter().enumerate() {
            if idx > 0 {
                builder.push(", ");
            }
            builder.push_value(value);
        }
        builder.push(")");
    }
    match (dialect, returning) {
        (SqlDialect::PostgreSql, Some(key_column)) => {
            builder.push(" RETURNING ").push_identifier(key_column);
        }
        (SqlDialect::MsSql, Some(_)) => {
            builder.push("; SELECT CAST(SCOPE_IDENTITY() AS BIGINT) AS [id]");
        }
        _ => {}
    }
    builder.finish()
}

fn push_assignments(builder: &mut StatementBuilder, columns: Vec<(String, QueryParam)>) {
    for (idx, (name, value)) in columns.into_iter().enumerate() {
        if idx > 0 {
            builder.push(", ");
        }
        builder.push_identifier(&name).push(" = ").push_value(value);
    }
}

/// `UPDATE` of every given column on the row matching `key`.
pub fn update(
    dialect: SqlDialect,
    table: &str,
    key_column: &str,
    key: QueryParam,
    columns: Vec<(String, QueryParam)>,
) -> DbResult<Statement> {
    if columns.is_empty() {
        return Err(DbError::invalid_input(format!(
            "Nothing to update on '{table}': no columns besides the key"
        )));
    }
    let mut builder = StatementBuilder::new(dialect);
    builder.push("UPDATE ").push_identifier(table).push(" SET ");
    push_assignments(&mut builder, columns);
    builder
        .push(" WHERE ")
        .push_identifier(key_column)
        .push(" = ")
        .push_value(key);
    Ok(builder.finish())
}

/// `UPDATE` of every given column on all rows matching `filter`.
pub fn bulk_update(
    dialect: SqlDialect,
    table: &str,
    columns: Vec<(String, QueryParam)>,
    filter: Option<&Filter>,
) -> DbResult<Statement> {
    if columns.is_empty() {
        return Err(DbError::invalid_input(format!(
            "Nothing to update on '{table}': no columns besides the key"
        )));
    }
    let mut builder = StatementBuilder::new(dialect);
    builder.push("UPDATE ").push_identifier(table).push(" SET ");
    push_assignments(&mut builder, columns);
    if let Some(filter) = filter {
        builder.push_filter(filter)?;
    }
    Ok(builder.finish())
}

/// `DELETE` of the row matching `key`.
pub fn delete(dialect: SqlDialect, table: &str, key_column: &str, key: QueryParam) -> Statement {
    let mut builder = StatementBuilder::new(dialect);
    builder
        .push("DELETE FROM ")
        .push_identifier(table)
        .push(" WHERE ")
        .push_identifier(key_column)
        .push(" = ")
        .push_value(key);
    builder.finish()
}

/// `DELETE` of all rows matching `filter`.
pub fn bulk_delete(dialect: SqlDialect, table: &str, filter: Option<&Filter>) -> DbResult<Statement> {
    let mut builder = StatementBuilder::new(dialect);
    builder.push("DELETE FROM ").push_identifier(table);
    if let Some(filter) = filter {
        builder.push_filter(filter)?;
    }
    Ok(builder.finish())
}
