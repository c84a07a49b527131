//! Pass-through statement execution.
//!
//! These methods run caller-written SQL as-is on either of the wrapper's
//! connections. SQL is not rewritten; use [`SqlDialect::switch_dialect`]
//! first when it is written with `[bracketed]` identifiers.
//!
//! [`SqlDialect::switch_dialect`]: crate::db::dialect::SqlDialect::switch_dialect

use crate::db::dialect::SqlDialect;
use crate::db::params::QueryParam;
use crate::db::rows::JsonRow;
use crate::db::wrapper::DbWrapper;
use crate::error::{DbError, DbResult};
use crate::models::entity::from_row;
use serde::de::DeserializeOwned;
use serde_json::Value as JsonValue;
use std::collections::VecDeque;
use std::time::Duration;

/// How [`Command::sql`] is interpreted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum CommandKind {
    #[default]
    Text,
    /// The text is a procedure name invoked with `CALL` (`EXEC` on SQL Server)
    StoredProcedure,
}

/// A statement to run through the executor.
///
/// ```ignore
/// let rows = wrapper
///     .execute_query(Command::new("SELECT * FROM Product WHERE Color = ?").bind("Red"))
///     .await?;
/// ```
#[derive(Debug, Clone, Default)]
pub struct Command {
    sql: String,
    params: Vec<QueryParam>,
    kind: CommandKind,
    use_transaction: bool,
    timeout: Option<Duration>,
}

impl Command {
    pub fn new(sql: impl Into<String>) -> Self {
        Self {
            sql: sql.into(),
            ..Self::default()
        }
    }

    /// Call the stored procedure `name` with the bound parameters.
    pub fn procedure(name: impl Into<String>) -> Self {
        Self {
            sql: name.into(),
            kind: CommandKind::StoredProcedure,
            ..Self::default()
        }
    }

    /// Bind the next positional parameter.
    pub fn bind(mut self, param: impl Into<QueryParam>) -> Self {
        self.params.push(param.into());
        self
    }

    /// Run inside the attached transaction instead of autocommit.
    pub fn transactional(mut self, use_transaction: bool) -> Self {
        self.use_transaction = use_transaction;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[QueryParam] {
        &self.params
    }

    pub fn kind(&self) -> CommandKind {
        self.kind
    }

    /// SQL text to send for `dialect`.
    fn render(&self, dialect: SqlDialect) -> DbResult<String> {
        match self.kind {
            CommandKind::Text => Ok(self.sql.clone()),
            CommandKind::StoredProcedure => {
                if dialect == SqlDialect::Sqlite {
                    return Err(DbError::invalid_input(
                        "SQLite does not support stored procedures",
                    ));
                }
                let placeholders = (1..=self.params.len())
                    .map(|i| dialect.placeholder(i))
                    .collect::<Vec<_>>()
                    .join(", ");
                if dialect == SqlDialect::MsSql {
                    let args = if placeholders.is_empty() {
                        String::new()
                    } else {
                        format!(" {placeholders}")
                    };
                    return Ok(format!("EXEC {}{args}", self.sql));
                }
                Ok(format!("CALL {}({placeholders})", self.sql))
            }
        }
    }
}

impl From<&str> for Command {
    fn from(sql: &str) -> Self {
        Self::new(sql)
    }
}

impl From<String> for Command {
    fn from(sql: String) -> Self {
        Self::new(sql)
    }
}

/// Result sets of a multi-statement query, read in order.
#[derive(Debug, Clone, Default)]
pub struct ResultSets {
    sets: VecDeque<Vec<JsonRow>>,
}

impl ResultSets {
    /// Number of sets not read yet.
    pub fn len(&self) -> usize {
        self.sets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sets.is_empty()
    }

    pub fn is_consumed(&self) -> bool {
        self.sets.is_empty()
    }

    /// The next set as raw rows.
    pub fn read_rows(&mut self) -> DbResult<Vec<JsonRow>> {
        self.sets
            .pop_front()
            .ok_or_else(|| DbError::invalid_input("All result sets have already been read"))
    }

    /// The next set mapped to `T`.
    pub fn read<T: DeserializeOwned>(&mut self) -> DbResult<Vec<T>> {
        self.read_rows()?
            .into_iter()
            .map(|row| from_row(std::any::type_name::<T>(), row))
            .collect()
    }

    /// First row of the next set mapped to `T`. The rest of the set is dropped.
    pub fn read_first<T: DeserializeOwned>(&mut self) -> DbResult<Option<T>> {
        self.read_rows()?
            .into_iter()
            .next()
            .map(|row| from_row(std::any::type_name::<T>(), row))
            .transpose()
    }
}

impl From<Vec<Vec<JsonRow>>> for ResultSets {
    fn from(sets: Vec<Vec<JsonRow>>) -> Self {
        Self { sets: sets.into() }
    }
}

impl DbWrapper {
    /// Run a statement and return the number of affected rows.
    pub async fn execute(&mut self, command: impl Into<Command>) -> DbResult<u64> {
        let command = command.into();
        let sql = command.render(self.dialect)?;
        self.run_execute(&sql, &command.params, command.use_transaction, command.timeout)
            .await
    }

    /// Run a query and return its rows as JSON objects.
    pub async fn execute_query(&mut self, command: impl Into<Command>) -> DbResult<Vec<JsonRow>> {
        let command = command.into();
        let sql = command.render(self.dialect)?;
        self.run_fetch(&sql, &command.params, command.use_transaction, command.timeout)
            .await
    }

    /// Run a query and map each row to `T` by column name.
    pub async fn execute_query_as<T: DeserializeOwned>(
        &mut self,
        command: impl Into<Command>,
    ) -> DbResult<Vec<T>> {
        self.execute_query(command)
            .await?
            .into_iter()
            .map(|row| from_row(std::any::type_name::<T>(), row))
            .collect()
    }

    /// First row of a query mapped to `T`, if any.
    pub async fn execute_query_first<T: DeserializeOwned>(
        &mut self,
        command: impl Into<Command>,
    ) -> DbResult<Option<T>> {
        self.execute_query(command)
            .await?
            .into_iter()
            .next()
            .map(|row| from_row(std::any::type_name::<T>(), row))
            .transpose()
    }

    /// First column of the first row.
    ///
    /// `None` when the query returns no rows or the value is NULL.
    pub async fn execute_scalar<T: DeserializeOwned>(
        &mut self,
        command: impl Into<Command>,
    ) -> DbResult<Option<T>> {
        let rows = self.execute_query(command).await?;
        let value = rows
            .into_iter()
            .next()
            .and_then(|row| row.into_iter().next())
            .map(|(_, value)| value);

        match value {
            None | Some(JsonValue::Null) => Ok(None),
            Some(value) => serde_json::from_value(value)
                .map(Some)
                .map_err(|e| DbError::mapping(std::any::type_name::<T>(), e.to_string())),
        }
    }

    /// Run several `;`-separated statements and collect one result set per
    /// statement. Statements returning no rows yield an empty set.
    ///
    /// Multi-statement text cannot be prepared, so bound parameters are
    /// rejected.
    pub async fn query_multiple(&mut self, command: impl Into<Command>) -> DbResult<ResultSets> {
        let command = command.into();
        if !command.params.is_empty() {
            return Err(DbError::invalid_input(
                "Multi-statement queries cannot take bound parameters",
            ));
        }
        let sql = command.render(self.dialect)?;
        let sets = self
            .run_fetch_result_sets(&sql, command.use_transaction, command.timeout)
            .await?;
        Ok(ResultSets::from(sets))
    }

    /// [`DbWrapper::query_multiple`] with a callback that reads the sets.
    pub async fn query_multiple_with<R>(
        &mut self,
        command: impl Into<Command>,
        resolver: impl FnOnce(&mut ResultSets) -> DbResult<R>,
    ) -> DbResult<R> {
        let mut sets = self.query_multiple(command).await?;
        resolver(&mut sets)
    }
}
