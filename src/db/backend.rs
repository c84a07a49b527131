//! Statement execution per database backend.
//!
//! Each module below provides the same interface adapted to its database
//! type. Functions take a concrete connection, so the same code serves both
//! the autocommit connection and the connection behind the open transaction.
//!
//! When `params` is empty the SQL is sent as raw text, which allows several
//! statements in one call and avoids prepared statement restrictions.
//! SQL Server batches always go through `sp_executesql`, which accepts
//! several statements either way.

use crate::db::params::{
    QueryParam, bind_mssql_param, bind_mysql_param, bind_postgres_param, bind_sqlite_param,
};
use crate::db::rows::{JsonRow, RowToJson};
use crate::error::DbResult;
use futures_util::TryStreamExt;
use serde_json::Value as JsonValue;
use sqlx::{Either, Executor};

/// Split a multi-statement stream into one row set per statement.
async fn collect_result_sets<'e, Q, R>(
    mut stream: futures_util::stream::BoxStream<'e, Result<Either<Q, R>, sqlx::Error>>,
) -> DbResult<Vec<Vec<JsonRow>>>
where
    R: RowToJson,
{
    let mut sets = Vec::new();
    let mut current = Vec::new();
    while let Some(item) = stream.try_next().await? {
        match item {
            Either::Left(_) => sets.push(std::mem::take(&mut current)),
            Either::Right(row) => current.push(row.to_json_map()),
        }
    }
    if !current.is_empty() {
        sets.push(current);
    }
    Ok(sets)
}

fn first_column_as_key(rows: &[JsonRow]) -> Option<i64> {
    rows.first()
        .and_then(|row| row.values().next())
        .and_then(JsonValue::as_i64)
}

pub(crate) mod mysql {
    use super::*;
    use sqlx::MySqlConnection;

    pub async fn execute(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.execute(conn).await?
        };
        Ok(result.rows_affected())
    }

    /// Run an INSERT and report the generated key when asked for.
    pub async fn insert(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
        returning_key: bool,
    ) -> DbResult<Option<i64>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_mysql_param(query, param);
        }
        let result = query.execute(conn).await?;
        Ok(returning_key.then(|| result.last_insert_id() as i64))
    }

    pub async fn fetch_all(
        conn: &mut MySqlConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<JsonRow>> {
        let rows = if params.is_empty() {
            conn.fetch_all(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_mysql_param(query, param);
            }
            query.fetch_all(conn).await?
        };
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn fetch_result_sets(
        conn: &mut MySqlConnection,
        sql: &str,
    ) -> DbResult<Vec<Vec<JsonRow>>> {
        collect_result_sets(conn.fetch_many(sql)).await
    }
}

pub(crate) mod postgres {
    use super::*;
    use sqlx::PgConnection;

    pub async fn execute(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.execute(conn).await?
        };
        Ok(result.rows_affected())
    }

    /// Run an INSERT. With `returning_key` the statement must end in a
    /// `RETURNING` clause naming the key column.
    pub async fn insert(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
        returning_key: bool,
    ) -> DbResult<Option<i64>> {
        if !returning_key {
            execute(conn, sql, params).await?;
            return Ok(None);
        }
        let rows = fetch_all(conn, sql, params).await?;
        Ok(first_column_as_key(&rows))
    }

    pub async fn fetch_all(
        conn: &mut PgConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<JsonRow>> {
        let rows = if params.is_empty() {
            conn.fetch_all(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_postgres_param(query, param);
            }
            query.fetch_all(conn).await?
        };
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn fetch_result_sets(
        conn: &mut PgConnection,
        sql: &str,
    ) -> DbResult<Vec<Vec<JsonRow>>> {
        collect_result_sets(conn.fetch_many(sql)).await
    }
}

pub(crate) mod sqlite {
    use super::*;
    use sqlx::SqliteConnection;

    pub async fn execute(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = if params.is_empty() {
            conn.execute(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.execute(conn).await?
        };
        Ok(result.rows_affected())
    }

    pub async fn insert(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
        returning_key: bool,
    ) -> DbResult<Option<i64>> {
        let mut query = sqlx::query(sql);
        for param in params {
            query = bind_sqlite_param(query, param);
        }
        let result = query.execute(conn).await?;
        Ok(returning_key.then(|| result.last_insert_rowid()))
    }

    pub async fn fetch_all(
        conn: &mut SqliteConnection,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<JsonRow>> {
        let rows = if params.is_empty() {
            conn.fetch_all(sql).await?
        } else {
            let mut query = sqlx::query(sql);
            for param in params {
                query = bind_sqlite_param(query, param);
            }
            query.fetch_all(conn).await?
        };
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    pub async fn fetch_result_sets(
        conn: &mut SqliteConnection,
        sql: &str,
    ) -> DbResult<Vec<Vec<JsonRow>>> {
        collect_result_sets(conn.fetch_many(sql)).await
    }
}

pub(crate) mod mssql {
    use super::*;
    use crate::db::mssql::MssqlClient;
    use tiberius::Query;

    fn build<'q>(sql: &'q str, params: &'q [QueryParam]) -> Query<'q> {
        let mut query = Query::new(sql);
        for param in params {
            bind_mssql_param(&mut query, param);
        }
        query
    }

    pub async fn execute(
        conn: &mut MssqlClient,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<u64> {
        let result = build(sql, params).execute(conn).await?;
        Ok(result.rows_affected().iter().sum())
    }

    /// Run an INSERT. With `returning_key` the batch must end in a SELECT
    /// whose first column is the generated key.
    pub async fn insert(
        conn: &mut MssqlClient,
        sql: &str,
        params: &[QueryParam],
        returning_key: bool,
    ) -> DbResult<Option<i64>> {
        if !returning_key {
            execute(conn, sql, params).await?;
            return Ok(None);
        }
        let sets = build(sql, params).query(conn).await?.into_results().await?;
        let rows: Vec<JsonRow> = sets
            .last()
            .map(|rows| rows.iter().map(RowToJson::to_json_map).collect())
            .unwrap_or_default();
        Ok(first_column_as_key(&rows))
    }

    pub async fn fetch_all(
        conn: &mut MssqlClient,
        sql: &str,
        params: &[QueryParam],
    ) -> DbResult<Vec<JsonRow>> {
        let rows = build(sql, params)
            .query(conn)
            .await?
            .into_first_result()
            .await?;
        Ok(rows.iter().map(RowToJson::to_json_map).collect())
    }

    /// Statements that return no rows produce no set here.
    pub async fn fetch_result_sets(
        conn: &mut MssqlClient,
        sql: &str,
    ) -> DbResult<Vec<Vec<JsonRow>>> {
        let sets = conn.simple_query(sql).await?.into_results().await?;
        Ok(sets
            .iter()
            .map(|rows| rows.iter().map(RowToJson::to_json_map).collect())
            .collect())
    }
}
