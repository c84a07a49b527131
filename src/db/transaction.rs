//! The transaction attached to a wrapper's transactional connection.

use crate::db::dialect::SqlDialect;
use crate::db::mssql::MssqlTransaction;
use crate::db::pool::DbPool;
use crate::error::{DbError, DbResult};
use crate::impl_db_dispatch;
use chrono::{DateTime, Utc};
use serde::Serialize;
use sqlx::{MySql, Postgres, Sqlite, Transaction};
use uuid::Uuid;

/// Database-specific transaction wrapper.
///
/// Each variant owns its connection until committed or rolled back, so the
/// transactional pool has nothing left to hand out while one is attached.
pub enum DbTransaction {
    /// MySQL transaction
    MySql(Transaction<'static, MySql>),
    /// PostgreSQL transaction
    Postgres(Transaction<'static, Postgres>),
    /// SQLite transaction
    SQLite(Transaction<'static, Sqlite>),
    /// SQL Server transaction
    MsSql(MssqlTransaction),
}

impl DbTransaction {
    /// Begin a transaction on the pool's connection.
    pub async fn begin(pool: &DbPool) -> DbResult<Self> {
        let tx = impl_db_dispatch!(pool, {
            MySql(p) => DbTransaction::MySql(p.begin().await?),
            Postgres(p) => DbTransaction::Postgres(p.begin().await?),
            SQLite(p) => DbTransaction::SQLite(p.begin().await?),
            MsSql(p) => DbTransaction::MsSql(MssqlTransaction::begin(p).await?),
        });
        Ok(tx)
    }

    /// Get the dialect for this transaction.
    pub fn dialect(&self) -> SqlDialect {
        match self {
            DbTransaction::MySql(_) => SqlDialect::MySql,
            DbTransaction::Postgres(_) => SqlDialect::PostgreSql,
            DbTransaction::SQLite(_) => SqlDialect::Sqlite,
            DbTransaction::MsSql(_) => SqlDialect::MsSql,
        }
    }

    /// Commit the transaction.
    pub async fn commit(self) -> DbResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::Postgres(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::SQLite(tx) => tx.commit().await.map_err(DbError::from),
            DbTransaction::MsSql(tx) => tx.commit().await,
        }
    }

    /// Rollback the transaction.
    pub async fn rollback(self) -> DbResult<()> {
        match self {
            DbTransaction::MySql(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::Postgres(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::SQLite(tx) => tx.rollback().await.map_err(DbError::from),
            DbTransaction::MsSql(tx) => tx.rollback().await,
        }
    }
}

impl std::fmt::Debug for DbTransaction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("DbTransaction").field(&self.dialect()).finish()
    }
}

/// Snapshot of a wrapper's transaction state.
#[derive(Debug, Clone, Serialize)]
pub struct TransactionInfo {
    /// Identifies the wrapper instance in logs and errors
    pub instance_id: Uuid,
    pub dialect: SqlDialect,
    /// False only between a failed finish and the next renewal
    pub active: bool,
    /// When the current transaction started (absolute time)
    pub started_at: Option<DateTime<Utc>>,
    /// Number of transactions begun after the first one
    pub renewals: u64,
}
