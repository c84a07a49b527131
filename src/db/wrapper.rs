//! The dual-connection wrapper.
//!
//! A [`DbWrapper`] owns two connections to the same database. The
//! transactional connection always has a transaction attached: committing or
//! rolling back immediately begins the next one. The other connection runs
//! in autocommit mode. Every executor and CRUD call picks one of the two
//! through its `use_transaction` flag.

use crate::config::{WrapperConfig, WrapperOptions};
use crate::db::dialect::{SqlDialect, check_dialect};
use crate::db::macros::with_connection;
use crate::db::params::QueryParam;
use crate::db::pool::DbPool;
use crate::db::rows::JsonRow;
use crate::db::transaction::{DbTransaction, TransactionInfo};
use crate::error::{DbError, DbResult};
use chrono::{DateTime, Utc};
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Savepoint wrapped around each item of a continue-on-error batch.
pub(crate) const BATCH_SAVEPOINT: &str = "db_wrapper_batch_item";

pub struct DbWrapper {
    pub(crate) dialect: SqlDialect,
    instance_id: Uuid,
    /// Autocommit connection
    pub(crate) connection: DbPool,
    transactional_connection: DbPool,
    transaction: Option<DbTransaction>,
    options: WrapperOptions,
    transaction_started_at: Option<DateTime<Utc>>,
    transactions_begun: u64,
}

impl DbWrapper {
    /// Connect with default options.
    pub async fn connect(connection_string: &str, dialect: SqlDialect) -> DbResult<Self> {
        Self::connect_with_options(connection_string, dialect, WrapperOptions::default()).await
    }

    /// Open both connections and begin the first transaction.
    ///
    /// Fails when the connection string's scheme does not match `dialect` or
    /// when either connection cannot be opened.
    pub async fn connect_with_options(
        connection_string: &str,
        dialect: SqlDialect,
        options: WrapperOptions,
    ) -> DbResult<Self> {
        options.validate().map_err(DbError::configuration)?;
        check_dialect(connection_string, dialect)?;

        let connection = DbPool::connect(connection_string, dialect, &options).await?;
        let transactional_connection =
            DbPool::connect(connection_string, dialect, &options).await?;

        let mut wrapper = Self {
            dialect,
            instance_id: Uuid::new_v4(),
            connection,
            transactional_connection,
            transaction: None,
            options,
            transaction_started_at: None,
            transactions_begun: 0,
        };
        wrapper.renew_transaction().await?;

        info!(
            instance_id = %wrapper.instance_id,
            dialect = %dialect,
            "Database wrapper connected"
        );

        Ok(wrapper)
    }

    /// Connect using a name or connection string resolved through `config`.
    pub async fn from_config(
        config: &WrapperConfig,
        name_or_connection_string: &str,
        dialect: SqlDialect,
    ) -> DbResult<Self> {
        let connection_string = config.connection_string(name_or_connection_string)?;
        Self::connect_with_options(&connection_string, dialect, config.options.clone()).await
    }

    pub fn dialect(&self) -> SqlDialect {
        self.dialect
    }

    pub fn instance_id(&self) -> Uuid {
        self.instance_id
    }

    pub fn options(&self) -> &WrapperOptions {
        &self.options
    }

    pub fn transaction_info(&self) -> TransactionInfo {
        TransactionInfo {
            instance_id: self.instance_id,
            dialect: self.dialect,
            active: self.transaction.is_some(),
            started_at: self.transaction_started_at,
            renewals: self.transactions_begun.saturating_sub(1),
        }
    }

    /// Commit the attached transaction and begin a new one.
    ///
    /// Does nothing when no transaction is attached.
    pub async fn commit_changes(&mut self) -> DbResult<()> {
        self.finish_transaction(true).await
    }

    /// Roll back the attached transaction and begin a new one.
    ///
    /// Does nothing when no transaction is attached.
    pub async fn rollback_changes(&mut self) -> DbResult<()> {
        self.finish_transaction(false).await
    }

    async fn finish_transaction(&mut self, commit: bool) -> DbResult<()> {
        let Some(tx) = self.transaction.take() else {
            debug!(
                instance_id = %self.instance_id,
                "No transaction attached, nothing to finish"
            );
            return Ok(());
        };

        let finished = if commit {
            tx.commit().await
        } else {
            tx.rollback().await
        };

        match &finished {
            Ok(()) => debug!(
                instance_id = %self.instance_id,
                committed = commit,
                "Transaction finished"
            ),
            Err(e) => warn!(
                instance_id = %self.instance_id,
                committed = commit,
                error = %e,
                "Failed to finish transaction"
            ),
        }

        // A failed renewal leaves no transaction; the next transactional
        // call retries it.
        let renewed = self.renew_transaction().await;
        finished?;
        renewed
    }

    async fn renew_transaction(&mut self) -> DbResult<()> {
        let tx = DbTransaction::begin(&self.transactional_connection).await?;
        self.transaction = Some(tx);
        self.transaction_started_at = Some(Utc::now());
        self.transactions_begun += 1;

        debug!(
            instance_id = %self.instance_id,
            renewals = self.transactions_begun.saturating_sub(1),
            "Transaction begun"
        );
        Ok(())
    }

    /// The attached transaction, beginning one first if none is attached.
    pub(crate) async fn attached_transaction(&mut self) -> DbResult<&mut DbTransaction> {
        if self.transaction.is_none() {
            self.renew_transaction().await?;
        }
        let instance_id = self.instance_id.to_string();
        self.transaction
            .as_mut()
            .ok_or_else(|| DbError::transaction("No transaction attached", instance_id))
    }

    /// Roll back pending work and release both connections.
    pub async fn close(mut self) {
        if let Some(tx) = self.transaction.take() {
            if let Err(e) = tx.rollback().await {
                warn!(
                    instance_id = %self.instance_id,
                    error = %e,
                    "Failed to roll back pending work while closing"
                );
            }
        }
        self.connection.close().await;
        self.transactional_connection.close().await;
        info!(instance_id = %self.instance_id, "Database wrapper closed");
    }

    fn command_timeout(&self, requested: Option<Duration>) -> Duration {
        requested.unwrap_or_else(|| self.options.command_timeout_or_default())
    }

    // -------------------------------------------------------------------------
    // Statement primitives shared by the executor and the CRUD facade
    // -------------------------------------------------------------------------

    pub(crate) async fn run_execute(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        use_transaction: bool,
        requested_timeout: Option<Duration>,
    ) -> DbResult<u64> {
        let limit = self.command_timeout(requested_timeout);
        debug!(
            instance_id = %self.instance_id,
            sql = %sql,
            params = params.len(),
            use_transaction,
            "Executing statement"
        );
        with_timeout("statement execution", limit, self.execute_on(sql, params, use_transaction))
            .await
    }

    async fn execute_on(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        use_transaction: bool,
    ) -> DbResult<u64> {
        with_connection!(self, use_transaction, |conn, backend| {
            backend::execute(conn, sql, params).await
        })
    }

    pub(crate) async fn run_fetch(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        use_transaction: bool,
        requested_timeout: Option<Duration>,
    ) -> DbResult<Vec<JsonRow>> {
        let limit = self.command_timeout(requested_timeout);
        debug!(
            instance_id = %self.instance_id,
            sql = %sql,
            params = params.len(),
            use_transaction,
            "Executing query"
        );
        with_timeout("query execution", limit, self.fetch_on(sql, params, use_transaction)).await
    }

    async fn fetch_on(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        use_transaction: bool,
    ) -> DbResult<Vec<JsonRow>> {
        with_connection!(self, use_transaction, |conn, backend| {
            backend::fetch_all(conn, sql, params).await
        })
    }

    pub(crate) async fn run_insert(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        returning_key: bool,
        use_transaction: bool,
        requested_timeout: Option<Duration>,
    ) -> DbResult<Option<i64>> {
        let limit = self.command_timeout(requested_timeout);
        debug!(
            instance_id = %self.instance_id,
            sql = %sql,
            params = params.len(),
            use_transaction,
            "Executing insert"
        );
        with_timeout(
            "insert",
            limit,
            self.insert_on(sql, params, returning_key, use_transaction),
        )
        .await
    }

    async fn insert_on(
        &mut self,
        sql: &str,
        params: &[QueryParam],
        returning_key: bool,
        use_transaction: bool,
    ) -> DbResult<Option<i64>> {
        with_connection!(self, use_transaction, |conn, backend| {
            backend::insert(conn, sql, params, returning_key).await
        })
    }

    pub(crate) async fn run_fetch_result_sets(
        &mut self,
        sql: &str,
        use_transaction: bool,
        requested_timeout: Option<Duration>,
    ) -> DbResult<Vec<Vec<JsonRow>>> {
        let limit = self.command_timeout(requested_timeout);
        debug!(
            instance_id = %self.instance_id,
            sql = %sql,
            use_transaction,
            "Executing multi-statement query"
        );
        with_timeout(
            "multi-statement query",
            limit,
            self.fetch_result_sets_on(sql, use_transaction),
        )
        .await
    }

    async fn fetch_result_sets_on(
        &mut self,
        sql: &str,
        use_transaction: bool,
    ) -> DbResult<Vec<Vec<JsonRow>>> {
        with_connection!(self, use_transaction, |conn, backend| {
            backend::fetch_result_sets(conn, sql).await
        })
    }

    pub(crate) async fn savepoint(&mut self, name: &str) -> DbResult<()> {
        let sql = self.dialect.savepoint_sql(name);
        self.run_execute(&sql, &[], true, None).await.map(|_| ())
    }

    pub(crate) async fn rollback_to_savepoint(&mut self, name: &str) -> DbResult<()> {
        let sql = self.dialect.rollback_to_savepoint_sql(name);
        self.run_execute(&sql, &[], true, None).await.map(|_| ())
    }

    pub(crate) async fn release_savepoint(&mut self, name: &str) -> DbResult<()> {
        match self.dialect.release_savepoint_sql(name) {
            Some(sql) => self.run_execute(&sql, &[], true, None).await.map(|_| ()),
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for DbWrapper {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbWrapper")
            .field("instance_id", &self.instance_id)
            .field("dialect", &self.dialect)
            .field("transaction_active", &self.transaction.is_some())
            .field("options", &self.options)
            .finish()
    }
}

async fn with_timeout<T>(
    operation: &str,
    limit: Duration,
    future: impl Future<Output = DbResult<T>>,
) -> DbResult<T> {
    match timeout(limit, future).await {
        Ok(result) => result,
        Err(_) => Err(DbError::timeout(operation, limit.as_secs())),
    }
}
