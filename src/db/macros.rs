//! Database dispatch macros for reducing code duplication.
//!
//! These macros generate the per-backend match arms while keeping call
//! sites linear. They expand at compile time with no runtime overhead.

/// Macro for generating database dispatch match arms over `DbPool`.
///
/// # Example
///
/// ```ignore
/// impl_db_dispatch!(pool, {
///     MySql(p) => do_mysql(p),
///     Postgres(p) => do_postgres(p),
///     SQLite(p) => do_sqlite(p),
///     MsSql(p) => do_mssql(p),
/// });
/// ```
#[macro_export]
macro_rules! impl_db_dispatch {
    ($pool:expr, { $($variant:ident($p:ident) => $body:expr),+ $(,)? }) => {
        match $pool {
            $(
                $crate::db::pool::DbPool::$variant($p) => $body,
            )+
        }
    };
}

/// Run `$body` against the connection selected by `$use_transaction`.
///
/// Inside the body `$conn` is a `&mut` backend connection (the open
/// transaction, or the autocommit connection checked out of its pool) and
/// `$backend` names the matching module in `db::backend`. A missing
/// transaction is renewed before the body runs.
///
/// ```ignore
/// with_connection!(self, use_transaction, |conn, backend| {
///     backend::execute(conn, sql, params).await
/// })
/// ```
macro_rules! with_connection {
    ($wrapper:expr, $use_transaction:expr, |$conn:ident, $backend:ident| $body:expr) => {{
        if $use_transaction {
            match $wrapper.attached_transaction().await? {
                $crate::db::transaction::DbTransaction::MySql(tx) => {
                    use $crate::db::backend::mysql as $backend;
                    let $conn = &mut **tx;
                    $body
                }
                $crate::db::transaction::DbTransaction::Postgres(tx) => {
                    use $crate::db::backend::postgres as $backend;
                    let $conn = &mut **tx;
                    $body
                }
                $crate::db::transaction::DbTransaction::SQLite(tx) => {
                    use $crate::db::backend::sqlite as $backend;
                    let $conn = &mut **tx;
                    $body
                }
                $crate::db::transaction::DbTransaction::MsSql(tx) => {
                    use $crate::db::backend::mssql as $backend;
                    let $conn = &mut **tx;
                    $body
                }
            }
        } else {
            match &$wrapper.connection {
                $crate::db::pool::DbPool::MySql(pool) => {
                    use $crate::db::backend::mysql as $backend;
                    let mut pooled = pool.acquire().await?;
                    let $conn = &mut *pooled;
                    $body
                }
                $crate::db::pool::DbPool::Postgres(pool) => {
                    use $crate::db::backend::postgres as $backend;
                    let mut pooled = pool.acquire().await?;
                    let $conn = &mut *pooled;
                    $body
                }
                $crate::db::pool::DbPool::SQLite(pool) => {
                    use $crate::db::backend::sqlite as $backend;
                    let mut pooled = pool.acquire().await?;
                    let $conn = &mut *pooled;
                    $body
                }
                $crate::db::pool::DbPool::MsSql(pool) => {
                    use $crate::db::backend::mssql as $backend;
                    let mut pooled = pool.acquire().await?;
                    let $conn = &mut *pooled;
                    $body
                }
            }
        }
    }};
}

pub(crate) use with_connection;
