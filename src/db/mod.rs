//! Database abstraction layer.
//!
//! This module provides database access functionality:
//! - The dual-connection wrapper and its transaction lifecycle
//! - Pass-through statement execution
//! - Entity CRUD and SQL statement building
//! - Dialect helpers and type mappings
//! - SQL Server connections over `tiberius`
//! - Database dispatch macros for reducing code duplication

mod backend;
pub mod crud;
pub mod dialect;
pub mod executor;
pub mod macros;
pub mod mssql;
pub mod params;
pub mod pool;
pub mod rows;
pub mod statement;
pub mod transaction;
pub mod wrapper;

pub use dialect::{SqlDialect, check_dialect, convert_to_sql_in};
pub use executor::{Command, CommandKind, ResultSets};
pub use params::{ColumnType, QueryParam};
pub use pool::DbPool;
pub use rows::JsonRow;
pub use statement::{Filter, Join, JoinKind, StatementOptions};
pub use transaction::{DbTransaction, TransactionInfo};
pub use wrapper::DbWrapper;
