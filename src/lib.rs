//! DB Wrapper Library
//!
//! A thin wrapper over `sqlx` for PostgreSQL, MySQL and SQLite, and over
//! `tiberius` for SQL Server, that keeps two connections per instance: one with a transaction always attached and one in
//! autocommit mode. On top of it sit pass-through statement execution, entity
//! CRUD, and an operation manager that adds transaction handling, logging and
//! duplicate-name checks to single and batch operations.

pub mod config;
pub mod db;
pub mod error;
pub mod manager;
pub mod models;

pub use config::{WrapperConfig, WrapperOptions};
pub use db::{
    ColumnType, Command, DbWrapper, Filter, QueryParam, ResultSets, SqlDialect, StatementOptions,
};
pub use error::{DbError, DbResult};
pub use manager::{DbWrapperSqlManager, EntityOperations, FacadeOperations};
pub use models::{
    BatchOptions, DbOperationResult, Entity, EntityOperation, IdentifiedEntity, OperationOptions,
    OperationOutcome,
};
