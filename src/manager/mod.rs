//! Operation manager.
//!
//! [`DbWrapperSqlManager`] wraps single and batch insert/update/delete calls
//! with uniform transaction handling and logging:
//!
//! - one debug summary per call with the elapsed time and a
//!   `POSITIVE`/`NEGATIVE` result
//! - commit on success and roll back on failure when it manages the
//!   transaction
//! - failures either returned or swallowed into the result flag
//!
//! The primitives themselves come from an [`EntityOperations`] strategy.

mod duplicates;
pub mod strategy;

pub use strategy::{EntityOperations, FacadeOperations};

use crate::db::dialect::{SqlDialect, convert_to_sql_in};
use crate::db::statement::Filter;
use crate::db::wrapper::{BATCH_SAVEPOINT, DbWrapper};
use crate::error::{DbError, DbResult};
use crate::models::entity::{Entity, IdentifiedEntity};
use crate::models::operation::{BatchOptions, DbOperationResult, EntityOperation, OperationOptions};
use duplicates::check_duplicate_names;
use std::ops::{Deref, DerefMut};
use std::time::Instant;
use tracing::{debug, error, warn};

pub struct DbWrapperSqlManager<S = FacadeOperations> {
    wrapper: DbWrapper,
    operations: S,
}

impl DbWrapperSqlManager<FacadeOperations> {
    pub fn new(wrapper: DbWrapper) -> Self {
        Self::with_operations(wrapper, FacadeOperations)
    }

    /// Connect a wrapper with default options and manage it.
    pub async fn connect(connection_string: &str, dialect: SqlDialect) -> DbResult<Self> {
        Ok(Self::new(DbWrapper::connect(connection_string, dialect).await?))
    }
}

impl<S: EntityOperations> DbWrapperSqlManager<S> {
    pub fn with_operations(wrapper: DbWrapper, operations: S) -> Self {
        Self {
            wrapper,
            operations,
        }
    }

    pub fn operations(&self) -> &S {
        &self.operations
    }

    pub fn into_wrapper(self) -> DbWrapper {
        self.wrapper
    }

    pub async fn insert_entity<T: Entity>(
        &mut self,
        entity: T,
        options: OperationOptions,
    ) -> DbResult<DbOperationResult<T>> {
        self.execute_db_operation(EntityOperation::Insert, "insert_entity", entity, options)
            .await
    }

    pub async fn update_entity<T: Entity>(
        &mut self,
        entity: T,
        options: OperationOptions,
    ) -> DbResult<DbOperationResult<T>> {
        self.execute_db_operation(EntityOperation::Update, "update_entity", entity, options)
            .await
    }

    pub async fn delete_entity<T: Entity>(
        &mut self,
        entity: T,
        options: OperationOptions,
    ) -> DbResult<DbOperationResult<T>> {
        self.execute_db_operation(EntityOperation::Delete, "delete_entity", entity, options)
            .await
    }

    pub async fn insert_entities<T: Entity>(
        &mut self,
        entities: Vec<T>,
        options: BatchOptions,
    ) -> DbResult<Vec<DbOperationResult<T>>> {
        self.execute_db_operations(EntityOperation::Insert, "insert_entities", entities, options)
            .await
    }

    pub async fn update_entities<T: Entity>(
        &mut self,
        entities: Vec<T>,
        options: BatchOptions,
    ) -> DbResult<Vec<DbOperationResult<T>>> {
        self.execute_db_operations(EntityOperation::Update, "update_entities", entities, options)
            .await
    }

    /// Pass [`BatchOptions::deletion`] to skip the duplicate-name check.
    pub async fn delete_entities<T: Entity>(
        &mut self,
        entities: Vec<T>,
        options: BatchOptions,
    ) -> DbResult<Vec<DbOperationResult<T>>> {
        self.execute_db_operations(EntityOperation::Delete, "delete_entities", entities, options)
            .await
    }

    /// Delete exactly the rows with the given ids.
    ///
    /// Returns `false` when the statement fails or deletes a different number
    /// of rows than ids were given; the deletion is then rolled back when the
    /// transaction is managed here.
    pub async fn bulk_delete_entities_by_id<T: Entity>(
        &mut self,
        ids: &[i64],
        manage_transaction: bool,
    ) -> bool {
        self.delete_ids::<T>("bulk_delete_entities_by_id", ids, manage_transaction)
            .await
    }

    /// [`DbWrapperSqlManager::bulk_delete_entities_by_id`] over the entities' ids.
    pub async fn bulk_delete_entities<T: IdentifiedEntity>(
        &mut self,
        entities: &[T],
        manage_transaction: bool,
    ) -> bool {
        let ids: Vec<i64> = entities.iter().map(IdentifiedEntity::id).collect();
        self.delete_ids::<T>("bulk_delete_entities", &ids, manage_transaction)
            .await
    }

    /// Run one operation with transaction handling and logging.
    pub async fn execute_db_operation<T: Entity>(
        &mut self,
        operation: EntityOperation,
        method: &str,
        mut entity: T,
        options: OperationOptions,
    ) -> DbResult<DbOperationResult<T>> {
        let function = describe(method, T::entity_name());
        let start = Instant::now();

        let mut outcome = self.apply(operation, &mut entity).await;
        if outcome.is_ok() && options.manage_transaction {
            outcome = self.wrapper.commit_changes().await;
        }

        let succeeded = match outcome {
            Ok(()) => true,
            Err(err) => {
                self.handle_sql_error::<T>(&err, &function, options.manage_transaction)
                    .await;
                if options.throw_on_error {
                    log_executed_function(&function, start, false);
                    return Err(err);
                }
                false
            }
        };

        log_executed_function(&function, start, succeeded);
        Ok(DbOperationResult::new(entity, succeeded))
    }

    /// Run one operation per entity, in order, committing once at the end.
    pub async fn execute_db_operations<T: Entity>(
        &mut self,
        operation: EntityOperation,
        method: &str,
        entities: Vec<T>,
        options: BatchOptions,
    ) -> DbResult<Vec<DbOperationResult<T>>> {
        if entities.is_empty() {
            return Ok(Vec::new());
        }

        let function = describe(method, T::entity_name());
        if options.check_duplicate_names {
            check_duplicate_names(&mut self.wrapper, &entities).await?;
        }

        let start = Instant::now();
        let mut results = Vec::with_capacity(entities.len());

        for mut entity in entities {
            let outcome = if options.throw_on_error {
                self.apply(operation, &mut entity).await
            } else {
                self.apply_isolated(operation, &mut entity).await
            };

            match outcome {
                Ok(()) => results.push(DbOperationResult::new(entity, true)),
                Err(err) => {
                    let serialized = serde_json::to_string(&entity).unwrap_or_default();
                    if options.throw_on_error {
                        self.handle_sql_error::<T>(&err, &function, options.manage_transaction)
                            .await;
                        log_executed_function(&function, start, false);
                        return Err(DbError::batch_operation(function, serialized, err));
                    }

                    error!(
                        error = %err,
                        function = %function,
                        entity = %serialized,
                        "Batch item failed, continuing with the next one"
                    );
                    results.push(DbOperationResult::new(entity, false));
                }
            }
        }

        if options.manage_transaction {
            if let Err(err) = self.wrapper.commit_changes().await {
                self.handle_sql_error::<T>(&err, &function, true).await;
                log_executed_function(&function, start, false);
                if options.throw_on_error {
                    return Err(err);
                }
                return Ok(results
                    .into_iter()
                    .map(|result| DbOperationResult::new(result.into_entity(), false))
                    .collect());
            }
        }

        let all_succeeded = results.iter().all(DbOperationResult::succeeded);
        log_executed_function(&function, start, all_succeeded);
        Ok(results)
    }

    /// Run the strategy primitive, turning a no-effect outcome into an error.
    async fn apply<T: Entity>(
        &mut self,
        operation: EntityOperation,
        entity: &mut T,
    ) -> DbResult<()> {
        let outcome = match operation {
            EntityOperation::Insert => self.operations.insert(&mut self.wrapper, entity).await?,
            EntityOperation::Update => self.operations.update(&mut self.wrapper, entity).await?,
            EntityOperation::Delete => self.operations.delete(&mut self.wrapper, entity).await?,
        };

        if outcome.is_applied() {
            Ok(())
        } else {
            Err(DbError::operation_returned_false(operation.name()))
        }
    }

    /// [`Self::apply`] inside a savepoint, so a failure leaves no partial effects.
    async fn apply_isolated<T: Entity>(
        &mut self,
        operation: EntityOperation,
        entity: &mut T,
    ) -> DbResult<()> {
        self.wrapper.savepoint(BATCH_SAVEPOINT).await?;

        match self.apply(operation, entity).await {
            Ok(()) => self.wrapper.release_savepoint(BATCH_SAVEPOINT).await,
            Err(err) => {
                if let Err(rollback_err) = self.wrapper.rollback_to_savepoint(BATCH_SAVEPOINT).await
                {
                    warn!(
                        error = %rollback_err,
                        "Failed to roll back to savepoint after a batch item failed"
                    );
                }
                Err(err)
            }
        }
    }

    async fn delete_ids<T: Entity>(
        &mut self,
        method: &str,
        ids: &[i64],
        manage_transaction: bool,
    ) -> bool {
        let function = describe(method, T::entity_name());
        let start = Instant::now();

        let Some(in_list) = convert_to_sql_in(ids) else {
            log_executed_function(&function, start, true);
            return true;
        };

        let filter = Filter::new(format!("[{}] {in_list}", T::KEY_COLUMN));
        let expected = ids.len() as u64;

        let outcome = match self.wrapper.bulk_delete::<T>(Some(filter), true).await {
            Ok(deleted) if deleted != expected => {
                Err(DbError::count_mismatch(T::entity_name(), expected, deleted))
            }
            Ok(_) if manage_transaction => self.wrapper.commit_changes().await,
            Ok(_) => Ok(()),
            Err(err) => Err(err),
        };

        let succeeded = match outcome {
            Ok(()) => true,
            Err(err) => {
                self.handle_sql_error::<T>(&err, &function, manage_transaction)
                    .await;
                false
            }
        };

        log_executed_function(&function, start, succeeded);
        succeeded
    }

    /// Log a failure and roll back when managing the transaction.
    ///
    /// A failed rollback is logged; the caller keeps the original error.
    async fn handle_sql_error<T: Entity>(
        &mut self,
        err: &DbError,
        function: &str,
        manage_transaction: bool,
    ) {
        error!(
            error = %err,
            function = %function,
            entity_type = T::entity_name(),
            "Database operation failed"
        );

        if manage_transaction {
            if let Err(rollback_err) = self.wrapper.rollback_changes().await {
                error!(
                    error = %rollback_err,
                    function = %function,
                    "Rollback after a failed operation also failed"
                );
            }
        }
    }
}

impl<S> Deref for DbWrapperSqlManager<S> {
    type Target = DbWrapper;

    fn deref(&self) -> &Self::Target {
        &self.wrapper
    }
}

impl<S> DerefMut for DbWrapperSqlManager<S> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        &mut self.wrapper
    }
}

impl<S: std::fmt::Debug> std::fmt::Debug for DbWrapperSqlManager<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DbWrapperSqlManager")
            .field("wrapper", &self.wrapper)
            .field("operations", &self.operations)
            .finish()
    }
}

/// `"{method} - {entity}"`, the name used in logs and batch errors.
fn describe(method: &str, entity: &str) -> String {
    format!("{method} - {entity}")
}

fn log_executed_function(function: &str, start: Instant, succeeded: bool) {
    let result = if succeeded { "POSITIVE" } else { "NEGATIVE" };
    debug!(
        function = %function,
        milliseconds = start.elapsed().as_millis() as u64,
        result,
        "Database operation executed"
    );
}
