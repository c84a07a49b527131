//! Entity CRUD on top of the wrapper.
//!
//! Each operation has a plain form taking a `use_transaction` flag and a
//! `*_with` form taking a closure that customizes [`StatementOptions`].
//! Whatever dialect the closure sets, statements are always rendered for
//! the wrapper's own dialect.

use crate::db::params::QueryParam;
use crate::db::statement::{self, Filter, StatementOptions};
use crate::db::wrapper::DbWrapper;
use crate::error::{DbError, DbResult};
use crate::models::entity::{Entity, column_params, from_row, key_param, to_columns};
use crate::models::operation::OperationOutcome;
use tracing::debug;

impl DbWrapper {
    /// Build statement options, then pin them to the wrapper's dialect.
    pub fn statement_options(&self, configure: impl FnOnce(&mut StatementOptions)) -> StatementOptions {
        let mut options = StatementOptions::default();
        configure(&mut options);
        options.dialect = Some(self.dialect);
        options
    }

    /// All entities matching `filter`, or the whole table without one.
    pub async fn find<T: Entity>(
        &mut self,
        filter: Option<Filter>,
        use_transaction: bool,
    ) -> DbResult<Vec<T>> {
        self.find_with(move |options| {
            options.use_transaction(use_transaction);
            if let Some(filter) = filter {
                options.filter(filter);
            }
        })
        .await
    }

    pub async fn find_with<T: Entity>(
        &mut self,
        configure: impl FnOnce(&mut StatementOptions),
    ) -> DbResult<Vec<T>> {
        let options = self.statement_options(configure);
        let statement = statement::select(self.dialect, T::TABLE, &options)?;
        let rows = self
            .run_fetch(
                &statement.sql,
                &statement.params,
                options.use_transaction,
                options.command_timeout,
            )
            .await?;

        debug!(entity = T::entity_name(), rows = rows.len(), "Entities found");
        rows.into_iter()
            .map(|row| from_row(T::entity_name(), row))
            .collect()
    }

    /// The stored row for the key carried by `keys`.
    pub async fn get<T: Entity>(&mut self, keys: &T, use_transaction: bool) -> DbResult<Option<T>> {
        let columns = to_columns(keys)?;
        let key = key_param::<T>(&columns)?;
        self.get_by_key::<T>(key, use_transaction).await
    }

    pub async fn get_by_key<T: Entity>(
        &mut self,
        key: impl Into<QueryParam>,
        use_transaction: bool,
    ) -> DbResult<Option<T>> {
        self.get_with::<T>(key, |options| {
            options.use_transaction(use_transaction);
        })
        .await
    }

    pub async fn get_with<T: Entity>(
        &mut self,
        key: impl Into<QueryParam>,
        configure: impl FnOnce(&mut StatementOptions),
    ) -> DbResult<Option<T>> {
        let options = self.statement_options(configure);
        let statement = statement::select_by_key(self.dialect, T::TABLE, T::KEY_COLUMN, key.into());
        let rows = self
            .run_fetch(
                &statement.sql,
                &statement.params,
                options.use_transaction,
                options.command_timeout,
            )
            .await?;

        rows.into_iter()
            .next()
            .map(|row| from_row(T::entity_name(), row))
            .transpose()
    }

    /// Number of rows matching `filter`.
    pub async fn count<T: Entity>(
        &mut self,
        filter: Option<Filter>,
        use_transaction: bool,
    ) -> DbResult<u64> {
        self.count_with::<T>(move |options| {
            options.use_transaction(use_transaction);
            if let Some(filter) = filter {
                options.filter(filter);
            }
        })
        .await
    }

    pub async fn count_with<T: Entity>(
        &mut self,
        configure: impl FnOnce(&mut StatementOptions),
    ) -> DbResult<u64> {
        let options = self.statement_options(configure);
        let statement = statement::count(self.dialect, T::TABLE, &options)?;
        let rows = self
            .run_fetch(
                &statement.sql,
                &statement.params,
                options.use_transaction,
                options.command_timeout,
            )
            .await?;

        rows.first()
            .and_then(|row| row.get("total"))
            .and_then(|total| total.as_u64())
            .ok_or_else(|| DbError::internal(format!("COUNT over '{}' returned no total", T::TABLE)))
    }

    /// Insert `entity`, storing the generated key back into it.
    pub async fn insert<T: Entity>(&mut self, entity: &mut T, use_transaction: bool) -> DbResult<()> {
        self.insert_with(entity, |options| {
            options.use_transaction(use_transaction);
        })
        .await
    }

    pub async fn insert_with<T: Entity>(
        &mut self,
        entity: &mut T,
        configure: impl FnOnce(&mut StatementOptions),
    ) -> DbResult<()> {
        let options = self.statement_options(configure);
        let generated = T::GENERATED_KEY.then_some(T::KEY_COLUMN);
        let columns = column_params::<T>(to_columns(entity)?, generated)?;
        let statement = statement::insert(self.dialect, T::TABLE, columns, generated);

        let key = self
            .run_insert(
                &statement.sql,
                &statement.params,
                generated.is_some(),
                options.use_transaction,
                options.command_timeout,
            )
            .await?;

        if let Some(key) = key {
            entity.set_generated_key(key);
        }
        Ok(())
    }

    /// Update every column of the row matching the entity's key.
    pub async fn update<T: Entity>(
        &mut self,
        entity: &T,
        use_transaction: bool,
    ) -> DbResult<OperationOutcome> {
        self.update_with(entity, |options| {
            options.use_transaction(use_transaction);
        })
        .await
    }

    pub async fn update_with<T: Entity>(
        &mut self,
        entity: &T,
        configure: impl FnOnce(&mut StatementOptions),
    ) -> DbResult<OperationOutcome> {
        let options = self.statement_options(configure);
        let columns = to_columns(entity)?;
        let key = key_param::<T>(&columns)?;
        let columns = column_params::<T>(columns, Some(T::KEY_COLUMN))?;
        let statement = statement::update(self.dialect, T::TABLE, T::KEY_COLUMN, key, columns)?;

        let affected = self
            .run_execute(
                &statement.sql,
                &statement.params,
                options.use_transaction,
                options.command_timeout,
            )
            .await?;
        Ok(OperationOutcome::from_rows_affected(affected))
    }

    /// Delete the row matching the entity's key.
    pub async fn delete<T: Entity>(
        &mut self,
        entity: &T,
        use_transaction: bool,
    ) -> DbResult<OperationOutcome> {
        self.delete_with(entity, |options| {
            options.use_transaction(use_transaction);
        })
        .await
    }

    pub async fn delete_with<T: Entity>(
        &mut self,
        entity: &T,
        configure: impl FnOnce(&mut StatementOptions),
    ) -> DbResult<OperationOutcome> {
        let options = self.statement_options(configure);
        let columns = to_columns(entity)?;
        let key = key_param::<T>(&columns)?;
        let statement = statement::delete(self.dialect, T::TABLE, T::KEY_COLUMN, key);

        let affected = self
            .run_execute(
                &statement.sql,
                &statement.params,
                options.use_transaction,
                options.command_timeout,
            )
            .await?;
        Ok(OperationOutcome::from_rows_affected(affected))
    }

    /// Copy every non-key column of `values` onto all rows matching `filter`.
    ///
    /// Without a filter every row of the table is updated.
    pub async fn bulk_update<T: Entity>(
        &mut self,
        values: &T,
        filter: Option<Filter>,
        use_transaction: bool,
    ) -> DbResult<u64> {
        self.bulk_update_with(values, move |options| {
            options.use_transaction(use_transaction);
            if let Some(filter) = filter {
                options.filter(filter);
            }
        })
        .await
    }

    pub async fn bulk_update_with<T: Entity>(
        &mut self,
        values: &T,
        configure: impl FnOnce(&mut StatementOptions),
    ) -> DbResult<u64> {
        let options = self.statement_options(configure);
        let columns = column_params::<T>(to_columns(values)?, Some(T::KEY_COLUMN))?;
        let statement =
            statement::bulk_update(self.dialect, T::TABLE, columns, options.filter.as_ref())?;

        self.run_execute(
            &statement.sql,
            &statement.params,
            options.use_transaction,
            options.command_timeout,
        )
        .await
    }

    /// Delete all rows matching `filter`, or every row without one.
    pub async fn bulk_delete<T: Entity>(
        &mut self,
        filter: Option<Filter>,
        use_transaction: bool,
    ) -> DbResult<u64> {
        self.bulk_delete_with::<T>(move |options| {
            options.use_transaction(use_transaction);
            if let Some(filter) = filter {
                options.filter(filter);
            }
        })
        .await
    }

    pub async fn bulk_delete_with<T: Entity>(
        &mut self,
        configure: impl FnOnce(&mut StatementOptions),
    ) -> DbResult<u64> {
        let options = self.statement_options(configure);
        let statement = statement::bulk_delete(self.dialect, T::TABLE, options.filter.as_ref())?;

        self.run_execute(
            &statement.sql,
            &statement.params,
            options.use_transaction,
            options.command_timeout,
        )
        .await
    }
}
