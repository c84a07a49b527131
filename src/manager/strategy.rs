//! The primitives the operation manager runs for each entity.

use crate::db::wrapper::DbWrapper;
use crate::error::DbResult;
use crate::models::entity::Entity;
use crate::models::operation::OperationOutcome;
use std::future::Future;

/// Insert, update and delete primitives used by the operation manager.
///
/// The manager commits and rolls back around these calls, so
/// implementations should run inside the wrapper's attached transaction.
pub trait EntityOperations: Send + Sync {
    fn insert<T: Entity>(
        &self,
        wrapper: &mut DbWrapper,
        entity: &mut T,
    ) -> impl Future<Output = DbResult<OperationOutcome>> + Send;

    fn update<T: Entity>(
        &self,
        wrapper: &mut DbWrapper,
        entity: &T,
    ) -> impl Future<Output = DbResult<OperationOutcome>> + Send;

    fn delete<T: Entity>(
        &self,
        wrapper: &mut DbWrapper,
        entity: &T,
    ) -> impl Future<Output = DbResult<OperationOutcome>> + Send;
}

/// Runs operations through the wrapper's CRUD facade, transactionally.
#[derive(Debug, Clone, Copy, Default)]
pub struct FacadeOperations;

impl EntityOperations for FacadeOperations {
    async fn insert<T: Entity>(
        &self,
        wrapper: &mut DbWrapper,
        entity: &mut T,
    ) -> DbResult<OperationOutcome> {
        wrapper.insert(entity, true).await?;
        Ok(OperationOutcome::Applied)
    }

    async fn update<T: Entity>(
        &self,
        wrapper: &mut DbWrapper,
        entity: &T,
    ) -> DbResult<OperationOutcome> {
        wrapper.update(entity, true).await
    }

    async fn delete<T: Entity>(
        &self,
        wrapper: &mut DbWrapper,
        entity: &T,
    ) -> DbResult<OperationOutcome> {
        wrapper.delete(entity, true).await
    }
}
