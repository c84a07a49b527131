//! Data models for the database wrapper.
//!
//! This module re-exports the entity mapping traits and operation result types.

pub mod entity;
pub mod operation;

pub use entity::{Entity, IdentifiedEntity};
pub use operation::{
    BatchOptions, DbOperationResult, EntityOperation, OperationOptions, OperationOutcome,
};
