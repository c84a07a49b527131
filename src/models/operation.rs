//! Operation results and options for the operation manager.

use serde::Serialize;

/// Outcome of a single insert/update/delete primitive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum OperationOutcome {
    /// The statement changed the row
    Applied,
    /// The statement ran but matched nothing
    NoEffect,
}

impl OperationOutcome {
    pub fn from_rows_affected(rows_affected: u64) -> Self {
        if rows_affected > 0 {
            Self::Applied
        } else {
            Self::NoEffect
        }
    }

    pub fn is_applied(&self) -> bool {
        matches!(self, Self::Applied)
    }
}

/// The entity an operation ran on, and whether it succeeded.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DbOperationResult<T> {
    entity: T,
    succeeded: bool,
}

impl<T> DbOperationResult<T> {
    pub fn new(entity: T, succeeded: bool) -> Self {
        Self { entity, succeeded }
    }

    /// The entity, including any key generated by an insert.
    pub fn entity(&self) -> &T {
        &self.entity
    }

    pub fn succeeded(&self) -> bool {
        self.succeeded
    }

    pub fn into_entity(self) -> T {
        self.entity
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntityOperation {
    Insert,
    Update,
    Delete,
}

impl EntityOperation {
    pub fn name(&self) -> &'static str {
        match self {
            Self::Insert => "Insert",
            Self::Update => "Update",
            Self::Delete => "Delete",
        }
    }
}

impl std::fmt::Display for EntityOperation {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Options for single-entity operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct OperationOptions {
    /// Commit on success and roll back on failure
    pub manage_transaction: bool,
    /// Return the error instead of a failed result
    pub throw_on_error: bool,
}

impl Default for OperationOptions {
    fn default() -> Self {
        Self {
            manage_transaction: true,
            throw_on_error: true,
        }
    }
}

impl OperationOptions {
    pub fn manage_transaction(mut self, manage_transaction: bool) -> Self {
        self.manage_transaction = manage_transaction;
        self
    }

    pub fn throw_on_error(mut self, throw_on_error: bool) -> Self {
        self.throw_on_error = throw_on_error;
        self
    }
}

/// Options for batch operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchOptions {
    /// Reject the batch when names repeat within it or already exist
    pub check_duplicate_names: bool,
    pub manage_transaction: bool,
    pub throw_on_error: bool,
}

impl Default for BatchOptions {
    fn default() -> Self {
        Self {
            check_duplicate_names: true,
            manage_transaction: true,
            throw_on_error: true,
        }
    }
}

impl BatchOptions {
    /// Defaults for deletes, which skip the duplicate-name check.
    pub fn deletion() -> Self {
        Self {
            check_duplicate_names: false,
            ..Self::default()
        }
    }

    pub fn check_duplicate_names(mut self, check: bool) -> Self {
        self.check_duplicate_names = check;
        self
    }

    pub fn manage_transaction(mut self, manage_transaction: bool) -> Self {
        self.manage_transaction = manage_transaction;
        self
    }

    pub fn throw_on_error(mut self, throw_on_error: bool) -> Self {
        self.throw_on_error = throw_on_error;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_outcome_from_rows_affected() {
        assert_eq!(OperationOutcome::from_rows_affected(0), OperationOutcome::NoEffect);
        assert!(OperationOutcome::from_rows_affected(2).is_applied());
    }

    #[test]
    fn test_option_defaults() {
        let single = OperationOptions::default();
        assert!(single.manage_transaction && single.throw_on_error);

        let batch = BatchOptions::default();
        assert!(batch.check_duplicate_names);
        assert!(!BatchOptions::deletion().check_duplicate_names);
        assert!(!batch.throw_on_error(false).throw_on_error);
    }

    #[test]
    fn test_result_accessors() {
        let result = DbOperationResult::new("row", false);
        assert!(!result.succeeded());
        assert_eq!(*result.entity(), "row");
        assert_eq!(result.into_entity(), "row");
    }
}
