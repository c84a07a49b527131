//! Error types for the database wrapper.
//!
//! All fallible operations return [`DbResult`]. Driver errors are mapped into
//! [`DbError`] with a suggestion attached where one helps, and the manager
//! layer adds its own variants for duplicate names, count mismatches and
//! failed batch items.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum DbError {
    #[error("Connection failed: {message}")]
    Connection { message: String, suggestion: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Database error: {message}")]
    Database {
        message: String,
        /// e.g., "42P01" for undefined table
        sql_state: Option<String>,
        suggestion: String,
    },

    #[error("Transaction error: {message} (instance: {instance_id})")]
    Transaction { message: String, instance_id: String },

    #[error("Timeout: {operation} exceeded {elapsed_secs}s")]
    Timeout {
        operation: String,
        elapsed_secs: u64,
    },

    #[error("Invalid input: {message}")]
    InvalidInput { message: String },

    #[error("Mapping error for {entity}: {message}")]
    Mapping { entity: String, message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },

    #[error("{operation} result was false but didn't throw exception")]
    OperationReturnedFalse { operation: String },

    #[error(
        "There's more than one element with the same value in the '{property}' attribute. {}",
        duplicate_values_message(.property, .values)
    )]
    CreatingDuplicateEntry {
        property: String,
        values: Vec<String>,
    },

    #[error(
        "Error trying to create entities that already exists, looking at the '{property}' attribute. {}",
        duplicate_values_message(.property, .values)
    )]
    EntityAlreadyExists {
        property: String,
        values: Vec<String>,
    },

    #[error("Trying to delete {expected} {entity}, but instead only {actual} were deleted")]
    CountMismatch {
        entity: String,
        expected: u64,
        actual: u64,
    },

    #[error("Error on {description} --> {entity}")]
    BatchOperation {
        description: String,
        /// Serialized form of the entity that failed
        entity: String,
        #[source]
        source: Box<DbError>,
    },
}

fn duplicate_values_message(property: &str, values: &[String]) -> String {
    format!(
        "Values in '{}' must be unique. The duplicated values are: ['{}']",
        property,
        values.join("', '")
    )
}

impl DbError {
    /// Create a connection error with a helpful suggestion.
    pub fn connection(message: impl Into<String>, suggestion: impl Into<String>) -> Self {
        Self::Connection {
            message: message.into(),
            suggestion: suggestion.into(),
        }
    }

    /// Create a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    /// Create a database error with optional SQL state.
    pub fn database(
        message: impl Into<String>,
        sql_state: Option<String>,
        suggestion: impl Into<String>,
    ) -> Self {
        Self::Database {
            message: message.into(),
            sql_state,
            suggestion: suggestion.into(),
        }
    }

    /// Create a transaction error.
    pub fn transaction(message: impl Into<String>, instance_id: impl Into<String>) -> Self {
        Self::Transaction {
            message: message.into(),
            instance_id: instance_id.into(),
        }
    }

    /// Create a timeout error.
    pub fn timeout(operation: impl Into<String>, elapsed_secs: u64) -> Self {
        Self::Timeout {
            operation: operation.into(),
            elapsed_secs,
        }
    }

    /// Create an invalid input error.
    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::InvalidInput {
            message: message.into(),
        }
    }

    /// Create a mapping error for an entity type.
    pub fn mapping(entity: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Mapping {
            entity: entity.into(),
            message: message.into(),
        }
    }

    /// Create an internal error.
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn operation_returned_false(operation: impl Into<String>) -> Self {
        Self::OperationReturnedFalse {
            operation: operation.into(),
        }
    }

    pub fn creating_duplicate_entry(property: impl Into<String>, values: Vec<String>) -> Self {
        Self::CreatingDuplicateEntry {
            property: property.into(),
            values,
        }
    }

    pub fn entity_already_exists(property: impl Into<String>, values: Vec<String>) -> Self {
        Self::EntityAlreadyExists {
            property: property.into(),
            values,
        }
    }

    pub fn count_mismatch(entity: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::CountMismatch {
            entity: entity.into(),
            expected,
            actual,
        }
    }

    /// Wrap the failure of a single batch item.
    pub fn batch_operation(
        description: impl Into<String>,
        entity: impl Into<String>,
        source: DbError,
    ) -> Self {
        Self::BatchOperation {
            description: description.into(),
            entity: entity.into(),
            source: Box::new(source),
        }
    }

    /// Get the suggestion for this error, if available.
    pub fn suggestion(&self) -> Option<&str> {
        match self {
            Self::Connection { suggestion, .. } => Some(suggestion),
            Self::Database { suggestion, .. } => Some(suggestion),
            Self::BatchOperation { source, .. } => source.suggestion(),
            _ => None,
        }
    }

    /// Check if this error is retryable.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Connection { .. } | Self::Timeout { .. } => true,
            Self::BatchOperation { source, .. } => source.is_retryable(),
            _ => false,
        }
    }

    /// SQLSTATE reported by the driver, if any.
    pub fn sql_state(&self) -> Option<&str> {
        match self {
            Self::Database { sql_state, .. } => sql_state.as_deref(),
            Self::BatchOperation { source, .. } => source.sql_state(),
            _ => None,
        }
    }
}

/// Convert sqlx errors to DbError.
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::Configuration(msg) => DbError::connection(
                msg.to_string(),
                "Check the connection string format and credentials",
            ),
            sqlx::Error::Database(db_err) => {
                let code = db_err.code().map(|c| c.to_string());
                DbError::database(
                    db_err.message(),
                    code,
                    "Check the SQL syntax and referenced objects",
                )
            }
            sqlx::Error::RowNotFound => DbError::database(
                "No rows returned",
                None,
                "Verify the query conditions match existing data",
            ),
            sqlx::Error::PoolTimedOut => DbError::timeout("connection acquire", 30),
            sqlx::Error::PoolClosed => {
                DbError::connection("Connection pool is closed", "Reconnect to the database")
            }
            sqlx::Error::Io(io_err) => DbError::connection(
                format!("I/O error: {}", io_err),
                "Check network connectivity and database server status",
            ),
            sqlx::Error::Tls(tls_err) => DbError::connection(
                format!("TLS error: {}", tls_err),
                "Verify TLS configuration and certificates",
            ),
            sqlx::Error::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            sqlx::Error::TypeNotFound { type_name } => {
                DbError::internal(format!("Type not found: {}", type_name))
            }
            sqlx::Error::ColumnNotFound(col) => {
                DbError::internal(format!("Column not found: {}", col))
            }
            sqlx::Error::ColumnIndexOutOfBounds { index, len } => DbError::internal(format!(
                "Column index {} out of bounds (len: {})",
                index, len
            )),
            sqlx::Error::ColumnDecode { index, source } => {
                DbError::internal(format!("Failed to decode column {}: {}", index, source))
            }
            sqlx::Error::Decode(source) => DbError::internal(format!("Decode error: {}", source)),
            sqlx::Error::WorkerCrashed => DbError::internal("Database worker crashed"),
            _ => DbError::internal(format!("Unknown database error: {}", err)),
        }
    }
}

/// Convert SQL Server driver errors to DbError.
impl From<tiberius::error::Error> for DbError {
    fn from(err: tiberius::error::Error) -> Self {
        use tiberius::error::Error as TdsError;
        match err {
            TdsError::Server(token) => DbError::database(
                token.message(),
                Some(token.code().to_string()),
                "Check the SQL syntax and referenced objects",
            ),
            TdsError::Io { message, .. } => DbError::connection(
                format!("I/O error: {}", message),
                "Check network connectivity and database server status",
            ),
            TdsError::Tls(msg) => DbError::connection(
                format!("TLS error: {}", msg),
                "Verify TLS configuration or set TrustServerCertificate=true",
            ),
            TdsError::Routing { host, port } => DbError::connection(
                format!("Server requested a redirect to {}:{}", host, port),
                "Connect to the redirected host directly",
            ),
            TdsError::Protocol(msg) => DbError::connection(
                format!("Protocol error: {}", msg),
                "Check database server compatibility",
            ),
            TdsError::Conversion(msg) => {
                DbError::internal(format!("Failed to convert value: {}", msg))
            }
            other => DbError::internal(format!("SQL Server error: {}", other)),
        }
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::internal(format!("JSON error: {}", err))
    }
}

/// Result type alias for database operations.
pub type DbResult<T> = Result<T, DbError>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::error::Error as _;

    #[test]
    fn test_error_display() {
        let err = DbError::connection("Failed to connect", "Check credentials");
        assert!(err.to_string().contains("Connection failed"));
    }

    #[test]
    fn test_error_suggestion() {
        let err = DbError::database(
            "Syntax error",
            Some("42601".to_string()),
            "Check SQL syntax",
        );
        assert_eq!(err.suggestion(), Some("Check SQL syntax"));
        assert_eq!(err.sql_state(), Some("42601"));
    }

    #[test]
    fn test_error_retryable() {
        assert!(DbError::timeout("query", 30).is_retryable());
        assert!(DbError::connection("err", "sugg").is_retryable());
        assert!(!DbError::invalid_input("bad").is_retryable());
    }

    #[test]
    fn test_sql_server_errors() {
        let err: DbError = tiberius::error::Error::Routing {
            host: "node2.example".into(),
            port: 1433,
        }
        .into();
        assert!(err.is_retryable());
        assert!(err.to_string().contains("node2.example:1433"));

        let err: DbError = tiberius::error::Error::Conversion("bad numeric".into()).into();
        assert!(matches!(err, DbError::Internal { .. }));
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_creating_duplicate_entry_message() {
        let err = DbError::creating_duplicate_entry("Name", vec!["a".into(), "b".into()]);
        assert_eq!(
            err.to_string(),
            "There's more than one element with the same value in the 'Name' attribute. \
             Values in 'Name' must be unique. The duplicated values are: ['a', 'b']"
        );
    }

    #[test]
    fn test_entity_already_exists_message() {
        let err = DbError::entity_already_exists("Name", vec!["Widget".into()]);
        assert_eq!(
            err.to_string(),
            "Error trying to create entities that already exists, looking at the 'Name' attribute. \
             Values in 'Name' must be unique. The duplicated values are: ['Widget']"
        );
    }

    #[test]
    fn test_count_mismatch_message() {
        let err = DbError::count_mismatch("Product", 3, 2);
        assert_eq!(
            err.to_string(),
            "Trying to delete 3 Product, but instead only 2 were deleted"
        );
    }

    #[test]
    fn test_operation_returned_false_message() {
        let err = DbError::operation_returned_false("Update");
        assert_eq!(
            err.to_string(),
            "Update result was false but didn't throw exception"
        );
    }

    #[test]
    fn test_batch_operation_keeps_source() {
        let inner = DbError::database("constraint failed", Some("23000".into()), "fix data");
        let err = DbError::batch_operation("InsertEntities - Product", "{\"Name\":\"x\"}", inner);
        assert_eq!(
            err.to_string(),
            "Error on InsertEntities - Product --> {\"Name\":\"x\"}"
        );
        assert_eq!(err.sql_state(), Some("23000"));
        let source = err.source().map(|s| s.to_string());
        assert_eq!(source.as_deref(), Some("Database error: constraint failed"));
    }
}
