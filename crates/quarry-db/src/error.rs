//! # Database Error Types
//!
//! Error types for store and repository operations.
//!
//! ## Error Flow
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Propagation                                    │
//! │                                                                         │
//! │  SQLite Error (sqlx::Error)        CoreError (schema / arguments)      │
//! │       │                                 │                               │
//! │       └───────────────┬─────────────────┘                               │
//! │                       ▼                                                 │
//! │  DbError (this module) ← Adds context and categorization               │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ApiError (quarry-api) ← Status code + serialized errors               │
//! │                                                                         │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use quarry_core::{CoreError, EntityId, ValidationError};
use thiserror::Error;

/// Store and repository errors.
#[derive(Debug, Error)]
pub enum DbError {
    /// A required lookup matched nothing.
    ///
    /// ## When This Occurs
    /// - `get_by_id` with an unknown id
    /// - `get_where` / `get_where_in` with `Lookup::Required` and no match
    /// - `first_where` with no match
    #[error("{message}")]
    NotFound { kind: String, message: String },

    /// Malformed call: empty relation list, zero page size, undeclared
    /// relation, relation operation on an unsaved parent...
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Attribute validation failed (required fields, unique fields).
    #[error("Validation failed: {}", summarize(.errors))]
    Validation { errors: Vec<ValidationError> },

    /// Referential integrity would be broken.
    ///
    /// ## When This Occurs
    /// - Deleting an entity still referenced by a `BelongsTo` foreign key
    /// - Attaching an id that does not exist
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// Database connection failed.
    ///
    /// ## When This Occurs
    /// - Database file doesn't exist and can't be created
    /// - File permissions issue
    /// - Pool closed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Migration failed.
    #[error("Migration failed: {0}")]
    MigrationFailed(String),

    /// Query execution failed.
    #[error("Query failed: {0}")]
    QueryFailed(String),

    /// Transaction failed.
    #[error("Transaction failed: {0}")]
    TransactionFailed(String),

    /// Pool exhausted (all connections in use).
    #[error("Connection pool exhausted")]
    PoolExhausted,

    /// Internal error (corrupt stored JSON, broken invariants).
    #[error("Internal database error: {0}")]
    Internal(String),
}

fn summarize(errors: &[ValidationError]) -> String {
    errors
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl DbError {
    /// NotFound for a lookup by id.
    pub fn not_found(kind: impl Into<String>, id: EntityId) -> Self {
        let kind = kind.into();
        DbError::NotFound {
            message: format!("No query results for kind [{}] {}", kind, id),
            kind,
        }
    }

    /// NotFound for a lookup by attributes, optionally naming what was looked for.
    pub fn no_record(kind: impl Into<String>, hint: Option<&str>) -> Self {
        let message = match hint {
            Some(hint) if !hint.is_empty() => format!("No {} record found.", hint),
            _ => "No record found.".to_string(),
        };
        DbError::NotFound {
            kind: kind.into(),
            message,
        }
    }

    pub fn invalid(message: impl Into<String>) -> Self {
        DbError::InvalidArgument(message.into())
    }

    pub fn validation(errors: Vec<ValidationError>) -> Self {
        DbError::Validation { errors }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, DbError::NotFound { .. })
    }
}

/// Convert sqlx errors to DbError.
///
/// ## Error Mapping
/// ```text
/// sqlx::Error::RowNotFound    → DbError::NotFound
/// sqlx::Error::Database       → Analyze message for constraint type
/// sqlx::Error::PoolTimedOut   → DbError::PoolExhausted
/// Other                       → DbError::Internal
/// ```
impl From<sqlx::Error> for DbError {
    fn from(err: sqlx::Error) -> Self {
        match err {
            sqlx::Error::RowNotFound => DbError::no_record("record", None),

            sqlx::Error::Database(db_err) => {
                let msg = db_err.message();

                // "UNIQUE constraint failed: <table>.<column>"
                if msg.contains("UNIQUE constraint failed") {
                    let field = msg
                        .split("UNIQUE constraint failed: ")
                        .nth(1)
                        .unwrap_or("unknown")
                        .to_string();
                    DbError::validation(vec![ValidationError::Duplicate {
                        field,
                        value: "unknown".to_string(),
                    }])
                } else if msg.contains("FOREIGN KEY constraint failed") {
                    DbError::ConstraintViolation(msg.to_string())
                } else {
                    DbError::QueryFailed(msg.to_string())
                }
            }

            sqlx::Error::PoolTimedOut => DbError::PoolExhausted,

            sqlx::Error::PoolClosed => DbError::ConnectionFailed("Pool is closed".to_string()),

            _ => DbError::Internal(err.to_string()),
        }
    }
}

impl From<sqlx::migrate::MigrateError> for DbError {
    fn from(err: sqlx::migrate::MigrateError) -> Self {
        DbError::MigrationFailed(err.to_string())
    }
}

impl From<CoreError> for DbError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(v) => DbError::validation(vec![v]),
            other => DbError::InvalidArgument(other.to_string()),
        }
    }
}

impl From<ValidationError> for DbError {
    fn from(err: ValidationError) -> Self {
        DbError::validation(vec![err])
    }
}

impl From<serde_json::Error> for DbError {
    fn from(err: serde_json::Error) -> Self {
        DbError::Internal(format!("Corrupt stored JSON: {}", err))
    }
}

/// Result type for database operations.
pub type DbResult<T> = Result<T, DbError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_not_found_messages() {
        let err = DbError::no_record("users", Some("user"));
        assert_eq!(err.to_string(), "No user record found.");

        let err = DbError::no_record("users", None);
        assert_eq!(err.to_string(), "No record found.");

        let err = DbError::not_found("users", EntityId::new(4));
        assert_eq!(err.to_string(), "No query results for kind [users] 4");
        assert!(err.is_not_found());
    }

    #[test]
    fn test_core_error_mapping() {
        let err: DbError = CoreError::UnknownRelation {
            kind: "users".into(),
            relation: "rols".into(),
        }
        .into();
        assert!(matches!(err, DbError::InvalidArgument(_)));

        let err: DbError = CoreError::Validation(ValidationError::Required {
            field: "name".into(),
        })
        .into();
        assert_eq!(err.to_string(), "Validation failed: name is required");
    }
}
