//! # Error Types
//!
//! Domain-specific error types for quarry-core.
//!
//! ## Error Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Error Types                                     │
//! │                                                                         │
//! │  quarry-core errors (this file)                                        │
//! │  ├── CoreError        - Schema and argument errors                     │
//! │  └── ValidationError  - Per-field attribute failures                   │
//! │                                                                         │
//! │  quarry-db errors (separate crate)                                     │
//! │  └── DbError          - Store and repository failures                  │
//! │                                                                         │
//! │  quarry-api errors                                                     │
//! │  └── ApiError         - What HTTP clients see (serialized)             │
//! │                                                                         │
//! │  Flow: ValidationError → CoreError → DbError → ApiError → Client       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use thiserror::Error;

// =============================================================================
// Core Error
// =============================================================================

/// Errors raised while building or consulting a schema.
#[derive(Debug, Error)]
pub enum CoreError {
    /// The kind is not registered in the schema.
    #[error("Unknown entity kind: {0}")]
    UnknownKind(String),

    /// The relation is not declared on the kind.
    ///
    /// ## When This Occurs
    /// - Typo in an include list (`?include=rols`)
    /// - Relation declared on the inverse kind only
    #[error("Call to undefined relationship [{relation}] on kind [{kind}]")]
    UnknownRelation { kind: String, relation: String },

    /// A caller passed a malformed argument (empty relation list, zero page size...).
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Validation error (wraps ValidationError).
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),
}

// =============================================================================
// Validation Error
// =============================================================================

/// Attribute validation errors.
///
/// Every variant names the field it concerns so the API layer can render
/// structured `{field: [messages]}` payloads.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// A required field is missing or null.
    #[error("{field} is required")]
    Required { field: String },

    /// Value already used by another entity of the same kind.
    #[error("{field} '{value}' already exists")]
    Duplicate { field: String, value: String },

    /// Invalid format (column names, pivot keys...).
    #[error("{field} has invalid format: {reason}")]
    InvalidFormat { field: String, reason: String },

    /// Value must be positive.
    #[error("{field} must be positive")]
    MustBePositive { field: String },
}

impl ValidationError {
    /// Returns the field this error is about.
    pub fn field(&self) -> &str {
        match self {
            ValidationError::Required { field }
            | ValidationError::Duplicate { field, .. }
            | ValidationError::InvalidFormat { field, .. }
            | ValidationError::MustBePositive { field } => field,
        }
    }
}

// =============================================================================
// Result Type Alias
// =============================================================================

/// Convenience type alias for Results with CoreError.
pub type CoreResult<T> = Result<T, CoreError>;

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages() {
        let err = CoreError::UnknownRelation {
            kind: "users".to_string(),
            relation: "rols".to_string(),
        };
        assert_eq!(
            err.to_string(),
            "Call to undefined relationship [rols] on kind [users]"
        );
    }

    #[test]
    fn test_validation_error_messages() {
        let err = ValidationError::Required {
            field: "email".to_string(),
        };
        assert_eq!(err.to_string(), "email is required");
        assert_eq!(err.field(), "email");

        let err = ValidationError::Duplicate {
            field: "email".to_string(),
            value: "ada@example.com".to_string(),
        };
        assert_eq!(err.to_string(), "email 'ada@example.com' already exists");
    }

    #[test]
    fn test_validation_converts_to_core_error() {
        let validation_err = ValidationError::Required {
            field: "name".to_string(),
        };
        let core_err: CoreError = validation_err.into();
        assert!(matches!(core_err, CoreError::Validation(_)));
    }
}
