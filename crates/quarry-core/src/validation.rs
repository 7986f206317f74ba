//! # Validation
//!
//! Checks shared by every store before anything is written.
//!
//! Unique constraints need a lookup, so they live in the store layer;
//! everything that can be decided from the attributes alone lives here.

use serde_json::Value;

use crate::error::ValidationError;
use crate::schema::EntityKind;
use crate::types::Attributes;

/// Column and kind names: `[A-Za-z_][A-Za-z0-9_]*`, at most 64 chars.
pub fn validate_column(name: &str) -> Result<(), ValidationError> {
    let invalid = |reason: &str| ValidationError::InvalidFormat {
        field: name.to_string(),
        reason: reason.to_string(),
    };

    let mut chars = name.chars();
    match chars.next() {
        None => return Err(invalid("must not be empty")),
        Some(c) if !(c.is_ascii_alphabetic() || c == '_') => {
            return Err(invalid("must start with a letter or underscore"))
        }
        _ => {}
    }

    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(invalid("may only contain letters, digits and underscores"));
    }

    if name.len() > 64 {
        return Err(invalid("must be at most 64 characters"));
    }

    Ok(())
}

/// Required fields missing (or null) from the full attribute set of an entity.
pub fn check_required(kind: &EntityKind, attributes: &Attributes) -> Vec<ValidationError> {
    kind.required
        .iter()
        .filter(|field| attributes.get(field.as_str()).map_or(true, Value::is_null))
        .map(|field| ValidationError::Required {
            field: field.clone(),
        })
        .collect()
}

/// Every attribute key must be a valid column name.
pub fn check_columns(attributes: &Attributes) -> Vec<ValidationError> {
    attributes
        .keys()
        .filter_map(|key| validate_column(key).err())
        .collect()
}

/// Page sizes must be at least 1.
pub fn validate_per_page(per_page: u64) -> Result<(), ValidationError> {
    if per_page == 0 {
        return Err(ValidationError::MustBePositive {
            field: "per_page".to_string(),
        });
    }
    Ok(())
}

/// Page numbers are 1-based.
pub fn validate_page(page: u64) -> Result<(), ValidationError> {
    if page == 0 {
        return Err(ValidationError::MustBePositive {
            field: "page".to_string(),
        });
    }
    Ok(())
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_validate_column() {
        assert!(validate_column("user_id").is_ok());
        assert!(validate_column("_private").is_ok());
        assert!(validate_column("").is_err());
        assert!(validate_column("1abc").is_err());
        assert!(validate_column("name'; DROP").is_err());
        assert!(validate_column(&"a".repeat(65)).is_err());
    }

    #[test]
    fn test_check_required_treats_null_as_missing() {
        let kind = EntityKind::new("users").required(["name", "email"]);
        let attrs = json!({ "name": null, "email": "a@b.c" });

        let errors = check_required(&kind, attrs.as_object().unwrap());
        assert_eq!(
            errors,
            vec![ValidationError::Required {
                field: "name".to_string()
            }]
        );
    }

    #[test]
    fn test_check_columns() {
        let attrs = json!({ "ok": 1, "not ok": 2 });
        let errors = check_columns(attrs.as_object().unwrap());
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].field(), "not ok");
    }

    #[test]
    fn test_page_bounds() {
        assert!(validate_per_page(0).is_err());
        assert!(validate_per_page(1).is_ok());
        assert!(validate_page(0).is_err());
    }
}
