//! Request input normalization.

use serde_json::{Map, Value};

/// Input key holding the bulk-operation flag.
pub const BULK_KEY: &str = "bulk";

/// Lenient boolean parsing for form and query input.
///
/// `true 1 yes on` are true and `false 0 no off` plus the empty string are
/// false (case-insensitive, surrounding whitespace ignored). Null counts as
/// false. Anything else is `None`.
pub fn parse_bool(value: &Value) -> Option<bool> {
    match value {
        Value::Bool(b) => Some(*b),
        Value::Null => Some(false),
        Value::Number(n) => match n.as_f64() {
            Some(x) if x == 1.0 => Some(true),
            Some(x) if x == 0.0 => Some(false),
            _ => None,
        },
        Value::String(s) => match s.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "on" | "yes" => Some(true),
            "0" | "false" | "off" | "no" | "" => Some(false),
            _ => None,
        },
        Value::Array(_) | Value::Object(_) => None,
    }
}

/// Coerces a present `bulk` input to a boolean (or null when unparseable).
/// Other keys are untouched; a missing `bulk` stays missing.
pub fn normalize_bulk(mut inputs: Map<String, Value>) -> Map<String, Value> {
    if let Some(raw) = inputs.get_mut(BULK_KEY) {
        *raw = parse_bool(raw).map(Value::Bool).unwrap_or(Value::Null);
    }
    inputs
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_parse_bool_strings() {
        for truthy in ["true", "TRUE", "1", "yes", "On", " on "] {
            assert_eq!(parse_bool(&json!(truthy)), Some(true), "{truthy}");
        }
        for falsy in ["false", "0", "no", "OFF", ""] {
            assert_eq!(parse_bool(&json!(falsy)), Some(false), "{falsy}");
        }
        assert_eq!(parse_bool(&json!("maybe")), None);
        assert_eq!(parse_bool(&json!("2")), None);
    }

    #[test]
    fn test_parse_bool_other_values() {
        assert_eq!(parse_bool(&json!(true)), Some(true));
        assert_eq!(parse_bool(&json!(1)), Some(true));
        assert_eq!(parse_bool(&json!(0)), Some(false));
        assert_eq!(parse_bool(&json!(5)), None);
        assert_eq!(parse_bool(&Value::Null), Some(false));
        assert_eq!(parse_bool(&json!([1])), None);
    }

    #[test]
    fn test_normalize_bulk_only_touches_bulk() {
        let inputs = json!({ "bulk": "yes", "name": "on" });
        let out = normalize_bulk(inputs.as_object().cloned().unwrap());
        assert_eq!(out["bulk"], json!(true));
        assert_eq!(out["name"], json!("on"));

        let unparseable = json!({ "bulk": "sometimes" });
        let out = normalize_bulk(unparseable.as_object().cloned().unwrap());
        assert_eq!(out["bulk"], Value::Null);

        let absent = json!({ "name": "x" });
        let out = normalize_bulk(absent.as_object().cloned().unwrap());
        assert!(!out.contains_key(BULK_KEY));
    }
}
