//! # Response Envelopes
//!
//! The four response shapes every endpoint returns.
//!
//! ```text
//! ┌──────────────┬────────┬───────────────────────────────────────────────┐
//! │ Shape        │ Status │ Body                                          │
//! ├──────────────┼────────┼───────────────────────────────────────────────┤
//! │ success      │ 200    │ {"success":true,  "code":200, "data":…}       │
//! │ error        │ 400    │ {"success":false, "code":400, "errors":…}     │
//! │ with_meta    │ 200    │ {"success":true,  "code":200, "data":…,       │
//! │              │        │  "meta":…}   (meta lifted out of data)        │
//! │ no_content   │ 204    │ empty                                         │
//! └──────────────┴────────┴───────────────────────────────────────────────┘
//! ```
//!
//! `code` mirrors the status unless set explicitly.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq)]
enum Shape {
    Success(Value),
    Error(Value),
    WithMeta { data: Value, meta: Value },
    NoContent,
}

/// A formatted API response, ready to hand to axum.
#[derive(Debug, Clone, PartialEq)]
pub struct ApiResponse {
    status: StatusCode,
    code: Option<u32>,
    shape: Shape,
}

impl ApiResponse {
    pub fn success(data: impl Into<Value>) -> Self {
        ApiResponse {
            status: StatusCode::OK,
            code: None,
            shape: Shape::Success(data.into()),
        }
    }

    /// Error envelope. Objects and arrays are sent as they are; anything
    /// else is wrapped as `{"message": …}`.
    pub fn error(errors: impl Into<Value>) -> Self {
        let errors = match errors.into() {
            structured @ (Value::Object(_) | Value::Array(_)) => structured,
            other => json!({ "message": other }),
        };
        ApiResponse {
            status: StatusCode::BAD_REQUEST,
            code: None,
            shape: Shape::Error(errors),
        }
    }

    /// Success envelope with the payload's `meta` key lifted beside `data`.
    pub fn with_meta(data: impl Into<Value>) -> Self {
        let (data, meta) = match data.into() {
            Value::Object(mut map) => {
                let meta = map.remove("meta").unwrap_or(Value::Null);
                (Value::Object(map), meta)
            }
            other => (other, Value::Null),
        };
        ApiResponse {
            status: StatusCode::OK,
            code: None,
            shape: Shape::WithMeta { data, meta },
        }
    }

    pub fn no_content() -> Self {
        ApiResponse {
            status: StatusCode::NO_CONTENT,
            code: None,
            shape: Shape::NoContent,
        }
    }

    pub fn with_status(mut self, status: StatusCode) -> Self {
        self.status = status;
        self
    }

    /// Application code reported in the body instead of the status.
    pub fn with_code(mut self, code: u32) -> Self {
        self.code = Some(code);
        self
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn code(&self) -> u32 {
        self.code.unwrap_or_else(|| u32::from(self.status.as_u16()))
    }

    /// The JSON body, `None` for no-content responses.
    pub fn body(&self) -> Option<Value> {
        let code = Value::from(self.code());
        let mut out = Map::new();
        match &self.shape {
            Shape::Success(data) => {
                out.insert("success".into(), Value::Bool(true));
                out.insert("code".into(), code);
                out.insert("data".into(), data.clone());
            }
            Shape::Error(errors) => {
                out.insert("success".into(), Value::Bool(false));
                out.insert("code".into(), code);
                out.insert("errors".into(), errors.clone());
            }
            Shape::WithMeta { data, meta } => {
                out.insert("success".into(), Value::Bool(true));
                out.insert("code".into(), code);
                out.insert("data".into(), data.clone());
                out.insert("meta".into(), meta.clone());
            }
            Shape::NoContent => return None,
        }
        Some(Value::Object(out))
    }
}

impl IntoResponse for ApiResponse {
    fn into_response(self) -> Response {
        match self.body() {
            Some(body) => (self.status, Json(body)).into_response(),
            None => self.status.into_response(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_success_code_defaults_to_status() {
        let response = ApiResponse::success(json!({ "id": 1 })).with_status(StatusCode::CREATED);
        assert_eq!(
            response.body().unwrap(),
            json!({ "success": true, "code": 201, "data": { "id": 1 } })
        );
    }

    #[test]
    fn test_explicit_code_overrides_status() {
        let response = ApiResponse::success(json!([])).with_code(1001);
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(response.body().unwrap()["code"], json!(1001));
    }

    #[test]
    fn test_error_wraps_plain_messages() {
        let response = ApiResponse::error("Out of stock");
        assert_eq!(
            response.body().unwrap(),
            json!({ "success": false, "code": 400, "errors": { "message": "Out of stock" } })
        );

        let structured = ApiResponse::error(json!({ "name": ["name is required"] }))
            .with_status(StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            structured.body().unwrap()["errors"],
            json!({ "name": ["name is required"] })
        );
        assert_eq!(structured.code(), 422);
    }

    #[test]
    fn test_with_meta_lifts_meta_out_of_data() {
        let response = ApiResponse::with_meta(json!({
            "data": [1, 2],
            "meta": { "pagination": { "total": 2 } }
        }));
        assert_eq!(
            response.body().unwrap(),
            json!({
                "success": true,
                "code": 200,
                "data": { "data": [1, 2] },
                "meta": { "pagination": { "total": 2 } }
            })
        );

        let bare = ApiResponse::with_meta(json!({ "data": [] }));
        assert_eq!(bare.body().unwrap()["meta"], Value::Null);
    }

    #[test]
    fn test_no_content_has_no_body() {
        let response = ApiResponse::no_content();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
        assert!(response.body().is_none());
    }
}
