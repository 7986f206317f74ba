//! # API Error Type
//!
//! Unified error type for handlers built on the repositories.
//!
//! ## Error Handling Strategy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Error Flow in Quarry                                 │
//! │                                                                         │
//! │  Handler                                                                │
//! │  Result<ApiResponse, ApiError>                                          │
//! │         │                                                               │
//! │         ▼                                                               │
//! │  users.get_by_id(id) ── DbError ──► From<DbError> ──► ApiError          │
//! │                                                          │              │
//! │   NotFound            → 404  {"message": "..."}          │              │
//! │   InvalidArgument     → 400  {"message": "..."}          │              │
//! │   Validation          → 400  {"email": ["..."], ...}     │              │
//! │   ConstraintViolation → 409  {"message": "..."}          │              │
//! │   anything else       → 500  generic message, logged     │              │
//! │                                                          ▼              │
//! │                              {"success":false,"code":…,"errors":…}      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Internal details (SQL, file paths) never reach the client.

use std::collections::BTreeMap;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde_json::{json, Value};
use thiserror::Error;
use tracing::error;

use quarry_core::{CoreError, ValidationError};
use quarry_db::DbError;

use crate::response::ApiResponse;

/// Message sent for every 5xx.
pub const INTERNAL_MESSAGE: &str = "Something went wrong. Please try again later.";

/// An error ready to be rendered with the error envelope.
#[derive(Debug, Clone, PartialEq, Error)]
#[error("{status}: {errors}")]
pub struct ApiError {
    pub status: StatusCode,
    /// Body code; mirrors the status unless set explicitly.
    pub code: u32,
    pub errors: Value,
}

impl ApiError {
    pub fn new(status: StatusCode, errors: impl Into<Value>) -> Self {
        ApiError {
            status,
            code: u32::from(status.as_u16()),
            errors: errors.into(),
        }
    }

    pub fn with_code(mut self, code: u32) -> Self {
        self.code = code;
        self
    }

    pub fn message(status: StatusCode, message: impl Into<String>) -> Self {
        ApiError::new(status, json!({ "message": message.into() }))
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::message(StatusCode::NOT_FOUND, message)
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::message(StatusCode::BAD_REQUEST, message)
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::message(StatusCode::CONFLICT, message)
    }

    pub fn internal() -> Self {
        ApiError::message(StatusCode::INTERNAL_SERVER_ERROR, INTERNAL_MESSAGE)
    }

    /// `{field: [messages]}`, fields in name order.
    pub fn validation(errors: &[ValidationError]) -> Self {
        let mut fields: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for err in errors {
            fields
                .entry(err.field().to_string())
                .or_default()
                .push(err.to_string());
        }
        ApiError::new(StatusCode::BAD_REQUEST, json!(fields))
    }
}

/// Converts database errors to API errors.
impl From<DbError> for ApiError {
    fn from(err: DbError) -> Self {
        match err {
            DbError::NotFound { message, .. } => ApiError::not_found(message),
            DbError::InvalidArgument(message) => ApiError::bad_request(message),
            DbError::Validation { errors } => ApiError::validation(&errors),
            DbError::ConstraintViolation(message) => ApiError::conflict(message),
            other => {
                error!(error = %other, "Database error while handling request");
                ApiError::internal()
            }
        }
    }
}

impl From<CoreError> for ApiError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Validation(validation) => ApiError::validation(&[validation]),
            other => ApiError::bad_request(other.to_string()),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        ApiResponse::error(self.errors)
            .with_status(self.status)
            .with_code(self.code)
            .into_response()
    }
}

/// Result type for handlers.
pub type ApiResult<T> = Result<T, ApiError>;

// =============================================================================
// Unit Tests
// =============================================================================
