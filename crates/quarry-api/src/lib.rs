//! # quarry-api: Response Formatting for Quarry
//!
//! Shapes repository results into HTTP responses: envelopes, error mapping,
//! transformers with includes, pagination metadata and input normalization.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Quarry Request Flow                              │
//! │                                                                         │
//! │  GET /users?include=posts&page=2                                       │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Application handler (axum)                                            │
//! │       │   IncludeParams ─► Manager ─► relation_paths()                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  quarry-db: users.query().with(paths).paginate(10, 2)                  │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                   quarry-api (THIS CRATE)                       │   │
//! │  │                                                                 │   │
//! │  │   Manager::paginated(page, &UserTransformer)                    │   │
//! │  │        │                                                        │   │
//! │  │        ▼                                                        │   │
//! │  │   ApiResponse::with_meta(..)   or   ApiError::from(DbError)     │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  {"success":true,"code":200,"data":{…},"meta":{"pagination":{…}}}      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`response`] - The four response envelopes
//! - [`error`] - `ApiError` and the `DbError` status mapping
//! - [`transform`] - Transformers, include scopes, the transform manager
//! - [`pagination`] - Page adapter and `meta.pagination`
//! - [`includes`] - `include` / `includes` query parameter parsing
//! - [`inputs`] - Boolean input normalization

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod includes;
pub mod inputs;
pub mod pagination;
pub mod response;
pub mod transform;

// =============================================================================
// Re-exports
// =============================================================================

pub use error::{ApiError, ApiResult};
pub use includes::{parse_includes, IncludeParams};
pub use inputs::{normalize_bulk, parse_bool};
pub use pagination::{PageAdapter, PaginationMeta, Paginator};
pub use response::ApiResponse;
pub use transform::{loaded_relation, Manager, PlainTransformer, Resource, Transformer};
