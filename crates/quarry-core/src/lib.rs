//! # quarry-core: Pure Types for Quarry
//!
//! This crate holds the data model shared by every other Quarry crate.
//! It has zero I/O dependencies.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                          Quarry Architecture                            │
//! │                                                                         │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                    quarry-api (formatting)                      │   │
//! │  │    envelopes, transformers, includes, bulk normalization        │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │                    quarry-db (storage)                          │   │
//! │  │    Repository contract, Store trait, Memory + SQLite stores     │   │
//! │  └─────────────────────────────┬───────────────────────────────────┘   │
//! │                                │                                        │
//! │  ┌─────────────────────────────▼───────────────────────────────────┐   │
//! │  │               ★ quarry-core (THIS CRATE) ★                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────┐  ┌───────────┐  ┌───────────┐  ┌───────────┐  │   │
//! │  │   │   types   │  │  schema   │  │   query   │  │ validation│  │   │
//! │  │   │  Entity   │  │ EntityKind│  │  Filter   │  │  fillable │  │   │
//! │  │   │   Page    │  │ Relations │  │  OrderBy  │  │  required │  │   │
//! │  │   └───────────┘  └───────────┘  └───────────┘  └───────────┘  │   │
//! │  │                                                                 │   │
//! │  │   NO I/O • NO DATABASE • NO NETWORK                             │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Modules
//!
//! - [`types`] - Entity, EntityId, Related, Page
//! - [`schema`] - Entity kinds, mutation policy, relation descriptors
//! - [`query`] - Filters, ordering and the in-memory evaluation of both
//! - [`validation`] - Attribute checks shared by every store
//! - [`error`] - Domain error types
//!
//! ## Example Usage
//!
//! ```rust
//! use quarry_core::schema::{EntityKind, Schema};
//! use serde_json::json;
//!
//! let schema = Schema::builder()
//!     .kind(EntityKind::new("users").fillable(["name", "email"]).required(["name"]))
//!     .build()
//!     .unwrap();
//!
//! let users = schema.kind("users").unwrap();
//! let attrs = json!({ "name": "Ada", "is_admin": true });
//! let (kept, discarded) = users.fill(attrs.as_object().unwrap().clone());
//!
//! assert!(kept.contains_key("name"));
//! assert_eq!(discarded, vec!["is_admin".to_string()]);
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod error;
pub mod query;
pub mod schema;
pub mod types;
pub mod validation;

// =============================================================================
// Re-exports for Convenience
// =============================================================================

pub use error::{CoreError, CoreResult, ValidationError};
pub use query::{Filter, OrderBy, OrderDirection, Query};
pub use schema::{Cardinality, EntityKind, MutationPolicy, PivotTable, RelationDescriptor, Schema};
pub use types::*;

// =============================================================================
// Crate-Level Constants
// =============================================================================

/// Default page size for `paginate`.
pub const DEFAULT_PER_PAGE: u64 = 10;

/// Column holding the primary identifier.
pub const ID_COLUMN: &str = "id";

/// Column holding the creation timestamp (drives "latest" ordering).
pub const CREATED_AT: &str = "created_at";

/// Column holding the last modification timestamp.
pub const UPDATED_AT: &str = "updated_at";

/// Columns owned by the store. Attribute maps never write them.
pub const RESERVED_COLUMNS: [&str; 3] = [ID_COLUMN, CREATED_AT, UPDATED_AT];
