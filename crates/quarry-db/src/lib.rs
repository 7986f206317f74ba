//! # quarry-db: Storage and Repository Layer for Quarry
//!
//! This crate provides the Repository contract and the stores it runs on.
//! Stores come in two flavours: an in-process map and SQLite via sqlx.
//!
//! ## Architecture Position
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Quarry Data Flow                                 │
//! │                                                                         │
//! │  HTTP handler (show user 7 with posts)                                 │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  ┌─────────────────────────────────────────────────────────────────┐   │
//! │  │                     quarry-db (THIS CRATE)                      │   │
//! │  │                                                                 │   │
//! │  │   ┌───────────────┐    ┌───────────────┐    ┌──────────────┐  │   │
//! │  │   │   Database    │    │  Repository   │    │  Migrations  │  │   │
//! │  │   │   (pool.rs)   │    │   (trait)     │    │  (embedded)  │  │   │
//! │  │   │               │    │               │    │              │  │   │
//! │  │   │ SqlitePool    │    │ EntityRepo<S> │    │ 001_create_  │  │   │
//! │  │   │ Connection    │◄───│ QueryHandle   │    │   records    │  │   │
//! │  │   │ Management    │    │ relations     │    │              │  │   │
//! │  │   └───────────────┘    └───────┬───────┘    └──────────────┘  │   │
//! │  │                                │                                │   │
//! │  │                    ┌───────────▼───────────┐                    │   │
//! │  │                    │  Store trait          │                    │   │
//! │  │                    │  MemoryStore          │                    │   │
//! │  │                    │  SqliteStore          │                    │   │
//! │  │                    └───────────────────────┘                    │   │
//! │  └─────────────────────────────────────────────────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Module Organization
//!
//! - [`config`] - Database configuration (builder and environment)
//! - [`pool`] - Connection pool creation
//! - [`migrations`] - Embedded database migrations
//! - [`store`] - Storage capability and its two implementations
//! - [`repository`] - The Repository contract, query handles, relations
//! - [`error`] - Database error types
//!
//! ## Usage
//!
//! ```rust,ignore
//! use quarry_db::{Database, DbConfig, Repository};
//!
//! let db = Database::new(DbConfig::new("quarry.db")).await?;
//! let users = db.repository(schema, "users")?;
//!
//! let ada = users.create(attrs).await?;
//! let page = users.paginate(10).await?;
//! ```

// =============================================================================
// Module Declarations
// =============================================================================

pub mod config;
pub mod error;
pub mod migrations;
pub mod pool;
pub mod repository;
pub mod store;

// =============================================================================
// Re-exports
// =============================================================================

pub use config::{ConfigError, DbConfig};
pub use error::{DbError, DbResult};
pub use pool::Database;

pub use store::{MemoryStore, PivotScope, SqliteStore, Store};

// Repository re-exports for convenience
pub use repository::{
    EntityRepository, Fetched, Lookup, QueryHandle, Repository, SyncChanges, SyncItem, Target,
};
