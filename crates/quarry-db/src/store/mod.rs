//! # Store Module
//!
//! The storage capability repositories are written against.
//!
//! ## Layers
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                                                                         │
//! │  Repository (get_where, sync, chunk, ...)                              │
//! │       │                                                                 │
//! │       │  fetch / count / insert / write / remove / pivot_*             │
//! │       ▼                                                                 │
//! │  Store trait                                                           │
//! │  ├── MemoryStore   RwLock'ed maps, used by tests and prototypes        │
//! │  └── SqliteStore   sqlx pool, generic records/pivots tables            │
//! │                                                                         │
//! │  Both stores evaluate quarry_core::Query with the same semantics and   │
//! │  share the validation and referential checks in this module.           │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

pub mod memory;
pub mod sqlite;

use async_trait::async_trait;
use serde_json::Value;
use tracing::debug;

use quarry_core::validation::{check_columns, check_required};
use quarry_core::{
    Attributes, Entity, EntityId, EntityKind, Filter, Query, Schema, ValidationError, ID_COLUMN,
};

use crate::error::{DbError, DbResult};

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

// =============================================================================
// Pivot Scope
// =============================================================================

/// Selects rows of one pivot table.
///
/// A row matches when, for every condition, the row's column holds one of
/// the listed ids.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotScope {
    pub table: String,
    pub conditions: Vec<(String, Vec<EntityId>)>,
}

impl PivotScope {
    pub fn new(table: impl Into<String>) -> Self {
        PivotScope {
            table: table.into(),
            conditions: Vec::new(),
        }
    }

    pub fn with(mut self, column: impl Into<String>, ids: Vec<EntityId>) -> Self {
        self.conditions.push((column.into(), ids));
        self
    }

    pub fn matches(&self, row: &Attributes) -> bool {
        self.conditions.iter().all(|(column, ids)| {
            row.get(column)
                .and_then(EntityId::from_value)
                .is_some_and(|id| ids.contains(&id))
        })
    }
}

// =============================================================================
// Store Trait
// =============================================================================

/// Storage capability: selection, mutation and pivot-row primitives.
///
/// Implementations are cheap to clone (shared pool or shared state).
#[async_trait]
pub trait Store: Clone + Send + Sync + 'static {
    fn schema(&self) -> &Schema;

    /// Entities of `kind` matching the query, ordered and windowed.
    async fn fetch(&self, kind: &str, query: &Query) -> DbResult<Vec<Entity>>;

    /// Number of matches, ignoring ordering and window.
    async fn count(&self, kind: &str, query: &Query) -> DbResult<u64>;

    async fn find(&self, kind: &str, id: EntityId) -> DbResult<Option<Entity>>;

    /// Persists a new entity. Assigns its id and both timestamps.
    async fn insert(&self, kind: &str, attributes: Attributes) -> DbResult<Entity>;

    /// Merges attributes into an existing entity and bumps `updated_at`.
    async fn write(&self, kind: &str, id: EntityId, attributes: Attributes) -> DbResult<Entity>;

    /// Bumps `updated_at` only.
    async fn touch(&self, kind: &str, id: EntityId) -> DbResult<()>;

    /// Deletes an entity and the pivot rows referencing it.
    ///
    /// Fails with `ConstraintViolation` while a `BelongsTo` key points at it.
    async fn remove(&self, kind: &str, id: EntityId) -> DbResult<bool>;

    /// Matching pivot rows in insertion order.
    async fn pivot_rows(&self, scope: &PivotScope) -> DbResult<Vec<Attributes>>;

    async fn pivot_insert(&self, table: &str, row: Attributes) -> DbResult<()>;

    /// Merges attributes into every matching row.
    async fn pivot_update(&self, scope: &PivotScope, attributes: Attributes) -> DbResult<u64>;

    async fn pivot_delete(&self, scope: &PivotScope) -> DbResult<u64>;
}

// =============================================================================
// Shared Checks
// =============================================================================

/// Validates the full attribute set an entity would have after a write.
///
/// `id` is the entity being written, excluded from unique checks.
pub(crate) async fn validate_write<S: Store>(
    store: &S,
    kind: &EntityKind,
    id: Option<EntityId>,
    attributes: &Attributes,
) -> DbResult<()> {
    let mut errors = check_columns(attributes);
    errors.extend(check_required(kind, attributes));

    for field in &kind.unique {
        let Some(value) = attributes.get(field).filter(|v| !v.is_null()) else {
            continue;
        };
        let mut query = Query::new().filter(Filter::Eq(field.clone(), value.clone()));
        if let Some(id) = id {
            query = query.filter(Filter::Ne(ID_COLUMN.to_string(), Value::from(id)));
        }
        if store.count(&kind.name, &query).await? > 0 {
            errors.push(ValidationError::Duplicate {
                field: field.clone(),
                value: match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                },
            });
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(DbError::validation(errors))
    }
}

/// Refuses to delete an entity that a `BelongsTo` key still points at.
pub(crate) async fn guard_remove<S: Store>(store: &S, kind: &str, id: EntityId) -> DbResult<()> {
    for dependent in store.schema().dependents_of(kind) {
        let query = Query::new().filter(Filter::eq(dependent.foreign_key.clone(), id));
        let referencing = store.count(&dependent.kind, &query).await?;
        if referencing > 0 {
            return Err(DbError::ConstraintViolation(format!(
                "Cannot delete {} {}: referenced by {} {} row(s) through {}",
                kind, id, referencing, dependent.kind, dependent.foreign_key
            )));
        }
    }
    Ok(())
}

/// Removes pivot rows holding the id of a deleted entity.
pub(crate) async fn cascade_pivots<S: Store>(store: &S, kind: &str, id: EntityId) -> DbResult<u64> {
    let mut removed = 0;
    for link in store.schema().pivot_links_of(kind) {
        let scope = PivotScope::new(link.table).with(link.column, vec![id]);
        removed += store.pivot_delete(&scope).await?;
    }
    if removed > 0 {
        debug!(kind = %kind, id = %id, removed, "Cascaded pivot rows");
    }
    Ok(removed)
}

// =============================================================================
// Unit Tests
// =============================================================================
