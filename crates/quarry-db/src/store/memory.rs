//! # Memory Store
//!
//! A process-local store. Same semantics as the SQLite store, no I/O.
//!
//! ## Layout
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  MemoryState (behind one tokio RwLock)                                  │
//! │                                                                         │
//! │  records    kind → BTreeMap<EntityId, Entity>                          │
//! │  sequences  kind → last id handed out                                  │
//! │  pivots     table → Vec<row>   (insertion order)                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::RwLock;
use tracing::debug;

use quarry_core::{Attributes, Entity, EntityId, Query, Schema};

use super::{cascade_pivots, guard_remove, validate_write, PivotScope, Store};
use crate::error::{DbError, DbResult};

#[derive(Debug, Default)]
struct MemoryState {
    records: HashMap<String, BTreeMap<EntityId, Entity>>,
    sequences: HashMap<String, i64>,
    pivots: HashMap<String, Vec<Attributes>>,
}

/// In-memory [`Store`].
///
/// ## Usage
/// ```rust,ignore
/// let store = MemoryStore::new(schema);
/// let users = EntityRepository::new(store, "users")?;
/// ```
#[derive(Debug, Clone)]
pub struct MemoryStore {
    schema: Arc<Schema>,
    state: Arc<RwLock<MemoryState>>,
}

impl MemoryStore {
    pub fn new(schema: Schema) -> Self {
        MemoryStore {
            schema: Arc::new(schema),
            state: Arc::new(RwLock::new(MemoryState::default())),
        }
    }

    async fn existing(&self, kind: &str, id: EntityId) -> DbResult<Entity> {
        self.find(kind, id)
            .await?
            .ok_or_else(|| DbError::not_found(kind, id))
    }
}

#[async_trait]
impl Store for MemoryStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn fetch(&self, kind: &str, query: &Query) -> DbResult<Vec<Entity>> {
        self.schema.kind_or_err(kind)?;
        query.validate()?;

        let state = self.state.read().await;
        let candidates = state
            .records
            .get(kind)
            .map(|records| records.values().cloned().collect::<Vec<_>>())
            .unwrap_or_default();

        Ok(query.apply(candidates))
    }

    async fn count(&self, kind: &str, query: &Query) -> DbResult<u64> {
        self.schema.kind_or_err(kind)?;
        query.validate()?;

        let state = self.state.read().await;
        let count = state
            .records
            .get(kind)
            .map(|records| records.values().filter(|e| query.matches(e)).count())
            .unwrap_or(0);

        Ok(count as u64)
    }

    async fn find(&self, kind: &str, id: EntityId) -> DbResult<Option<Entity>> {
        self.schema.kind_or_err(kind)?;

        let state = self.state.read().await;
        Ok(state
            .records
            .get(kind)
            .and_then(|records| records.get(&id))
            .cloned())
    }

    async fn insert(&self, kind: &str, attributes: Attributes) -> DbResult<Entity> {
        let entity_kind = self.schema.kind_or_err(kind)?;
        validate_write(self, entity_kind, None, &attributes).await?;

        let mut state = self.state.write().await;
        let sequence = state.sequences.entry(kind.to_string()).or_insert(0);
        *sequence += 1;
        let id = EntityId::new(*sequence);

        let now = Utc::now();
        let entity = Entity::from_store(kind, id, attributes, now, now);
        state
            .records
            .entry(kind.to_string())
            .or_default()
            .insert(id, entity.clone());

        debug!(kind = %kind, id = %id, "Inserted entity");
        Ok(entity)
    }

    async fn write(&self, kind: &str, id: EntityId, attributes: Attributes) -> DbResult<Entity> {
        let entity_kind = self.schema.kind_or_err(kind)?;
        let current = self.existing(kind, id).await?;

        let mut merged = current.attributes().clone();
        merged.extend(attributes);
        validate_write(self, entity_kind, Some(id), &merged).await?;

        let created_at = current.created_at().unwrap_or_else(Utc::now);
        let entity = Entity::from_store(kind, id, merged, created_at, Utc::now());

        let mut state = self.state.write().await;
        let records = state.records.entry(kind.to_string()).or_default();
        if !records.contains_key(&id) {
            return Err(DbError::not_found(kind, id));
        }
        records.insert(id, entity.clone());

        debug!(kind = %kind, id = %id, "Wrote entity");
        Ok(entity)
    }

    async fn touch(&self, kind: &str, id: EntityId) -> DbResult<()> {
        self.schema.kind_or_err(kind)?;

        let mut state = self.state.write().await;
        let record = state
            .records
            .get_mut(kind)
            .and_then(|records| records.get_mut(&id))
            .ok_or_else(|| DbError::not_found(kind, id))?;

        let created_at = record.created_at().unwrap_or_else(Utc::now);
        let attributes = record.attributes().clone();
        *record = Entity::from_store(kind, id, attributes, created_at, Utc::now());
        Ok(())
    }

    async fn remove(&self, kind: &str, id: EntityId) -> DbResult<bool> {
        self.schema.kind_or_err(kind)?;
        guard_remove(self, kind, id).await?;

        let removed = {
            let mut state = self.state.write().await;
            state
                .records
                .get_mut(kind)
                .and_then(|records| records.remove(&id))
                .is_some()
        };

        if removed {
            cascade_pivots(self, kind, id).await?;
            debug!(kind = %kind, id = %id, "Removed entity");
        }
        Ok(removed)
    }

    async fn pivot_rows(&self, scope: &PivotScope) -> DbResult<Vec<Attributes>> {
        let state = self.state.read().await;
        Ok(state
            .pivots
            .get(&scope.table)
            .map(|rows| rows.iter().filter(|r| scope.matches(r)).cloned().collect())
            .unwrap_or_default())
    }

    async fn pivot_insert(&self, table: &str, row: Attributes) -> DbResult<()> {
        let mut state = self.state.write().await;
        state.pivots.entry(table.to_string()).or_default().push(row);
        Ok(())
    }

    async fn pivot_update(&self, scope: &PivotScope, attributes: Attributes) -> DbResult<u64> {
        let mut state = self.state.write().await;
        let mut updated = 0;
        if let Some(rows) = state.pivots.get_mut(&scope.table) {
            for row in rows.iter_mut().filter(|r| scope.matches(r)) {
                row.extend(attributes.clone());
                updated += 1;
            }
        }
        Ok(updated)
    }

    async fn pivot_delete(&self, scope: &PivotScope) -> DbResult<u64> {
        let mut state = self.state.write().await;
        let Some(rows) = state.pivots.get_mut(&scope.table) else {
            return Ok(0);
        };
        let before = rows.len();
        rows.retain(|r| !scope.matches(r));
        Ok((before - rows.len()) as u64)
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use quarry_core::{EntityKind, Filter, RelationDescriptor};
    use serde_json::json;

    fn attrs(value: serde_json::Value) -> Attributes {
        value.as_object().cloned().unwrap()
    }

    fn store() -> MemoryStore {
        let schema = Schema::builder()
            .kind(EntityKind::new("users").unguarded().required(["name"]).unique(["email"]))
            .kind(
                EntityKind::new("posts")
                    .unguarded()
                    .relation(RelationDescriptor::belongs_to("author", "users", "user_id")),
            )
            .build()
            .unwrap();
        MemoryStore::new(schema)
    }

    #[tokio::test]
    async fn test_ids_are_never_reused() {
        let store = store();
        let first = store.insert("users", attrs(json!({ "name": "a" }))).await.unwrap();
        assert_eq!(first.id(), Some(EntityId::new(1)));

        assert!(store.remove("users", EntityId::new(1)).await.unwrap());
        let second = store.insert("users", attrs(json!({ "name": "b" }))).await.unwrap();
        assert_eq!(second.id(), Some(EntityId::new(2)));
    }

    #[tokio::test]
    async fn test_insert_validates_required_and_unique() {
        let store = store();
        let err = store.insert("users", Attributes::new()).await.unwrap_err();
        assert!(matches!(err, DbError::Validation { .. }));

        store
            .insert("users", attrs(json!({ "name": "a", "email": "a@x" })))
            .await
            .unwrap();
        let err = store
            .insert("users", attrs(json!({ "name": "b", "email": "a@x" })))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("email 'a@x' already exists"));
    }

    #[tokio::test]
    async fn test_write_keeps_own_unique_value() {
        let store = store();
        let user = store
            .insert("users", attrs(json!({ "name": "a", "email": "a@x" })))
            .await
            .unwrap();
        let id = user.id().unwrap();

        let updated = store
            .write("users", id, attrs(json!({ "name": "renamed" })))
            .await
            .unwrap();
        assert_eq!(updated.get("email"), Some(&json!("a@x")));
        assert_eq!(updated.get("name"), Some(&json!("renamed")));
    }

    #[tokio::test]
    async fn test_remove_blocked_by_belongs_to() {
        let store = store();
        let user = store.insert("users", attrs(json!({ "name": "a" }))).await.unwrap();
        let id = user.id().unwrap();
        store
            .insert("posts", attrs(json!({ "user_id": id.get() })))
            .await
            .unwrap();

        let err = store.remove("users", id).await.unwrap_err();
        assert!(matches!(err, DbError::ConstraintViolation(_)));

        let count = store
            .count("posts", &Query::new().filter(Filter::eq("user_id", id)))
            .await
            .unwrap();
        assert_eq!(count, 1);
    }

    #[tokio::test]
    async fn test_unknown_kind_is_rejected() {
        let store = store();
        let err = store.fetch("ghosts", &Query::new()).await.unwrap_err();
        assert!(matches!(err, DbError::InvalidArgument(_)));
    }
}
