//! # Relation Helpers
//!
//! Eager loading, existence checks and pivot bookkeeping shared by the
//! repository and the query handle.
//!
//! ## Eager Loading
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  ["roles.permissions", "posts"]                                        │
//! │       │                                                                 │
//! │       ▼  LoadTree::parse                                               │
//! │  roles ── permissions                                                  │
//! │  posts                                                                 │
//! │       │                                                                 │
//! │       ▼  one batched fetch per relation and level                      │
//! │  parents ──► related (flattened) ──► recurse ──► split back per parent │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, HashMap, HashSet};
use std::future::Future;
use std::pin::Pin;

use chrono::Utc;
use serde_json::Value;
use tracing::debug;

use quarry_core::validation::check_columns;
use quarry_core::{
    timestamp_value, Attributes, Cardinality, Entity, EntityId, EntityKind, Filter, PivotTable,
    Query, Related, RelationDescriptor, CREATED_AT, ID_COLUMN, UPDATED_AT,
};

use crate::error::{DbError, DbResult};
use crate::store::{PivotScope, Store};

type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

// =============================================================================
// Load Tree
// =============================================================================

/// Nested relation names parsed from dot-paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub(crate) struct LoadTree {
    children: BTreeMap<String, LoadTree>,
}

impl LoadTree {
    pub(crate) fn parse<S: AsRef<str>>(paths: &[S]) -> Self {
        let mut root = LoadTree::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path.as_ref().split('.').map(str::trim).filter(|s| !s.is_empty()) {
                node = node.children.entry(segment.to_string()).or_default();
            }
        }
        root
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.children.is_empty()
    }
}

fn id_values(ids: &[EntityId]) -> Vec<Value> {
    ids.iter().map(|id| Value::from(*id)).collect()
}

fn unique_ids<I: IntoIterator<Item = EntityId>>(ids: I) -> Vec<EntityId> {
    let mut seen = HashSet::new();
    ids.into_iter().filter(|id| seen.insert(*id)).collect()
}

/// Loads every relation in `tree` onto `entities`, recursively.
pub(crate) fn load<'a, S: Store>(
    store: &'a S,
    kind: &'a EntityKind,
    entities: &'a mut [Entity],
    tree: &'a LoadTree,
) -> BoxFuture<'a, DbResult<()>> {
    Box::pin(async move {
        for (name, subtree) in &tree.children {
            let descriptor = kind.relation_or_err(name)?;
            let target = store.schema().kind_or_err(&descriptor.target)?;
            load_one(store, target, descriptor, entities, subtree).await?;
        }
        Ok(())
    })
}

async fn load_one<S: Store>(
    store: &S,
    target: &EntityKind,
    descriptor: &RelationDescriptor,
    entities: &mut [Entity],
    subtree: &LoadTree,
) -> DbResult<()> {
    let parent_ids = unique_ids(entities.iter().filter_map(Entity::id));

    match &descriptor.cardinality {
        Cardinality::HasOne { foreign_key } | Cardinality::HasMany { foreign_key } => {
            let mut related = if parent_ids.is_empty() {
                Vec::new()
            } else {
                let query = Query::new().filter(Filter::In(foreign_key.clone(), id_values(&parent_ids)));
                store.fetch(&target.name, &query).await?
            };
            if !subtree.is_empty() {
                load(store, target, &mut related, subtree).await?;
            }

            let mut grouped: HashMap<EntityId, Vec<Entity>> = HashMap::new();
            for child in related {
                if let Some(owner) = child.get(foreign_key).and_then(EntityId::from_value) {
                    grouped.entry(owner).or_default().push(child);
                }
            }

            for entity in entities.iter_mut() {
                let children = entity
                    .id()
                    .and_then(|id| grouped.get(&id).cloned())
                    .unwrap_or_default();
                let value = if descriptor.is_many() {
                    Related::Many(children)
                } else {
                    Related::One(children.into_iter().next().map(Box::new))
                };
                entity.set_relation(descriptor.name.clone(), value);
            }
        }

        Cardinality::BelongsTo { foreign_key } => {
            let owner_ids = unique_ids(
                entities
                    .iter()
                    .filter_map(|e| e.get(foreign_key).and_then(EntityId::from_value)),
            );
            let mut owners = if owner_ids.is_empty() {
                Vec::new()
            } else {
                let query = Query::new().filter(Filter::In(ID_COLUMN.to_string(), id_values(&owner_ids)));
                store.fetch(&target.name, &query).await?
            };
            if !subtree.is_empty() {
                load(store, target, &mut owners, subtree).await?;
            }

            let by_id: HashMap<EntityId, Entity> = owners
                .into_iter()
                .filter_map(|e| e.id().map(|id| (id, e)))
                .collect();

            for entity in entities.iter_mut() {
                let owner = entity
                    .get(foreign_key)
                    .and_then(EntityId::from_value)
                    .and_then(|id| by_id.get(&id).cloned())
                    .map(Box::new);
                entity.set_relation(descriptor.name.clone(), Related::One(owner));
            }
        }

        Cardinality::BelongsToMany { pivot } => {
            let rows = if parent_ids.is_empty() {
                Vec::new()
            } else {
                let scope = PivotScope::new(pivot.table.clone()).with(pivot.parent_key.clone(), parent_ids);
                store.pivot_rows(&scope).await?
            };

            let related_ids = unique_ids(
                rows.iter()
                    .filter_map(|row| row.get(&pivot.related_key).and_then(EntityId::from_value)),
            );
            let mut related = if related_ids.is_empty() {
                Vec::new()
            } else {
                let query = Query::new().filter(Filter::In(ID_COLUMN.to_string(), id_values(&related_ids)));
                store.fetch(&target.name, &query).await?
            };
            if !subtree.is_empty() {
                load(store, target, &mut related, subtree).await?;
            }

            let by_id: HashMap<EntityId, Entity> = related
                .into_iter()
                .filter_map(|e| e.id().map(|id| (id, e)))
                .collect();

            for entity in entities.iter_mut() {
                let Some(parent_id) = entity.id() else {
                    entity.set_relation(descriptor.name.clone(), Related::Many(Vec::new()));
                    continue;
                };
                let members = rows
                    .iter()
                    .filter(|row| row.get(&pivot.parent_key).and_then(EntityId::from_value) == Some(parent_id))
                    .filter_map(|row| {
                        let related_id = row.get(&pivot.related_key).and_then(EntityId::from_value)?;
                        by_id.get(&related_id).map(|e| e.clone().with_pivot(row.clone()))
                    })
                    .collect();
                entity.set_relation(descriptor.name.clone(), Related::Many(members));
            }
        }
    }

    debug!(relation = %descriptor.name, target = %target.name, "Loaded relation");
    Ok(())
}

// =============================================================================
// Existence
// =============================================================================

/// Whether `entity` has at least one related record through `descriptor`.
pub(crate) async fn exists<S: Store>(
    store: &S,
    entity: &Entity,
    descriptor: &RelationDescriptor,
) -> DbResult<bool> {
    let Some(id) = entity.id() else {
        return Ok(false);
    };

    match &descriptor.cardinality {
        Cardinality::HasOne { foreign_key } | Cardinality::HasMany { foreign_key } => {
            let query = Query::new().filter(Filter::eq(foreign_key.clone(), id));
            Ok(store.count(&descriptor.target, &query).await? > 0)
        }
        Cardinality::BelongsTo { foreign_key } => {
            match entity.get(foreign_key).and_then(EntityId::from_value) {
                Some(owner) => Ok(store.find(&descriptor.target, owner).await?.is_some()),
                None => Ok(false),
            }
        }
        Cardinality::BelongsToMany { pivot } => {
            let scope = PivotScope::new(pivot.table.clone()).with(pivot.parent_key.clone(), vec![id]);
            Ok(!store.pivot_rows(&scope).await?.is_empty())
        }
    }
}

// =============================================================================
// Pivot Bookkeeping
// =============================================================================

/// Resolves a many-to-many relation and the persisted parent it is used from.
pub(crate) fn pivot_of<'k>(
    kind: &'k EntityKind,
    parent: &Entity,
    relation: &str,
) -> DbResult<(&'k RelationDescriptor, &'k PivotTable, EntityId)> {
    let descriptor = kind.relation_or_err(relation)?;
    let pivot = descriptor.pivot().ok_or_else(|| {
        DbError::invalid(format!(
            "Relation [{}] on kind [{}] is not many-to-many",
            relation, kind.name
        ))
    })?;
    let parent_id = persisted(parent, relation)?;
    Ok((descriptor, pivot, parent_id))
}

/// The parent's id, or `InvalidArgument` when it was never saved.
pub(crate) fn persisted(parent: &Entity, relation: &str) -> DbResult<EntityId> {
    parent.persisted_id().ok_or_else(|| {
        DbError::invalid(format!(
            "Cannot use relation [{}] on an unsaved {} entity",
            relation,
            parent.kind()
        ))
    })
}

pub(crate) fn parent_scope(pivot: &PivotTable, parent_id: EntityId) -> PivotScope {
    PivotScope::new(pivot.table.clone()).with(pivot.parent_key.clone(), vec![parent_id])
}

/// Related ids currently attached to the parent, in attach order.
pub(crate) async fn attached_ids<S: Store>(
    store: &S,
    pivot: &PivotTable,
    parent_id: EntityId,
) -> DbResult<Vec<EntityId>> {
    let rows = store.pivot_rows(&parent_scope(pivot, parent_id)).await?;
    Ok(unique_ids(
        rows.iter()
            .filter_map(|row| row.get(&pivot.related_key).and_then(EntityId::from_value)),
    ))
}

/// Stamps pivot timestamps when the pivot declares them.
pub(crate) fn stamp(pivot: &PivotTable, row: &mut Attributes, creating: bool) {
    if !pivot.with_timestamps {
        return;
    }
    let now = timestamp_value(Utc::now());
    if creating {
        row.insert(CREATED_AT.to_string(), now.clone());
    }
    row.insert(UPDATED_AT.to_string(), now);
}

/// Inserts one pivot row per `(id, attributes)` pair.
///
/// Every related id must exist. Keys always win over caller attributes.
pub(crate) async fn insert_rows<S: Store>(
    store: &S,
    descriptor: &RelationDescriptor,
    pivot: &PivotTable,
    parent_id: EntityId,
    items: Vec<(EntityId, Attributes)>,
) -> DbResult<Vec<EntityId>> {
    let mut attached = Vec::with_capacity(items.len());
    for (related_id, attributes) in items {
        let errors = check_columns(&attributes);
        if !errors.is_empty() {
            return Err(DbError::validation(errors));
        }
        if store.find(&descriptor.target, related_id).await?.is_none() {
            return Err(DbError::ConstraintViolation(format!(
                "Cannot attach {} {}: no such record",
                descriptor.target, related_id
            )));
        }

        let mut row = attributes;
        row.insert(pivot.parent_key.clone(), Value::from(parent_id));
        row.insert(pivot.related_key.clone(), Value::from(related_id));
        stamp(pivot, &mut row, true);

        store.pivot_insert(&pivot.table, row).await?;
        attached.push(related_id);
    }
    Ok(attached)
}

// =============================================================================
// Unit Tests
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_tree_merges_dot_paths() {
        let tree = LoadTree::parse(&["roles.permissions", "roles", " posts ", "", "a..b"]);

        let names: Vec<_> = tree.children.keys().cloned().collect();
        assert_eq!(names, vec!["a", "posts", "roles"]);
        assert!(tree.children["roles"].children.contains_key("permissions"));
        assert!(tree.children["a"].children.contains_key("b"));
        assert!(tree.children["posts"].is_empty());
    }

    #[test]
    fn test_unique_ids_keeps_first_occurrence() {
        let ids = unique_ids([3, 1, 3, 2, 1].map(EntityId::new));
        assert_eq!(ids, vec![EntityId::new(3), EntityId::new(1), EntityId::new(2)]);
    }
}
