//! # Repository Module
//!
//! The uniform data-access contract for one entity kind.
//!
//! ## Repository Pattern
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Repository Pattern                                   │
//! │                                                                         │
//! │  Caller (HTTP handler, job, seed binary)                               │
//! │       │                                                                 │
//! │       │  users.get_where("status", "active", ...)                      │
//! │       ▼                                                                 │
//! │  Repository trait (every operation is a provided method)               │
//! │  ├── reads      all, paginate, get, get_where, first_where, chunk      │
//! │  ├── writes     create, first_or_create, update, force_update, delete  │
//! │  ├── relations  load, has_relations, sync, attach, detach,             │
//! │  │              create_relationally, update_or_create_relationally     │
//! │  └── query()    lazy QueryHandle for anything else                     │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Store (MemoryStore | SqliteStore)                                     │
//! │                                                                         │
//! │  Implementors supply only store() and kind().                          │
//! │  EntityRepository<S> is the stock implementation.                      │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! The repository holds no entity state between calls.

pub mod query;
pub(crate) mod relations;

use std::collections::HashMap;
use std::ops::ControlFlow;

use async_trait::async_trait;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, warn};

use quarry_core::query::values_equal;
use quarry_core::{
    Attributes, Cardinality, Entity, EntityCollection, EntityId, EntityKind, Filter, OrderBy,
    OrderDirection, Page, Query, ID_COLUMN,
};

use crate::error::{DbError, DbResult};
use crate::store::Store;
use query::check_window;
use relations::{attached_ids, parent_scope, persisted, pivot_of, stamp, LoadTree};

pub use query::QueryHandle;

// =============================================================================
// Argument and Result Types
// =============================================================================

/// Whether a lookup that matches nothing is an error.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Lookup {
    /// Fail with `NotFound`.
    #[default]
    Required,
    /// Return an empty result.
    Optional,
}

/// Result of [`Repository::get`].
#[derive(Debug, Clone, PartialEq)]
pub enum Fetched {
    One(Entity),
    /// No id was given: every entity.
    Many(EntityCollection),
    /// Optional lookup that matched nothing.
    Missing,
}

impl Fetched {
    pub fn into_entity(self) -> Option<Entity> {
        match self {
            Fetched::One(entity) => Some(entity),
            _ => None,
        }
    }

    pub fn into_collection(self) -> EntityCollection {
        match self {
            Fetched::One(entity) => vec![entity],
            Fetched::Many(entities) => entities,
            Fetched::Missing => Vec::new(),
        }
    }

    pub fn is_missing(&self) -> bool {
        matches!(self, Fetched::Missing)
    }
}

/// An entity handle or an id, for operations that accept either.
#[derive(Debug)]
pub enum Target<'a> {
    Entity(&'a mut Entity),
    Id(EntityId),
}

impl<'a> From<&'a mut Entity> for Target<'a> {
    fn from(entity: &'a mut Entity) -> Self {
        Target::Entity(entity)
    }
}

impl From<EntityId> for Target<'_> {
    fn from(id: EntityId) -> Self {
        Target::Id(id)
    }
}

impl From<i64> for Target<'_> {
    fn from(id: i64) -> Self {
        Target::Id(EntityId::new(id))
    }
}

/// One member of a many-to-many sync, with optional pivot attributes.
#[derive(Debug, Clone, PartialEq)]
pub struct SyncItem {
    pub id: EntityId,
    pub attributes: Attributes,
}

impl SyncItem {
    pub fn new(id: impl Into<EntityId>) -> Self {
        SyncItem {
            id: id.into(),
            attributes: Attributes::new(),
        }
    }

    pub fn with_attributes(id: impl Into<EntityId>, attributes: Attributes) -> Self {
        SyncItem {
            id: id.into(),
            attributes,
        }
    }
}

impl From<EntityId> for SyncItem {
    fn from(id: EntityId) -> Self {
        SyncItem::new(id)
    }
}

impl From<i64> for SyncItem {
    fn from(id: i64) -> Self {
        SyncItem::new(id)
    }
}

/// What a sync changed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SyncChanges {
    pub attached: Vec<EntityId>,
    pub detached: Vec<EntityId>,
    /// Already attached, pivot attributes changed.
    pub updated: Vec<EntityId>,
}

// =============================================================================
// Helpers
// =============================================================================

/// Mass-assignable subset of `attributes`, logging what was dropped.
fn guarded(kind: &EntityKind, attributes: Attributes) -> Attributes {
    let (kept, discarded) = kind.fill(attributes);
    if !discarded.is_empty() {
        warn!(kind = %kind.name, fields = ?discarded, "Discarded non-fillable attributes");
    }
    kept
}

fn forced(kind: &EntityKind, attributes: Attributes) -> Attributes {
    let (kept, discarded) = kind.force_fill(attributes);
    if !discarded.is_empty() {
        warn!(kind = %kind.name, fields = ?discarded, "Discarded reserved columns");
    }
    kept
}

fn same_value(current: Option<&Value>, new: &Value) -> bool {
    match current {
        Some(cur) if cur.is_number() && new.is_number() => values_equal(Some(cur), new),
        Some(cur) => cur == new,
        None => false,
    }
}

/// Equality filters on every given attribute.
fn matching(attributes: &Attributes) -> Vec<Filter> {
    attributes
        .iter()
        .map(|(column, value)| Filter::Eq(column.clone(), value.clone()))
        .collect()
}

fn merged(mut base: Attributes, extra: Attributes) -> Attributes {
    base.extend(extra);
    base
}

/// Writes the attributes that differ from the entity and refreshes it.
///
/// Returns false (and writes nothing) when nothing changed or the entity
/// was never persisted.
async fn write_dirty<S: Store>(store: &S, entity: &mut Entity, attributes: Attributes) -> DbResult<bool> {
    let Some(id) = entity.persisted_id() else {
        return Ok(false);
    };

    let dirty: Attributes = attributes
        .into_iter()
        .filter(|(column, value)| !same_value(entity.get(column), value))
        .collect();
    if dirty.is_empty() {
        return Ok(false);
    }

    let fresh = store.write(entity.kind(), id, dirty).await?;
    entity.sync_from(fresh);
    debug!(kind = %entity.kind(), id = %id, "Updated entity");
    Ok(true)
}

// =============================================================================
// Repository Trait
// =============================================================================

/// Data-access contract for one entity kind.
#[async_trait]
pub trait Repository: Send + Sync {
    type Store: Store;

    fn store(&self) -> &Self::Store;

    fn kind(&self) -> &EntityKind;

    /// Begins a lazy query over the kind.
    fn query(&self) -> QueryHandle<'_, Self::Store> {
        QueryHandle::new(self.store(), self.kind())
    }

    /// Repository for the target kind of one of this kind's relations.
    fn related_repository(&self, relation: &str) -> DbResult<EntityRepository<Self::Store>> {
        let descriptor = self.kind().relation_or_err(relation)?;
        EntityRepository::new(self.store().clone(), &descriptor.target)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// Every entity with the named relations loaded.
    async fn all(&self, related: &[&str]) -> DbResult<EntityCollection> {
        self.query().with(related).get().await
    }

    /// First page, newest first.
    async fn paginate(&self, per_page: u64) -> DbResult<Page> {
        self.paginate_at(per_page, 1).await
    }

    async fn paginate_at(&self, per_page: u64, page: u64) -> DbResult<Page> {
        self.query().latest().paginate(per_page, page).await
    }

    /// Every entity when `id` is `None`, otherwise the entity with that id.
    async fn get(&self, id: Option<EntityId>, related: &[&str], lookup: Lookup) -> DbResult<Fetched> {
        let Some(id) = id else {
            return Ok(Fetched::Many(self.all(related).await?));
        };

        match self.query().with(related).find(id).await? {
            Some(entity) => Ok(Fetched::One(entity)),
            None if lookup == Lookup::Required => Err(DbError::not_found(&self.kind().name, id)),
            None => Ok(Fetched::Missing),
        }
    }

    async fn get_by_id(&self, id: EntityId, related: &[&str]) -> DbResult<Entity> {
        self.query()
            .with(related)
            .find(id)
            .await?
            .ok_or_else(|| DbError::not_found(&self.kind().name, id))
    }

    async fn find(&self, id: EntityId) -> DbResult<Option<Entity>> {
        self.query().find(id).await
    }

    /// Entities with `column = value` and every extra filter.
    ///
    /// Newest first unless an order is given.
    async fn get_where(
        &self,
        column: &str,
        value: Value,
        extra: Vec<Filter>,
        lookup: Lookup,
        order: Option<OrderBy>,
    ) -> DbResult<EntityCollection> {
        let query = Query::new()
            .filter(Filter::Eq(column.to_string(), value))
            .filters(extra)
            .order_by(order.unwrap_or_else(OrderBy::latest));

        let entities = self.store().fetch(&self.kind().name, &query).await?;
        if entities.is_empty() && lookup == Lookup::Required {
            return Err(DbError::no_record(&self.kind().name, None));
        }
        Ok(entities)
    }

    /// Entities whose `column` is one of `values`, plus every extra filter.
    ///
    /// Store order (id ascending) unless an order is given.
    async fn get_where_in(
        &self,
        column: &str,
        values: Vec<Value>,
        extra: Vec<Filter>,
        lookup: Lookup,
        order: Option<OrderBy>,
    ) -> DbResult<EntityCollection> {
        let mut query = Query::new()
            .filter(Filter::In(column.to_string(), values))
            .filters(extra);
        if let Some(order) = order {
            query = query.order_by(order);
        }

        let entities = self.store().fetch(&self.kind().name, &query).await?;
        if entities.is_empty() && lookup == Lookup::Required {
            return Err(DbError::no_record(&self.kind().name, None));
        }
        Ok(entities)
    }

    /// First entity with `column = value` and every extra filter.
    ///
    /// `hint` names the record in the `NotFound` message.
    async fn first_where(
        &self,
        column: &str,
        value: Value,
        extra: Vec<Filter>,
        lookup: Lookup,
        hint: Option<&str>,
    ) -> DbResult<Option<Entity>> {
        let entity = self
            .query()
            .filter(Filter::Eq(column.to_string(), value))
            .filters(extra)
            .first()
            .await?;

        if entity.is_none() && lookup == Lookup::Required {
            return Err(DbError::no_record(&self.kind().name, hint));
        }
        Ok(entity)
    }

    /// Feeds pages of `per_page` entities (id order) to `callback`.
    ///
    /// Returns false when the callback breaks, true once every page was seen.
    async fn chunk<F>(&self, per_page: u64, mut callback: F) -> DbResult<bool>
    where
        F: FnMut(EntityCollection, u64) -> ControlFlow<()> + Send,
    {
        check_window(per_page, 1)?;

        let mut page = 1;
        loop {
            let results = self
                .query()
                .order_by(ID_COLUMN, OrderDirection::Asc)
                .for_page(page, per_page)
                .get()
                .await?;
            if results.is_empty() {
                return Ok(true);
            }

            let size = results.len() as u64;
            if callback(results, page).is_break() {
                debug!(kind = %self.kind().name, page, "Chunking stopped by callback");
                return Ok(false);
            }
            if size < per_page {
                return Ok(true);
            }
            page += 1;
        }
    }

    // =========================================================================
    // Writes
    // =========================================================================

    /// An unsaved (or assumed-saved) instance, guarded fill.
    fn new_instance(&self, attributes: Attributes, exists: bool) -> Entity {
        let mut entity = Entity::new(&self.kind().name, guarded(self.kind(), attributes));
        entity.set_exists(exists);
        entity
    }

    async fn create(&self, attributes: Attributes) -> DbResult<Entity> {
        let attributes = guarded(self.kind(), attributes);
        self.store().insert(&self.kind().name, attributes).await
    }

    /// First entity matching every attribute, else an unsaved instance.
    async fn first_or_new(&self, attributes: Attributes, defaults: Attributes) -> DbResult<Entity> {
        if let Some(found) = self.query().filters(matching(&attributes)).first().await? {
            return Ok(found);
        }
        Ok(self.new_instance(merged(attributes, defaults), false))
    }

    /// First entity matching every attribute, else a newly created one.
    async fn first_or_create(&self, attributes: Attributes, defaults: Attributes) -> DbResult<Entity> {
        if let Some(found) = self.query().filters(matching(&attributes)).first().await? {
            return Ok(found);
        }
        self.create(merged(attributes, defaults)).await
    }

    /// Guarded update of an entity handle or an id. True when a field changed.
    async fn update(&self, target: Target<'_>, attributes: Attributes) -> DbResult<bool> {
        match target {
            Target::Entity(entity) => self.update_entity(entity, attributes).await,
            Target::Id(id) => self.update_by_id(id, attributes).await,
        }
    }

    /// Guarded update of a handle, refreshed in place. False for unsaved handles.
    async fn update_entity(&self, entity: &mut Entity, attributes: Attributes) -> DbResult<bool> {
        let attributes = guarded(self.kind(), attributes);
        write_dirty(self.store(), entity, attributes).await
    }

    async fn update_by_id(&self, id: EntityId, attributes: Attributes) -> DbResult<bool> {
        let mut entity = self.get_by_id(id, &[]).await?;
        self.update_entity(&mut entity, attributes).await
    }

    /// Update that ignores the mass-assignment policy (reserved columns
    /// are still never written).
    async fn force_update(&self, target: Target<'_>, attributes: Attributes) -> DbResult<bool> {
        let attributes = forced(self.kind(), attributes);
        match target {
            Target::Entity(entity) => write_dirty(self.store(), entity, attributes).await,
            Target::Id(id) => {
                let mut entity = self.get_by_id(id, &[]).await?;
                write_dirty(self.store(), &mut entity, attributes).await
            }
        }
    }

    /// Matches on `attributes`: updates the match with `values`, or creates
    /// from both.
    async fn update_or_create(&self, attributes: Attributes, values: Attributes) -> DbResult<Entity> {
        match self.query().filters(matching(&attributes)).first().await? {
            Some(mut entity) => {
                self.update_entity(&mut entity, values).await?;
                Ok(entity)
            }
            None => self.create(merged(attributes, values)).await,
        }
    }

    /// Deletes by handle or id.
    ///
    /// `None` when the handle was never persisted.
    async fn delete(&self, target: Target<'_>) -> DbResult<Option<bool>> {
        match target {
            Target::Entity(entity) => {
                let Some(id) = entity.persisted_id() else {
                    return Ok(None);
                };
                let removed = self.store().remove(&self.kind().name, id).await?;
                entity.set_exists(false);
                Ok(Some(removed))
            }
            Target::Id(id) => {
                let entity = self.get_by_id(id, &[]).await?;
                let id = entity.id().unwrap_or(id);
                Ok(Some(self.store().remove(&self.kind().name, id).await?))
            }
        }
    }

    // =========================================================================
    // Relations
    // =========================================================================

    /// Eager-loads relations (dot-paths allowed) onto a fetched entity.
    async fn load(&self, entity: &mut Entity, relations: &[&str]) -> DbResult<()> {
        let tree = LoadTree::parse(relations);
        relations::load(self.store(), self.kind(), std::slice::from_mut(entity), &tree).await
    }

    async fn has_relations(&self, id: EntityId, relations: &[&str]) -> DbResult<bool> {
        self.has_relations_by(ID_COLUMN, Value::from(id), relations).await
    }

    /// True when some entity with `column = value` has a related record in
    /// any of the named relations.
    async fn has_relations_by(&self, column: &str, value: Value, relations: &[&str]) -> DbResult<bool> {
        if relations.is_empty() {
            return Err(DbError::invalid(
                "has_relations only accepts a non-empty list of relations",
            ));
        }
        let descriptors = relations
            .iter()
            .map(|name| self.kind().relation_or_err(name))
            .collect::<Result<Vec<_>, _>>()?;

        let candidates = self.query().where_eq(column, value).get().await?;
        for entity in &candidates {
            for descriptor in &descriptors {
                if relations::exists(self.store(), entity, descriptor).await? {
                    return Ok(true);
                }
            }
        }
        Ok(false)
    }

    /// Makes the parent's membership in a many-to-many relation exactly `items`.
    async fn sync(&self, parent: &Entity, relation: &str, items: Vec<SyncItem>) -> DbResult<SyncChanges> {
        let (descriptor, pivot, parent_id) = pivot_of(self.kind(), parent, relation)?;
        let store = self.store();

        // Same id twice: first position, last attributes.
        let mut wanted: Vec<(EntityId, Attributes)> = Vec::new();
        for item in items {
            match wanted.iter_mut().find(|(id, _)| *id == item.id) {
                Some(existing) => existing.1 = item.attributes,
                None => wanted.push((item.id, item.attributes)),
            }
        }

        let rows = store.pivot_rows(&parent_scope(pivot, parent_id)).await?;
        let mut current: HashMap<EntityId, Attributes> = HashMap::new();
        let mut current_order = Vec::new();
        for row in rows {
            if let Some(id) = row.get(&pivot.related_key).and_then(EntityId::from_value) {
                if !current.contains_key(&id) {
                    current_order.push(id);
                }
                current.insert(id, row);
            }
        }

        let new_items: Vec<(EntityId, Attributes)> = wanted
            .iter()
            .filter(|(id, _)| !current.contains_key(id))
            .cloned()
            .collect();
        for (id, _) in &new_items {
            if store.find(&descriptor.target, *id).await?.is_none() {
                return Err(DbError::ConstraintViolation(format!(
                    "Cannot attach {} {}: no such record",
                    descriptor.target, id
                )));
            }
        }

        let mut changes = SyncChanges::default();

        changes.detached = current_order
            .iter()
            .copied()
            .filter(|id| !wanted.iter().any(|(w, _)| w == id))
            .collect();
        if !changes.detached.is_empty() {
            let scope = parent_scope(pivot, parent_id)
                .with(pivot.related_key.clone(), changes.detached.clone());
            store.pivot_delete(&scope).await?;
        }

        for (id, attributes) in &wanted {
            let Some(row) = current.get(id) else {
                continue;
            };
            if attributes.is_empty() || attributes.iter().all(|(k, v)| same_value(row.get(k), v)) {
                continue;
            }
            let mut update = attributes.clone();
            stamp(pivot, &mut update, false);
            let scope = parent_scope(pivot, parent_id).with(pivot.related_key.clone(), vec![*id]);
            store.pivot_update(&scope, update).await?;
            changes.updated.push(*id);
        }

        changes.attached = relations::insert_rows(store, descriptor, pivot, parent_id, new_items).await?;

        debug!(
            kind = %self.kind().name,
            relation = %relation,
            attached = changes.attached.len(),
            detached = changes.detached.len(),
            updated = changes.updated.len(),
            "Synced relation"
        );
        Ok(changes)
    }

    /// Attaches ids not yet attached, with the same pivot attributes each.
    ///
    /// Returns the newly attached ids. With `touch`, the parent and every
    /// attached entity get their `updated_at` bumped.
    async fn attach(
        &self,
        parent: &Entity,
        relation: &str,
        ids: &[EntityId],
        attributes: Attributes,
        touch: bool,
    ) -> DbResult<Vec<EntityId>> {
        let (descriptor, pivot, parent_id) = pivot_of(self.kind(), parent, relation)?;
        let store = self.store();

        let current = attached_ids(store, pivot, parent_id).await?;
        let mut items: Vec<(EntityId, Attributes)> = Vec::new();
        for id in ids {
            if !current.contains(id) && !items.iter().any(|(seen, _)| seen == id) {
                items.push((*id, attributes.clone()));
            }
        }

        let attached = relations::insert_rows(store, descriptor, pivot, parent_id, items).await?;

        if touch && !attached.is_empty() {
            store.touch(&self.kind().name, parent_id).await?;
            for id in &attached {
                store.touch(&descriptor.target, *id).await?;
            }
        }

        debug!(kind = %self.kind().name, relation = %relation, count = attached.len(), "Attached");
        Ok(attached)
    }

    /// Detaches the given ids, or every member when `ids` is `None`.
    async fn detach(
        &self,
        parent: &Entity,
        relation: &str,
        ids: Option<&[EntityId]>,
        touch: bool,
    ) -> DbResult<u64> {
        let (_, pivot, parent_id) = pivot_of(self.kind(), parent, relation)?;

        let mut scope = parent_scope(pivot, parent_id);
        if let Some(ids) = ids {
            scope = scope.with(pivot.related_key.clone(), ids.to_vec());
        }
        let removed = self.store().pivot_delete(&scope).await?;

        if touch && removed > 0 {
            self.store().touch(&self.kind().name, parent_id).await?;
        }

        debug!(kind = %self.kind().name, relation = %relation, removed, "Detached");
        Ok(removed)
    }

    /// Creates an entity linked to `parent` through `relation`.
    ///
    /// HasOne/HasMany set the foreign key; BelongsToMany creates then attaches.
    async fn create_relationally(
        &self,
        parent: &Entity,
        relation: &str,
        attributes: Attributes,
    ) -> DbResult<Entity> {
        let descriptor = self.kind().relation_or_err(relation)?;
        let parent_id = persisted(parent, relation)?;
        let target = self.store().schema().kind_or_err(&descriptor.target)?;

        match &descriptor.cardinality {
            Cardinality::HasOne { foreign_key } | Cardinality::HasMany { foreign_key } => {
                let mut attributes = guarded(target, attributes);
                attributes.insert(foreign_key.clone(), Value::from(parent_id));
                self.store().insert(&target.name, attributes).await
            }
            Cardinality::BelongsToMany { .. } => {
                let created = self
                    .store()
                    .insert(&target.name, guarded(target, attributes))
                    .await?;
                if let Some(id) = created.id() {
                    self.attach(parent, relation, &[id], Attributes::new(), true)
                        .await?;
                }
                Ok(created)
            }
            Cardinality::BelongsTo { .. } => Err(DbError::invalid(format!(
                "Cannot create through belongs-to relation [{}] on kind [{}]",
                relation,
                self.kind().name
            ))),
        }
    }

    /// `update_or_create` restricted to entities linked to `parent`.
    async fn update_or_create_relationally(
        &self,
        parent: &Entity,
        relation: &str,
        attributes: Attributes,
        values: Attributes,
    ) -> DbResult<Entity> {
        let descriptor = self.kind().relation_or_err(relation)?;
        let parent_id = persisted(parent, relation)?;
        let target = self.store().schema().kind_or_err(&descriptor.target)?;
        let scoped = QueryHandle::new(self.store(), target).filters(matching(&attributes));

        let existing = match &descriptor.cardinality {
            Cardinality::HasOne { foreign_key } | Cardinality::HasMany { foreign_key } => {
                scoped.where_eq(foreign_key.clone(), parent_id).first().await?
            }
            Cardinality::BelongsToMany { pivot } => {
                let linked = attached_ids(self.store(), pivot, parent_id).await?;
                scoped.where_in(ID_COLUMN, linked).first().await?
            }
            Cardinality::BelongsTo { .. } => {
                return Err(DbError::invalid(format!(
                    "Cannot create through belongs-to relation [{}] on kind [{}]",
                    relation,
                    self.kind().name
                )))
            }
        };

        match existing {
            Some(mut entity) => {
                write_dirty(self.store(), &mut entity, guarded(target, values)).await?;
                Ok(entity)
            }
            None => {
                self.create_relationally(parent, relation, merged(attributes, values))
                    .await
            }
        }
    }
}

// =============================================================================
// Stock Implementation
// =============================================================================

/// Repository over any [`Store`] for one kind of its schema.
///
/// ## Usage
/// ```rust,ignore
/// let users = EntityRepository::new(store, "users")?;
/// let ada = users.create(attrs).await?;
/// ```
#[derive(Debug, Clone)]
pub struct EntityRepository<S: Store> {
    store: S,
    kind: EntityKind,
}

impl<S: Store> EntityRepository<S> {
    /// Fails with `InvalidArgument` when the kind is not in the store's schema.
    pub fn new(store: S, kind: &str) -> DbResult<Self> {
        let kind = store.schema().kind_or_err(kind)?.clone();
        Ok(EntityRepository { store, kind })
    }
}

impl<S: Store> Repository for EntityRepository<S> {
    type Store = S;

    fn store(&self) -> &S {
        &self.store
    }

    fn kind(&self) -> &EntityKind {
        &self.kind
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
