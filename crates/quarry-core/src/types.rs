//! # Domain Types
//!
//! Core types handed out by every repository.
//!
//! ## Type Hierarchy
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                         Domain Types                                    │
//! │                                                                         │
//! │  ┌─────────────────┐   ┌─────────────────┐   ┌─────────────────┐       │
//! │  │     Entity      │   │     Related     │   │      Page       │       │
//! │  │  ─────────────  │   │  ─────────────  │   │  ─────────────  │       │
//! │  │  kind           │   │  One(Entity?)   │   │  items          │       │
//! │  │  id (EntityId)  │   │  Many(Vec)      │   │  current_page   │       │
//! │  │  attributes     │   └─────────────────┘   │  per_page       │       │
//! │  │  relations      │                         │  total          │       │
//! │  │  pivot          │                         └─────────────────┘       │
//! │  └─────────────────┘                                                    │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Identity
//! The id is assigned by the store on insert and never changes afterwards.
//! An entity built in memory (`Entity::new`) has no id until it is persisted.

use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, SecondsFormat, Utc};
use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::{CREATED_AT, ID_COLUMN, UPDATED_AT};

/// Field name → value map of an entity.
pub type Attributes = serde_json::Map<String, Value>;

/// Ordered sequence of entities, in the order the store returned them.
pub type EntityCollection = Vec<Entity>;

// =============================================================================
// Entity Id
// =============================================================================

/// Primary identifier of an entity, unique per kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityId(i64);

impl EntityId {
    #[inline]
    pub const fn new(id: i64) -> Self {
        EntityId(id)
    }

    #[inline]
    pub const fn get(self) -> i64 {
        self.0
    }

    /// Reads an id out of a JSON value (integers, or integral strings).
    pub fn from_value(value: &Value) -> Option<Self> {
        match value {
            Value::Number(n) => n.as_i64().map(EntityId),
            Value::String(s) => s.trim().parse().ok().map(EntityId),
            _ => None,
        }
    }
}

impl From<i64> for EntityId {
    fn from(id: i64) -> Self {
        EntityId(id)
    }
}

impl From<EntityId> for Value {
    fn from(id: EntityId) -> Self {
        Value::from(id.0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Renders a timestamp the way both stores persist it.
///
/// Fixed-width RFC 3339 in UTC, so string order equals chronological order.
pub fn timestamp_value(at: DateTime<Utc>) -> Value {
    Value::String(format_timestamp(at))
}

/// String form of [`timestamp_value`].
pub fn format_timestamp(at: DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Micros, true)
}

// =============================================================================
// Entity
// =============================================================================

/// A record of a given kind.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    kind: String,
    id: Option<EntityId>,
    attributes: Attributes,
    exists: bool,
    created_at: Option<DateTime<Utc>>,
    updated_at: Option<DateTime<Utc>>,
    relations: BTreeMap<String, Related>,
    pivot: Option<Attributes>,
}

impl Entity {
    /// Creates an unsaved entity.
    pub fn new(kind: impl Into<String>, attributes: Attributes) -> Self {
        Entity {
            kind: kind.into(),
            id: None,
            attributes,
            exists: false,
            created_at: None,
            updated_at: None,
            relations: BTreeMap::new(),
            pivot: None,
        }
    }

    /// Creates an entity as read back from a store.
    pub fn from_store(
        kind: impl Into<String>,
        id: EntityId,
        attributes: Attributes,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        Entity {
            kind: kind.into(),
            id: Some(id),
            attributes,
            exists: true,
            created_at: Some(created_at),
            updated_at: Some(updated_at),
            relations: BTreeMap::new(),
            pivot: None,
        }
    }

    pub fn kind(&self) -> &str {
        &self.kind
    }

    pub fn id(&self) -> Option<EntityId> {
        self.id
    }

    /// Whether the entity is treated as backed by the store.
    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn set_exists(&mut self, exists: bool) {
        self.exists = exists;
    }

    /// Persisted id, only when the entity is both keyed and existing.
    pub fn persisted_id(&self) -> Option<EntityId> {
        if self.exists {
            self.id
        } else {
            None
        }
    }

    pub fn attributes(&self) -> &Attributes {
        &self.attributes
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    pub fn updated_at(&self) -> Option<DateTime<Utc>> {
        self.updated_at
    }

    /// Returns a plain attribute.
    pub fn get(&self, column: &str) -> Option<&Value> {
        self.attributes.get(column)
    }

    /// Returns the value of any column, including the store-owned ones.
    pub fn value(&self, column: &str) -> Option<Value> {
        match column {
            ID_COLUMN => self.id.map(Value::from),
            CREATED_AT => self.created_at.map(timestamp_value),
            UPDATED_AT => self.updated_at.map(timestamp_value),
            _ => self.attributes.get(column).cloned(),
        }
    }

    pub fn set(&mut self, column: impl Into<String>, value: Value) {
        self.attributes.insert(column.into(), value);
    }

    /// Merges attributes into the entity (in memory only).
    pub fn fill(&mut self, attributes: Attributes) {
        for (key, value) in attributes {
            self.attributes.insert(key, value);
        }
    }

    /// True when every given attribute is equal on this entity.
    pub fn matches(&self, attributes: &Attributes) -> bool {
        attributes.iter().all(|(column, expected)| {
            crate::query::values_equal(self.value(column).as_ref(), expected)
        })
    }

    /// Copies persisted state from a fresh read, keeping loaded relations.
    pub fn sync_from(&mut self, fresh: Entity) {
        self.id = fresh.id;
        self.attributes = fresh.attributes;
        self.exists = fresh.exists;
        self.created_at = fresh.created_at;
        self.updated_at = fresh.updated_at;
    }

    pub fn relation(&self, name: &str) -> Option<&Related> {
        self.relations.get(name)
    }

    pub fn relations(&self) -> &BTreeMap<String, Related> {
        &self.relations
    }

    pub fn relation_loaded(&self, name: &str) -> bool {
        self.relations.contains_key(name)
    }

    pub fn set_relation(&mut self, name: impl Into<String>, related: Related) {
        self.relations.insert(name.into(), related);
    }

    /// Pivot row attributes, for entities reached through a many-to-many relation.
    pub fn pivot(&self) -> Option<&Attributes> {
        self.pivot.as_ref()
    }

    pub fn with_pivot(mut self, pivot: Attributes) -> Self {
        self.pivot = Some(pivot);
        self
    }

    /// JSON view of the entity without its relations.
    pub fn to_plain_json(&self) -> Value {
        let mut out = Attributes::new();
        if let Some(id) = self.id {
            out.insert(ID_COLUMN.to_string(), Value::from(id));
        }
        for (key, value) in &self.attributes {
            out.insert(key.clone(), value.clone());
        }
        if let Some(at) = self.created_at {
            out.insert(CREATED_AT.to_string(), timestamp_value(at));
        }
        if let Some(at) = self.updated_at {
            out.insert(UPDATED_AT.to_string(), timestamp_value(at));
        }
        if let Some(pivot) = &self.pivot {
            out.insert("pivot".to_string(), Value::Object(pivot.clone()));
        }
        Value::Object(out)
    }

    /// JSON view of the entity including every loaded relation.
    pub fn to_json(&self) -> Value {
        let mut out = match self.to_plain_json() {
            Value::Object(map) => map,
            _ => Attributes::new(),
        };
        for (name, related) in &self.relations {
            out.insert(name.clone(), related.to_json());
        }
        Value::Object(out)
    }
}

impl Serialize for Entity {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

// =============================================================================
// Related
// =============================================================================

/// A loaded relation.
#[derive(Debug, Clone, PartialEq)]
pub enum Related {
    /// HasOne / BelongsTo
    One(Option<Box<Entity>>),
    /// HasMany / BelongsToMany
    Many(EntityCollection),
}

impl Related {
    pub fn is_empty(&self) -> bool {
        match self {
            Related::One(one) => one.is_none(),
            Related::Many(many) => many.is_empty(),
        }
    }

    pub fn entities(&self) -> Vec<&Entity> {
        match self {
            Related::One(one) => one.iter().map(|e| e.as_ref()).collect(),
            Related::Many(many) => many.iter().collect(),
        }
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.entities().into_iter().filter_map(Entity::id).collect()
    }

    pub fn to_json(&self) -> Value {
        match self {
            Related::One(Some(entity)) => entity.to_json(),
            Related::One(None) => Value::Null,
            Related::Many(many) => Value::Array(many.iter().map(Entity::to_json).collect()),
        }
    }
}

// =============================================================================
// Page
// =============================================================================

/// A bounded slice of a result set plus pagination metadata.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Page {
    pub items: EntityCollection,
    /// 1-based page number.
    pub current_page: u64,
    pub per_page: u64,
    /// Total matches across all pages.
    pub total: u64,
}

impl Page {
    pub fn new(items: EntityCollection, current_page: u64, per_page: u64, total: u64) -> Self {
        Page {
            items,
            current_page,
            per_page,
            total,
        }
    }

    /// Number of items on this page.
    pub fn count(&self) -> usize {
        self.items.len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    /// Last page number (at least 1).
    pub fn last_page(&self) -> u64 {
        if self.per_page == 0 {
            return 1;
        }
        self.total.div_ceil(self.per_page).max(1)
    }

    pub fn has_more_pages(&self) -> bool {
        self.current_page < self.last_page()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
