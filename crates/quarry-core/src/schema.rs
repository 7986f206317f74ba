//! # Schema
//!
//! Declared entity kinds and the associations between them.
//!
//! Relations are a registered mapping from relation name to a typed
//! descriptor. Repositories look them up at call time.
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Cardinality        Link lives on            Example                   │
//! │  ───────────        ─────────────            ───────                   │
//! │  HasOne / HasMany   target.foreign_key       users → posts (user_id)   │
//! │  BelongsTo          parent.foreign_key       posts → users (user_id)   │
//! │  BelongsToMany      pivot table rows         users ⇄ roles (role_user) │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::collections::{BTreeMap, BTreeSet};

use crate::error::{CoreError, CoreResult};
use crate::types::Attributes;
use crate::RESERVED_COLUMNS;

// =============================================================================
// Relations
// =============================================================================

/// Join table of a many-to-many relation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotTable {
    pub table: String,
    /// Pivot column holding the parent's id.
    pub parent_key: String,
    /// Pivot column holding the related entity's id.
    pub related_key: String,
    /// Stamp `created_at` / `updated_at` on pivot rows.
    pub with_timestamps: bool,
}

impl PivotTable {
    pub fn new(
        table: impl Into<String>,
        parent_key: impl Into<String>,
        related_key: impl Into<String>,
    ) -> Self {
        PivotTable {
            table: table.into(),
            parent_key: parent_key.into(),
            related_key: related_key.into(),
            with_timestamps: false,
        }
    }

    pub fn with_timestamps(mut self) -> Self {
        self.with_timestamps = true;
        self
    }

    /// The same table seen from the other side of the relation.
    pub fn inverse(&self) -> Self {
        PivotTable {
            table: self.table.clone(),
            parent_key: self.related_key.clone(),
            related_key: self.parent_key.clone(),
            with_timestamps: self.with_timestamps,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Cardinality {
    HasOne { foreign_key: String },
    HasMany { foreign_key: String },
    BelongsTo { foreign_key: String },
    BelongsToMany { pivot: PivotTable },
}

/// A declared association from one kind to another.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelationDescriptor {
    pub name: String,
    /// Kind of the related entities.
    pub target: String,
    pub cardinality: Cardinality,
}

impl RelationDescriptor {
    pub fn has_one(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        RelationDescriptor {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::HasOne {
                foreign_key: foreign_key.into(),
            },
        }
    }

    pub fn has_many(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        RelationDescriptor {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::HasMany {
                foreign_key: foreign_key.into(),
            },
        }
    }

    pub fn belongs_to(
        name: impl Into<String>,
        target: impl Into<String>,
        foreign_key: impl Into<String>,
    ) -> Self {
        RelationDescriptor {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::BelongsTo {
                foreign_key: foreign_key.into(),
            },
        }
    }

    pub fn belongs_to_many(
        name: impl Into<String>,
        target: impl Into<String>,
        pivot: PivotTable,
    ) -> Self {
        RelationDescriptor {
            name: name.into(),
            target: target.into(),
            cardinality: Cardinality::BelongsToMany { pivot },
        }
    }

    /// Whether the relation yields a collection.
    pub fn is_many(&self) -> bool {
        matches!(
            self.cardinality,
            Cardinality::HasMany { .. } | Cardinality::BelongsToMany { .. }
        )
    }

    pub fn pivot(&self) -> Option<&PivotTable> {
        match &self.cardinality {
            Cardinality::BelongsToMany { pivot } => Some(pivot),
            _ => None,
        }
    }
}

// =============================================================================
// Mutation Policy
// =============================================================================

/// Which attributes may be mass-assigned through guarded writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MutationPolicy {
    /// Only the listed fields. An empty list guards everything.
    Fillable(BTreeSet<String>),
    /// Every non-reserved field.
    Unguarded,
}

impl Default for MutationPolicy {
    fn default() -> Self {
        MutationPolicy::Fillable(BTreeSet::new())
    }
}

impl MutationPolicy {
    pub fn allows(&self, field: &str) -> bool {
        match self {
            MutationPolicy::Fillable(fields) => fields.contains(field),
            MutationPolicy::Unguarded => true,
        }
    }
}

// =============================================================================
// Entity Kind
// =============================================================================

/// Declaration of one entity kind.
///
/// ## Example
/// ```rust
/// use quarry_core::schema::{EntityKind, PivotTable, RelationDescriptor};
///
/// let users = EntityKind::new("users")
///     .fillable(["name", "email"])
///     .required(["name"])
///     .unique(["email"])
///     .relation(RelationDescriptor::has_many("posts", "posts", "user_id"))
///     .relation(RelationDescriptor::belongs_to_many(
///         "roles",
///         "roles",
///         PivotTable::new("role_user", "user_id", "role_id"),
///     ));
///
/// assert!(users.relation_named("roles").is_some());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntityKind {
    pub name: String,
    pub policy: MutationPolicy,
    pub required: Vec<String>,
    pub unique: Vec<String>,
    pub relations: BTreeMap<String, RelationDescriptor>,
}

impl EntityKind {
    pub fn new(name: impl Into<String>) -> Self {
        EntityKind {
            name: name.into(),
            policy: MutationPolicy::default(),
            required: Vec::new(),
            unique: Vec::new(),
            relations: BTreeMap::new(),
        }
    }

    /// Sets the mass-assignment allow-list.
    pub fn fillable<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.policy = MutationPolicy::Fillable(fields.into_iter().map(Into::into).collect());
        self
    }

    /// Allows every attribute through guarded writes.
    pub fn unguarded(mut self) -> Self {
        self.policy = MutationPolicy::Unguarded;
        self
    }

    pub fn required<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.required = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn unique<I, S>(mut self, fields: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.unique = fields.into_iter().map(Into::into).collect();
        self
    }

    pub fn relation(mut self, descriptor: RelationDescriptor) -> Self {
        self.relations.insert(descriptor.name.clone(), descriptor);
        self
    }

    pub fn relation_named(&self, name: &str) -> Option<&RelationDescriptor> {
        self.relations.get(name)
    }

    /// Looks up a relation, failing with `UnknownRelation`.
    pub fn relation_or_err(&self, name: &str) -> CoreResult<&RelationDescriptor> {
        self.relations
            .get(name)
            .ok_or_else(|| CoreError::UnknownRelation {
                kind: self.name.clone(),
                relation: name.to_string(),
            })
    }

    /// Splits attributes into the mass-assignable ones and the names of the discarded ones.
    ///
    /// Reserved columns are always discarded.
    pub fn fill(&self, attributes: Attributes) -> (Attributes, Vec<String>) {
        let mut kept = Attributes::new();
        let mut discarded = Vec::new();

        for (key, value) in attributes {
            if !RESERVED_COLUMNS.contains(&key.as_str()) && self.policy.allows(&key) {
                kept.insert(key, value);
            } else {
                discarded.push(key);
            }
        }

        (kept, discarded)
    }

    /// Drops reserved columns only (used by forced writes).
    pub fn force_fill(&self, attributes: Attributes) -> (Attributes, Vec<String>) {
        let mut kept = Attributes::new();
        let mut discarded = Vec::new();

        for (key, value) in attributes {
            if RESERVED_COLUMNS.contains(&key.as_str()) {
                discarded.push(key);
            } else {
                kept.insert(key, value);
            }
        }

        (kept, discarded)
    }
}

// =============================================================================
// Schema
// =============================================================================

/// Registry of every entity kind a store knows about.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Schema {
    kinds: BTreeMap<String, EntityKind>,
}

/// A `BelongsTo` foreign key that points at some kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Dependent {
    /// Kind holding the foreign key.
    pub kind: String,
    pub foreign_key: String,
}

/// A pivot column that stores ids of some kind.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PivotLink {
    pub table: String,
    pub column: String,
}

impl Schema {
    pub fn builder() -> SchemaBuilder {
        SchemaBuilder::default()
    }

    pub fn kind(&self, name: &str) -> Option<&EntityKind> {
        self.kinds.get(name)
    }

    pub fn kind_or_err(&self, name: &str) -> CoreResult<&EntityKind> {
        self.kinds
            .get(name)
            .ok_or_else(|| CoreError::UnknownKind(name.to_string()))
    }

    pub fn kinds(&self) -> impl Iterator<Item = &EntityKind> {
        self.kinds.values()
    }

    /// Every `BelongsTo` foreign key referencing `kind`.
    ///
    /// An entity of `kind` cannot be deleted while one of these points at it.
    pub fn dependents_of(&self, kind: &str) -> Vec<Dependent> {
        let mut out = Vec::new();
        for owner in self.kinds.values() {
            for relation in owner.relations.values() {
                if let Cardinality::BelongsTo { foreign_key } = &relation.cardinality {
                    if relation.target == kind {
                        let dependent = Dependent {
                            kind: owner.name.clone(),
                            foreign_key: foreign_key.clone(),
                        };
                        if !out.contains(&dependent) {
                            out.push(dependent);
                        }
                    }
                }
            }
        }
        out
    }

    /// Every pivot column holding ids of `kind`, from either side of a relation.
    pub fn pivot_links_of(&self, kind: &str) -> Vec<PivotLink> {
        let mut out = Vec::new();
        for owner in self.kinds.values() {
            for relation in owner.relations.values() {
                let Some(pivot) = relation.pivot() else {
                    continue;
                };
                let mut push = |column: &str| {
                    let link = PivotLink {
                        table: pivot.table.clone(),
                        column: column.to_string(),
                    };
                    if !out.contains(&link) {
                        out.push(link);
                    }
                };
                if owner.name == kind {
                    push(&pivot.parent_key);
                }
                if relation.target == kind {
                    push(&pivot.related_key);
                }
            }
        }
        out
    }
}

/// Collects kinds, then checks that every relation target is registered.
#[derive(Debug, Default)]
pub struct SchemaBuilder {
    kinds: BTreeMap<String, EntityKind>,
}

impl SchemaBuilder {
    pub fn kind(mut self, kind: EntityKind) -> Self {
        self.kinds.insert(kind.name.clone(), kind);
        self
    }

    pub fn build(self) -> CoreResult<Schema> {
        for kind in self.kinds.values() {
            crate::validation::validate_column(&kind.name)
                .map_err(CoreError::Validation)?;
            for relation in kind.relations.values() {
                if !self.kinds.contains_key(&relation.target) {
                    return Err(CoreError::UnknownKind(relation.target.clone()));
                }
                let columns: Vec<&str> = match &relation.cardinality {
                    Cardinality::HasOne { foreign_key }
                    | Cardinality::HasMany { foreign_key }
                    | Cardinality::BelongsTo { foreign_key } => vec![foreign_key.as_str()],
                    Cardinality::BelongsToMany { pivot } => {
                        vec![pivot.parent_key.as_str(), pivot.related_key.as_str()]
                    }
                };
                for column in columns {
                    crate::validation::validate_column(column).map_err(CoreError::Validation)?;
                }
            }
        }

        Ok(Schema { kinds: self.kinds })
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
