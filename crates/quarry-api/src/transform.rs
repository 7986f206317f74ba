//! # Transformers
//!
//! Per-kind presentation of entities, with opt-in embedded relations.
//!
//! ## How a Transform Runs
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Transform With Includes                              │
//! │                                                                         │
//! │  ?include=posts.author,roles                                           │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  Manager::new(&["posts.author", "roles"])                              │
//! │       │        scope tree: posts ─► author                             │
//! │       │                    roles                                       │
//! │       ▼                                                                 │
//! │  manager.item(&user, &UserTransformer)                                 │
//! │       │                                                                 │
//! │       ├── UserTransformer::transform(user)    → {"id":1,"name":…}      │
//! │       ├── "posts" (available + requested)                              │
//! │       │     └── include(user,"posts") → Collection(posts, PostT)       │
//! │       │           └── each post, scope {author}                        │
//! │       └── "roles" requested but not available → skipped                │
//! │       │                                                                 │
//! │       ▼                                                                 │
//! │  {"data": {"id":1, "name":…, "posts": {"data": [ … ]}}}                │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Transformers only read relations that are already loaded; load them
//! first with [`Manager::relation_paths`] and `QueryHandle::with`.

use std::collections::BTreeMap;

use serde_json::{json, Value};

use quarry_core::{Entity, Page, Related};

use crate::includes::IncludeParams;
use crate::pagination::{PageAdapter, PaginationMeta, Paginator};

// =============================================================================
// Transformer
// =============================================================================

/// An embeddable resource returned by [`Transformer::include`].
pub enum Resource {
    Item(Entity, Box<dyn Transformer>),
    Collection(Vec<Entity>, Box<dyn Transformer>),
    Null,
}

impl std::fmt::Debug for Resource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Resource::Item(entity, _) => f.debug_tuple("Item").field(entity).finish(),
            Resource::Collection(entities, _) => {
                f.debug_tuple("Collection").field(&entities.len()).finish()
            }
            Resource::Null => f.write_str("Null"),
        }
    }
}

pub trait Transformer: Send + Sync {
    /// Presentation of one entity; should be a JSON object.
    fn transform(&self, entity: &Entity) -> Value;

    /// Includes a client may ask for.
    fn available_includes(&self) -> &[&str] {
        &[]
    }

    /// Includes embedded whether asked for or not.
    fn default_includes(&self) -> &[&str] {
        &[]
    }

    /// Resolves an include. Defaults to the loaded relation of that name,
    /// presented as plain entities.
    fn include(&self, entity: &Entity, name: &str) -> Resource {
        loaded_relation(entity, name, PlainTransformer)
    }
}

/// Every column, no relations.
#[derive(Debug, Clone, Copy, Default)]
pub struct PlainTransformer;

impl Transformer for PlainTransformer {
    fn transform(&self, entity: &Entity) -> Value {
        entity.to_plain_json()
    }
}

/// The loaded relation `name` as a resource presented by `transformer`.
///
/// Unloaded relations resolve to [`Resource::Null`].
pub fn loaded_relation<T>(entity: &Entity, name: &str, transformer: T) -> Resource
where
    T: Transformer + 'static,
{
    match entity.relation(name) {
        Some(Related::One(Some(related))) => {
            Resource::Item((**related).clone(), Box::new(transformer))
        }
        Some(Related::Many(related)) => Resource::Collection(related.clone(), Box::new(transformer)),
        Some(Related::One(None)) | None => Resource::Null,
    }
}

// =============================================================================
// Include Scopes
// =============================================================================

/// Requested include paths as a tree (`posts.author` → posts ─► author).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
struct Scope {
    children: BTreeMap<String, Scope>,
}

impl Scope {
    fn parse<S: AsRef<str>>(paths: &[S]) -> Self {
        let mut root = Scope::default();
        for path in paths {
            let mut node = &mut root;
            for segment in path.as_ref().split('.').map(str::trim) {
                if segment.is_empty() {
                    break;
                }
                node = node.children.entry(segment.to_string()).or_default();
            }
        }
        root
    }

    fn requested(&self, name: &str) -> bool {
        self.children.contains_key(name)
    }

    fn child(&self, name: &str) -> Scope {
        self.children.get(name).cloned().unwrap_or_default()
    }

    fn paths(&self, prefix: &str, out: &mut Vec<String>) {
        for (name, child) in &self.children {
            let path = if prefix.is_empty() {
                name.clone()
            } else {
                format!("{}.{}", prefix, name)
            };
            if child.children.is_empty() {
                out.push(path);
            } else {
                child.paths(&path, out);
            }
        }
    }
}

// =============================================================================
// Manager
// =============================================================================

/// Runs transformers with a set of requested includes.
#[derive(Debug, Clone, Default)]
pub struct Manager {
    scope: Scope,
}

impl Manager {
    pub fn new<S: AsRef<str>>(includes: &[S]) -> Self {
        Manager {
            scope: Scope::parse(includes),
        }
    }

    pub fn from_params(params: &IncludeParams) -> Self {
        Manager::new(&params.parse())
    }

    /// Requested includes as dot-paths, deepest paths only, for eager loading.
    pub fn relation_paths(&self) -> Vec<String> {
        let mut out = Vec::new();
        self.scope.paths("", &mut out);
        out
    }

    /// `{"data": {...}}`
    pub fn item(&self, entity: &Entity, transformer: &dyn Transformer) -> Value {
        json!({ "data": self.transform(entity, transformer, &self.scope) })
    }

    /// `{"data": [...]}`
    pub fn collection(&self, entities: &[Entity], transformer: &dyn Transformer) -> Value {
        let data: Vec<Value> = entities
            .iter()
            .map(|entity| self.transform(entity, transformer, &self.scope))
            .collect();
        json!({ "data": data })
    }

    /// `{"data": [...], "meta": {"pagination": {...}}}`
    pub fn paginated(&self, page: &Page, transformer: &dyn Transformer) -> Value {
        self.paginated_with(page, transformer, &PageAdapter::new(page))
    }

    pub fn paginated_with(
        &self,
        page: &Page,
        transformer: &dyn Transformer,
        paginator: &dyn Paginator,
    ) -> Value {
        let mut out = self.collection(&page.items, transformer);
        out["meta"] = json!({ "pagination": PaginationMeta::from_paginator(paginator) });
        out
    }

    fn transform(&self, entity: &Entity, transformer: &dyn Transformer, scope: &Scope) -> Value {
        let mut data = transformer.transform(entity);
        if let Value::Object(fields) = &mut data {
            self.embed(fields, entity, transformer, scope);
        }
        data
    }

    fn embed(
        &self,
        fields: &mut serde_json::Map<String, Value>,
        entity: &Entity,
        transformer: &dyn Transformer,
        scope: &Scope,
    ) {
        let defaults = transformer.default_includes();
        let wanted = defaults.iter().chain(
            transformer
                .available_includes()
                .iter()
                .filter(|name| scope.requested(name) && !defaults.contains(*name)),
        );

        for name in wanted {
            let embedded = match transformer.include(entity, name) {
                Resource::Item(related, nested) => {
                    json!({ "data": self.transform(&related, nested.as_ref(), &scope.child(name)) })
                }
                Resource::Collection(related, nested) => {
                    let child = scope.child(name);
                    let items: Vec<Value> = related
                        .iter()
                        .map(|e| self.transform(e, nested.as_ref(), &child))
                        .collect();
                    json!({ "data": items })
                }
                Resource::Null => json!({ "data": null }),
            };
            fields.insert(name.to_string(), embedded);
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
