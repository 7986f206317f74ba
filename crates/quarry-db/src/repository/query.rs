//! # Query Handle
//!
//! A lazy, composable query scoped to one kind. Nothing runs until a
//! terminal (`get`, `first`, `find`, `count`, `exists`, `paginate`) is awaited.
//!
//! ```rust,ignore
//! let admins = users
//!     .query()
//!     .where_eq("role", "admin")
//!     .where_not_null("email")
//!     .latest()
//!     .with(&["posts"])
//!     .limit(5)
//!     .get()
//!     .await?;
//! ```

use serde_json::Value;

use quarry_core::validation::{validate_page, validate_per_page};
use quarry_core::{
    Entity, EntityCollection, EntityId, EntityKind, Filter, OrderBy, OrderDirection, Page, Query,
    ID_COLUMN,
};

use super::relations::{self, LoadTree};
use crate::error::{DbError, DbResult};
use crate::store::Store;

#[derive(Debug, Clone)]
pub struct QueryHandle<'r, S: Store> {
    store: &'r S,
    kind: &'r EntityKind,
    query: Query,
    with: Vec<String>,
}

impl<'r, S: Store> QueryHandle<'r, S> {
    pub fn new(store: &'r S, kind: &'r EntityKind) -> Self {
        QueryHandle {
            store,
            kind,
            query: Query::new(),
            with: Vec::new(),
        }
    }

    /// The query built so far.
    pub fn as_query(&self) -> &Query {
        &self.query
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.query = self.query.filter(filter);
        self
    }

    pub fn filters<I: IntoIterator<Item = Filter>>(mut self, filters: I) -> Self {
        self.query = self.query.filters(filters);
        self
    }

    pub fn where_eq(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Eq(column.into(), value.into()))
    }

    pub fn where_ne(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Ne(column.into(), value.into()))
    }

    pub fn where_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(Filter::In(column.into(), values.into_iter().map(Into::into).collect()))
    }

    pub fn where_not_in<I, V>(self, column: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<Value>,
    {
        self.filter(Filter::NotIn(column.into(), values.into_iter().map(Into::into).collect()))
    }

    pub fn where_lt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lt(column.into(), value.into()))
    }

    pub fn where_lte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Lte(column.into(), value.into()))
    }

    pub fn where_gt(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gt(column.into(), value.into()))
    }

    pub fn where_gte(self, column: impl Into<String>, value: impl Into<Value>) -> Self {
        self.filter(Filter::Gte(column.into(), value.into()))
    }

    pub fn where_null(self, column: impl Into<String>) -> Self {
        self.filter(Filter::Null(column.into()))
    }

    pub fn where_not_null(self, column: impl Into<String>) -> Self {
        self.filter(Filter::NotNull(column.into()))
    }

    pub fn order_by(mut self, column: impl Into<String>, direction: OrderDirection) -> Self {
        self.query = self.query.order_by(OrderBy::new(column, direction));
        self
    }

    pub fn latest(mut self) -> Self {
        self.query = self.query.order_by(OrderBy::latest());
        self
    }

    pub fn oldest(mut self) -> Self {
        self.query = self.query.order_by(OrderBy::oldest());
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.query = self.query.limit(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.query = self.query.offset(offset);
        self
    }

    pub fn for_page(mut self, page: u64, per_page: u64) -> Self {
        self.query = self.query.for_page(page, per_page);
        self
    }

    /// Relations to eager-load on every result (dot-paths allowed).
    pub fn with<S2: AsRef<str>>(mut self, relations: &[S2]) -> Self {
        self.with
            .extend(relations.iter().map(|r| r.as_ref().to_string()));
        self
    }

    async fn run(&self, query: &Query) -> DbResult<EntityCollection> {
        let mut entities = self.store.fetch(&self.kind.name, query).await?;
        let tree = LoadTree::parse(&self.with);
        if !tree.is_empty() && !entities.is_empty() {
            relations::load(self.store, self.kind, &mut entities, &tree).await?;
        }
        Ok(entities)
    }

    // =========================================================================
    // Terminals
    // =========================================================================

    pub async fn get(self) -> DbResult<EntityCollection> {
        self.run(&self.query).await
    }

    pub async fn first(self) -> DbResult<Option<Entity>> {
        let query = self.query.clone().limit(1);
        Ok(self.run(&query).await?.into_iter().next())
    }

    /// First match that also has the given id.
    pub async fn find(self, id: EntityId) -> DbResult<Option<Entity>> {
        let query = self
            .query
            .clone()
            .filter(Filter::eq(ID_COLUMN, id))
            .limit(1);
        Ok(self.run(&query).await?.into_iter().next())
    }

    pub async fn count(self) -> DbResult<u64> {
        self.store
            .count(&self.kind.name, &self.query.unwindowed())
            .await
    }

    pub async fn exists(self) -> DbResult<bool> {
        Ok(self.count().await? > 0)
    }

    /// One page of the current selection (any window set so far is replaced).
    pub async fn paginate(self, per_page: u64, page: u64) -> DbResult<Page> {
        check_window(per_page, page)?;

        let total = self
            .store
            .count(&self.kind.name, &self.query.unwindowed())
            .await?;
        let query = self.query.clone().for_page(page, per_page);
        let items = self.run(&query).await?;
        Ok(Page::new(items, page, per_page, total))
    }
}

/// Page size and page number must both be at least 1.
pub(crate) fn check_window(per_page: u64, page: u64) -> DbResult<()> {
    validate_per_page(per_page)
        .and_then(|()| validate_page(page))
        .map_err(|e| DbError::invalid(e.to_string()))
}
