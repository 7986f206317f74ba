//! # Query Model
//!
//! Plain-data description of a selection: conjunctive filters, ordering and
//! a limit/offset window. Stores translate it (SQL) or evaluate it directly
//! (memory) with the semantics defined here.
//!
//! ## Semantics
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Filters      all must hold (AND)                                      │
//! │               NULL / missing never satisfies a comparison              │
//! │               Eq(col, null) means IS NULL                              │
//! │               In(col, [])  matches nothing, NotIn(col, []) everything  │
//! │               numbers compare numerically, true/false as 1/0           │
//! │                                                                         │
//! │  Ordering     explicit orders first, then id as tie-break              │
//! │               (direction of the last explicit order, else ASC)         │
//! │               NULL sorts lowest                                        │
//! │                                                                         │
//! │  Window       offset, then limit                                       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::cmp::Ordering;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{CoreError, CoreResult};
use crate::types::Entity;
use crate::validation::validate_column;
use crate::{CREATED_AT, ID_COLUMN};

// =============================================================================
// Filters
// =============================================================================

#[derive(Debug, Clone, PartialEq)]
pub enum Filter {
    Eq(String, Value),
    Ne(String, Value),
    In(String, Vec<Value>),
    NotIn(String, Vec<Value>),
    Lt(String, Value),
    Lte(String, Value),
    Gt(String, Value),
    Gte(String, Value),
    Null(String),
    NotNull(String),
}

impl Filter {
    pub fn eq(column: impl Into<String>, value: impl Into<Value>) -> Self {
        Filter::Eq(column.into(), value.into())
    }

    pub fn column(&self) -> &str {
        match self {
            Filter::Eq(c, _)
            | Filter::Ne(c, _)
            | Filter::In(c, _)
            | Filter::NotIn(c, _)
            | Filter::Lt(c, _)
            | Filter::Lte(c, _)
            | Filter::Gt(c, _)
            | Filter::Gte(c, _)
            | Filter::Null(c)
            | Filter::NotNull(c) => c,
        }
    }

    /// Rewrites `Eq(c, null)` / `Ne(c, null)` into their null checks.
    pub fn normalized(self) -> Self {
        match self {
            Filter::Eq(c, Value::Null) => Filter::Null(c),
            Filter::Ne(c, Value::Null) => Filter::NotNull(c),
            other => other,
        }
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        let actual = entity.value(self.column());
        let present = actual.as_ref().filter(|v| !v.is_null());

        match self {
            Filter::Null(_) => present.is_none(),
            Filter::NotNull(_) => present.is_some(),
            Filter::Eq(_, Value::Null) => present.is_none(),
            Filter::Ne(_, Value::Null) => present.is_some(),
            Filter::Eq(_, expected) => present.is_some_and(|v| values_equal(Some(v), expected)),
            Filter::Ne(_, expected) => present.is_some_and(|v| !values_equal(Some(v), expected)),
            Filter::In(_, values) => {
                present.is_some_and(|v| values.iter().any(|e| values_equal(Some(v), e)))
            }
            Filter::NotIn(_, values) => {
                if values.is_empty() {
                    return true;
                }
                present.is_some_and(|v| !values.iter().any(|e| values_equal(Some(v), e)))
            }
            Filter::Lt(_, expected) => compare_present(present, expected, |o| o.is_lt()),
            Filter::Lte(_, expected) => compare_present(present, expected, |o| o.is_le()),
            Filter::Gt(_, expected) => compare_present(present, expected, |o| o.is_gt()),
            Filter::Gte(_, expected) => compare_present(present, expected, |o| o.is_ge()),
        }
    }
}

fn compare_present(present: Option<&Value>, expected: &Value, check: fn(Ordering) -> bool) -> bool {
    if expected.is_null() {
        return false;
    }
    present.is_some_and(|v| check(compare_values(v, expected)))
}

// =============================================================================
// Value comparison
// =============================================================================

fn numeric(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::Bool(b) => Some(if *b { 1.0 } else { 0.0 }),
        _ => None,
    }
}

fn integral(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64(),
        Value::Bool(b) => Some(i64::from(*b)),
        _ => None,
    }
}

fn rank(value: &Value) -> u8 {
    match value {
        Value::Null => 0,
        Value::Bool(_) | Value::Number(_) => 1,
        Value::String(_) => 2,
        Value::Array(_) | Value::Object(_) => 3,
    }
}

/// Equality as the stores apply it.
///
/// A missing value equals `null`.
pub fn values_equal(actual: Option<&Value>, expected: &Value) -> bool {
    let actual = actual.unwrap_or(&Value::Null);
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Null, _) | (_, Value::Null) => false,
        _ if rank(actual) == 1 && rank(expected) == 1 => {
            match (integral(actual), integral(expected)) {
                (Some(a), Some(b)) => a == b,
                _ => numeric(actual) == numeric(expected),
            }
        }
        _ => actual == expected,
    }
}

/// Total order over JSON values: null < numbers/bools < strings < composites.
pub fn compare_values(a: &Value, b: &Value) -> Ordering {
    let (ra, rb) = (rank(a), rank(b));
    if ra != rb {
        return ra.cmp(&rb);
    }
    match (a, b) {
        (Value::Null, Value::Null) => Ordering::Equal,
        (Value::String(x), Value::String(y)) => x.cmp(y),
        _ if ra == 1 => match (integral(a), integral(b)) {
            (Some(x), Some(y)) => x.cmp(&y),
            _ => numeric(a)
                .partial_cmp(&numeric(b))
                .unwrap_or(Ordering::Equal),
        },
        _ => a.to_string().cmp(&b.to_string()),
    }
}

// =============================================================================
// Ordering
// =============================================================================

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderDirection {
    #[default]
    Asc,
    Desc,
}

impl OrderDirection {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OrderDirection::Asc => "ASC",
            OrderDirection::Desc => "DESC",
        }
    }

    pub fn apply(&self, ordering: Ordering) -> Ordering {
        match self {
            OrderDirection::Asc => ordering,
            OrderDirection::Desc => ordering.reverse(),
        }
    }
}

impl fmt::Display for OrderDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for OrderDirection {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(OrderDirection::Asc),
            "desc" => Ok(OrderDirection::Desc),
            other => Err(CoreError::InvalidArgument(format!(
                "Order direction must be 'asc' or 'desc', got '{}'",
                other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OrderBy {
    pub column: String,
    pub direction: OrderDirection,
}

impl OrderBy {
    pub fn new(column: impl Into<String>, direction: OrderDirection) -> Self {
        OrderBy {
            column: column.into(),
            direction,
        }
    }

    pub fn asc(column: impl Into<String>) -> Self {
        OrderBy::new(column, OrderDirection::Asc)
    }

    pub fn desc(column: impl Into<String>) -> Self {
        OrderBy::new(column, OrderDirection::Desc)
    }

    /// Newest first.
    pub fn latest() -> Self {
        OrderBy::desc(CREATED_AT)
    }

    /// Oldest first.
    pub fn oldest() -> Self {
        OrderBy::asc(CREATED_AT)
    }
}

// =============================================================================
// Query
// =============================================================================

/// A selection over one kind.
///
/// ## Example
/// ```rust
/// use quarry_core::query::{Filter, OrderBy, Query};
///
/// let query = Query::new()
///     .filter(Filter::eq("status", "active"))
///     .order_by(OrderBy::latest())
///     .for_page(2, 10);
///
/// assert_eq!(query.offset, 10);
/// assert_eq!(query.limit, Some(10));
/// ```
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub filters: Vec<Filter>,
    pub orders: Vec<OrderBy>,
    pub limit: Option<u64>,
    pub offset: u64,
}

impl Query {
    pub fn new() -> Self {
        Query::default()
    }

    pub fn filter(mut self, filter: Filter) -> Self {
        self.filters.push(filter.normalized());
        self
    }

    pub fn filters<I: IntoIterator<Item = Filter>>(mut self, filters: I) -> Self {
        self.filters
            .extend(filters.into_iter().map(Filter::normalized));
        self
    }

    pub fn order_by(mut self, order: OrderBy) -> Self {
        self.orders.push(order);
        self
    }

    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = offset;
        self
    }

    /// Window for a 1-based page number.
    pub fn for_page(mut self, page: u64, per_page: u64) -> Self {
        self.offset = page.saturating_sub(1).saturating_mul(per_page);
        self.limit = Some(per_page);
        self
    }

    /// Same filters, no ordering and no window (used for counting).
    pub fn unwindowed(&self) -> Self {
        Query {
            filters: self.filters.clone(),
            orders: Vec::new(),
            limit: None,
            offset: 0,
        }
    }

    /// Checks every column name used by the query.
    pub fn validate(&self) -> CoreResult<()> {
        for filter in &self.filters {
            validate_column(filter.column())?;
        }
        for order in &self.orders {
            validate_column(&order.column)?;
        }
        Ok(())
    }

    /// Explicit orders plus the id tie-break.
    pub fn effective_orders(&self) -> Vec<OrderBy> {
        let mut orders = self.orders.clone();
        let tie_break = orders
            .last()
            .map(|o| o.direction)
            .unwrap_or(OrderDirection::Asc);
        if orders.last().map(|o| o.column.as_str()) != Some(ID_COLUMN) {
            orders.push(OrderBy::new(ID_COLUMN, tie_break));
        }
        orders
    }

    pub fn matches(&self, entity: &Entity) -> bool {
        self.filters.iter().all(|f| f.matches(entity))
    }

    /// Filters, sorts and windows a candidate set.
    pub fn apply<I: IntoIterator<Item = Entity>>(&self, candidates: I) -> Vec<Entity> {
        let mut selected: Vec<Entity> = candidates
            .into_iter()
            .filter(|e| self.matches(e))
            .collect();

        let orders = self.effective_orders();
        selected.sort_by(|a, b| {
            for order in &orders {
                let left = a.value(&order.column).unwrap_or(Value::Null);
                let right = b.value(&order.column).unwrap_or(Value::Null);
                let ordering = order.direction.apply(compare_values(&left, &right));
                if ordering != Ordering::Equal {
                    return ordering;
                }
            }
            Ordering::Equal
        });

        let offset = usize::try_from(self.offset).unwrap_or(usize::MAX);
        let skipped = selected.into_iter().skip(offset);
        match self.limit {
            Some(limit) => skipped
                .take(usize::try_from(limit).unwrap_or(usize::MAX))
                .collect(),
            None => skipped.collect(),
        }
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
