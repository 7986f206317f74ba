//! # SQLite Store
//!
//! A [`Store`] over the generic `records` / `pivots` / `sequences` tables.
//!
//! ## Query Translation
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │  Query                              SQL                                │
//! │  ─────                              ───                                │
//! │  Filter::Eq("email", "a@x")         json_extract(attributes, '$.email') = ?
//! │  Filter::In("id", [])               1 = 0                              │
//! │  Filter::NotIn("id", [])            1 = 1                              │
//! │  Filter::Null("team")               json_extract(...) IS NULL          │
//! │  OrderBy::latest()                  ORDER BY created_at DESC, id DESC  │
//! │  limit / offset                     LIMIT ? OFFSET ?                   │
//! │                                                                         │
//! │  Reserved columns (id, created_at, updated_at) map to real columns.    │
//! │  Booleans bind as 1/0, the way json_extract() returns them.            │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::{QueryBuilder, Sqlite, SqlitePool};
use tracing::debug;

use quarry_core::{
    format_timestamp, Attributes, Entity, EntityId, Filter, Query, Schema, CREATED_AT, ID_COLUMN,
    UPDATED_AT,
};

use super::{cascade_pivots, guard_remove, validate_write, PivotScope, Store};
use crate::error::{DbError, DbResult};

/// Row shape of the `records` table.
#[derive(Debug, sqlx::FromRow)]
struct RecordRow {
    id: i64,
    attributes: String,
    created_at: String,
    updated_at: String,
}

impl RecordRow {
    fn into_entity(self, kind: &str) -> DbResult<Entity> {
        let attributes: Attributes = serde_json::from_str(&self.attributes)?;
        Ok(Entity::from_store(
            kind,
            EntityId::new(self.id),
            attributes,
            parse_timestamp(&self.created_at)?,
            parse_timestamp(&self.updated_at)?,
        ))
    }
}

fn parse_timestamp(raw: &str) -> DbResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|at| at.with_timezone(&Utc))
        .map_err(|e| DbError::Internal(format!("Corrupt timestamp '{}': {}", raw, e)))
}

/// SQLite-backed [`Store`].
///
/// Obtained from [`Database::store`](crate::Database::store).
#[derive(Debug, Clone)]
pub struct SqliteStore {
    pool: SqlitePool,
    schema: Arc<Schema>,
}

impl SqliteStore {
    pub fn new(pool: SqlitePool, schema: Schema) -> Self {
        SqliteStore {
            pool,
            schema: Arc::new(schema),
        }
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    async fn existing(&self, kind: &str, id: EntityId) -> DbResult<Entity> {
        self.find(kind, id)
            .await?
            .ok_or_else(|| DbError::not_found(kind, id))
    }
}

// =============================================================================
// SQL Building
// =============================================================================

fn push_column(builder: &mut QueryBuilder<'_, Sqlite>, column: &str) {
    match column {
        ID_COLUMN | CREATED_AT | UPDATED_AT => {
            builder.push(column);
        }
        _ => {
            builder.push("json_extract(attributes, ");
            builder.push_bind(format!("$.{}", column));
            builder.push(")");
        }
    }
}

/// Filter operand for a column.
///
/// Reserved columns get a unary `+`, which strips their column affinity so
/// `id = '1'` compares a number with a string and fails, the same way a
/// JSON attribute from `json_extract` does.
fn push_operand(builder: &mut QueryBuilder<'_, Sqlite>, column: &str) {
    if matches!(column, ID_COLUMN | CREATED_AT | UPDATED_AT) {
        builder.push("+");
    }
    push_column(builder, column);
}

fn push_value(builder: &mut QueryBuilder<'_, Sqlite>, value: &Value) {
    match value {
        Value::Null => {
            builder.push_bind(Option::<String>::None);
        }
        Value::Bool(b) => {
            builder.push_bind(i64::from(*b));
        }
        Value::Number(n) => match n.as_i64() {
            Some(i) => {
                builder.push_bind(i);
            }
            None => {
                builder.push_bind(n.as_f64().unwrap_or(0.0));
            }
        },
        Value::String(s) => {
            builder.push_bind(s.clone());
        }
        other => {
            builder.push_bind(other.to_string());
        }
    }
}

/// SQLite binds are signed; anything past `i64::MAX` saturates.
fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn push_list(builder: &mut QueryBuilder<'_, Sqlite>, values: &[Value]) {
    builder.push("(");
    for (i, value) in values.iter().enumerate() {
        if i > 0 {
            builder.push(", ");
        }
        push_value(builder, value);
    }
    builder.push(")");
}

fn push_comparison(builder: &mut QueryBuilder<'_, Sqlite>, column: &str, op: &str, value: &Value) {
    push_operand(builder, column);
    builder.push(op);
    push_value(builder, value);
}

fn push_filter(builder: &mut QueryBuilder<'_, Sqlite>, filter: &Filter) {
    let column = filter.column();
    match filter {
        Filter::Eq(_, Value::Null) | Filter::Null(_) => {
            push_operand(builder, column);
            builder.push(" IS NULL");
        }
        Filter::Ne(_, Value::Null) | Filter::NotNull(_) => {
            push_operand(builder, column);
            builder.push(" IS NOT NULL");
        }
        Filter::Eq(_, v) => push_comparison(builder, column, " = ", v),
        Filter::Ne(_, v) => push_comparison(builder, column, " != ", v),
        Filter::Lt(_, v) => push_comparison(builder, column, " < ", v),
        Filter::Lte(_, v) => push_comparison(builder, column, " <= ", v),
        Filter::Gt(_, v) => push_comparison(builder, column, " > ", v),
        Filter::Gte(_, v) => push_comparison(builder, column, " >= ", v),
        Filter::In(_, values) if values.is_empty() => {
            builder.push("1 = 0");
        }
        Filter::NotIn(_, values) if values.is_empty() => {
            builder.push("1 = 1");
        }
        Filter::In(_, values) => {
            push_operand(builder, column);
            builder.push(" IN ");
            push_list(builder, values);
        }
        Filter::NotIn(_, values) => {
            push_operand(builder, column);
            builder.push(" NOT IN ");
            push_list(builder, values);
        }
    }
}

fn push_where(builder: &mut QueryBuilder<'_, Sqlite>, kind: &str, query: &Query) {
    builder.push(" WHERE kind = ");
    builder.push_bind(kind.to_string());
    for filter in &query.filters {
        builder.push(" AND ");
        push_filter(builder, filter);
    }
}

fn push_pivot_where(builder: &mut QueryBuilder<'_, Sqlite>, scope: &PivotScope) {
    builder.push(" WHERE pivot = ");
    builder.push_bind(scope.table.clone());
    for (column, ids) in &scope.conditions {
        builder.push(" AND ");
        if ids.is_empty() {
            builder.push("1 = 0");
            continue;
        }
        builder.push("json_extract(row, ");
        builder.push_bind(format!("$.{}", column));
        builder.push(") IN (");
        let mut separated = builder.separated(", ");
        for id in ids {
            separated.push_bind(id.get());
        }
        builder.push(")");
    }
}

// =============================================================================
// Store Implementation
// =============================================================================

#[async_trait]
impl Store for SqliteStore {
    fn schema(&self) -> &Schema {
        &self.schema
    }

    async fn fetch(&self, kind: &str, query: &Query) -> DbResult<Vec<Entity>> {
        self.schema.kind_or_err(kind)?;
        query.validate()?;

        let mut builder =
            QueryBuilder::<Sqlite>::new("SELECT id, attributes, created_at, updated_at FROM records");
        push_where(&mut builder, kind, query);

        builder.push(" ORDER BY ");
        for (i, order) in query.effective_orders().iter().enumerate() {
            if i > 0 {
                builder.push(", ");
            }
            push_column(&mut builder, &order.column);
            builder.push(" ");
            builder.push(order.direction.as_sql());
        }

        if query.limit.is_some() || query.offset > 0 {
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded.
            builder.push(" LIMIT ");
            builder.push_bind(query.limit.map(clamp_i64).unwrap_or(-1));
            builder.push(" OFFSET ");
            builder.push_bind(clamp_i64(query.offset));
        }

        let rows: Vec<RecordRow> = builder.build_query_as().fetch_all(&self.pool).await?;
        debug!(kind = %kind, count = rows.len(), "Fetched records");

        rows.into_iter().map(|row| row.into_entity(kind)).collect()
    }

    async fn count(&self, kind: &str, query: &Query) -> DbResult<u64> {
        self.schema.kind_or_err(kind)?;
        query.validate()?;

        let mut builder = QueryBuilder::<Sqlite>::new("SELECT COUNT(*) FROM records");
        push_where(&mut builder, kind, query);

        let count: i64 = builder.build_query_scalar().fetch_one(&self.pool).await?;
        Ok(count as u64)
    }

    async fn find(&self, kind: &str, id: EntityId) -> DbResult<Option<Entity>> {
        self.schema.kind_or_err(kind)?;

        let row: Option<RecordRow> = sqlx::query_as(
            "SELECT id, attributes, created_at, updated_at FROM records WHERE kind = ? AND id = ?",
        )
        .bind(kind)
        .bind(id.get())
        .fetch_optional(&self.pool)
        .await?;

        row.map(|row| row.into_entity(kind)).transpose()
    }

    async fn insert(&self, kind: &str, attributes: Attributes) -> DbResult<Entity> {
        let entity_kind = self.schema.kind_or_err(kind)?;
        validate_write(self, entity_kind, None, &attributes).await?;

        let now = Utc::now();
        let stamp = format_timestamp(now);
        let encoded = serde_json::to_string(&attributes)?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let id: i64 = sqlx::query_scalar(
            r#"
            INSERT INTO sequences (kind, last_id) VALUES (?, 1)
            ON CONFLICT(kind) DO UPDATE SET last_id = last_id + 1
            RETURNING last_id
            "#,
        )
        .bind(kind)
        .fetch_one(&mut *tx)
        .await?;

        sqlx::query(
            "INSERT INTO records (kind, id, attributes, created_at, updated_at) VALUES (?, ?, ?, ?, ?)",
        )
        .bind(kind)
        .bind(id)
        .bind(&encoded)
        .bind(&stamp)
        .bind(&stamp)
        .execute(&mut *tx)
        .await?;

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        debug!(kind = %kind, id, "Inserted record");
        Ok(Entity::from_store(kind, EntityId::new(id), attributes, now, now))
    }

    async fn write(&self, kind: &str, id: EntityId, attributes: Attributes) -> DbResult<Entity> {
        let entity_kind = self.schema.kind_or_err(kind)?;
        let current = self.existing(kind, id).await?;

        let mut merged = current.attributes().clone();
        merged.extend(attributes);
        validate_write(self, entity_kind, Some(id), &merged).await?;

        let now = Utc::now();
        let result = sqlx::query(
            "UPDATE records SET attributes = ?, updated_at = ? WHERE kind = ? AND id = ?",
        )
        .bind(serde_json::to_string(&merged)?)
        .bind(format_timestamp(now))
        .bind(kind)
        .bind(id.get())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(kind, id));
        }

        debug!(kind = %kind, id = %id, "Wrote record");
        let created_at = current.created_at().unwrap_or(now);
        Ok(Entity::from_store(kind, id, merged, created_at, now))
    }

    async fn touch(&self, kind: &str, id: EntityId) -> DbResult<()> {
        self.schema.kind_or_err(kind)?;

        let result = sqlx::query("UPDATE records SET updated_at = ? WHERE kind = ? AND id = ?")
            .bind(format_timestamp(Utc::now()))
            .bind(kind)
            .bind(id.get())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::not_found(kind, id));
        }
        Ok(())
    }

    async fn remove(&self, kind: &str, id: EntityId) -> DbResult<bool> {
        self.schema.kind_or_err(kind)?;
        guard_remove(self, kind, id).await?;

        let result = sqlx::query("DELETE FROM records WHERE kind = ? AND id = ?")
            .bind(kind)
            .bind(id.get())
            .execute(&self.pool)
            .await?;

        let removed = result.rows_affected() > 0;
        if removed {
            cascade_pivots(self, kind, id).await?;
            debug!(kind = %kind, id = %id, "Removed record");
        }
        Ok(removed)
    }

    async fn pivot_rows(&self, scope: &PivotScope) -> DbResult<Vec<Attributes>> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT row FROM pivots");
        push_pivot_where(&mut builder, scope);
        builder.push(" ORDER BY seq");

        let rows: Vec<String> = builder.build_query_scalar().fetch_all(&self.pool).await?;
        rows.iter()
            .map(|raw| serde_json::from_str::<Attributes>(raw).map_err(DbError::from))
            .collect()
    }

    async fn pivot_insert(&self, table: &str, row: Attributes) -> DbResult<()> {
        sqlx::query("INSERT INTO pivots (pivot, row) VALUES (?, ?)")
            .bind(table)
            .bind(serde_json::to_string(&row)?)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn pivot_update(&self, scope: &PivotScope, attributes: Attributes) -> DbResult<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("SELECT seq, row FROM pivots");
        push_pivot_where(&mut builder, scope);

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;

        let rows: Vec<(i64, String)> = builder.build_query_as().fetch_all(&mut *tx).await?;
        for (seq, raw) in &rows {
            let mut row: Attributes = serde_json::from_str(raw)?;
            row.extend(attributes.clone());
            sqlx::query("UPDATE pivots SET row = ? WHERE seq = ?")
                .bind(serde_json::to_string(&row)?)
                .bind(*seq)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit()
            .await
            .map_err(|e| DbError::TransactionFailed(e.to_string()))?;
        Ok(rows.len() as u64)
    }

    async fn pivot_delete(&self, scope: &PivotScope) -> DbResult<u64> {
        let mut builder = QueryBuilder::<Sqlite>::new("DELETE FROM pivots");
        push_pivot_where(&mut builder, scope);

        let result = builder.build().execute(&self.pool).await?;
        Ok(result.rows_affected())
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
