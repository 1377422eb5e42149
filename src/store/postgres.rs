use anyhow::Context;
use async_trait::async_trait;
use serde_json::Value;
use sqlx::{postgres::PgPoolOptions, types::Json, PgPool};

use super::{new_id, Direction, DocumentStore, Filters, Query, UniqueViolation};

/// JSONB-backed store: one `documents` table keyed by (collection, id).
#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(database_url: &str) -> anyhow::Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(10)
            .connect(database_url)
            .await
            .context("connect to database")?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .context("run migrations")?;

        Ok(Self { pool })
    }
}

/// LIMIT and OFFSET are BIGINT; values past `i64::MAX` would wrap negative.
fn sql_int(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn write_error(err: sqlx::Error, collection: &str) -> anyhow::Error {
    let unique = err
        .as_database_error()
        .is_some_and(|db| db.is_unique_violation());
    if unique {
        UniqueViolation {
            collection: collection.to_string(),
        }
        .into()
    } else {
        err.into()
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn get(&self, collection: &str, id: &str) -> anyhow::Result<Option<Value>> {
        let row = sqlx::query_as::<_, (Json<Value>,)>(
            r#"
            SELECT data
              FROM documents
             WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("get {collection}/{id}"))?;
        Ok(row.map(|(Json(v),)| v))
    }

    async fn add(&self, collection: &str, data: Value) -> anyhow::Result<String> {
        let id = new_id();
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            "#,
        )
        .bind(collection)
        .bind(&id)
        .bind(Json(data))
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, collection))
        .with_context(|| format!("add {collection}"))?;
        Ok(id)
    }

    async fn set(&self, collection: &str, id: &str, data: Value) -> anyhow::Result<()> {
        sqlx::query(
            r#"
            INSERT INTO documents (collection, id, data)
            VALUES ($1, $2, $3)
            ON CONFLICT (collection, id) DO UPDATE SET data = EXCLUDED.data
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(data))
        .execute(&self.pool)
        .await
        .map_err(|e| write_error(e, collection))
        .with_context(|| format!("set {collection}/{id}"))?;
        Ok(())
    }

    async fn merge(&self, collection: &str, id: &str, patch: Value) -> anyhow::Result<bool> {
        let res = sqlx::query(
            r#"
            UPDATE documents
               SET data = data || $3
             WHERE collection = $1 AND id = $2
            "#,
        )
        .bind(collection)
        .bind(id)
        .bind(Json(patch))
        .execute(&self.pool)
        .await
        .with_context(|| format!("merge {collection}/{id}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn delete(&self, collection: &str, id: &str) -> anyhow::Result<bool> {
        let res = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await
            .with_context(|| format!("delete {collection}/{id}"))?;
        Ok(res.rows_affected() > 0)
    }

    async fn find(&self, collection: &str, query: &Query) -> anyhow::Result<Vec<(String, Value)>> {
        // ORDER BY direction cannot be bound, only the field name.
        let order = match &query.order_by {
            Some((_, Direction::Asc)) => "data ->> $3 ASC NULLS LAST, created_at ASC",
            Some((_, Direction::Desc)) => "data ->> $3 DESC NULLS LAST, created_at DESC",
            None => "created_at ASC, $3::text IS NULL",
        };
        let sql = format!(
            r#"
            SELECT id, data
              FROM documents
             WHERE collection = $1 AND data @> $2
             ORDER BY {order}
             LIMIT $4 OFFSET $5
            "#
        );
        let order_field = query.order_by.as_ref().map(|(f, _)| f.clone());
        let rows = sqlx::query_as::<_, (String, Json<Value>)>(&sql)
            .bind(collection)
            .bind(Json(Value::Object(query.filters.clone())))
            .bind(order_field)
            .bind(query.limit.map(sql_int))
            .bind(sql_int(query.offset))
            .fetch_all(&self.pool)
            .await
            .with_context(|| format!("find {collection}"))?;
        Ok(rows.into_iter().map(|(id, Json(v))| (id, v)).collect())
    }

    async fn count(&self, collection: &str, filters: &Filters) -> anyhow::Result<u64> {
        let (n,) = sqlx::query_as::<_, (i64,)>(
            r#"
            SELECT COUNT(*)
              FROM documents
             WHERE collection = $1 AND data @> $2
            "#,
        )
        .bind(collection)
        .bind(Json(Value::Object(filters.clone())))
        .fetch_one(&self.pool)
        .await
        .with_context(|| format!("count {collection}"))?;
        Ok(n as u64)
    }
}
