use async_trait::async_trait;
use serde_json::Value;
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};
use std::time::Duration;
use tracing::info;

use super::query::{FilterOp, Query, SortDirection};
use super::{DocumentStore, StoreError};

const CREATE_TABLE: &str = r#"
    CREATE TABLE IF NOT EXISTS documents (
        collection TEXT NOT NULL,
        id TEXT NOT NULL,
        body JSONB NOT NULL,
        PRIMARY KEY (collection, id)
    )
"#;

/// Rows per INSERT statement, keeps bind parameters under the Postgres limit
const BATCH_CHUNK: usize = 1_000;

/// Document store backed by a single JSONB table
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub async fn connect(url: &str, max_connections: u32, timeout_secs: u64) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(timeout_secs))
            .connect(url)
            .await?;

        sqlx::query(CREATE_TABLE).execute(&pool).await?;
        info!("Connected Postgres document store (max_connections={})", max_connections);

        Ok(Self { pool })
    }
}

#[async_trait]
impl DocumentStore for PgStore {
    async fn create(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        if !doc.is_object() {
            return Err(StoreError::NotAnObject);
        }
        let result = sqlx::query(
            "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3) ON CONFLICT DO NOTHING",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(doc))
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StoreError::Conflict {
                collection: collection.to_string(),
                id: id.to_string(),
            });
        }
        Ok(())
    }

    async fn put(&self, collection: &str, id: &str, doc: Value) -> Result<(), StoreError> {
        if !doc.is_object() {
            return Err(StoreError::NotAnObject);
        }
        sqlx::query(
            "INSERT INTO documents (collection, id, body) VALUES ($1, $2, $3) \
             ON CONFLICT (collection, id) DO UPDATE SET body = EXCLUDED.body",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(doc))
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn put_many(&self, collection: &str, docs: Vec<(String, Value)>) -> Result<(), StoreError> {
        if docs.iter().any(|(_, doc)| !doc.is_object()) {
            return Err(StoreError::NotAnObject);
        }

        let mut tx = self.pool.begin().await?;
        for chunk in docs.chunks(BATCH_CHUNK) {
            let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("INSERT INTO documents (collection, id, body) ");
            qb.push_values(chunk, |mut row, (id, doc)| {
                row.push_bind(collection).push_bind(id.as_str()).push_bind(Json(doc));
            });
            qb.push(" ON CONFLICT (collection, id) DO UPDATE SET body = EXCLUDED.body");
            qb.build().execute(&mut *tx).await?;
        }
        tx.commit().await?;
        Ok(())
    }

    async fn get(&self, collection: &str, id: &str) -> Result<Option<Value>, StoreError> {
        let row = sqlx::query_scalar::<_, Json<Value>>(
            "SELECT body FROM documents WHERE collection = $1 AND id = $2",
        )
        .bind(collection)
        .bind(id)
        .fetch_optional(&self.pool)
        .await?;
        Ok(row.map(|Json(body)| body))
    }

    async fn update(&self, collection: &str, id: &str, patch: Value) -> Result<Value, StoreError> {
        if !patch.is_object() {
            return Err(StoreError::NotAnObject);
        }
        let row = sqlx::query_scalar::<_, Json<Value>>(
            "UPDATE documents SET body = body || $3 WHERE collection = $1 AND id = $2 RETURNING body",
        )
        .bind(collection)
        .bind(id)
        .bind(Json(patch))
        .fetch_optional(&self.pool)
        .await?;

        row.map(|Json(body)| body)
            .ok_or_else(|| StoreError::not_found(collection, id))
    }

    async fn delete(&self, collection: &str, id: &str) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM documents WHERE collection = $1 AND id = $2")
            .bind(collection)
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    async fn query(&self, collection: &str, query: &Query) -> Result<Vec<Value>, StoreError> {
        let mut qb: QueryBuilder<Postgres> = QueryBuilder::new("SELECT body FROM documents WHERE collection = ");
        qb.push_bind(collection);

        for filter in &query.filters {
            qb.push(" AND body -> ");
            qb.push_bind(filter.field.as_str());
            qb.push(match filter.op {
                FilterOp::Eq => " = ",
                FilterOp::Gte => " >= ",
                FilterOp::Lt => " < ",
            });
            qb.push_bind(Json(&filter.value));
        }

        if let Some((field, direction)) = &query.order_by {
            qb.push(" ORDER BY body -> ");
            qb.push_bind(field.as_str());
            qb.push(match direction {
                SortDirection::Asc => " ASC",
                SortDirection::Desc => " DESC",
            });
        }

        if let Some(limit) = query.limit {
            qb.push(" LIMIT ");
            qb.push_bind(limit as i64);
        }

        let rows = qb
            .build_query_scalar::<Json<Value>>()
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|Json(body)| body).collect())
    }

    async fn health_check(&self) -> Result<(), StoreError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}
