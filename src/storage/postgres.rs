use crate::storage::trait_def::{merge_fields, now_millis};
use crate::storage::{RollupStorage, StorageResult, StoredDocument};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::postgres::PgPoolOptions;
use sqlx::types::Json;
use sqlx::PgPool;
use std::sync::Arc;

pub struct PostgresStorage {
    pool: Arc<PgPool>,
}

impl PostgresStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
        })
    }
}

#[async_trait]
impl RollupStorage for PostgresStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS monthly_stats (
                month_key TEXT PRIMARY KEY,
                doc JSONB NOT NULL,
                created_at BIGINT NOT NULL,
                updated_at BIGINT NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredDocument>> {
        let row = sqlx::query_as::<_, (Json<Value>, i64, i64)>(
            r#"
            SELECT doc, created_at, updated_at
            FROM monthly_stats
            WHERE month_key = $1
            "#,
        )
        .bind(key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        Ok(row.map(|(Json(doc), created_at, updated_at)| StoredDocument {
            key: key.to_string(),
            doc,
            created_at,
            updated_at,
        }))
    }

    async fn upsert(&self, key: &str, fields: Map<String, Value>) -> StorageResult<()> {
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, Json<Value>>(
            "SELECT doc FROM monthly_stats WHERE month_key = $1 FOR UPDATE",
        )
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?
        .map(|Json(doc)| doc);

        let merged = merge_fields(key, existing, fields)?;

        sqlx::query(
            r#"
            INSERT INTO monthly_stats (month_key, doc, created_at, updated_at)
            VALUES ($1, $2, $3, $3)
            ON CONFLICT (month_key) DO UPDATE SET
                doc = EXCLUDED.doc,
                updated_at = EXCLUDED.updated_at
            "#,
        )
        .bind(key)
        .bind(Json(merged))
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let keys = sqlx::query_scalar::<_, String>(
            r#"
            SELECT month_key
            FROM monthly_stats
            WHERE left(month_key, length($1)) = $1
            ORDER BY month_key ASC
            "#,
        )
        .bind(prefix)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(keys)
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM monthly_stats WHERE month_key = $1")
            .bind(key)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
