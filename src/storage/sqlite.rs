use crate::storage::trait_def::{merge_fields, now_millis};
use crate::storage::{RollupStorage, StorageResult, StoredDocument};
use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use sqlx::sqlite::SqlitePoolOptions;
use sqlx::SqlitePool;
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct SqliteStorage {
    pool: Arc<SqlitePool>,
    /// Upserts read then write inside one transaction; SQLite cannot upgrade
    /// concurrent deferred transactions, so writers take turns
    write_lock: Mutex<()>,
}

impl SqliteStorage {
    pub async fn new(database_url: &str, max_connections: u32) -> Result<Self> {
        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await?;
        Ok(Self {
            pool: Arc::new(pool),
            write_lock: Mutex::new(()),
        })
    }

    /// Write a document verbatim, bypassing the merge
    #[cfg(test)]
    pub(crate) async fn insert_raw(&self, key: &str, doc: &str) -> Result<()> {
        let now = now_millis();
        sqlx::query(
            "INSERT INTO monthly_stats (month_key, doc, created_at, updated_at) VALUES (?, ?, ?, ?)",
        )
        .bind(key)
        .bind(doc)
        .bind(now)
        .bind(now)
        .execute(self.pool.as_ref())
        .await?;
        Ok(())
    }
}

fn decode_row(key: &str, (doc, created_at, updated_at): (String, i64, i64)) -> StorageResult<StoredDocument> {
    Ok(StoredDocument {
        key: key.to_string(),
        doc: serde_json::from_str(&doc)?,
        created_at,
        updated_at,
    })
}

#[async_trait]
impl RollupStorage for SqliteStorage {
    async fn init(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS monthly_stats (
                month_key TEXT PRIMARY KEY,
                doc TEXT NOT NULL,
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )
            "#,
        )
        .execute(self.pool.as_ref())
        .await?;

        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredDocument>> {
        let row = sqlx::query_as::<_, (String, i64, i64)>(
            r#"
            SELECT doc, created_at, updated_at
            FROM monthly_stats
            WHERE month_key = ?
            "#,
        )
        .bind(key)
        .fetch_optional(self.pool.as_ref())
        .await?;

        row.map(|row| decode_row(key, row)).transpose()
    }

    async fn upsert(&self, key: &str, fields: Map<String, Value>) -> StorageResult<()> {
        let _guard = self.write_lock.lock().await;
        let now = now_millis();
        let mut tx = self.pool.begin().await?;

        let existing = sqlx::query_scalar::<_, String>(
            "SELECT doc FROM monthly_stats WHERE month_key = ?",
        )
        .bind(key)
        .fetch_optional(&mut *tx)
        .await?
        .map(|doc| serde_json::from_str::<Value>(&doc))
        .transpose()?;

        let merged = merge_fields(key, existing, fields)?;

        sqlx::query(
            r#"
            INSERT INTO monthly_stats (month_key, doc, created_at, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (month_key) DO UPDATE SET
                doc = excluded.doc,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(key)
        .bind(serde_json::to_string(&merged)?)
        .bind(now)
        .bind(now)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        // substr() rather than LIKE so '%' and '_' in the prefix stay literal
        let keys = sqlx::query_scalar::<_, String>(
            r#"
            SELECT month_key
            FROM monthly_stats
            WHERE substr(month_key, 1, length(?1)) = ?1
            ORDER BY month_key ASC
            "#,
        )
        .bind(prefix)
        .fetch_all(self.pool.as_ref())
        .await?;

        Ok(keys)
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let result = sqlx::query("DELETE FROM monthly_stats WHERE month_key = ?")
            .bind(key)
            .execute(self.pool.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }
}
