use crate::storage::{RollupStorage, StorageResult, StoredDocument};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use moka::future::Cache;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;

/// Read-through cache in front of another storage backend
///
/// Month documents are read far more often than written (every quarter and
/// year view re-reads its months), so reads are served from a Moka cache.
/// Writes and deletes go straight to the inner storage and invalidate the key.
///
/// A read that misses the cache may finish after a write to the same key has
/// already invalidated it. Each key therefore carries a write generation,
/// bumped once the inner write has landed, and every cached entry records
/// the generation its read started under. Entries from an older generation
/// are treated as misses, so a completed write is never shadowed by the
/// value it replaced.
pub struct CachedStorage {
    /// Underlying storage implementation
    inner: Arc<dyn RollupStorage>,
    /// Read cache for document lookups, including negative lookups, tagged
    /// with the key's write generation at the start of the read
    read_cache: Cache<String, (u64, Option<StoredDocument>)>,
    /// Completed writes per key, bumped after the inner write lands
    generations: DashMap<String, u64>,
}

impl CachedStorage {
    pub fn new(inner: Arc<dyn RollupStorage>, max_cache_entries: u64, ttl_secs: u64) -> Self {
        let read_cache = Cache::builder()
            .max_capacity(max_cache_entries)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();

        Self {
            inner,
            read_cache,
            generations: DashMap::new(),
        }
    }

    fn generation(&self, key: &str) -> u64 {
        self.generations.get(key).map(|g| *g).unwrap_or(0)
    }

    async fn invalidate_cache(&self, key: &str) {
        *self.generations.entry(key.to_string()).or_insert(0) += 1;
        self.read_cache.invalidate(key).await;
    }
}

#[async_trait]
impl RollupStorage for CachedStorage {
    async fn init(&self) -> Result<()> {
        self.inner.init().await
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredDocument>> {
        let generation = self.generation(key);

        if let Some((cached_at, cached)) = self.read_cache.get(key).await {
            if cached_at == generation {
                return Ok(cached);
            }
        }

        // Failed reads are not cached; only successful lookups are
        let result = self.inner.get(key).await?;

        self.read_cache
            .insert(key.to_string(), (generation, result.clone()))
            .await;

        Ok(result)
    }

    async fn upsert(&self, key: &str, fields: Map<String, Value>) -> StorageResult<()> {
        let result = self.inner.upsert(key, fields).await;

        // Invalidate even on failure: the write may have partially landed
        self.invalidate_cache(key).await;

        result
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        self.inner.list_keys(prefix).await
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        let result = self.inner.delete(key).await;
        self.invalidate_cache(key).await;
        result
    }
}
