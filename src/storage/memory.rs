use crate::storage::trait_def::{merge_fields, now_millis};
use crate::storage::{RollupStorage, StorageResult, StoredDocument};
use anyhow::Result;
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use serde_json::{Map, Value};

/// Process-local store, used for tests and for runs that need no persistence
#[derive(Default)]
pub struct MemoryStorage {
    documents: DashMap<String, StoredDocument>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl RollupStorage for MemoryStorage {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> StorageResult<Option<StoredDocument>> {
        Ok(self.documents.get(key).map(|entry| entry.value().clone()))
    }

    async fn upsert(&self, key: &str, fields: Map<String, Value>) -> StorageResult<()> {
        let now = now_millis();

        // The entry guard holds the shard lock, so the merge is atomic per key
        match self.documents.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                let stored = occupied.get_mut();
                stored.doc = merge_fields(key, Some(stored.doc.clone()), fields)?;
                stored.updated_at = now;
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredDocument {
                    key: key.to_string(),
                    doc: merge_fields(key, None, fields)?,
                    created_at: now,
                    updated_at: now,
                });
            }
        }

        Ok(())
    }

    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys: Vec<String> = self
            .documents
            .iter()
            .filter(|entry| entry.key().starts_with(prefix))
            .map(|entry| entry.key().clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn delete(&self, key: &str) -> StorageResult<bool> {
        Ok(self.documents.remove(key).is_some())
    }
}
