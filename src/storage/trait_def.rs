use anyhow::Result;
use async_trait::async_trait;
use serde_json::{Map, Value};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum StorageError {
    #[error("stored document for '{0}' is not a JSON object")]
    NotAnObject(String),
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl From<sqlx::Error> for StorageError {
    fn from(err: sqlx::Error) -> Self {
        StorageError::Other(err.into())
    }
}

impl From<serde_json::Error> for StorageError {
    fn from(err: serde_json::Error) -> Self {
        StorageError::Other(err.into())
    }
}

pub type StorageResult<T> = Result<T, StorageError>;

/// A document as held by the store, with the timestamps the store manages
#[derive(Debug, Clone, PartialEq)]
pub struct StoredDocument {
    pub key: String,
    pub doc: Value,
    /// Unix milliseconds of the first write
    pub created_at: i64,
    /// Unix milliseconds of the latest write
    pub updated_at: i64,
}

/// Key -> JSON document store holding the monthly aggregates
#[async_trait]
pub trait RollupStorage: Send + Sync {
    /// Initialize the storage (create tables, etc.)
    async fn init(&self) -> Result<()>;

    /// Fetch a document, `None` when the key has never been written
    async fn get(&self, key: &str) -> StorageResult<Option<StoredDocument>>;

    /// Merge `fields` into the document at `key`, creating it if needed.
    /// Top-level fields not present in `fields` are preserved.
    async fn upsert(&self, key: &str, fields: Map<String, Value>) -> StorageResult<()>;

    /// All keys starting with `prefix`, sorted ascending
    async fn list_keys(&self, prefix: &str) -> StorageResult<Vec<String>>;

    /// Remove a document. Returns whether it existed.
    async fn delete(&self, key: &str) -> StorageResult<bool>;
}

/// Shallow merge used by every backend
pub(crate) fn merge_fields(
    key: &str,
    existing: Option<Value>,
    fields: Map<String, Value>,
) -> StorageResult<Value> {
    let mut merged = match existing {
        Some(Value::Object(map)) => map,
        Some(_) => return Err(StorageError::NotAnObject(key.to_string())),
        None => Map::new(),
    };
    merged.extend(fields);
    Ok(Value::Object(merged))
}

pub(crate) fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}
