pub mod cached;
pub mod memory;
pub mod postgres;
pub mod sqlite;
pub mod trait_def;


pub use cached::CachedStorage;
pub use memory::MemoryStorage;
pub use postgres::PostgresStorage;
pub use sqlite::SqliteStorage;
pub use trait_def::{RollupStorage, StorageError, StorageResult, StoredDocument};

use anyhow::Result;
use std::sync::Arc;
use tracing::info;

use crate::config::{Config, DatabaseBackend};

/// Open the configured backend, create its schema and wrap it in the read
/// cache when enabled
pub async fn connect(config: &Config) -> Result<Arc<dyn RollupStorage>> {
    let storage: Arc<dyn RollupStorage> = match config.database.backend {
        DatabaseBackend::Sqlite => {
            info!("Using SQLite storage: {}", config.database.url);
            Arc::new(SqliteStorage::new(&config.database.url, config.database.max_connections).await?)
        }
        DatabaseBackend::Postgres => {
            info!("Using PostgreSQL storage: {}", config.database.url);
            Arc::new(PostgresStorage::new(&config.database.url, config.database.max_connections).await?)
        }
        DatabaseBackend::Memory => {
            info!("Using in-memory storage, statistics will not survive a restart");
            Arc::new(MemoryStorage::new())
        }
    };

    storage.init().await?;

    if config.cache.max_entries == 0 {
        return Ok(storage);
    }

    info!(
        "Read cache enabled: {} entries, {}s TTL",
        config.cache.max_entries, config.cache.ttl_secs
    );
    Ok(Arc::new(CachedStorage::new(
        storage,
        config.cache.max_entries,
        config.cache.ttl_secs,
    )))
}
