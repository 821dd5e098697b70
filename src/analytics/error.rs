use thiserror::Error;

use crate::models::MonthKeyError;
use crate::storage::StorageError;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error(transparent)]
    InvalidKey(#[from] MonthKeyError),

    #[error("stored record '{key}' could not be decoded: {source}")]
    CorruptRecord {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("aggregate for '{key}' could not be encoded: {source}")]
    Encode {
        key: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

pub type StatsResult<T> = Result<T, StatsError>;
