use thiserror::Error;

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("cache storage unavailable: {0}")]
    StorageUnavailable(#[from] sqlx::Error),

    #[error("payload serialization failed: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid cache key: {0}")]
    InvalidKey(String),
}
