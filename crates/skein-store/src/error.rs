use thiserror::Error;

/// Errors from the backing key-value service.
#[derive(Debug, Error)]
pub enum StoreError {
  #[error("redis error: {0}")]
  Redis(#[from] redis::RedisError),

  #[error("failed to encode store payload: {0}")]
  Encode(#[from] serde_json::Error),

  #[error("unknown status value '{0}'")]
  InvalidStatus(String),
}
