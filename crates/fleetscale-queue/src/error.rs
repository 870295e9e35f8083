//! Work queue error types.

use thiserror::Error;

pub type QueueResult<T> = Result<T, QueueError>;

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("queue closed: {0}")]
    Closed(String),

    #[error("failed to encode notification: {0}")]
    Encode(#[from] serde_json::Error),
}
