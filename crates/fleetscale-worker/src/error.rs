use thiserror::Error;

pub type WorkerResult<T> = Result<T, WorkerError>;

#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("malformed notification: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("notification has no records")]
    NoRecords,

    #[error("object key is empty")]
    EmptyKey,

    #[error("unknown capacity class: {0}")]
    UnknownClass(String),
}
