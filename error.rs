use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("IO Error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Database Pool Error: {0}")]
    DbPool(#[from] r2d2::Error),

    #[error("Database Error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("Json Error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image Error: {0}")]
    Image(#[from] image::ImageError),

    #[error("Storage Unavailable: {0}")]
    StorageUnavailable(String),

    #[error("Schema Mismatch: store is at version {found}, this build supports up to {expected}")]
    SchemaMismatch { found: i64, expected: i64 },

    #[error("Transaction Aborted: {0}")]
    TransactionAborted(#[source] Box<Error>),

    #[error("Feed Fetch Failure: {0}")]
    FeedFetch(String),

    #[error("Invalid Argument: {0}")]
    InvalidArgument(String),

    #[error("Initialization Failed: {0}")]
    Init(String),
}

impl Error {
    /// Wraps a failure raised inside a write transaction. Feed errors keep their
    /// own classification so callers can tell a bad dataset from a bad disk.
    pub fn aborted(err: Error) -> Self {
        match err {
            Error::FeedFetch(_) | Error::TransactionAborted(_) => err,
            other => Error::TransactionAborted(Box::new(other)),
        }
    }
}
