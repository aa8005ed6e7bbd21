//! Error types for sqliteq.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    /// The queue engine was closed; no storage access was attempted.
    #[error("queue {0} is closed")]
    Closed(String),

    /// Table, index or column provisioning failed while creating a queue.
    #[error("failed to set up queue {queue}: {source}")]
    Setup {
        queue: String,
        #[source]
        source: sqlx::Error,
    },

    #[error("storage error: {0}")]
    Storage(#[from] sqlx::Error),

    #[error("configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

pub type Result<T> = std::result::Result<T, Error>;
