use std::path::PathBuf;
use thiserror::Error;

/// Failures of the description store.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("sqlite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("connection pool error: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("write connection lock poisoned")]
    Poisoned,

    #[error("store worker stopped before replying")]
    Disconnected,
}

/// Failures deriving the product identity from repository metadata.
#[derive(Debug, Error)]
pub enum ProductError {
    #[error("no git repository found at {0}")]
    NoRepository(PathBuf),

    #[error("repository at {0} has no remote configured")]
    NoRemote(PathBuf),

    #[error("cannot derive a product name from remote url {0}")]
    UnrecognizedUrl(String),

    #[error("git error: {0}")]
    Git(#[from] git2::Error),
}

/// Inbound lines that cannot be turned into a known message.
#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("malformed message: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("message has no command field")]
    MissingCommand,

    #[error("unknown command: {0}")]
    UnknownCommand(String),
}

/// Startup failures that leave a session disabled.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("description store unavailable: {0}")]
    Store(#[from] StoreError),

    #[error("cannot determine product: {0}")]
    Product(#[from] ProductError),
}
