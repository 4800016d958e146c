//! Error types for Tally.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum TallyError {
    #[error("window expression '{0}' resolves to a moment in the future")]
    InvalidWindow(String),

    #[error("store write failed: {0}")]
    StoreWrite(#[source] rusqlite::Error),

    #[error("store read failed: {0}")]
    StoreRead(#[source] rusqlite::Error),

    #[error("store unavailable: {0}")]
    StoreOpen(#[source] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, TallyError>;
