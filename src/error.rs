//! Structured error kinds shared across the catalog store, scanner, enricher,
//! remote sync, resolver and tag search.
//!
//! Most call sites compose several fallible steps and return `anyhow::Result`
//! (see the teacher's `main.rs`); library entry points callers are expected
//! to match on return `Result<T, CoreError>`.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CoreError {
    #[error("catalog store unavailable: {0}")]
    StoreUnavailable(String),

    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("failed to read tags from {path}: {reason}")]
    TagReadError { path: String, reason: String },

    #[error("network request failed: {0}")]
    NetworkError(String),

    #[error("rate limited, retry after backoff")]
    RateLimited,

    /// Never constructed as an `Err` by this crate: an empty result is
    /// surfaced as an empty collection. Kept for documentation parity with
    /// the error-kind table this crate implements.
    #[error("empty result")]
    EmptyResult,

    #[error("internal error: {0}")]
    Internal(String),
}

impl From<rusqlite::Error> for CoreError {
    fn from(e: rusqlite::Error) -> Self {
        CoreError::Internal(e.to_string())
    }
}
