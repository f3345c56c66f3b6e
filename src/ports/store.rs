use std::{future::Future, time::Duration};

use thiserror::Error;

/// Errors surfaced by the data-layer ports.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum StoreError {
    /// No record matched the lookup (includes expired tokens)
    #[error("record not found")]
    RecordNotFound,

    /// The caller's version did not match the stored version
    #[error("edit conflict")]
    EditConflict,

    /// A principal with the same email address already exists
    #[error("duplicate email")]
    DuplicateEmail,

    /// The call did not complete within the query timeout
    #[error("store call timed out after {0:?}")]
    Timeout(Duration),

    /// Any other backend failure
    #[error("store backend error: {0}")]
    Backend(String),
}

/// Result type alias for store operations
pub type StoreResult<T> = Result<T, StoreError>;

/// Run a store call, giving up after `limit`.
///
/// A slow dependency must never hold a serving slot indefinitely, so every
/// call the gatekeeping core makes goes through here.
pub async fn bounded<T, F>(limit: Duration, call: F) -> StoreResult<T>
where
    F: Future<Output = StoreResult<T>>,
{
    match tokio::time::timeout(limit, call).await {
        Ok(result) => result,
        Err(_) => Err(StoreError::Timeout(limit)),
    }
}
