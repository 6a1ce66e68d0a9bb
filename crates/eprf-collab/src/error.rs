use thiserror::Error;

use eprf_store::StoreError;

/// Errors produced by the collaboration engines.
///
/// The taxonomy maps one-to-one onto the HTTP surface: validation failures
/// are client mistakes (400), authorization failures fail closed and are
/// never upgraded (403), missing references are 404, and store failures are
/// transient (500).  Reads may be retried after a store failure; writes are
/// never retried automatically because section saves are last-write-wins and
/// a blind retry could reapply stale data.
#[derive(Error, Debug)]
pub enum CollabError {
    /// Missing or malformed required input.
    #[error("Validation error: {0}")]
    Validation(String),

    /// The caller's permission level does not allow the operation.
    #[error("Permission denied: {0}")]
    Authorization(String),

    /// A referenced incident, patient, version, or grant does not exist.
    #[error("Not found: {0}")]
    NotFound(String),

    /// The record store failed or was unreachable.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Convenience alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CollabError>;
