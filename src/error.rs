//! Crate-wide error type and result alias.

use thiserror::Error;

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, CairnError>;

/// Errors surfaced by the store core.
///
/// `Corruption` is fatal: the core never attempts repair, and the caller
/// must treat the containing transaction as unusable. Capacity overflow
/// during a node split is not an error and never reaches the caller.
#[derive(Debug, Error)]
pub enum CairnError {
    /// A lookup by key or index did not match anything.
    #[error("{0} not found")]
    NotFound(&'static str),

    /// An explicit object key collided with an existing object.
    #[error("object key {0} already used")]
    KeyAlreadyUsed(i64),

    /// A structural invariant does not hold.
    #[error("corruption detected: {0}")]
    Corruption(&'static str),

    /// The caller violated the API contract.
    #[error("invalid argument: {0}")]
    Invalid(&'static str),
}
