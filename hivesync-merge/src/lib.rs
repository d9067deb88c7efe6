//! Mergeable configuration automatons for hivesync.
//!
//! This crate provides the merge automaton the sync engine pushes and merges
//! through:
//!
//! - [`MergeableConfig`] — the contract every automaton satisfies
//!   (push / merge / confirm / dump)
//! - [`LwwConfigMap`] — the default implementation: a field map whose
//!   conflicts resolve by comparing a SHA-256 of each candidate's serialized
//!   encoding, keeping the higher digest
//! - [`ConfigStore`] — owns one automaton per (variant, owner) pair
//!
//! All automatons satisfy the following merge properties:
//! - **Commutative**: merge(a, b) == merge(b, a)
//! - **Associative**: merge(merge(a, b), c) == merge(a, merge(b, c))
//! - **Idempotent**: merge(a, a) == a
//!
//! These properties ensure that replicas converge to the same state
//! regardless of the order in which remote blobs arrive, including
//! duplicated delivery.

mod automaton;
mod lww_map;
mod store;

pub use automaton::{MergeableConfig, PushData};
pub use lww_map::LwwConfigMap;
pub use store::{ConfigDump, ConfigStore};

/// Result type for merge operations.
pub type MergeResult<T> = Result<T, MergeError>;

/// Errors that can occur in merge operations.
#[derive(Debug, thiserror::Error)]
pub enum MergeError {
    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A remote blob could not be decoded as an automaton delta.
    #[error("invalid config blob: {0}")]
    InvalidBlob(String),

    /// A dump could not be restored.
    #[error("invalid config dump: {0}")]
    InvalidDump(String),
}
