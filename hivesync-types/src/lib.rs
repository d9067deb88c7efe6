//! Core type definitions for hivesync.
//!
//! This crate defines the fundamental, variant-agnostic types used throughout
//! the sync engine:
//! - Account and swarm-node identifiers (Ed25519 public keys, hex on the wire)
//! - The `ConfigVariant` enum with its load/processing ordering
//! - A millisecond clock abstraction so jobs never read wall time ambiently
//!
//! Application-level semantics of what each variant stores (profile fields,
//! contact records, group rosters) belong to the variant payloads, not here.

mod clock;
mod ids;
mod variant;

pub use clock::{Clock, ManualClock, SystemClock};
pub use ids::{AccountId, NodeId};
pub use variant::ConfigVariant;

/// Result type alias using the crate's error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur in type operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid public key: {0}")]
    InvalidKey(String),
}
