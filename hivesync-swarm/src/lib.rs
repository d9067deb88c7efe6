//! Swarm wire types, client abstraction and response validation.
//!
//! A swarm is a set of independent storage nodes replicating one account's
//! data; no single node is authoritative. This crate defines:
//!
//! - the batched write/delete wire shapes and the per-node sub-response
//!   envelope ([`SubResponse`])
//! - the [`SwarmClient`] collaborator trait the jobs crate talks through,
//!   plus an in-memory mock for tests
//! - the [`ResponseValidator`], which turns a set of per-node,
//!   partially-failing, Ed25519-signed responses into one quorum-checked
//!   [`ValidatedResult`]

mod client;
mod validator;
mod wire;

pub use client::{mock::MockSwarm, SwarmClient};
pub use validator::{
    expiry_signature_message, ExpiryOutcome, RequiredResponses, ResponseValidator,
    ValidatedResult,
};
pub use wire::{
    BatchEntry, DeleteRequest, ExpireUpdateBody, StoreRequest, StoreResponseBody, SubResponse,
    CONFIG_TTL_MS,
};

/// Result type for swarm operations.
pub type SwarmResult<T> = Result<T, SwarmError>;

/// Errors that can occur in swarm operations.
#[derive(Debug, thiserror::Error)]
pub enum SwarmError {
    /// Network error.
    #[error("network error: {0}")]
    Network(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// A node returned a signature that does not verify. This indicates
    /// tampering rather than a transient fault, so the whole validation
    /// call aborts.
    #[error("signature verification failed for node {node}")]
    SignatureVerificationFailed {
        /// The offending node.
        node: String,
    },

    /// Fewer structurally valid responses than the configured threshold.
    #[error("quorum not met: {valid}/{total} valid responses, required {required}")]
    QuorumNotMet {
        /// The configured threshold.
        required: String,
        /// Structurally valid responses observed.
        valid: usize,
        /// Total responses the quorum was evaluated over.
        total: usize,
    },
}
