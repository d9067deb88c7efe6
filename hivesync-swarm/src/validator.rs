//! Quorum and signature validation of multi-node swarm responses.
//!
//! Partial node failure is expected and tolerated: a failed or unsigned
//! node contributes an empty result and a warning. A signature that fails
//! to verify is different — it indicates tampering, not a transient fault,
//! so the whole validation call aborts rather than silently discarding the
//! one bad node.

use crate::wire::{ExpireUpdateBody, SubResponse};
use crate::{SwarmError, SwarmResult};
use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signature, Verifier, VerifyingKey};
use hivesync_types::{AccountId, NodeId};
use std::collections::BTreeMap;
use std::fmt;
use tracing::{debug, warn};

/// How many structurally valid node responses an operation requires.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RequiredResponses {
    /// Every node in the response set must be structurally valid.
    All,
    /// At least this many nodes must be structurally valid.
    AtLeast(usize),
}

impl RequiredResponses {
    /// Decodes the wire convention where `-1` means "all".
    #[must_use]
    pub fn from_raw(raw: i64) -> Self {
        if raw < 0 {
            Self::All
        } else {
            Self::AtLeast(raw as usize)
        }
    }

    fn is_met(&self, valid: usize, total: usize) -> bool {
        match self {
            Self::All => valid == total,
            Self::AtLeast(n) => valid >= *n,
        }
    }
}

impl fmt::Display for RequiredResponses {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::All => write!(f, "all"),
            Self::AtLeast(n) => write!(f, "at least {n}"),
        }
    }
}

/// The quorum-approved, signature-verified outcome of a swarm operation:
/// a mapping from node id to that node's validated payload.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidatedResult<T> {
    results: BTreeMap<NodeId, T>,
}

impl<T> ValidatedResult<T> {
    fn new(results: BTreeMap<NodeId, T>) -> Self {
        Self { results }
    }

    /// Returns the validated payload for a node, if it was authoritative.
    #[must_use]
    pub fn get(&self, node: &NodeId) -> Option<&T> {
        self.results.get(node)
    }

    /// Iterates over (node, payload) pairs.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &T)> {
        self.results.iter()
    }

    /// Number of nodes with an authoritative payload.
    #[must_use]
    pub fn len(&self) -> usize {
        self.results.len()
    }

    /// True when no node produced an authoritative payload.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// One node's validated answer to an expiry-update request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExpiryOutcome {
    /// The expiry the node applied (ms).
    pub expiry_ms: u64,
    /// Hashes whose expiry the node updated.
    pub updated: Vec<String>,
    /// Hashes left unchanged, mapped to the authoritative expiry the node
    /// already held.
    pub unchanged: BTreeMap<String, u64>,
}

/// Builds the exact byte sequence a node signs for an expiry update:
/// `owner_pubkey_hex ++ ascii(expiry) ++ concat(requested) ++ concat(updated)`.
///
/// Order matters and must match what the signer produced; both the verifier
/// and the test signer go through this one function so the layout cannot
/// drift between them.
#[must_use]
pub fn expiry_signature_message(
    owner: &AccountId,
    expiry_ms: u64,
    requested_hashes: &[String],
    updated_hashes: &[String],
) -> Vec<u8> {
    let mut message = Vec::new();
    message.extend_from_slice(owner.to_hex().as_bytes());
    message.extend_from_slice(expiry_ms.to_string().as_bytes());
    for hash in requested_hashes {
        message.extend_from_slice(hash.as_bytes());
    }
    for hash in updated_hashes {
        message.extend_from_slice(hash.as_bytes());
    }
    message
}

/// Validates a set of per-node responses against a quorum requirement.
#[derive(Debug, Clone, Copy)]
pub struct ResponseValidator {
    required: RequiredResponses,
}

impl ResponseValidator {
    /// Creates a validator with the given quorum requirement.
    #[must_use]
    pub fn new(required: RequiredResponses) -> Self {
        Self { required }
    }

    /// Validates the per-node responses to an expiry-update request.
    ///
    /// - A failed or unsigned node records an empty result (it simply does
    ///   not appear in the output map) and is logged, not fatal.
    /// - A signed node has its signature verified over the canonical byte
    ///   layout; a mismatch hard-fails the whole call.
    /// - A node lacking an `expiry` field is excluded from the final map
    ///   without being treated as an error.
    /// - The quorum is applied over the full response count, not just the
    ///   nodes that happened to reply usefully.
    pub fn validate_expiry_update(
        &self,
        owner: &AccountId,
        requested_hashes: &[String],
        responses: &BTreeMap<NodeId, SubResponse<ExpireUpdateBody>>,
    ) -> SwarmResult<ValidatedResult<ExpiryOutcome>> {
        let total = responses.len();
        let mut valid = 0usize;
        let mut results = BTreeMap::new();

        for (node, response) in responses {
            let Some(body) = response.body.as_ref().filter(|_| response.is_success()) else {
                warn!(node = %node, status = response.status_code, "expiry response failed, recording empty result");
                continue;
            };

            let Some(signature_b64) = body.signature.as_deref() else {
                warn!(node = %node, "expiry response missing signature, recording empty result");
                continue;
            };

            let Some(expiry_ms) = body.expiry_ms else {
                // Not authoritative for this field; structurally fine.
                debug!(node = %node, "expiry response has no expiry field, excluding from result");
                valid += 1;
                continue;
            };

            self.verify_expiry_signature(
                node,
                owner,
                expiry_ms,
                requested_hashes,
                &body.updated,
                signature_b64,
            )?;

            valid += 1;
            results.insert(
                *node,
                ExpiryOutcome {
                    expiry_ms,
                    updated: body.updated.clone(),
                    unchanged: body.unchanged.clone(),
                },
            );
        }

        if !self.required.is_met(valid, total) {
            return Err(SwarmError::QuorumNotMet {
                required: self.required.to_string(),
                valid,
                total,
            });
        }

        Ok(ValidatedResult::new(results))
    }

    fn verify_expiry_signature(
        &self,
        node: &NodeId,
        owner: &AccountId,
        expiry_ms: u64,
        requested_hashes: &[String],
        updated_hashes: &[String],
        signature_b64: &str,
    ) -> SwarmResult<()> {
        let bad_signature = || SwarmError::SignatureVerificationFailed {
            node: node.to_hex(),
        };

        let signature_bytes = STANDARD.decode(signature_b64).map_err(|_| bad_signature())?;
        let signature = Signature::from_slice(&signature_bytes).map_err(|_| bad_signature())?;
        let verifying_key =
            VerifyingKey::from_bytes(node.as_bytes()).map_err(|_| bad_signature())?;

        let message = expiry_signature_message(owner, expiry_ms, requested_hashes, updated_hashes);
        verifying_key
            .verify(&message, &signature)
            .map_err(|_| bad_signature())
    }
}
