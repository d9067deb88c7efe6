//! Wire shapes for batched swarm requests and per-node responses.
//!
//! A batch combines store and delete sub-requests into one atomic submission.
//! The swarm layer preserves request ordering in its response list, but when
//! `require_all` is false it may omit or truncate entries without erroring
//! the whole batch — consumers zip responses positionally and treat missing
//! entries as failed.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Default time-to-live for config namespace records (30 days, ms).
pub const CONFIG_TTL_MS: u64 = 30 * 24 * 60 * 60 * 1000;

/// A request to store one record under a namespace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreRequest {
    /// Target namespace for the record.
    pub namespace: i32,
    /// Record payload, base64-encoded.
    pub data: String,
    /// Time-to-live in milliseconds.
    pub ttl_ms: u64,
}

impl StoreRequest {
    /// Builds a store request from raw payload bytes.
    #[must_use]
    pub fn new(namespace: i32, payload: &[u8], ttl_ms: u64) -> Self {
        Self {
            namespace,
            data: STANDARD.encode(payload),
            ttl_ms,
        }
    }

    /// Decodes the payload back to raw bytes.
    pub fn decode_data(&self) -> Result<Vec<u8>, base64::DecodeError> {
        STANDARD.decode(&self.data)
    }
}

/// A request to delete previously stored records by server hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteRequest {
    /// Server hashes of the records to delete.
    pub hashes: Vec<String>,
}

/// One sub-request inside a batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum BatchEntry {
    /// Store a record.
    Store(StoreRequest),
    /// Delete records by hash.
    Delete(DeleteRequest),
}

/// One node's reply to a single sub-request.
///
/// Anything outside 200–299, or with `failed_to_parse` set, is a failed
/// sub-response regardless of body content.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubResponse<T> {
    /// HTTP-like status code.
    pub status_code: u16,
    /// The envelope arrived but its body could not be decoded.
    #[serde(default)]
    pub failed_to_parse: bool,
    /// Decoded body, when present and parseable.
    pub body: Option<T>,
}

impl<T> SubResponse<T> {
    /// A successful sub-response carrying a body.
    #[must_use]
    pub fn ok(body: T) -> Self {
        Self {
            status_code: 200,
            failed_to_parse: false,
            body: Some(body),
        }
    }

    /// A failed sub-response with the given status code.
    #[must_use]
    pub fn error(status_code: u16) -> Self {
        Self {
            status_code,
            failed_to_parse: false,
            body: None,
        }
    }

    /// A sub-response whose body could not be decoded.
    #[must_use]
    pub fn unparseable(status_code: u16) -> Self {
        Self {
            status_code,
            failed_to_parse: true,
            body: None,
        }
    }

    /// True for a 2xx response whose body decoded.
    #[must_use]
    pub fn is_success(&self) -> bool {
        (200..=299).contains(&self.status_code) && !self.failed_to_parse
    }
}

/// Body of a successful store sub-response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreResponseBody {
    /// Server hash assigned to the stored record.
    pub hash: String,
    /// Server timestamp at storage time (ms).
    pub timestamp_ms: u64,
}

/// Body of one node's reply to an expiry-update request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpireUpdateBody {
    /// The expiry the node applied (ms). Absent when the node's data is not
    /// authoritative for this field.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expiry_ms: Option<u64>,
    /// Hashes whose expiry the node updated.
    #[serde(default)]
    pub updated: Vec<String>,
    /// Hashes whose expiry was left unchanged, mapped to the authoritative
    /// expiry the node already held (usually sooner than the request).
    #[serde(default)]
    pub unchanged: BTreeMap<String, u64>,
    /// Ed25519 signature over the canonical expiry message, base64.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature: Option<String>,
}
