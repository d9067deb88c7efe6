//! The mergeable-config contract.
//!
//! The sync engine treats every automaton as a black box exposing exactly
//! this surface. Correctness of the sync job depends only on the stated
//! algebraic properties (commutativity, idempotence), never on internals,
//! so any conforming implementation can be substituted behind the trait.

use crate::MergeResult;

/// One outbound serialized delta produced by [`MergeableConfig::push`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PushData {
    /// The sequence number of this push. Stable across repeated `push()`
    /// calls until the push is confirmed.
    pub seqno: u64,
    /// Opaque serialized delta covering all unconfirmed local edits.
    pub payload: Vec<u8>,
    /// Server hashes this push supersedes, eligible for deletion in the
    /// same batch.
    pub obsolete_hashes: Vec<String>,
}

/// A mergeable configuration automaton for one (variant, owner) pair.
///
/// Implementations must guarantee:
/// - `push` is idempotent until confirmed: calling it again without an
///   intervening mutation returns the same seqno and byte payload;
/// - `merge` is commutative and idempotent — applying the same set of blobs
///   in any order, or more than once, yields the same resulting state;
/// - sequence numbers are monotonically increasing and incremented at most
///   once per push/confirm cycle, even if several fields changed.
pub trait MergeableConfig: Send {
    /// Sets a field to a new value, marking it pending for the next push.
    fn set(&mut self, key: &str, value: serde_json::Value);

    /// Returns the current value of a field, if present.
    fn get(&self, key: &str) -> Option<&serde_json::Value>;

    /// Serializes all unconfirmed local edits into one delta.
    fn push(&mut self) -> MergeResult<PushData>;

    /// Folds remote `(server_hash, bytes)` blobs into local state.
    /// Returns how many of the supplied blobs were actually new.
    fn merge(&mut self, blobs: &[(String, Vec<u8>)]) -> MergeResult<usize>;

    /// Marks a previously produced push as durably stored under
    /// `server_hash`. The hashes that push listed as obsolete leave the
    /// bookkeeping, and `server_hash` becomes the tracked record the next
    /// push reports as superseded. A seqno that does not match the
    /// outstanding push is ignored (stale confirmation).
    fn confirm_pushed(&mut self, seqno: u64, server_hash: &str);

    /// True when unconfirmed local state exists.
    fn needs_push(&self) -> bool;

    /// True when in-memory state differs from the last dump.
    fn needs_dump(&self) -> bool;

    /// Serializes the full automaton state for persistence and clears
    /// the dump flag.
    fn dump(&mut self) -> MergeResult<Vec<u8>>;

    /// Restores the automaton from a previously produced dump.
    fn restore(&mut self, bytes: &[u8]) -> MergeResult<()>;
}
