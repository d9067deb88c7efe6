//! Digest-resolved LWW field map — the default merge automaton.
//!
//! Stores configuration as a flat map of string keys to JSON values.
//! Concurrent writes to the same field resolve deterministically by
//! comparing a SHA-256 of each candidate's serialized encoding and keeping
//! the higher digest. The rule is arbitrary but total, and it does not
//! depend on wall-clock time, so clock skew between devices can never
//! flip a merge outcome.

use crate::automaton::{MergeableConfig, PushData};
use crate::{MergeError, MergeResult};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, BTreeSet};

/// The wire shape of one pushed delta.
#[derive(Debug, Serialize, Deserialize)]
struct ConfigBlob {
    seqno: u64,
    fields: BTreeMap<String, serde_json::Value>,
}

/// The persisted shape of the full automaton state.
#[derive(Debug, Serialize, Deserialize)]
struct DumpState {
    seqno: u64,
    fields: BTreeMap<String, serde_json::Value>,
    known_hashes: BTreeSet<String>,
    obsolete_hashes: BTreeSet<String>,
    dirty: bool,
}

/// An outstanding push awaiting confirmation.
#[derive(Debug, Clone)]
struct OutstandingPush {
    seqno: u64,
    payload: Vec<u8>,
    obsolete: Vec<String>,
}

/// A mergeable config map with digest-resolved last-writer-wins fields.
#[derive(Debug, Default)]
pub struct LwwConfigMap {
    fields: BTreeMap<String, serde_json::Value>,
    seqno: u64,
    /// Server hashes backing the currently confirmed state.
    known_hashes: BTreeSet<String>,
    /// Hashes still awaiting deletion from earlier cycles.
    obsolete_hashes: BTreeSet<String>,
    /// Local edits exist that the outstanding push (if any) does not cover.
    dirty: bool,
    pending: Option<OutstandingPush>,
    /// The seqno has already been bumped since the last confirmation.
    seqno_bumped: bool,
    dump_stale: bool,
}

impl LwwConfigMap {
    /// Creates an empty automaton.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current sequence number.
    #[must_use]
    pub fn seqno(&self) -> u64 {
        self.seqno
    }

    /// Number of fields currently present.
    #[must_use]
    pub fn len(&self) -> usize {
        self.fields.len()
    }

    /// True when no fields are present.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    fn digest(value: &serde_json::Value) -> MergeResult<[u8; 32]> {
        let bytes = serde_json::to_vec(value)?;
        Ok(Sha256::digest(&bytes).into())
    }
}

impl MergeableConfig for LwwConfigMap {
    fn set(&mut self, key: &str, value: serde_json::Value) {
        if self.fields.get(key) == Some(&value) {
            return;
        }
        self.fields.insert(key.to_string(), value);
        self.dirty = true;
        self.dump_stale = true;
    }

    fn get(&self, key: &str) -> Option<&serde_json::Value> {
        self.fields.get(key)
    }

    fn push(&mut self) -> MergeResult<PushData> {
        // Idempotent until confirmed: no new edits means the same bytes
        // and the same seqno come back.
        if !self.dirty {
            if let Some(p) = &self.pending {
                return Ok(PushData {
                    seqno: p.seqno,
                    payload: p.payload.clone(),
                    obsolete_hashes: p.obsolete.clone(),
                });
            }
        }

        // One seqno bump per confirm cycle, however many fields changed.
        if !self.seqno_bumped {
            self.seqno += 1;
            self.seqno_bumped = true;
            self.dump_stale = true;
        }

        let blob = ConfigBlob {
            seqno: self.seqno,
            fields: self.fields.clone(),
        };
        let payload = serde_json::to_vec(&blob)?;
        // This payload supersedes every server record whose contents it
        // already reflects: the confirmed records backing local state plus
        // anything still awaiting deletion from an earlier cycle.
        let obsolete: Vec<String> = self
            .obsolete_hashes
            .union(&self.known_hashes)
            .cloned()
            .collect();

        self.pending = Some(OutstandingPush {
            seqno: self.seqno,
            payload: payload.clone(),
            obsolete: obsolete.clone(),
        });
        self.dirty = false;

        Ok(PushData {
            seqno: self.seqno,
            payload,
            obsolete_hashes: obsolete,
        })
    }

    fn merge(&mut self, blobs: &[(String, Vec<u8>)]) -> MergeResult<usize> {
        let mut new_blobs = 0;

        for (hash, bytes) in blobs {
            let blob: ConfigBlob = serde_json::from_slice(bytes)
                .map_err(|e| MergeError::InvalidBlob(format!("{hash}: {e}")))?;

            if self.known_hashes.insert(hash.clone()) {
                new_blobs += 1;
                self.dump_stale = true;
            }

            if blob.seqno > self.seqno {
                self.seqno = blob.seqno;
                self.dump_stale = true;
            }

            for (key, candidate) in blob.fields {
                let keep_current = match self.fields.get(&key) {
                    Some(current) => Self::digest(current)? >= Self::digest(&candidate)?,
                    None => false,
                };
                if !keep_current {
                    self.fields.insert(key, candidate);
                    self.dump_stale = true;
                }
            }
        }

        Ok(new_blobs)
    }

    fn confirm_pushed(&mut self, seqno: u64, server_hash: &str) {
        match &self.pending {
            Some(p) if p.seqno == seqno => {}
            _ => return,
        }
        let Some(pending) = self.pending.take() else {
            return;
        };

        // The records this push superseded are deleted from the swarm;
        // stop tracking them. The new server record takes their place.
        for h in &pending.obsolete {
            self.obsolete_hashes.remove(h);
            self.known_hashes.remove(h);
        }
        self.known_hashes.insert(server_hash.to_string());

        self.seqno_bumped = false;
        self.dump_stale = true;
    }

    fn needs_push(&self) -> bool {
        self.dirty || self.pending.is_some()
    }

    fn needs_dump(&self) -> bool {
        self.dump_stale
    }

    fn dump(&mut self) -> MergeResult<Vec<u8>> {
        let state = DumpState {
            seqno: self.seqno,
            fields: self.fields.clone(),
            known_hashes: self.known_hashes.clone(),
            obsolete_hashes: self.obsolete_hashes.clone(),
            dirty: self.needs_push(),
        };
        let bytes = serde_json::to_vec(&state)?;
        self.dump_stale = false;
        Ok(bytes)
    }

    fn restore(&mut self, bytes: &[u8]) -> MergeResult<()> {
        let state: DumpState = serde_json::from_slice(bytes)
            .map_err(|e| MergeError::InvalidDump(e.to_string()))?;
        self.seqno = state.seqno;
        self.fields = state.fields;
        self.known_hashes = state.known_hashes;
        self.obsolete_hashes = state.obsolete_hashes;
        self.dirty = state.dirty;
        self.pending = None;
        self.seqno_bumped = false;
        self.dump_stale = false;
        Ok(())
    }
}
