//! Disappearing-message expiry reconciliation.
//!
//! When a message's countdown should shorten (e.g. it was read on another
//! device), every node in the owner's swarm is asked to shorten the record's
//! TTL. Nodes reply individually and sign what they did; the validated
//! result can disagree with the request — a node that already held a sooner
//! expiry reports the hash as unchanged with its authoritative value, and
//! local bookkeeping is folded to match the swarm rather than the other way
//! around.

use crate::context::SyncContext;
use crate::error::{JobError, JobResult};
use hivesync_swarm::ResponseValidator;
use hivesync_types::AccountId;
use std::collections::BTreeMap;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Upper bound on attempts per expiry group before giving up.
pub const MAX_EXPIRY_ATTEMPTS: u32 = 10;

const RETRY_BACKOFF_MS: u64 = 200;

/// What one reconciliation run accomplished.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ExpiryReport {
    /// Hashes at least one node shortened to the requested expiry.
    pub updated: usize,
    /// Local rows rewritten to a node's authoritative (sooner) expiry.
    pub reconciled: usize,
}

/// Shortens message expiries on the swarm and folds the authoritative
/// answers back into local bookkeeping.
pub struct ExpiryReconcileJob {
    ctx: SyncContext,
    validator: ResponseValidator,
    max_attempts: u32,
}

impl ExpiryReconcileJob {
    /// Creates a job bound to a context and quorum policy.
    #[must_use]
    pub fn new(ctx: SyncContext, validator: ResponseValidator) -> Self {
        Self {
            ctx,
            validator,
            max_attempts: MAX_EXPIRY_ATTEMPTS,
        }
    }

    /// Overrides the attempt bound (mainly for tests).
    #[must_use]
    pub fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    /// Runs one reconciliation pass.
    ///
    /// `adjustments` maps a message hash to the expiry (ms) it should
    /// shorten to. Hashes sharing an expiry go to the swarm as one request.
    /// Shorten-only semantics mean a node never extends a record's life;
    /// whatever expiry each node reports back is written through to local
    /// rows in a single transaction.
    pub async fn run(
        &self,
        owner: AccountId,
        adjustments: Vec<(String, u64)>,
    ) -> JobResult<ExpiryReport> {
        if adjustments.is_empty() {
            return Ok(ExpiryReport::default());
        }

        let mut groups: BTreeMap<u64, Vec<String>> = BTreeMap::new();
        for (hash, expiry_ms) in adjustments {
            groups.entry(expiry_ms).or_default().push(hash);
        }

        let mut updated: Vec<String> = Vec::new();
        let mut authoritative: BTreeMap<String, u64> = BTreeMap::new();

        for (expiry_ms, hashes) in groups {
            let validated = self.update_group(owner, &hashes, expiry_ms).await?;

            for (node, outcome) in validated.iter() {
                debug!(
                    node = %node,
                    updated = outcome.updated.len(),
                    unchanged = outcome.unchanged.len(),
                    "validated expiry outcome"
                );
                for hash in &outcome.updated {
                    if !updated.contains(hash) {
                        updated.push(hash.clone());
                    }
                    record_soonest(&mut authoritative, hash, outcome.expiry_ms);
                }
                for (hash, node_expiry) in &outcome.unchanged {
                    record_soonest(&mut authoritative, hash, *node_expiry);
                }
            }
        }

        let entries: Vec<(String, u64)> = authoritative.into_iter().collect();
        let reconciled = self.ctx.store.reconcile_expiries(&entries)?;

        info!(%owner, updated = updated.len(), reconciled, "expiry reconciliation complete");
        Ok(ExpiryReport {
            updated: updated.len(),
            reconciled,
        })
    }

    async fn update_group(
        &self,
        owner: AccountId,
        hashes: &[String],
        expiry_ms: u64,
    ) -> JobResult<hivesync_swarm::ValidatedResult<hivesync_swarm::ExpiryOutcome>> {
        let mut attempt = 0u32;
        loop {
            attempt += 1;
            let result = match self
                .ctx
                .swarm
                .update_expiry(owner, hashes.to_vec(), expiry_ms, true)
                .await
            {
                Ok(responses) => self
                    .validator
                    .validate_expiry_update(&owner, hashes, &responses)
                    .map_err(JobError::from),
                Err(e) => Err(JobError::from(e)),
            };

            match result {
                Ok(validated) => return Ok(validated),
                Err(e) if e.is_retryable() && attempt < self.max_attempts => {
                    warn!(%owner, attempt, error = %e, "expiry update failed, retrying");
                    tokio::time::sleep(Duration::from_millis(
                        RETRY_BACKOFF_MS * u64::from(attempt),
                    ))
                    .await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

fn record_soonest(map: &mut BTreeMap<String, u64>, hash: &str, expiry_ms: u64) {
    map.entry(hash.to_string())
        .and_modify(|existing| *existing = (*existing).min(expiry_ms))
        .or_insert(expiry_ms);
}
