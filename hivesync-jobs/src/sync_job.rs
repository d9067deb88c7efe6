//! The batched config synchronization job.
//!
//! One cycle drains every pending variant for an owner into a single atomic
//! swarm batch (stores first, one combined delete of superseded hashes
//! last), reconciles the order-preserving response list positionally,
//! confirms what the swarm accepted and drops what it did not — a dropped
//! change simply stays pending and re-collects next cycle. Completion
//! reschedules exactly one future record per owner, never a duplicate.

use crate::collector::PendingChangeCollector;
use crate::context::SyncContext;
use crate::error::JobResult;
use crate::store::{ScheduleOp, SyncJobRecord};
use hivesync_swarm::{BatchEntry, DeleteRequest, StoreRequest, StoreResponseBody, SubResponse};
use hivesync_types::AccountId;
use std::collections::HashSet;
use tracing::{debug, info, warn};

/// Minimum delay between two sync cycles for the same owner (ms).
pub const MIN_SYNC_INTERVAL_MS: u64 = 3_000;

/// How one invocation of the sync job ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyncOutcome {
    /// Another cycle for this owner was already running; this invocation
    /// made no network call and rescheduled instead.
    Deferred,
    /// The cycle ran to completion.
    Completed {
        /// Changes the swarm accepted and the automatons confirmed.
        confirmed: usize,
        /// Changes the swarm rejected or omitted; they stay pending.
        dropped: usize,
        /// True if a fresh job record was inserted (rather than an existing
        /// one updated, or nothing scheduled on an empty cycle).
        rescheduled: bool,
    },
}

/// Runs batched config sync cycles.
pub struct ConfigSyncJob {
    ctx: SyncContext,
}

impl ConfigSyncJob {
    /// Creates a job bound to a context.
    #[must_use]
    pub fn new(ctx: SyncContext) -> Self {
        Self { ctx }
    }

    /// Runs one sync cycle for an owner.
    pub async fn run(&self, owner: AccountId) -> JobResult<SyncOutcome> {
        let now = self.ctx.clock.now_ms();

        let Some(_guard) = self.ctx.runner.try_begin(owner) else {
            debug!(%owner, "sync already running, deferring");
            self.reschedule(owner, now + MIN_SYNC_INTERVAL_MS)?;
            return Ok(SyncOutcome::Deferred);
        };

        if self.ctx.identity.credentials(owner).is_none() {
            info!(%owner, "no credentials yet, nothing to sync");
            return Ok(SyncOutcome::Completed {
                confirmed: 0,
                dropped: 0,
                rescheduled: false,
            });
        }

        let changes = {
            let mut configs = self.ctx.configs.lock().unwrap();
            PendingChangeCollector::collect(&mut configs, owner)?
        };
        if changes.is_empty() {
            debug!(%owner, "nothing pending");
            return Ok(SyncOutcome::Completed {
                confirmed: 0,
                dropped: 0,
                rescheduled: false,
            });
        }

        // Stores first, in collection order; one combined delete last so
        // the response list zips positionally against `changes`.
        let mut entries: Vec<BatchEntry> = changes
            .iter()
            .map(|c| BatchEntry::Store(StoreRequest::new(c.namespace, &c.payload, c.ttl_ms)))
            .collect();
        let obsolete = dedup_hashes(changes.iter().flat_map(|c| c.obsolete_hashes.iter()));
        if !obsolete.is_empty() {
            entries.push(BatchEntry::Delete(DeleteRequest { hashes: obsolete }));
        }

        let responses = match self
            .ctx
            .swarm
            .send_batch(owner, entries, false)
            .await
        {
            Ok(responses) => responses,
            Err(e) => {
                // Nothing was confirmed; pending state is untouched and
                // re-collects next cycle. Rescheduling is best-effort.
                if let Err(store_err) = self.reschedule(owner, now + MIN_SYNC_INTERVAL_MS) {
                    warn!(%owner, error = %store_err, "failed to reschedule after swarm error");
                }
                return Err(e.into());
            }
        };

        let mut confirmed = 0usize;
        let mut dropped = 0usize;
        let mut dumps = Vec::new();
        {
            let mut configs = self.ctx.configs.lock().unwrap();
            for (i, change) in changes.iter().enumerate() {
                // A truncated response list means the tail entries failed.
                match responses.get(i).and_then(store_hash) {
                    Some(hash) => {
                        configs.with_config(change.variant, owner, |config| {
                            config.confirm_pushed(change.seqno, &hash);
                        });
                        if let Some(dump) =
                            configs.dump_if_needed(change.variant, owner, now)?
                        {
                            dumps.push(dump);
                        }
                        confirmed += 1;
                    }
                    None => {
                        debug!(%owner, variant = %change.variant, "change not accepted, staying pending");
                        dropped += 1;
                    }
                }
            }
        }

        // One record per owner: update a surviving scheduled record if one
        // exists, otherwise insert a fresh one for this job.
        let next_run = now + MIN_SYNC_INTERVAL_MS;
        let (op, rescheduled) = match self.ctx.store.scheduled_job(owner)? {
            Some(record) => (
                ScheduleOp::UpdateOther {
                    id: record.id,
                    next_run_ms: record.next_run_ms.max(next_run),
                },
                false,
            ),
            None => (ScheduleOp::Insert(SyncJobRecord::new(owner, next_run)), true),
        };
        // Confirms already applied in-memory survive a persist failure;
        // idempotent re-push keeps replicas convergent either way.
        self.ctx.store.persist_cycle(&dumps, &op)?;

        info!(%owner, confirmed, dropped, rescheduled, "sync cycle complete");
        Ok(SyncOutcome::Completed {
            confirmed,
            dropped,
            rescheduled,
        })
    }

    fn reschedule(&self, owner: AccountId, next_run_ms: u64) -> JobResult<()> {
        let op = match self.ctx.store.scheduled_job(owner)? {
            Some(record) => ScheduleOp::UpdateOther {
                id: record.id,
                next_run_ms: record.next_run_ms.max(next_run_ms),
            },
            None => ScheduleOp::Insert(SyncJobRecord::new(owner, next_run_ms)),
        };
        self.ctx.store.persist_cycle(&[], &op)
    }
}

fn dedup_hashes<'a>(hashes: impl Iterator<Item = &'a String>) -> Vec<String> {
    let mut seen: HashSet<&str> = HashSet::new();
    hashes.filter(|h| seen.insert(h.as_str())).cloned().collect()
}

fn store_hash(response: &SubResponse<serde_json::Value>) -> Option<String> {
    if !response.is_success() {
        return None;
    }
    let body = response.body.clone()?;
    let body: StoreResponseBody = serde_json::from_value(body).ok()?;
    Some(body.hash)
}
