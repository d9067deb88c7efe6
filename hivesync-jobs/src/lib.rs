//! Configuration sync and expiry reconciliation jobs.
//!
//! This crate orchestrates the write side of hivesync:
//!
//! 1. Local mutations mark fields pending on a variant's merge automaton.
//! 2. [`PendingChangeCollector`] drains pending variants in processing
//!    order and produces namespaced wire payloads.
//! 3. [`ConfigSyncJob`] batches every pending change (plus one combined
//!    delete of obsolete hashes) into a single atomic swarm submission,
//!    reconciles the partially-failing response list, confirms pushes,
//!    persists dumps and reschedules itself with a minimum interval.
//! 4. [`ExpiryReconcileJob`] independently shortens message TTLs on the
//!    swarm and folds the validated per-node result back into local expiry
//!    bookkeeping.
//!
//! All collaborators — identity, swarm client, persistence, scheduling
//! state, clock — arrive through an explicitly passed [`SyncContext`];
//! nothing reads ambient singletons.

mod collector;
mod context;
mod error;
mod expiry_job;
mod runner;
mod store;
mod sync_job;

pub use collector::{PendingChange, PendingChangeCollector};
pub use context::{Identity, IdentityProvider, StaticIdentityProvider, SyncContext};
pub use error::{JobError, JobResult};
pub use expiry_job::{ExpiryReconcileJob, ExpiryReport, MAX_EXPIRY_ATTEMPTS};
pub use runner::{JobRunner, RunGuard};
pub use store::{ExpiringMessage, ScheduleOp, SyncJobRecord, SyncStore};
pub use sync_job::{ConfigSyncJob, SyncOutcome, MIN_SYNC_INTERVAL_MS};
