//! Shared scheduling state for running jobs.
//!
//! Coordination between jobs for the same owner happens only through this
//! running set — a cooperative, poll-based avoidance of duplicate work, not
//! a lock. The check-and-set in `try_begin` is linearizable (it happens
//! under one mutex), so two jobs can never both observe "not running" and
//! race. Cross-owner concurrency is unrestricted.

use hivesync_types::AccountId;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Tracks which owners currently have a job mid-cycle.
#[derive(Debug, Default)]
pub struct JobRunner {
    running: Mutex<HashSet<AccountId>>,
}

impl JobRunner {
    /// Creates an empty runner.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Atomically claims the running slot for an owner.
    ///
    /// Returns `None` if a job for this owner is already mid-cycle; the
    /// caller must defer instead of running. The returned guard releases
    /// the slot on drop, so every exit path — success, error, panic —
    /// releases it.
    #[must_use]
    pub fn try_begin(self: &Arc<Self>, owner: AccountId) -> Option<RunGuard> {
        let mut running = self.running.lock().unwrap();
        if !running.insert(owner) {
            return None;
        }
        Some(RunGuard {
            runner: Arc::clone(self),
            owner,
        })
    }

    /// True if a job for this owner is currently mid-cycle.
    #[must_use]
    pub fn is_running(&self, owner: AccountId) -> bool {
        self.running.lock().unwrap().contains(&owner)
    }
}

/// Releases an owner's running slot on drop.
#[derive(Debug)]
pub struct RunGuard {
    runner: Arc<JobRunner>,
    owner: AccountId,
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        self.runner.running.lock().unwrap().remove(&self.owner);
    }
}
