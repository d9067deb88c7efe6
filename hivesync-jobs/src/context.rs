//! The explicitly injected context every job operation runs against.
//!
//! Jobs never reach for ambient singletons: identity, persistence, the
//! swarm client, scheduling state and the clock all arrive through
//! [`SyncContext`]. This keeps every code path testable with a manual
//! clock and an in-memory swarm.

use crate::runner::JobRunner;
use crate::store::SyncStore;
use hivesync_merge::ConfigStore;
use hivesync_swarm::SwarmClient;
use hivesync_types::{AccountId, Clock};
use std::collections::HashSet;
use std::sync::{Arc, Mutex};

/// Authentication credentials for one owner account.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    /// The account the credentials belong to.
    pub account: AccountId,
}

/// Exposes current authentication credentials for an owner id.
///
/// Returning `None` means onboarding has not completed for that owner —
/// the sync job treats that as "nothing to sync yet", not an error.
pub trait IdentityProvider: Send + Sync {
    /// Credentials for the given owner, if onboarding is complete.
    fn credentials(&self, owner: AccountId) -> Option<Identity>;
}

/// An identity provider backed by a fixed set of onboarded accounts.
#[derive(Debug, Default)]
pub struct StaticIdentityProvider {
    accounts: Mutex<HashSet<AccountId>>,
}

impl StaticIdentityProvider {
    /// Creates a provider with no onboarded accounts.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks an account as onboarded.
    pub fn add(&self, account: AccountId) {
        self.accounts.lock().unwrap().insert(account);
    }
}

impl IdentityProvider for StaticIdentityProvider {
    fn credentials(&self, owner: AccountId) -> Option<Identity> {
        self.accounts
            .lock()
            .unwrap()
            .contains(&owner)
            .then_some(Identity { account: owner })
    }
}

/// Everything a job needs to run one cycle.
#[derive(Clone)]
pub struct SyncContext {
    /// Authentication credentials lookup.
    pub identity: Arc<dyn IdentityProvider>,
    /// The network collaborator.
    pub swarm: Arc<dyn SwarmClient>,
    /// Persistent store for dumps, job records and expiry bookkeeping.
    pub store: Arc<SyncStore>,
    /// The merge automatons, behind a short-held lock (never held across
    /// an await point).
    pub configs: Arc<Mutex<ConfigStore>>,
    /// Shared scheduling state.
    pub runner: Arc<JobRunner>,
    /// Time source.
    pub clock: Arc<dyn Clock>,
}
