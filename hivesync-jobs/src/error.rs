//! Error types for the job layer.

use thiserror::Error;

/// Result type for job operations.
pub type JobResult<T> = Result<T, JobError>;

/// Errors that can occur while running a job.
#[derive(Debug, Error)]
pub enum JobError {
    /// Swarm/network-level failure. Retryable: pending changes are
    /// idempotent to re-push on the next cycle.
    #[error("swarm error: {0}")]
    Swarm(#[from] hivesync_swarm::SwarmError),

    /// Merge automaton failure.
    #[error("merge error: {0}")]
    Merge(#[from] hivesync_merge::MergeError),

    /// Persistence failure.
    #[error("storage error: {0}")]
    Storage(String),
}

impl JobError {
    /// True for failures that leave state intact and should simply be
    /// retried on a later cycle. Signature verification failures are not
    /// retryable in the "try again immediately" sense, but the jobs that
    /// hit them are still rescheduled rather than marked dead.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::Swarm(hivesync_swarm::SwarmError::SignatureVerificationFailed { .. }) => false,
            Self::Swarm(_) | Self::Storage(_) => true,
            Self::Merge(_) => false,
        }
    }
}
