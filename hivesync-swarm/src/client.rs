//! Swarm client abstraction.
//!
//! The jobs crate never talks to the network directly; it goes through this
//! trait, which any transport backend can implement. The contract the jobs
//! depend on: `send_batch` preserves request ordering in its response list,
//! and with `require_all == false` it may omit or truncate entries without
//! erroring the whole batch.

use crate::wire::{BatchEntry, ExpireUpdateBody, SubResponse};
use crate::SwarmResult;
use async_trait::async_trait;
use hivesync_types::{AccountId, NodeId};
use std::collections::BTreeMap;

/// A network collaborator that submits requests to an account's swarm.
#[async_trait]
pub trait SwarmClient: Send + Sync {
    /// Submits one atomic batch of sub-requests.
    ///
    /// The response list is order-preserving with respect to `entries`.
    /// When `require_all` is false a batch may partially fail: individual
    /// sub-responses carry their own status, and entries may be missing.
    async fn send_batch(
        &self,
        owner: AccountId,
        entries: Vec<BatchEntry>,
        require_all: bool,
    ) -> SwarmResult<Vec<SubResponse<serde_json::Value>>>;

    /// Asks every node in the owner's swarm to update the expiry of the
    /// given records. With `shorten_only`, an expiry is never extended.
    /// Returns each node's individual (signed) reply.
    async fn update_expiry(
        &self,
        owner: AccountId,
        hashes: Vec<String>,
        expiry_ms: u64,
        shorten_only: bool,
    ) -> SwarmResult<BTreeMap<NodeId, SubResponse<ExpireUpdateBody>>>;
}

/// An in-memory swarm for testing.
pub mod mock {
    use super::*;
    use crate::wire::StoreResponseBody;
    use crate::SwarmError;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::Mutex;

    /// One batch submission recorded by the mock.
    #[derive(Debug, Clone)]
    pub struct RecordedBatch {
        /// Owner the batch was submitted for.
        pub owner: AccountId,
        /// The sub-requests, in submission order.
        pub entries: Vec<BatchEntry>,
        /// The `require_all` flag the caller used.
        pub require_all: bool,
    }

    /// One expiry-update call recorded by the mock.
    #[derive(Debug, Clone)]
    pub struct RecordedExpiry {
        /// Owner the call was made for.
        pub owner: AccountId,
        /// Requested hashes.
        pub hashes: Vec<String>,
        /// Requested expiry (ms).
        pub expiry_ms: u64,
        /// Whether shorten-only semantics were requested.
        pub shorten_only: bool,
    }

    enum ScriptedBatch {
        Responses(Vec<SubResponse<serde_json::Value>>),
        Error(String),
    }

    enum ScriptedExpiry {
        Responses(BTreeMap<NodeId, SubResponse<ExpireUpdateBody>>),
        Error(String),
    }

    /// A scriptable in-memory swarm.
    ///
    /// With nothing scripted, every store entry succeeds with a generated
    /// hash (`auto-1`, `auto-2`, ...) and every delete succeeds with an
    /// empty body. Scripted responses are consumed in FIFO order, one per
    /// call. Every call is journaled so tests can assert on exactly what
    /// was sent — including that nothing was.
    #[derive(Default)]
    pub struct MockSwarm {
        batches: Mutex<Vec<RecordedBatch>>,
        expiries: Mutex<Vec<RecordedExpiry>>,
        scripted_batches: Mutex<VecDeque<ScriptedBatch>>,
        scripted_expiries: Mutex<VecDeque<ScriptedExpiry>>,
        hash_counter: AtomicU64,
    }

    impl MockSwarm {
        /// Creates a mock with auto-success behavior.
        #[must_use]
        pub fn new() -> Self {
            Self::default()
        }

        /// Scripts the response list for the next batch call.
        pub fn queue_batch_responses(&self, responses: Vec<SubResponse<serde_json::Value>>) {
            self.scripted_batches
                .lock()
                .unwrap()
                .push_back(ScriptedBatch::Responses(responses));
        }

        /// Scripts a transport-level failure for the next batch call.
        pub fn queue_batch_error(&self, message: impl Into<String>) {
            self.scripted_batches
                .lock()
                .unwrap()
                .push_back(ScriptedBatch::Error(message.into()));
        }

        /// Scripts the per-node response map for the next expiry call.
        pub fn queue_expiry_responses(
            &self,
            responses: BTreeMap<NodeId, SubResponse<ExpireUpdateBody>>,
        ) {
            self.scripted_expiries
                .lock()
                .unwrap()
                .push_back(ScriptedExpiry::Responses(responses));
        }

        /// Scripts a transport-level failure for the next expiry call.
        pub fn queue_expiry_error(&self, message: impl Into<String>) {
            self.scripted_expiries
                .lock()
                .unwrap()
                .push_back(ScriptedExpiry::Error(message.into()));
        }

        /// Every batch submitted so far.
        #[must_use]
        pub fn recorded_batches(&self) -> Vec<RecordedBatch> {
            self.batches.lock().unwrap().clone()
        }

        /// Every expiry call made so far.
        #[must_use]
        pub fn recorded_expiries(&self) -> Vec<RecordedExpiry> {
            self.expiries.lock().unwrap().clone()
        }

        /// A successful store sub-response with the given hash, as the
        /// untyped value the batch API returns.
        #[must_use]
        pub fn store_success(hash: &str, timestamp_ms: u64) -> SubResponse<serde_json::Value> {
            let body = StoreResponseBody {
                hash: hash.to_string(),
                timestamp_ms,
            };
            SubResponse {
                status_code: 200,
                failed_to_parse: false,
                body: serde_json::to_value(body).ok(),
            }
        }

        fn auto_response(&self, entry: &BatchEntry) -> SubResponse<serde_json::Value> {
            match entry {
                BatchEntry::Store(_) => {
                    let n = self.hash_counter.fetch_add(1, Ordering::SeqCst) + 1;
                    Self::store_success(&format!("auto-{n}"), 1_700_000_000_000 + n)
                }
                BatchEntry::Delete(_) => SubResponse::ok(serde_json::json!({})),
            }
        }
    }

    #[async_trait]
    impl SwarmClient for MockSwarm {
        async fn send_batch(
            &self,
            owner: AccountId,
            entries: Vec<BatchEntry>,
            require_all: bool,
        ) -> SwarmResult<Vec<SubResponse<serde_json::Value>>> {
            self.batches.lock().unwrap().push(RecordedBatch {
                owner,
                entries: entries.clone(),
                require_all,
            });

            match self.scripted_batches.lock().unwrap().pop_front() {
                Some(ScriptedBatch::Responses(responses)) => Ok(responses),
                Some(ScriptedBatch::Error(message)) => Err(SwarmError::Network(message)),
                None => Ok(entries.iter().map(|e| self.auto_response(e)).collect()),
            }
        }

        async fn update_expiry(
            &self,
            owner: AccountId,
            hashes: Vec<String>,
            expiry_ms: u64,
            shorten_only: bool,
        ) -> SwarmResult<BTreeMap<NodeId, SubResponse<ExpireUpdateBody>>> {
            self.expiries.lock().unwrap().push(RecordedExpiry {
                owner,
                hashes,
                expiry_ms,
                shorten_only,
            });

            match self.scripted_expiries.lock().unwrap().pop_front() {
                Some(ScriptedExpiry::Responses(responses)) => Ok(responses),
                Some(ScriptedExpiry::Error(message)) => Err(SwarmError::Network(message)),
                None => Ok(BTreeMap::new()),
            }
        }
    }
}
