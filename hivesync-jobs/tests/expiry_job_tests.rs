//! Expiry reconciliation against signed mock swarm responses.

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer, SigningKey};
use hivesync_jobs::{
    ExpiringMessage, ExpiryReconcileJob, ExpiryReport, JobError, JobRunner,
    StaticIdentityProvider, SyncContext, SyncStore,
};
use hivesync_merge::ConfigStore;
use hivesync_swarm::{
    expiry_signature_message, ExpireUpdateBody, MockSwarm, RequiredResponses, ResponseValidator,
    SubResponse, SwarmError,
};
use hivesync_types::{AccountId, ManualClock, NodeId};
use pretty_assertions::assert_eq;
use rand::rngs::OsRng;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

fn owner(byte: u8) -> AccountId {
    AccountId::from_bytes([byte; 32])
}

struct Fixture {
    ctx: SyncContext,
    swarm: Arc<MockSwarm>,
}

fn fixture() -> Fixture {
    let swarm = Arc::new(MockSwarm::new());
    let ctx = SyncContext {
        identity: Arc::new(StaticIdentityProvider::new()),
        swarm: swarm.clone(),
        store: Arc::new(SyncStore::open_in_memory().unwrap()),
        configs: Arc::new(Mutex::new(ConfigStore::new())),
        runner: Arc::new(JobRunner::new()),
        clock: Arc::new(ManualClock::at(1_000_000)),
    };
    Fixture { ctx, swarm }
}

fn node_keypair() -> (SigningKey, NodeId) {
    let key = SigningKey::generate(&mut OsRng);
    let node = NodeId::from_bytes(key.verifying_key().to_bytes());
    (key, node)
}

fn signed_response(
    key: &SigningKey,
    owner: &AccountId,
    expiry_ms: u64,
    requested: &[String],
    updated: Vec<String>,
    unchanged: BTreeMap<String, u64>,
) -> SubResponse<ExpireUpdateBody> {
    let message = expiry_signature_message(owner, expiry_ms, requested, &updated);
    let signature = STANDARD.encode(key.sign(&message).to_bytes());
    SubResponse::ok(ExpireUpdateBody {
        expiry_ms: Some(expiry_ms),
        updated,
        unchanged,
        signature: Some(signature),
    })
}

fn seed_message(ctx: &SyncContext, hash: &str, duration_ms: u64) {
    ctx.store
        .upsert_expiring_message(&ExpiringMessage {
            hash: hash.to_string(),
            conversation: "convo".to_string(),
            duration_ms,
            expires_started_ms: None,
        })
        .unwrap();
}

#[tokio::test]
async fn updated_hashes_rewrite_local_countdowns() {
    let f = fixture();
    let o = owner(1);
    seed_message(&f.ctx, "m1", 60_000);
    seed_message(&f.ctx, "m2", 30_000);

    let (key, node) = node_keypair();
    let requested = vec!["m1".to_string(), "m2".to_string()];
    let mut responses = BTreeMap::new();
    responses.insert(
        node,
        signed_response(&key, &o, 500_000, &requested, requested.clone(), BTreeMap::new()),
    );
    f.swarm.queue_expiry_responses(responses);

    let job = ExpiryReconcileJob::new(
        f.ctx.clone(),
        ResponseValidator::new(RequiredResponses::All),
    );
    let report = job
        .run(o, vec![("m1".to_string(), 500_000), ("m2".to_string(), 500_000)])
        .await
        .unwrap();

    assert_eq!(
        report,
        ExpiryReport {
            updated: 2,
            reconciled: 2
        }
    );
    let m1 = f.ctx.store.expiring_message("m1").unwrap().unwrap();
    assert_eq!(m1.expires_started_ms, Some(500_000 - 60_000));
    let m2 = f.ctx.store.expiring_message("m2").unwrap().unwrap();
    assert_eq!(m2.expires_started_ms, Some(500_000 - 30_000));

    let recorded = f.swarm.recorded_expiries();
    assert_eq!(recorded.len(), 1);
    assert!(recorded[0].shorten_only);
}

#[tokio::test]
async fn unchanged_hash_adopts_the_nodes_sooner_expiry() {
    let f = fixture();
    let o = owner(1);
    seed_message(&f.ctx, "m1", 60_000);

    // The node already held a sooner expiry and refuses to change it.
    let (key, node) = node_keypair();
    let requested = vec!["m1".to_string()];
    let mut unchanged = BTreeMap::new();
    unchanged.insert("m1".to_string(), 400_000u64);
    let mut responses = BTreeMap::new();
    responses.insert(
        node,
        signed_response(&key, &o, 500_000, &requested, Vec::new(), unchanged),
    );
    f.swarm.queue_expiry_responses(responses);

    let job = ExpiryReconcileJob::new(
        f.ctx.clone(),
        ResponseValidator::new(RequiredResponses::All),
    );
    let report = job.run(o, vec![("m1".to_string(), 500_000)]).await.unwrap();

    assert_eq!(
        report,
        ExpiryReport {
            updated: 0,
            reconciled: 1
        }
    );
    let m1 = f.ctx.store.expiring_message("m1").unwrap().unwrap();
    assert_eq!(m1.expires_started_ms, Some(400_000 - 60_000));
}

#[tokio::test]
async fn tampered_signature_fails_without_retry() {
    let f = fixture();
    let o = owner(1);

    let (key, node) = node_keypair();
    let requested = vec!["m1".to_string()];
    let mut response = signed_response(&key, &o, 500_000, &requested, requested.clone(), BTreeMap::new());
    if let Some(body) = response.body.as_mut() {
        // Signed over different updated hashes than reported.
        body.updated = vec!["m1".to_string(), "forged".to_string()];
    }
    let mut responses = BTreeMap::new();
    responses.insert(node, response);
    f.swarm.queue_expiry_responses(responses);

    let job = ExpiryReconcileJob::new(
        f.ctx.clone(),
        ResponseValidator::new(RequiredResponses::All),
    )
    .with_max_attempts(5);
    let err = job
        .run(o, vec![("m1".to_string(), 500_000)])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        JobError::Swarm(SwarmError::SignatureVerificationFailed { .. })
    ));
    // Tampering is not a transient fault: exactly one call went out.
    assert_eq!(f.swarm.recorded_expiries().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn transient_network_error_is_retried() {
    let f = fixture();
    let o = owner(1);
    seed_message(&f.ctx, "m1", 60_000);

    let (key, node) = node_keypair();
    let requested = vec!["m1".to_string()];
    let mut responses = BTreeMap::new();
    responses.insert(
        node,
        signed_response(&key, &o, 500_000, &requested, requested.clone(), BTreeMap::new()),
    );
    f.swarm.queue_expiry_error("connection reset");
    f.swarm.queue_expiry_responses(responses);

    let job = ExpiryReconcileJob::new(
        f.ctx.clone(),
        ResponseValidator::new(RequiredResponses::All),
    )
    .with_max_attempts(3);
    let report = job.run(o, vec![("m1".to_string(), 500_000)]).await.unwrap();

    assert_eq!(
        report,
        ExpiryReport {
            updated: 1,
            reconciled: 1
        }
    );
    assert_eq!(f.swarm.recorded_expiries().len(), 2);
}

#[tokio::test]
async fn strict_quorum_rejects_an_unsigned_node() {
    let f = fixture();
    let o = owner(1);

    let (key, good) = node_keypair();
    let (_, silent) = node_keypair();
    let requested = vec!["m1".to_string()];
    let mut responses = BTreeMap::new();
    responses.insert(
        good,
        signed_response(&key, &o, 500_000, &requested, requested.clone(), BTreeMap::new()),
    );
    responses.insert(
        silent,
        SubResponse::ok(ExpireUpdateBody {
            expiry_ms: Some(500_000),
            updated: requested.clone(),
            unchanged: BTreeMap::new(),
            signature: None,
        }),
    );
    f.swarm.queue_expiry_responses(responses);

    let job = ExpiryReconcileJob::new(
        f.ctx.clone(),
        ResponseValidator::new(RequiredResponses::All),
    )
    .with_max_attempts(1);
    let err = job
        .run(o, vec![("m1".to_string(), 500_000)])
        .await
        .unwrap_err();

    assert!(matches!(
        err,
        JobError::Swarm(SwarmError::QuorumNotMet { valid: 1, total: 2, .. })
    ));
}
