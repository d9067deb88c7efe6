//! Response validator tests with real Ed25519 signatures.

use base64::{engine::general_purpose::STANDARD, Engine};
use ed25519_dalek::{Signer, SigningKey};
use hivesync_swarm::{
    expiry_signature_message, ExpireUpdateBody, RequiredResponses, ResponseValidator, SubResponse,
    SwarmError,
};
use hivesync_types::{AccountId, NodeId};
use rand::rngs::OsRng;
use std::collections::BTreeMap;

fn owner() -> AccountId {
    AccountId::from_bytes([9u8; 32])
}

fn node_key() -> (SigningKey, NodeId) {
    let key = SigningKey::generate(&mut OsRng);
    let id = NodeId::from_bytes(key.verifying_key().to_bytes());
    (key, id)
}

fn signed_body(
    key: &SigningKey,
    owner: &AccountId,
    expiry_ms: u64,
    requested: &[String],
    updated: Vec<String>,
    unchanged: BTreeMap<String, u64>,
) -> ExpireUpdateBody {
    let message = expiry_signature_message(owner, expiry_ms, requested, &updated);
    let signature = key.sign(&message);
    ExpireUpdateBody {
        expiry_ms: Some(expiry_ms),
        updated,
        unchanged,
        signature: Some(STANDARD.encode(signature.to_bytes())),
    }
}

fn hashes(names: &[&str]) -> Vec<String> {
    names.iter().map(|s| s.to_string()).collect()
}

#[test]
fn all_valid_signatures_pass() {
    let owner = owner();
    let requested = hashes(&["h1", "h2"]);
    let mut responses = BTreeMap::new();
    let mut ids = Vec::new();

    for _ in 0..3 {
        let (key, id) = node_key();
        let body = signed_body(&key, &owner, 5_000, &requested, requested.clone(), BTreeMap::new());
        responses.insert(id, SubResponse::ok(body));
        ids.push(id);
    }

    let validator = ResponseValidator::new(RequiredResponses::All);
    let result = validator
        .validate_expiry_update(&owner, &requested, &responses)
        .unwrap();

    assert_eq!(result.len(), 3);
    for id in ids {
        assert_eq!(result.get(&id).unwrap().expiry_ms, 5_000);
    }
}

#[test]
fn one_bad_signature_fails_the_whole_call() {
    let owner = owner();
    let requested = hashes(&["h1"]);
    let mut responses = BTreeMap::new();

    for _ in 0..4 {
        let (key, id) = node_key();
        responses.insert(
            id,
            SubResponse::ok(signed_body(&key, &owner, 5_000, &requested, requested.clone(), BTreeMap::new())),
        );
    }

    // Fifth node signs a different message than it claims.
    let (key, id) = node_key();
    let mut body = signed_body(&key, &owner, 5_000, &requested, requested.clone(), BTreeMap::new());
    body.expiry_ms = Some(9_999);
    responses.insert(id, SubResponse::ok(body));

    let validator = ResponseValidator::new(RequiredResponses::All);
    let err = validator
        .validate_expiry_update(&owner, &requested, &responses)
        .unwrap_err();
    assert!(matches!(err, SwarmError::SignatureVerificationFailed { .. }));
}

#[test]
fn bad_signature_is_fatal_even_with_loose_quorum() {
    let owner = owner();
    let requested = hashes(&["h1"]);
    let mut responses = BTreeMap::new();

    let (key, id) = node_key();
    responses.insert(
        id,
        SubResponse::ok(signed_body(&key, &owner, 5_000, &requested, requested.clone(), BTreeMap::new())),
    );

    let (_, forged_id) = node_key();
    let (other_key, _) = node_key();
    responses.insert(
        forged_id,
        SubResponse::ok(signed_body(&other_key, &owner, 5_000, &requested, requested.clone(), BTreeMap::new())),
    );

    let validator = ResponseValidator::new(RequiredResponses::AtLeast(1));
    let err = validator
        .validate_expiry_update(&owner, &requested, &responses)
        .unwrap_err();
    assert!(matches!(err, SwarmError::SignatureVerificationFailed { .. }));
}

#[test]
fn failed_nodes_are_tolerated_under_count_quorum() {
    let owner = owner();
    let requested = hashes(&["h1"]);
    let mut responses = BTreeMap::new();

    for _ in 0..2 {
        let (key, id) = node_key();
        responses.insert(
            id,
            SubResponse::ok(signed_body(&key, &owner, 5_000, &requested, requested.clone(), BTreeMap::new())),
        );
    }
    let (_, dead) = node_key();
    responses.insert(dead, SubResponse::error(500));

    let validator = ResponseValidator::new(RequiredResponses::AtLeast(2));
    let result = validator
        .validate_expiry_update(&owner, &requested, &responses)
        .unwrap();
    assert_eq!(result.len(), 2);
    assert!(result.get(&dead).is_none());
}

#[test]
fn unsigned_node_breaks_require_all() {
    let owner = owner();
    let requested = hashes(&["h1"]);
    let mut responses = BTreeMap::new();

    let (key, id) = node_key();
    responses.insert(
        id,
        SubResponse::ok(signed_body(&key, &owner, 5_000, &requested, requested.clone(), BTreeMap::new())),
    );

    let (_, unsigned) = node_key();
    responses.insert(
        unsigned,
        SubResponse::ok(ExpireUpdateBody {
            expiry_ms: Some(5_000),
            updated: requested.clone(),
            unchanged: BTreeMap::new(),
            signature: None,
        }),
    );

    let validator = ResponseValidator::new(RequiredResponses::All);
    let err = validator
        .validate_expiry_update(&owner, &requested, &responses)
        .unwrap_err();
    assert!(matches!(err, SwarmError::QuorumNotMet { valid: 1, total: 2, .. }));
}

#[test]
fn node_without_expiry_is_excluded_but_not_an_error() {
    let owner = owner();
    let requested = hashes(&["h1"]);
    let mut responses = BTreeMap::new();

    let (key, id) = node_key();
    responses.insert(
        id,
        SubResponse::ok(signed_body(&key, &owner, 5_000, &requested, requested.clone(), BTreeMap::new())),
    );

    // Signed envelope, but no expiry field: not authoritative for expiry.
    let (_, silent) = node_key();
    responses.insert(
        silent,
        SubResponse::ok(ExpireUpdateBody {
            expiry_ms: None,
            updated: Vec::new(),
            unchanged: BTreeMap::new(),
            signature: Some(STANDARD.encode([0u8; 64])),
        }),
    );

    let validator = ResponseValidator::new(RequiredResponses::All);
    let result = validator
        .validate_expiry_update(&owner, &requested, &responses)
        .unwrap();
    assert_eq!(result.len(), 1);
    assert!(result.get(&silent).is_none());
}

#[test]
fn quorum_counts_over_full_response_set() {
    let owner = owner();
    let requested = hashes(&["h1"]);
    let mut responses = BTreeMap::new();

    let (key, id) = node_key();
    responses.insert(
        id,
        SubResponse::ok(signed_body(&key, &owner, 5_000, &requested, requested.clone(), BTreeMap::new())),
    );
    for _ in 0..3 {
        let (_, dead) = node_key();
        responses.insert(dead, SubResponse::error(503));
    }

    let validator = ResponseValidator::new(RequiredResponses::AtLeast(2));
    let err = validator
        .validate_expiry_update(&owner, &requested, &responses)
        .unwrap_err();
    assert!(matches!(err, SwarmError::QuorumNotMet { valid: 1, total: 4, .. }));
}

#[test]
fn raw_minus_one_means_all() {
    assert_eq!(RequiredResponses::from_raw(-1), RequiredResponses::All);
    assert_eq!(RequiredResponses::from_raw(3), RequiredResponses::AtLeast(3));
}

#[test]
fn unchanged_map_survives_validation() {
    let owner = owner();
    let requested = hashes(&["h1", "h2"]);
    let mut unchanged = BTreeMap::new();
    unchanged.insert("h2".to_string(), 2_000u64);

    let (key, id) = node_key();
    let body = signed_body(&key, &owner, 5_000, &requested, hashes(&["h1"]), unchanged.clone());
    let mut responses = BTreeMap::new();
    responses.insert(id, SubResponse::ok(body));

    let validator = ResponseValidator::new(RequiredResponses::All);
    let result = validator
        .validate_expiry_update(&owner, &requested, &responses)
        .unwrap();
    assert_eq!(result.get(&id).unwrap().unchanged, unchanged);
}
