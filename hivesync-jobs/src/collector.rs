//! Drains pending merge-automaton state into wire-ready changes.

use hivesync_merge::{ConfigStore, MergeResult};
use hivesync_swarm::CONFIG_TTL_MS;
use hivesync_types::{AccountId, ConfigVariant};
use tracing::debug;

/// One variant's unconfirmed local state, ready to be stored on the swarm.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingChange {
    /// The variant the payload belongs to.
    pub variant: ConfigVariant,
    /// Target swarm namespace.
    pub namespace: i32,
    /// Serialized automaton payload.
    pub payload: Vec<u8>,
    /// The payload's sequence number.
    pub seqno: u64,
    /// Time-to-live for the stored record (ms).
    pub ttl_ms: u64,
    /// Server hashes this payload supersedes.
    pub obsolete_hashes: Vec<String>,
}

/// Collects pending changes across an owner's tracked variants.
pub struct PendingChangeCollector;

impl PendingChangeCollector {
    /// Produces one change per variant with unconfirmed edits, in
    /// processing order.
    ///
    /// Collection does not advance automaton state beyond what `push`
    /// itself does: until a change is confirmed, collecting again yields
    /// the same payload and seqno, so a failed cycle can safely recollect.
    pub fn collect(
        configs: &mut ConfigStore,
        owner: AccountId,
    ) -> MergeResult<Vec<PendingChange>> {
        let variants = configs.variants_needing_push(owner);
        let mut changes = Vec::with_capacity(variants.len());
        for variant in variants {
            let push = configs.with_config(variant, owner, |config| config.push())?;
            debug!(
                variant = %variant,
                seqno = push.seqno,
                obsolete = push.obsolete_hashes.len(),
                "collected pending change"
            );
            changes.push(PendingChange {
                variant,
                namespace: variant.namespace(),
                payload: push.payload,
                seqno: push.seqno,
                ttl_ms: CONFIG_TTL_MS,
                obsolete_hashes: push.obsolete_hashes,
            });
        }
        Ok(changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(byte: u8) -> AccountId {
        AccountId::from_bytes([byte; 32])
    }

    #[test]
    fn collects_nothing_when_no_variant_is_pending() {
        let mut configs = ConfigStore::new();
        let changes = PendingChangeCollector::collect(&mut configs, owner(1)).unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn collects_in_processing_order_with_namespaces() {
        let mut configs = ConfigStore::new();
        let o = owner(1);
        for variant in [
            ConfigVariant::Contacts,
            ConfigVariant::UserProfile,
            ConfigVariant::GroupKeys,
        ] {
            configs.with_config(variant, o, |c| c.set("k", serde_json::json!(1)));
        }

        let changes = PendingChangeCollector::collect(&mut configs, o).unwrap();
        let variants: Vec<ConfigVariant> = changes.iter().map(|c| c.variant).collect();
        assert_eq!(
            variants,
            vec![
                ConfigVariant::UserProfile,
                ConfigVariant::Contacts,
                ConfigVariant::GroupKeys,
            ]
        );
        for change in &changes {
            assert_eq!(change.namespace, change.variant.namespace());
            assert_eq!(change.ttl_ms, CONFIG_TTL_MS);
        }
    }

    #[test]
    fn recollection_without_confirm_is_stable() {
        let mut configs = ConfigStore::new();
        let o = owner(1);
        configs.with_config(ConfigVariant::UserProfile, o, |c| {
            c.set("name", serde_json::json!("alice"));
        });

        let first = PendingChangeCollector::collect(&mut configs, o).unwrap();
        let second = PendingChangeCollector::collect(&mut configs, o).unwrap();
        assert_eq!(first, second);
    }
}
