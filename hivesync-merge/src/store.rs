//! Ownership of merge automatons, one per (variant, owner) pair.
//!
//! Automatons are exclusively owned by the store and only reachable through
//! scoped mutation, so no caller can hold an automaton across an await point
//! or observe it mid-merge.

use crate::automaton::MergeableConfig;
use crate::lww_map::LwwConfigMap;
use crate::MergeResult;
use hivesync_types::{AccountId, ConfigVariant};
use std::collections::HashMap;

/// A persisted snapshot of one automaton's state at a point in time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigDump {
    /// The variant this dump belongs to.
    pub variant: ConfigVariant,
    /// The owner account.
    pub owner: AccountId,
    /// Opaque automaton state bytes.
    pub data: Vec<u8>,
    /// When the dump was produced (ms since epoch).
    pub created_ms: u64,
}

type Factory = Box<dyn Fn() -> Box<dyn MergeableConfig> + Send>;

/// Owns one merge automaton per (variant, owner) pair.
pub struct ConfigStore {
    configs: HashMap<(ConfigVariant, AccountId), Box<dyn MergeableConfig>>,
    factory: Factory,
}

impl Default for ConfigStore {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigStore {
    /// Creates a store backed by [`LwwConfigMap`] automatons.
    #[must_use]
    pub fn new() -> Self {
        Self::with_factory(Box::new(|| Box::new(LwwConfigMap::new())))
    }

    /// Creates a store that builds automatons through a custom factory.
    /// Any implementation satisfying the [`MergeableConfig`] contract can
    /// be substituted.
    #[must_use]
    pub fn with_factory(factory: Factory) -> Self {
        Self {
            configs: HashMap::new(),
            factory,
        }
    }

    /// Runs a closure against the automaton for (variant, owner), creating
    /// it on first access.
    pub fn with_config<R>(
        &mut self,
        variant: ConfigVariant,
        owner: AccountId,
        f: impl FnOnce(&mut dyn MergeableConfig) -> R,
    ) -> R {
        let config = self
            .configs
            .entry((variant, owner))
            .or_insert_with(|| (self.factory)());
        f(config.as_mut())
    }

    /// True if an automaton exists for (variant, owner).
    #[must_use]
    pub fn contains(&self, variant: ConfigVariant, owner: AccountId) -> bool {
        self.configs.contains_key(&(variant, owner))
    }

    /// Variants tracked for an owner, in load order.
    #[must_use]
    pub fn tracked_variants(&self, owner: AccountId) -> Vec<ConfigVariant> {
        let mut variants: Vec<ConfigVariant> = self
            .configs
            .keys()
            .filter(|(_, o)| *o == owner)
            .map(|(v, _)| *v)
            .collect();
        variants.sort_by_key(|v| v.load_order());
        variants
    }

    /// Variants with unconfirmed local edits for an owner, ordered by
    /// processing rank, then load rank within a shared processing rank.
    #[must_use]
    pub fn variants_needing_push(&self, owner: AccountId) -> Vec<ConfigVariant> {
        let mut variants: Vec<ConfigVariant> = self
            .configs
            .iter()
            .filter(|((_, o), config)| *o == owner && config.needs_push())
            .map(|((v, _), _)| *v)
            .collect();
        variants.sort_by_key(|v| (v.processing_order(), v.load_order()));
        variants
    }

    /// Rehydrates automatons from persisted dumps.
    ///
    /// Dumps are applied in load order regardless of input order, so
    /// dependent variants always restore after their dependencies.
    pub fn hydrate(&mut self, mut dumps: Vec<ConfigDump>) -> MergeResult<()> {
        dumps.sort_by_key(|d| d.variant.load_order());
        for dump in dumps {
            self.with_config(dump.variant, dump.owner, |config| {
                config.restore(&dump.data)
            })?;
        }
        Ok(())
    }

    /// Produces a dump for (variant, owner) if its state is stale, clearing
    /// the dump flag.
    pub fn dump_if_needed(
        &mut self,
        variant: ConfigVariant,
        owner: AccountId,
        now_ms: u64,
    ) -> MergeResult<Option<ConfigDump>> {
        if !self.contains(variant, owner) {
            return Ok(None);
        }
        self.with_config(variant, owner, |config| {
            if !config.needs_dump() {
                return Ok(None);
            }
            let data = config.dump()?;
            Ok(Some(data))
        })
        .map(|data| {
            data.map(|data| ConfigDump {
                variant,
                owner,
                data,
                created_ms: now_ms,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn owner(byte: u8) -> AccountId {
        AccountId::from_bytes([byte; 32])
    }

    #[test]
    fn creates_automatons_on_demand() {
        let mut store = ConfigStore::new();
        assert!(!store.contains(ConfigVariant::Contacts, owner(1)));
        store.with_config(ConfigVariant::Contacts, owner(1), |c| {
            c.set("k", serde_json::json!(1));
        });
        assert!(store.contains(ConfigVariant::Contacts, owner(1)));
    }

    #[test]
    fn pending_variants_follow_processing_then_load_order() {
        let mut store = ConfigStore::new();
        let o = owner(1);
        for variant in [
            ConfigVariant::GroupKeys,
            ConfigVariant::ConvoInfoVolatile,
            ConfigVariant::GroupInfo,
            ConfigVariant::UserProfile,
            ConfigVariant::UserGroups,
        ] {
            store.with_config(variant, o, |c| c.set("k", serde_json::json!(1)));
        }

        assert_eq!(
            store.variants_needing_push(o),
            vec![
                ConfigVariant::UserProfile,
                ConfigVariant::UserGroups,
                ConfigVariant::ConvoInfoVolatile,
                ConfigVariant::GroupInfo,
                ConfigVariant::GroupKeys,
            ]
        );
    }

    #[test]
    fn pending_is_per_owner() {
        let mut store = ConfigStore::new();
        store.with_config(ConfigVariant::Contacts, owner(1), |c| {
            c.set("k", serde_json::json!(1));
        });
        assert!(store.variants_needing_push(owner(2)).is_empty());
    }

    #[test]
    fn hydrate_restores_state() {
        let mut store = ConfigStore::new();
        let o = owner(1);
        let data = store.with_config(ConfigVariant::UserProfile, o, |c| {
            c.set("name", serde_json::json!("alice"));
            let p = c.push().unwrap();
            c.confirm_pushed(p.seqno, "h1");
            c.dump().unwrap()
        });

        let mut fresh = ConfigStore::new();
        fresh
            .hydrate(vec![ConfigDump {
                variant: ConfigVariant::UserProfile,
                owner: o,
                data,
                created_ms: 1,
            }])
            .unwrap();
        let name = fresh.with_config(ConfigVariant::UserProfile, o, |c| {
            c.get("name").cloned()
        });
        assert_eq!(name, Some(serde_json::json!("alice")));
    }
}
