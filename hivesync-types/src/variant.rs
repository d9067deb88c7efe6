//! Configuration variants — the logical categories of synchronized state.
//!
//! Each variant carries two fixed ranks:
//! - `load_order`: the order automatons are rehydrated at startup, so that
//!   dependent variants (group keys) restore after their dependencies
//!   (group info, group members).
//! - `processing_order`: the order pending changes are collected and remote
//!   merges are applied within one cycle.
//!
//! Both ranks are intrinsic to the variant and never change at runtime.

use serde::{Deserialize, Serialize};
use std::fmt;

/// A logical category of synchronized per-account configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConfigVariant {
    /// The owner's profile (display name, avatar pointer, settings).
    UserProfile,
    /// The set of groups and communities the owner participates in.
    UserGroups,
    /// Volatile per-conversation info (read markers, typing settings).
    ConvoInfoVolatile,
    /// The owner's contact list.
    Contacts,
    /// Descriptive info for one group the owner administers or belongs to.
    GroupInfo,
    /// The membership roster for one group.
    GroupMembers,
    /// Key material for one group; depends on info and members.
    GroupKeys,
}

impl ConfigVariant {
    /// All variants in load order.
    #[must_use]
    pub fn all() -> [ConfigVariant; 7] {
        [
            Self::UserProfile,
            Self::UserGroups,
            Self::ConvoInfoVolatile,
            Self::Contacts,
            Self::GroupInfo,
            Self::GroupMembers,
            Self::GroupKeys,
        ]
    }

    /// Rank used when rehydrating automatons from dumps at startup.
    ///
    /// Group keys must load after group info and group members, whose state
    /// it depends on.
    #[must_use]
    pub const fn load_order(&self) -> u8 {
        match self {
            Self::UserProfile => 0,
            Self::UserGroups => 1,
            Self::ConvoInfoVolatile => 2,
            Self::Contacts => 3,
            Self::GroupInfo => 4,
            Self::GroupMembers => 5,
            Self::GroupKeys => 6,
        }
    }

    /// Rank used when collecting pending changes and applying merges.
    ///
    /// The three group variants share a rank; their relative order within it
    /// falls back to `load_order`.
    #[must_use]
    pub const fn processing_order(&self) -> u8 {
        match self {
            Self::UserProfile => 0,
            Self::UserGroups => 1,
            Self::ConvoInfoVolatile => 2,
            Self::Contacts => 3,
            Self::GroupInfo | Self::GroupMembers | Self::GroupKeys => 4,
        }
    }

    /// The swarm namespace this variant's records are stored under.
    #[must_use]
    pub const fn namespace(&self) -> i32 {
        match self {
            Self::UserProfile => 2,
            Self::Contacts => 3,
            Self::ConvoInfoVolatile => 4,
            Self::UserGroups => 5,
            Self::GroupInfo => 11,
            Self::GroupMembers => 12,
            Self::GroupKeys => 13,
        }
    }
}

impl fmt::Display for ConfigVariant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::UserProfile => "user_profile",
            Self::UserGroups => "user_groups",
            Self::ConvoInfoVolatile => "convo_info_volatile",
            Self::Contacts => "contacts",
            Self::GroupInfo => "group_info",
            Self::GroupMembers => "group_members",
            Self::GroupKeys => "group_keys",
        };
        write!(f, "{name}")
    }
}

impl std::str::FromStr for ConfigVariant {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user_profile" => Ok(Self::UserProfile),
            "user_groups" => Ok(Self::UserGroups),
            "convo_info_volatile" => Ok(Self::ConvoInfoVolatile),
            "contacts" => Ok(Self::Contacts),
            "group_info" => Ok(Self::GroupInfo),
            "group_members" => Ok(Self::GroupMembers),
            "group_keys" => Ok(Self::GroupKeys),
            other => Err(crate::Error::InvalidKey(format!(
                "unknown config variant: {other}"
            ))),
        }
    }
}
