//! Group key material as held by a member.

use std::fmt;

use serde::{Deserialize, Serialize};
use tribes_crypto::SymmetricKey;

use crate::refs::{GroupId, MsgId};

/// Cryptographic convention governing messages addressed to a group.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Scheme {
    /// Symmetric group key shared by all members
    #[default]
    #[serde(rename = "envelope-large-symmetric-group")]
    PrivateGroup,
}

impl Scheme {
    /// Wire name of the scheme.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::PrivateGroup => "envelope-large-symmetric-group",
        }
    }
}

impl fmt::Display for Scheme {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Everything a member needs to read and write a group.
///
/// Never mutated after registration. A rotated key would be a different group.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GroupKeyInfo {
    /// Shared symmetric key
    pub key: SymmetricKey,
    /// Id of the `group/init` message that founded the group
    pub root: MsgId,
    /// Convention for messages in this group
    pub scheme: Scheme,
}

impl GroupKeyInfo {
    /// Info for the default private-group scheme.
    pub fn new(key: SymmetricKey, root: MsgId) -> Self {
        Self { key, root, scheme: Scheme::default() }
    }

    /// Cloaked id of the group this info belongs to.
    pub fn group_id(&self) -> GroupId {
        GroupId::cloak(&self.root, &self.key)
    }
}
