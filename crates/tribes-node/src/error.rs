//! Error types for the node runtime.
//!
//! One enum per component. [`TribesError`] wraps all of them at the
//! orchestration boundary and classifies them for the listen loop.

use thiserror::Error;
use tribes_core::{ContentError, FeedId, GroupId, MsgId, RefError};
use tribes_crypto::{CryptoError, SymmetricKey};

use crate::storage::StorageError;

/// Errors from the key store.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum KeyStoreError {
    /// Group key is not 32 bytes; nothing was stored
    #[error("invalid group key length: expected {expected}, got {actual}")]
    InvalidKeyLength {
        /// Required length
        expected: usize,
        /// Length given
        actual: usize,
    },

    /// Group is already registered with different key material
    #[error("group {group_id} already registered with a different key or root")]
    Conflict {
        /// Group in question
        group_id: GroupId,
    },

    /// Warm-load from durable storage failed
    #[error("key store failed to load: {reason}")]
    LoadFailed {
        /// Underlying failure
        reason: String,
    },

    /// Store was closed
    #[error("key store is closed")]
    Closed,

    /// Durable write or read failed
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Errors from sealing or opening message content.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CodecError {
    /// No recipients given, or none resolved to a key
    #[error("no recipients to seal for")]
    NoRecipients,

    /// More recipients than the configured limit
    #[error("too many recipients: {actual} (max {max})")]
    TooManyRecipients {
        /// Configured limit
        max: usize,
        /// Number given
        actual: usize,
    },

    /// A group recipient has no key in the store
    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    /// Content has no `recps` to seal for
    #[error("content has no recipients")]
    NotPrivate,

    /// Content could not be serialized or its `recps` parsed
    #[error(transparent)]
    Content(#[from] ContentError),

    /// Pair key derivation or sealing failed
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Key store not usable
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),
}

/// Errors from resolving a group's tangle frontier.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TangleError {
    /// Group is not in the key store
    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    /// Key store not usable
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    /// Host log query failed
    #[error(transparent)]
    Log(#[from] LogError),
}

/// Errors reported by the host log.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LogError {
    /// Append did not extend the feed's latest message
    #[error("feed {feed} expected previous {expected:?}, got {got:?}")]
    Conflict {
        /// Feed being extended
        feed: FeedId,
        /// Actual latest message
        expected: Option<MsgId>,
        /// Previous claimed by the new message
        got: Option<MsgId>,
    },

    /// Message id does not match its content, or sequence is wrong
    #[error("invalid message {id}: {reason}")]
    InvalidMessage {
        /// Claimed id
        id: MsgId,
        /// What was wrong
        reason: String,
    },

    /// Message could not be encoded for hashing
    #[error("failed to encode message: {0}")]
    Encode(String),
}

/// Errors surfaced by the group lifecycle API.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum TribesError {
    /// Group is not in the key store
    #[error("unknown group {0}")]
    UnknownGroup(GroupId),

    /// Add-member names a root message this log does not have
    #[error("group root {0} not found")]
    UnknownRoot(MsgId),

    /// Add-member addresses a group id that does not match its key and root
    #[error("add-member addressed to {claimed}, but key and root give {derived}")]
    GroupIdMismatch {
        /// First group recipient of the message
        claimed: GroupId,
        /// Id computed from `groupKey` and `initialMsg`
        derived: GroupId,
    },

    /// The root of a new group is on the log but its key was not stored
    ///
    /// Carries the key material so the caller can finish with
    /// `Tribes::register_created`.
    #[error("group {group_id} was published but not registered: {source}")]
    Unregistered {
        /// Id of the published group
        group_id: GroupId,
        /// Key the root was sealed with
        group_key: SymmetricKey,
        /// The published `group/init`
        root: MsgId,
        /// Key store failure
        source: KeyStoreError,
    },

    /// Reference string could not be parsed
    #[error(transparent)]
    Ref(#[from] RefError),

    /// Content failed validation
    #[error(transparent)]
    Content(#[from] ContentError),

    /// Frontier could not be computed; nothing was published
    #[error(transparent)]
    Tangle(#[from] TangleError),

    /// Sealing failed
    #[error(transparent)]
    Codec(#[from] CodecError),

    /// Key store failed
    #[error(transparent)]
    KeyStore(#[from] KeyStoreError),

    /// Host log failed
    #[error(transparent)]
    Log(#[from] LogError),
}

impl TribesError {
    /// Returns true if a peer's replicated message caused this error.
    ///
    /// The listen loop logs and skips these. Anything else is a local fault.
    pub fn is_protocol_violation(&self) -> bool {
        matches!(
            self,
            Self::UnknownRoot(_)
                | Self::GroupIdMismatch { .. }
                | Self::Ref(_)
                | Self::Content(_)
                | Self::KeyStore(KeyStoreError::Conflict { .. })
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn replicated_garbage_is_a_protocol_violation() {
        let root = MsgId::from_hash([1; 32]);
        assert!(TribesError::UnknownRoot(root).is_protocol_violation());
        assert!(TribesError::Content(ContentError::EmptyRecipients).is_protocol_violation());
    }

    #[test]
    fn local_faults_are_not_protocol_violations() {
        let storage = TribesError::KeyStore(KeyStoreError::Storage(StorageError::Io(
            "disk".to_string(),
        )));
        assert!(!storage.is_protocol_violation());
        assert!(!TribesError::KeyStore(KeyStoreError::Closed).is_protocol_violation());
    }

    #[test]
    fn key_length_error_reports_lengths() {
        let err = KeyStoreError::InvalidKeyLength { expected: 32, actual: 16 };
        assert_eq!(err.to_string(), "invalid group key length: expected 32, got 16");
    }
}
