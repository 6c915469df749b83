//! Durable storage for the key store.
//!
//! Trait-based abstraction over an ordered key-value store. The trait is
//! synchronous; async callers move operations onto blocking threads.
//!
//! # Layout
//!
//! Two keyspaces share one ordered table:
//!
//! ```text
//! group\0  <group id TFK: 34> <inserted_at ms: 8 BE>  -> CBOR StoredGroup
//! member\0 <feed id TFK: 34>  <group id TFK: 34>      -> group id TFK
//! ```
//!
//! Each keyspace is enumerated with the range `[ns\0, ns\x01)`, so scanning
//! one never touches the other.

mod chaotic;
mod error;
mod memory;
mod redb;

use base64::{Engine, engine::general_purpose::STANDARD};
pub use chaotic::ChaoticStorage;
pub use error::StorageError;
pub use memory::MemoryStorage;
use serde::{Deserialize, Serialize};
use tribes_core::{
    FeedId, GroupId, GroupKeyInfo, MsgId, Scheme,
    refs::TFK_SIZE,
};
use tribes_crypto::SymmetricKey;

pub use self::redb::RedbStorage;

/// Namespace of group records.
const GROUP_NS: &[u8] = b"group";

/// Namespace of membership records.
const MEMBER_NS: &[u8] = b"member";

/// Persisted form of [`GroupKeyInfo`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredGroup {
    /// Base64 group key
    pub key: String,
    /// Root message of the group
    pub root: MsgId,
    /// Absent in records written before schemes existed
    #[serde(default)]
    pub scheme: Scheme,
}

impl StoredGroup {
    /// Record for `info`.
    pub fn from_info(info: &GroupKeyInfo) -> Self {
        Self { key: STANDARD.encode(info.key.as_bytes()), root: info.root, scheme: info.scheme }
    }

    /// Decode back into key material.
    pub fn into_info(self) -> Result<GroupKeyInfo, StorageError> {
        let bytes =
            STANDARD.decode(&self.key).map_err(|e| StorageError::Serialization(e.to_string()))?;
        let key = SymmetricKey::from_slice(&bytes)
            .map_err(|e| StorageError::Serialization(e.to_string()))?;
        Ok(GroupKeyInfo { key, root: self.root, scheme: self.scheme })
    }
}

/// Storage abstraction for group keys and memberships
///
/// Must be Clone (shared by the key store and its loader), Send + Sync, and
/// synchronous. Implementations share internal state via Arc, so clones
/// access the same underlying storage.
pub trait Storage: Clone + Send + Sync + 'static {
    /// Persist a group record.
    ///
    /// `inserted_at` orders repeated records for the same group; the latest
    /// one wins on load.
    fn put_group(
        &self,
        group_id: &GroupId,
        record: &StoredGroup,
        inserted_at: u64,
    ) -> Result<(), StorageError>;

    /// All group records in key order.
    fn list_groups(&self) -> Result<Vec<(GroupId, StoredGroup)>, StorageError>;

    /// Persist that `author` belongs to `group_id`. Idempotent.
    fn put_membership(&self, author: &FeedId, group_id: &GroupId) -> Result<(), StorageError>;

    /// All membership records in key order.
    fn list_memberships(&self) -> Result<Vec<(FeedId, GroupId)>, StorageError>;
}

/// `[ns\0, ns\x01)`: every key in the namespace and nothing else.
fn namespace_range(namespace: &[u8]) -> (Vec<u8>, Vec<u8>) {
    let mut start = namespace.to_vec();
    start.push(0x00);
    let mut end = namespace.to_vec();
    end.push(0x01);
    (start, end)
}

fn group_record_key(group_id: &GroupId, inserted_at: u64) -> Vec<u8> {
    let mut key = Vec::with_capacity(GROUP_NS.len() + 1 + TFK_SIZE + 8);
    key.extend_from_slice(GROUP_NS);
    key.push(0x00);
    key.extend_from_slice(&group_id.to_tfk());
    key.extend_from_slice(&inserted_at.to_be_bytes());
    key
}

fn decode_group_record_key(key: &[u8]) -> Result<GroupId, StorageError> {
    let offset = GROUP_NS.len() + 1;
    let tfk = key
        .get(offset..offset + TFK_SIZE)
        .ok_or_else(|| StorageError::Serialization(format!("group key too short: {}", key.len())))?;
    GroupId::from_tfk(tfk).map_err(|e| StorageError::Serialization(e.to_string()))
}

fn membership_record_key(author: &FeedId, group_id: &GroupId) -> Vec<u8> {
    let mut key = Vec::with_capacity(MEMBER_NS.len() + 1 + 2 * TFK_SIZE);
    key.extend_from_slice(MEMBER_NS);
    key.push(0x00);
    key.extend_from_slice(&author.to_tfk());
    key.extend_from_slice(&group_id.to_tfk());
    key
}

fn decode_membership_record_key(key: &[u8]) -> Result<(FeedId, GroupId), StorageError> {
    let offset = MEMBER_NS.len() + 1;
    let too_short = || StorageError::Serialization(format!("member key too short: {}", key.len()));

    let feed = key.get(offset..offset + TFK_SIZE).ok_or_else(too_short)?;
    let group = key.get(offset + TFK_SIZE..offset + 2 * TFK_SIZE).ok_or_else(too_short)?;

    let feed = FeedId::from_tfk(feed).map_err(|e| StorageError::Serialization(e.to_string()))?;
    let group = GroupId::from_tfk(group).map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok((feed, group))
}

fn encode_group_record(record: &StoredGroup) -> Result<Vec<u8>, StorageError> {
    let mut bytes = Vec::new();
    ciborium::into_writer(record, &mut bytes)
        .map_err(|e| StorageError::Serialization(e.to_string()))?;
    Ok(bytes)
}

fn decode_group_record(bytes: &[u8]) -> Result<StoredGroup, StorageError> {
    ciborium::from_reader(bytes).map_err(|e| StorageError::Serialization(e.to_string()))
}
