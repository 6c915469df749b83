#![allow(clippy::disallowed_types, reason = "Synchronous in-memory operations only")]

use std::{
    collections::BTreeMap,
    sync::{Arc, Mutex},
};

use tribes_core::{FeedId, GroupId};

use super::{
    GROUP_NS, MEMBER_NS, Storage, StorageError, StoredGroup, decode_group_record,
    decode_group_record_key, decode_membership_record_key, encode_group_record,
    group_record_key, membership_record_key, namespace_range,
};

/// In-memory storage implementation for testing and simulation
///
/// Keeps the same byte layout as the durable backend in a `BTreeMap`, so
/// range scans behave identically. Thread-safe through Mutex, but uses
/// `lock().expect()` which will panic if the mutex is poisoned - acceptable
/// for test code.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    inner: Arc<Mutex<BTreeMap<Vec<u8>, Vec<u8>>>>,
}

impl MemoryStorage {
    /// Create a new empty `MemoryStorage`
    pub fn new() -> Self {
        Self::default()
    }

    /// Total number of records across both keyspaces.
    #[allow(clippy::expect_used)]
    pub fn record_count(&self) -> usize {
        self.inner.lock().expect("Mutex poisoned").len()
    }

    #[allow(clippy::expect_used)]
    fn scan(&self, namespace: &[u8]) -> Vec<(Vec<u8>, Vec<u8>)> {
        let (start, end) = namespace_range(namespace);
        let inner = self.inner.lock().expect("Mutex poisoned");
        inner.range(start..end).map(|(k, v)| (k.clone(), v.clone())).collect()
    }

    #[allow(clippy::expect_used)]
    fn insert(&self, key: Vec<u8>, value: Vec<u8>) {
        self.inner.lock().expect("Mutex poisoned").insert(key, value);
    }
}

impl Storage for MemoryStorage {
    fn put_group(
        &self,
        group_id: &GroupId,
        record: &StoredGroup,
        inserted_at: u64,
    ) -> Result<(), StorageError> {
        let value = encode_group_record(record)?;
        self.insert(group_record_key(group_id, inserted_at), value);
        Ok(())
    }

    fn list_groups(&self) -> Result<Vec<(GroupId, StoredGroup)>, StorageError> {
        self.scan(GROUP_NS)
            .into_iter()
            .map(|(key, value)| Ok((decode_group_record_key(&key)?, decode_group_record(&value)?)))
            .collect()
    }

    fn put_membership(&self, author: &FeedId, group_id: &GroupId) -> Result<(), StorageError> {
        self.insert(membership_record_key(author, group_id), group_id.to_tfk().to_vec());
        Ok(())
    }

    fn list_memberships(&self) -> Result<Vec<(FeedId, GroupId)>, StorageError> {
        self.scan(MEMBER_NS)
            .into_iter()
            .map(|(key, _)| decode_membership_record_key(&key))
            .collect()
    }
}
