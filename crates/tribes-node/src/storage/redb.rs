//! Redb-backed durable storage implementation.
//!
//! Uses Redb's ACID transactions with Copy-on-Write for crash safety.
//! Every committed group and membership survives restarts.

use std::{path::Path, sync::Arc};

use redb::{Database, TableDefinition};
use tribes_core::{FeedId, GroupId};

use super::{
    GROUP_NS, MEMBER_NS, Storage, StorageError, StoredGroup, decode_group_record,
    decode_group_record_key, decode_membership_record_key, encode_group_record,
    group_record_key, membership_record_key, namespace_range,
};

/// Table: keystore
/// Key: namespaced record key (see module layout)
/// Value: CBOR `StoredGroup` or group id TFK
const KEYSTORE: TableDefinition<&[u8], &[u8]> = TableDefinition::new("keystore");

/// Durable storage backed by Redb.
///
/// Thread-safe through Redb's internal locking. Clone is cheap (Arc). The
/// database file is released when the last clone is dropped.
#[derive(Clone)]
pub struct RedbStorage {
    db: Arc<Database>,
}

impl RedbStorage {
    /// Open or create a Redb database at the given path.
    ///
    /// # Errors
    ///
    /// Returns `StorageError::Io` if the database cannot be opened or created.
    pub fn open(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let db = Database::create(path.as_ref()).map_err(|e| StorageError::Io(e.to_string()))?;

        let txn = db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;
        {
            let _ = txn.open_table(KEYSTORE).map_err(|e| StorageError::Io(e.to_string()))?;
        }
        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(Self { db: Arc::new(db) })
    }

    fn put(&self, key: &[u8], value: &[u8]) -> Result<(), StorageError> {
        let txn = self.db.begin_write().map_err(|e| StorageError::Io(e.to_string()))?;

        {
            let mut table = txn.open_table(KEYSTORE).map_err(|e| StorageError::Io(e.to_string()))?;
            table.insert(key, value).map_err(|e| StorageError::Io(e.to_string()))?;
        }

        txn.commit().map_err(|e| StorageError::Io(e.to_string()))?;

        Ok(())
    }

    fn scan(&self, namespace: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StorageError> {
        let txn = self.db.begin_read().map_err(|e| StorageError::Io(e.to_string()))?;
        let table = txn.open_table(KEYSTORE).map_err(|e| StorageError::Io(e.to_string()))?;

        let (start, end) = namespace_range(namespace);
        let results = table
            .range(start.as_slice()..end.as_slice())
            .map_err(|e| StorageError::Io(e.to_string()))?;

        let mut entries = Vec::new();
        for result in results {
            let (key, value) = result.map_err(|e| StorageError::Io(e.to_string()))?;
            entries.push((key.value().to_vec(), value.value().to_vec()));
        }

        Ok(entries)
    }
}

impl Storage for RedbStorage {
    fn put_group(
        &self,
        group_id: &GroupId,
        record: &StoredGroup,
        inserted_at: u64,
    ) -> Result<(), StorageError> {
        let value = encode_group_record(record)?;
        self.put(&group_record_key(group_id, inserted_at), &value)
    }

    fn list_groups(&self) -> Result<Vec<(GroupId, StoredGroup)>, StorageError> {
        self.scan(GROUP_NS)?
            .into_iter()
            .map(|(key, value)| Ok((decode_group_record_key(&key)?, decode_group_record(&value)?)))
            .collect()
    }

    fn put_membership(&self, author: &FeedId, group_id: &GroupId) -> Result<(), StorageError> {
        self.put(&membership_record_key(author, group_id), &group_id.to_tfk())
    }

    fn list_memberships(&self) -> Result<Vec<(FeedId, GroupId)>, StorageError> {
        self.scan(MEMBER_NS)?
            .into_iter()
            .map(|(key, _)| decode_membership_record_key(&key))
            .collect()
    }
}
