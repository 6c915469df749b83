//! Persistent cache of group keys and memberships.
//!
//! Reads are served from memory and never block. Writes update memory first,
//! then commit to storage on a blocking thread, so a read right after a write
//! sees the new value while the commit is still in flight.
//!
//! An entry whose commit failed stays cached but is marked pending. Adding it
//! again re-issues the commit instead of returning early.
//!
//! # Readiness
//!
//! [`KeyStore::open`] starts loading persisted records in the background.
//! Until the load finishes, reads see an empty cache and writes wait. The
//! wait is a `watch` channel, so waiters wake as soon as the load ends.
//!
//! ```text
//! Loading ──load ok──► Ready ──close──► Closed
//!    │
//!    └──load err──► Failed
//! ```

#![allow(clippy::disallowed_types, reason = "Cache locks are never held across await")]

use std::{
    collections::{BTreeSet, HashMap, HashSet},
    sync::{Arc, Mutex, PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use tokio::sync::watch;
use tracing::{debug, error, info};
use tribes_core::{Environment, FeedId, GroupId, GroupKeyInfo, MsgId};
use tribes_crypto::{KEY_SIZE, SymmetricKey};

use crate::{
    error::KeyStoreError,
    storage::{Storage, StorageError, StoredGroup},
};

/// Lifecycle state of a key store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Readiness {
    /// Persisted records are being read
    Loading,
    /// Cache reflects storage; writes proceed
    Ready,
    /// Persisted records could not be read
    Failed(String),
    /// Storage handle released
    Closed,
}

#[derive(Default)]
struct Cache {
    groups: HashMap<GroupId, GroupKeyInfo>,
    roots: HashMap<MsgId, GroupId>,
    memberships: HashMap<FeedId, BTreeSet<GroupId>>,
    /// Cached groups not yet committed to storage
    pending_groups: HashSet<GroupId>,
    /// Cached memberships not yet committed to storage
    pending_memberships: HashSet<(FeedId, GroupId)>,
}

impl Cache {
    fn insert_group(&mut self, group_id: GroupId, info: GroupKeyInfo) {
        self.roots.insert(info.root, group_id);
        self.groups.insert(group_id, info);
    }

    fn insert_membership(&mut self, author: FeedId, group_id: GroupId) -> bool {
        self.memberships.entry(author).or_default().insert(group_id)
    }
}

struct Shared<S, E> {
    storage: Mutex<Option<S>>,
    env: E,
    cache: RwLock<Cache>,
    readiness: watch::Sender<Readiness>,
}

/// Group keys and memberships, cached in memory and backed by [`Storage`].
///
/// Cheap to clone; clones share the cache and the storage handle.
pub struct KeyStore<S, E> {
    shared: Arc<Shared<S, E>>,
}

impl<S, E> Clone for KeyStore<S, E> {
    fn clone(&self) -> Self {
        Self { shared: Arc::clone(&self.shared) }
    }
}

impl<S: Storage, E: Environment> KeyStore<S, E> {
    /// Open a store over `storage` and start loading it.
    ///
    /// Must be called inside a Tokio runtime.
    pub fn open(storage: S, env: E) -> Self {
        let (readiness, _) = watch::channel(Readiness::Loading);
        let store = Self {
            shared: Arc::new(Shared {
                storage: Mutex::new(Some(storage)),
                env,
                cache: RwLock::new(Cache::default()),
                readiness,
            }),
        };

        let loader = store.clone();
        tokio::task::spawn_blocking(move || loader.warm_load());

        store
    }

    fn warm_load(&self) {
        let Some(storage) = self.storage() else {
            return;
        };

        let loaded = load_groups(&storage)
            .and_then(|groups| Ok((groups, load_memberships(&storage)?)));

        match loaded {
            Ok((groups, memberships)) => {
                let group_count = groups.len();
                let author_count = memberships.len();
                {
                    let mut cache = self.write_cache();
                    for (group_id, info) in groups {
                        cache.insert_group(group_id, info);
                    }
                    for (author, group_ids) in memberships {
                        for group_id in group_ids {
                            cache.insert_membership(author, group_id);
                        }
                    }
                }
                info!(groups = group_count, authors = author_count, "key store ready");
                self.shared.readiness.send_replace(Readiness::Ready);
            },
            Err(e) => {
                error!(error = %e, "key store warm-load failed");
                self.shared.readiness.send_replace(Readiness::Failed(e.to_string()));
            },
        }
    }

    /// Current lifecycle state.
    pub fn readiness(&self) -> Readiness {
        self.shared.readiness.borrow().clone()
    }

    /// Wait until the warm-load has finished.
    ///
    /// # Errors
    ///
    /// - `LoadFailed` if persisted records could not be read
    /// - `Closed` if the store was closed
    pub async fn ready(&self) -> Result<(), KeyStoreError> {
        let mut rx = self.shared.readiness.subscribe();
        let state = rx
            .wait_for(|state| *state != Readiness::Loading)
            .await
            .map_err(|_| KeyStoreError::Closed)?
            .clone();

        match state {
            Readiness::Failed(reason) => Err(KeyStoreError::LoadFailed { reason }),
            Readiness::Closed => Err(KeyStoreError::Closed),
            Readiness::Ready | Readiness::Loading => Ok(()),
        }
    }

    /// Register a group.
    ///
    /// The key is checked before anything else; a key that is not 32 bytes
    /// leaves the store untouched. Registering the same info twice is a
    /// no-op.
    ///
    /// # Errors
    ///
    /// - `InvalidKeyLength` if `key` is not 32 bytes
    /// - `Conflict` if the group is known with different key material
    /// - `Storage` if the durable write failed (the cache keeps the entry and
    ///   the next call for the same group retries the write)
    pub async fn add_group(
        &self,
        group_id: GroupId,
        key: &[u8],
        root: MsgId,
    ) -> Result<(), KeyStoreError> {
        let key = SymmetricKey::from_slice(key).map_err(|_| KeyStoreError::InvalidKeyLength {
            expected: KEY_SIZE,
            actual: key.len(),
        })?;
        self.add_group_info(group_id, GroupKeyInfo::new(key, root)).await
    }

    /// Register a group from already validated key material.
    pub async fn add_group_info(
        &self,
        group_id: GroupId,
        info: GroupKeyInfo,
    ) -> Result<(), KeyStoreError> {
        self.ready().await?;

        {
            let mut cache = self.write_cache();
            if let Some(existing) = cache.groups.get(&group_id) {
                if *existing != info {
                    return Err(KeyStoreError::Conflict { group_id });
                }
                if !cache.pending_groups.contains(&group_id) {
                    return Ok(());
                }
                debug!(%group_id, "retrying uncommitted group");
            } else {
                cache.insert_group(group_id, info.clone());
            }
            cache.pending_groups.insert(group_id);
        }

        let record = StoredGroup::from_info(&info);
        let inserted_at = self.shared.env.wall_clock_millis();
        self.persist(move |storage| storage.put_group(&group_id, &record, inserted_at)).await?;
        self.write_cache().pending_groups.remove(&group_id);

        info!(%group_id, root = %info.root, "group registered");
        Ok(())
    }

    /// Record that `author` belongs to `group_id`.
    ///
    /// Returns `true` if the membership was not committed before this call,
    /// either because it is new or because an earlier commit failed. The
    /// group does not have to be registered; callers enforce that ordering.
    pub async fn add_membership(
        &self,
        group_id: GroupId,
        author: FeedId,
    ) -> Result<bool, KeyStoreError> {
        self.ready().await?;

        {
            let mut cache = self.write_cache();
            let cached = !cache.insert_membership(author, group_id);
            if cached && !cache.pending_memberships.contains(&(author, group_id)) {
                return Ok(false);
            }
            cache.pending_memberships.insert((author, group_id));
        }

        self.persist(move |storage| storage.put_membership(&author, &group_id)).await?;
        self.write_cache().pending_memberships.remove(&(author, group_id));

        debug!(%group_id, %author, "membership registered");
        Ok(true)
    }

    /// Key material for a group. Never blocks; `None` while loading.
    pub fn get_group(&self, group_id: &GroupId) -> Option<GroupKeyInfo> {
        self.read_cache().groups.get(group_id).cloned()
    }

    /// Group whose root message is `root`.
    pub fn group_by_root(&self, root: &MsgId) -> Option<GroupId> {
        self.read_cache().roots.get(root).copied()
    }

    /// Groups `author` is known to belong to, in id order.
    pub fn author_groups(&self, author: &FeedId) -> Vec<GroupId> {
        self.read_cache()
            .memberships
            .get(author)
            .map(|groups| groups.iter().copied().collect())
            .unwrap_or_default()
    }

    /// Key material of every group `author` belongs to.
    ///
    /// Groups with a membership but no registered key are skipped.
    pub fn author_keys(&self, author: &FeedId) -> Vec<GroupKeyInfo> {
        let cache = self.read_cache();
        cache
            .memberships
            .get(author)
            .into_iter()
            .flatten()
            .filter_map(|group_id| cache.groups.get(group_id).cloned())
            .collect()
    }

    /// Snapshot of every persisted group, read from storage.
    pub async fn list_groups(&self) -> Result<HashMap<GroupId, GroupKeyInfo>, KeyStoreError> {
        self.read_storage(load_groups).await
    }

    /// Snapshot of every persisted membership, read from storage.
    pub async fn list_memberships(
        &self,
    ) -> Result<HashMap<FeedId, BTreeSet<GroupId>>, KeyStoreError> {
        self.read_storage(load_memberships).await
    }

    /// Release the storage handle.
    ///
    /// Waits for a running warm-load to end. Later writes fail with
    /// `Closed`; cached reads keep working.
    ///
    /// # Errors
    ///
    /// `Closed` if the store was already closed.
    pub async fn close(&self) -> Result<(), KeyStoreError> {
        let mut rx = self.shared.readiness.subscribe();
        rx.wait_for(|state| *state != Readiness::Loading)
            .await
            .map_err(|_| KeyStoreError::Closed)?;

        let closed_now = self.shared.readiness.send_if_modified(|state| {
            if *state == Readiness::Closed {
                return false;
            }
            *state = Readiness::Closed;
            true
        });
        if !closed_now {
            return Err(KeyStoreError::Closed);
        }

        let released = self.shared.storage.lock().unwrap_or_else(PoisonError::into_inner).take();
        drop(released);

        info!("key store closed");
        Ok(())
    }

    fn storage(&self) -> Option<S> {
        self.shared.storage.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    fn read_cache(&self) -> RwLockReadGuard<'_, Cache> {
        self.shared.cache.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write_cache(&self) -> RwLockWriteGuard<'_, Cache> {
        self.shared.cache.write().unwrap_or_else(PoisonError::into_inner)
    }

    async fn persist<F>(&self, op: F) -> Result<(), KeyStoreError>
    where
        F: FnOnce(&S) -> Result<(), StorageError> + Send + 'static,
    {
        self.read_storage(move |storage| op(storage)).await
    }

    async fn read_storage<T, F>(&self, op: F) -> Result<T, KeyStoreError>
    where
        T: Send + 'static,
        F: FnOnce(&S) -> Result<T, StorageError> + Send + 'static,
    {
        let storage = self.storage().ok_or(KeyStoreError::Closed)?;
        let result = tokio::task::spawn_blocking(move || op(&storage))
            .await
            .map_err(|e| StorageError::Io(e.to_string()))?;
        Ok(result?)
    }
}

fn load_groups<S: Storage>(storage: &S) -> Result<HashMap<GroupId, GroupKeyInfo>, StorageError> {
    let mut groups = HashMap::new();
    // Records come back in key order, so a later record for a group wins.
    for (group_id, record) in storage.list_groups()? {
        groups.insert(group_id, record.into_info()?);
    }
    Ok(groups)
}

fn load_memberships<S: Storage>(
    storage: &S,
) -> Result<HashMap<FeedId, BTreeSet<GroupId>>, StorageError> {
    let mut memberships: HashMap<FeedId, BTreeSet<GroupId>> = HashMap::new();
    for (author, group_id) in storage.list_memberships()? {
        memberships.entry(author).or_default().insert(group_id);
    }
    Ok(memberships)
}
