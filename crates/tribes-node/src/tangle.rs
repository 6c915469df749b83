//! Frontier resolution for a group's tangles.

use std::sync::Arc;

use tracing::debug;
use tribes_core::{Environment, GroupId, TangleUpdate, heads};

use crate::{error::TangleError, key_store::KeyStore, log::HostLog, storage::Storage};

/// Computes the `previous` a new group message should cite.
pub struct GroupTangle<S, E> {
    keys: KeyStore<S, E>,
    log: Arc<dyn HostLog>,
}

impl<S: Storage, E: Environment> GroupTangle<S, E> {
    /// Resolver reading group roots from `keys` and messages from `log`.
    pub fn new(keys: KeyStore<S, E>, log: Arc<dyn HostLog>) -> Self {
        Self { keys, log }
    }

    /// Tangle field for the next message on `tangle` of `group_id`.
    ///
    /// A group with no messages past its root resolves to `previous = [root]`.
    ///
    /// # Errors
    ///
    /// - `UnknownGroup` if the key store has no entry for `group_id`
    /// - `Log` if the host log query failed
    pub async fn resolve(
        &self,
        group_id: &GroupId,
        tangle: &str,
    ) -> Result<TangleUpdate, TangleError> {
        self.keys.ready().await?;

        let root = self
            .keys
            .get_group(group_id)
            .map(|info| info.root)
            .ok_or(TangleError::UnknownGroup(*group_id))?;

        let entries = self.log.query_tangle(&root, tangle).await?;
        let previous = heads(root, &entries);
        debug!(%group_id, tangle, observed = entries.len(), heads = previous.len(), "tangle resolved");

        Ok(TangleUpdate::extending(root, previous))
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use tribes_core::{FeedId, MsgContent, MsgId, GROUP_TANGLE, content};

    use super::*;
    use crate::{SystemEnv, log::MemoryLog, storage::MemoryStorage};

    struct Fixture {
        log: Arc<MemoryLog<SystemEnv>>,
        keys: KeyStore<MemoryStorage, SystemEnv>,
        resolver: GroupTangle<MemoryStorage, SystemEnv>,
    }

    fn fixture() -> Fixture {
        let log = Arc::new(MemoryLog::new(FeedId::from_public_key([1; 32]), SystemEnv::new()));
        let keys = KeyStore::open(MemoryStorage::new(), SystemEnv::new());
        let resolver = GroupTangle::new(keys.clone(), log.clone());
        Fixture { log, keys, resolver }
    }

    async fn post(log: &MemoryLog<SystemEnv>, update: &TangleUpdate) -> MsgId {
        let mut content = json!({ "type": "post" });
        content::set_tangle(&mut content, GROUP_TANGLE, update).unwrap();
        let previous = log.latest().await.unwrap();
        log.append(MsgContent::Plain(content), previous).await.unwrap().key
    }

    async fn group_rooted_at(f: &Fixture) -> (GroupId, MsgId) {
        let root = post(&f.log, &TangleUpdate::origin()).await;
        let group_id = GroupId::from_bytes([9; 32]);
        f.keys.add_group(group_id, &[3; 32], root).await.unwrap();
        (group_id, root)
    }

    #[tokio::test]
    async fn fresh_group_cites_root() {
        let f = fixture();
        let (group_id, root) = group_rooted_at(&f).await;

        let update = f.resolver.resolve(&group_id, GROUP_TANGLE).await.unwrap();
        assert_eq!(update, TangleUpdate::extending(root, vec![root]));
    }

    #[tokio::test]
    async fn linear_chain_cites_tip() {
        let f = fixture();
        let (group_id, root) = group_rooted_at(&f).await;

        let m1 = post(&f.log, &TangleUpdate::extending(root, vec![root])).await;
        let m2 = post(&f.log, &TangleUpdate::extending(root, vec![m1])).await;

        let update = f.resolver.resolve(&group_id, GROUP_TANGLE).await.unwrap();
        assert_eq!(update.previous, Some(vec![m2]));
    }

    #[tokio::test]
    async fn concurrent_branches_are_both_cited() {
        let f = fixture();
        let (group_id, root) = group_rooted_at(&f).await;

        let m1 = post(&f.log, &TangleUpdate::extending(root, vec![root])).await;
        let m2 = post(&f.log, &TangleUpdate::extending(root, vec![root])).await;

        let update = f.resolver.resolve(&group_id, GROUP_TANGLE).await.unwrap();
        let mut expected = vec![m1, m2];
        expected.sort();
        assert_eq!(update.previous, Some(expected));
    }

    #[tokio::test]
    async fn other_tangles_do_not_leak_in() {
        let f = fixture();
        let (group_id, root) = group_rooted_at(&f).await;
        post(&f.log, &TangleUpdate::extending(MsgId::from_hash([5; 32]), vec![])).await;

        let update = f.resolver.resolve(&group_id, GROUP_TANGLE).await.unwrap();
        assert_eq!(update.previous, Some(vec![root]));
    }

    #[tokio::test]
    async fn unknown_group_is_an_error() {
        let f = fixture();
        let group_id = GroupId::from_bytes([4; 32]);

        let result = f.resolver.resolve(&group_id, GROUP_TANGLE).await;
        assert_eq!(result, Err(TangleError::UnknownGroup(group_id)));
    }
}
