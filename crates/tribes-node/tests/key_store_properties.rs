//! Property-based tests for the key store.

use proptest::prelude::*;
use tribes_core::{FeedId, GroupId, MsgId};
use tribes_node::{KeyStore, KeyStoreError, MemoryStorage, SystemEnv};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Property: any 32-byte key registered is returned unchanged, with its root
    #[test]
    fn prop_add_then_get_roundtrips(
        id in any::<[u8; 32]>(),
        key in any::<[u8; 32]>(),
        root in any::<[u8; 32]>(),
    ) {
        runtime().block_on(async {
            let store = KeyStore::open(MemoryStorage::new(), SystemEnv::new());
            let group_id = GroupId::from_bytes(id);
            let root = MsgId::from_hash(root);

            store.add_group(group_id, &key, root).await.unwrap();

            let info = store.get_group(&group_id).unwrap();
            prop_assert_eq!(info.key.as_bytes(), &key);
            prop_assert_eq!(info.root, root);
            Ok(())
        })?;
    }

    /// Property: keys of any other length are rejected without touching the cache
    #[test]
    fn prop_wrong_length_never_mutates(
        key in prop::collection::vec(any::<u8>(), 0..80).prop_filter("not 32 bytes", |k| k.len() != 32),
    ) {
        runtime().block_on(async {
            let storage = MemoryStorage::new();
            let store = KeyStore::open(storage.clone(), SystemEnv::new());
            let group_id = GroupId::from_bytes([1; 32]);

            let result = store.add_group(group_id, &key, MsgId::from_hash([2; 32])).await;

            prop_assert_eq!(result, Err(KeyStoreError::InvalidKeyLength { expected: 32, actual: key.len() }));
            prop_assert!(store.get_group(&group_id).is_none());
            prop_assert_eq!(storage.record_count(), 0);
            Ok(())
        })?;
    }

    /// Property: memberships only grow, and each pair is reported new once
    #[test]
    fn prop_memberships_grow_monotonically(
        pairs in prop::collection::vec((0u8..4, 0u8..6), 1..40),
    ) {
        runtime().block_on(async {
            let store = KeyStore::open(MemoryStorage::new(), SystemEnv::new());
            let mut seen = std::collections::HashSet::new();

            for (author, group) in pairs {
                let feed = FeedId::from_public_key([author; 32]);
                let group_id = GroupId::from_bytes([group; 32]);
                let before = store.author_groups(&feed).len();

                let added = store.add_membership(group_id, feed).await.unwrap();

                prop_assert_eq!(added, seen.insert((author, group)));
                prop_assert!(store.author_groups(&feed).len() >= before);
                prop_assert!(store.author_groups(&feed).contains(&group_id));
            }
            Ok(())
        })?;
    }
}
