//! Chaos property tests for the key store.
//!
//! The key store is driven over `ChaoticStorage`, which fails a random share
//! of operations. Invariants checked:
//! - A write reported as successful is in the underlying storage
//! - A failed write surfaces as a transient storage error, never silently
//! - The cache serves every accepted write, persisted or not
//! - A failed warm-load blocks all writes

use proptest::prelude::*;
use tribes_core::{FeedId, GroupId, MsgId};
use tribes_node::{
    ChaoticStorage, KeyStore, KeyStoreError, MemoryStorage, Readiness, Storage, SystemEnv,
};

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

#[test]
fn prop_chaos_writes_are_reported_faithfully() {
    proptest!(|(
        failure_rate in 0.0..0.6,
        seed in any::<u64>(),
        group_count in 1u8..20,
    )| {
        runtime().block_on(async {
            let chaotic = ChaoticStorage::with_seed(MemoryStorage::new(), failure_rate, seed);
            let store = KeyStore::open(chaotic.clone(), SystemEnv::new());

            if store.ready().await.is_err() {
                // Warm-load itself hit an injected failure
                prop_assert!(matches!(store.readiness(), Readiness::Failed(_)));
                let result = store.add_group(GroupId::from_bytes([1; 32]), &[1; 32], MsgId::from_hash([1; 32])).await;
                prop_assert!(matches!(result, Err(KeyStoreError::LoadFailed { .. })), "expected LoadFailed, got {:?}", result);
                prop_assert_eq!(chaotic.inner().record_count(), 0);
                return Ok(());
            }

            let author = FeedId::from_public_key([0xAA; 32]);
            let mut persisted_groups = 0;
            let mut persisted_members = 0;

            for n in 0..group_count {
                let group_id = GroupId::from_bytes([n; 32]);
                let root = MsgId::from_hash([n; 32]);

                match store.add_group(group_id, &[n; 32], root).await {
                    Ok(()) => persisted_groups += 1,
                    Err(KeyStoreError::Storage(e)) => prop_assert!(e.is_transient()),
                    Err(e) => prop_assert!(false, "unexpected error: {e}"),
                }
                prop_assert!(store.get_group(&group_id).is_some());

                match store.add_membership(group_id, author).await {
                    Ok(added) => {
                        prop_assert!(added);
                        persisted_members += 1;
                    },
                    Err(KeyStoreError::Storage(e)) => prop_assert!(e.is_transient()),
                    Err(e) => prop_assert!(false, "unexpected error: {e}"),
                }
            }

            prop_assert_eq!(store.author_groups(&author).len(), group_count as usize);
            prop_assert_eq!(chaotic.inner().list_groups().unwrap().len(), persisted_groups);
            prop_assert_eq!(chaotic.inner().list_memberships().unwrap().len(), persisted_members);
            Ok(())
        })?;
    });
}

#[test]
fn prop_persisted_writes_survive_reload() {
    proptest!(|(
        failure_rate in 0.0..0.5,
        seed in any::<u64>(),
        group_count in 1u8..10,
    )| {
        runtime().block_on(async {
            let inner = MemoryStorage::new();
            let mut accepted = Vec::new();

            {
                let chaotic = ChaoticStorage::with_seed(inner.clone(), failure_rate, seed);
                let store = KeyStore::open(chaotic, SystemEnv::new());
                if store.ready().await.is_err() {
                    return Ok(());
                }
                for n in 0..group_count {
                    let group_id = GroupId::from_bytes([n; 32]);
                    if store.add_group(group_id, &[n; 32], MsgId::from_hash([n; 32])).await.is_ok() {
                        accepted.push(group_id);
                    }
                }
                store.close().await.unwrap();
            }

            let reloaded = KeyStore::open(inner, SystemEnv::new());
            reloaded.ready().await.unwrap();
            for group_id in &accepted {
                prop_assert!(reloaded.get_group(group_id).is_some());
            }
            prop_assert_eq!(reloaded.list_groups().await.unwrap().len(), accepted.len());
            Ok(())
        })?;
    });
}

#[test]
fn zero_failure_rate_never_fails() {
    runtime().block_on(async {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 0.0);
        let store = KeyStore::open(chaotic.clone(), SystemEnv::new());

        for n in 0..50u8 {
            store.add_group(GroupId::from_bytes([n; 32]), &[n; 32], MsgId::from_hash([n; 32])).await.unwrap();
        }

        assert_eq!(chaotic.inner().record_count(), 50);
        // Two warm-load scans plus one write per group
        assert_eq!(chaotic.operation_count(), 52);
    });
}
