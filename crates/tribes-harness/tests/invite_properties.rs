//! Property tests over invites in seeded networks.
//!
//! Invariants checked:
//! - Every invitee learns the group id and can read the group root
//! - Every invitee ends up with identical membership for all listed feeds
//! - Nodes left out of the invite learn nothing

use proptest::prelude::*;
use tribes_core::FeedId;
use tribes_harness::TestNetwork;

const CREATOR: usize = 0;

fn runtime() -> tokio::runtime::Runtime {
    tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap()
}

#[test]
fn prop_invitees_converge_on_group() {
    proptest!(ProptestConfig::with_cases(32), |(
        seed in any::<u64>(),
        invited in 1usize..5,
        bystanders in 0usize..3,
    )| {
        runtime().block_on(async {
            let total = 1 + invited + bystanders;
            let mut net = TestNetwork::new(seed, total);
            let created = net.node(CREATOR).tribes.create().await.unwrap();

            let invitees: Vec<FeedId> = (1..=invited).map(|i| net.node(i).feed()).collect();
            net.node(CREATOR).tribes.invite(created.group_id, &invitees, None).await.unwrap();

            for index in 1..total {
                net.replicate(CREATOR, index).await.unwrap();
            }
            net.process_all().await;

            let creator = net.node(CREATOR).feed();
            for index in 1..=invited {
                let node = net.node(index);
                prop_assert!(node.log.readable_content(&created.root.key).is_some());
                prop_assert_eq!(node.tribes.group_by_root(&created.root.key), Some(created.group_id));
                prop_assert_eq!(node.tribes.member_groups(&creator), vec![created.group_id]);
                for feed in &invitees {
                    prop_assert_eq!(node.tribes.member_groups(feed), vec![created.group_id]);
                }
            }

            for index in (invited + 1)..total {
                let node = net.node(index);
                prop_assert!(node.tribes.member_groups(&creator).is_empty());
                prop_assert_eq!(node.log.rebuild_count(), 0);
            }
            Ok(())
        })?;
    });
}
