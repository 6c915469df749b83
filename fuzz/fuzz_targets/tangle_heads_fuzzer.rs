//! Fuzz target for tangle frontier computation
//!
//! Tangle entries come from replicated content, so they may cite unknown
//! ids, cite themselves, form cycles or claim other roots.
//!
//! # Invariants
//!
//! - heads() NEVER panics
//! - The frontier is never empty
//! - Every head is the root or an entry id claiming that root

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use tribes_core::{MsgId, TangleEntry, heads};

#[derive(Debug, Arbitrary)]
struct RawEntry {
    id: u8,
    root: u8,
    previous: Vec<u8>,
}

fn msg(n: u8) -> MsgId {
    MsgId::from_hash([n; 32])
}

fuzz_target!(|input: (u8, Vec<RawEntry>)| {
    let (root_byte, raw) = input;
    let root = msg(root_byte);
    let entries: Vec<TangleEntry> = raw
        .into_iter()
        .map(|e| TangleEntry {
            id: msg(e.id),
            root: msg(e.root),
            previous: e.previous.into_iter().map(msg).collect(),
        })
        .collect();

    let frontier = heads(root, &entries);

    assert!(!frontier.is_empty(), "frontier always contains at least one node");
    for head in &frontier {
        assert!(
            *head == root || entries.iter().any(|e| e.id == *head && e.root == root),
            "head {head} is not a node of the tangle"
        );
    }
});
