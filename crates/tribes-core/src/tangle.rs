//! Causal tangles anchored at a root message.
//!
//! A tangle is a DAG: every message names the root it belongs to and the
//! messages it saw last (`previous`). New messages cite the current frontier,
//! the set of nodes nothing else in the observed set cites yet.

use std::collections::{BTreeSet, HashSet};

use serde::{Deserialize, Serialize};

use crate::refs::MsgId;

/// Tangle tracking all activity in a group.
pub const GROUP_TANGLE: &str = "group";

/// Tangle tracking membership changes of a group.
pub const MEMBERS_TANGLE: &str = "members";

/// The `tangles.<name>` field carried by message content.
///
/// The root message of a tangle carries `{ root: null, previous: null }`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TangleUpdate {
    /// Root of the tangle, `None` on the root message itself
    pub root: Option<MsgId>,
    /// Frontier observed when the message was written
    pub previous: Option<Vec<MsgId>>,
}

impl TangleUpdate {
    /// Field value for the message founding a tangle.
    pub fn origin() -> Self {
        Self::default()
    }

    /// Field value for a message extending the tangle at `root`.
    pub fn extending(root: MsgId, previous: Vec<MsgId>) -> Self {
        Self { root: Some(root), previous: Some(previous) }
    }

    /// Whether both `root` and `previous` are present.
    pub fn is_complete(&self) -> bool {
        self.root.is_some() && self.previous.is_some()
    }
}

/// One observed node of a tangle.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TangleEntry {
    /// Message id of the node
    pub id: MsgId,
    /// Root the message claims to belong to
    pub root: MsgId,
    /// Messages cited as causal predecessors
    pub previous: Vec<MsgId>,
}

impl TangleEntry {
    /// Build an entry from a message id and its tangle field.
    ///
    /// Returns `None` for the root message or an incomplete field.
    pub fn from_update(id: MsgId, update: &TangleUpdate) -> Option<Self> {
        let root = update.root?;
        let previous = update.previous.clone()?;
        Some(Self { id, root, previous })
    }
}

/// Frontier of the tangle at `root` given the observed `entries`.
///
/// The root is always part of the node set, so a tangle with no observed
/// messages has frontier `[root]`. Entries claiming a different root are
/// ignored. Citations of ids outside the node set are ignored. The result is
/// sorted so equal inputs produce equal `previous` lists, and never empty:
/// if cyclic citations leave no uncited node, the frontier falls back to
/// `[root]`.
pub fn heads(root: MsgId, entries: &[TangleEntry]) -> Vec<MsgId> {
    let members: Vec<&TangleEntry> =
        entries.iter().filter(|e| e.root == root && e.id != root).collect();

    let cited: HashSet<MsgId> =
        members.iter().flat_map(|e| e.previous.iter().copied()).collect();

    let mut nodes = BTreeSet::new();
    nodes.insert(root);
    nodes.extend(members.iter().map(|e| e.id));

    let frontier: Vec<MsgId> = nodes.into_iter().filter(|id| !cited.contains(id)).collect();
    // Only cyclic citations can cite every node
    if frontier.is_empty() { vec![root] } else { frontier }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn id(n: u8) -> MsgId {
        MsgId::from_hash([n; 32])
    }

    fn entry(n: u8, root: MsgId, previous: &[MsgId]) -> TangleEntry {
        TangleEntry { id: id(n), root, previous: previous.to_vec() }
    }

    #[test]
    fn fresh_tangle_frontier_is_root() {
        let root = id(0);
        assert_eq!(heads(root, &[]), vec![root]);
    }

    #[test]
    fn linear_chain_frontier_is_tip() {
        let root = id(0);
        let m1 = entry(1, root, &[root]);
        let m2 = entry(2, root, &[m1.id]);

        assert_eq!(heads(root, &[m1, m2.clone()]), vec![m2.id]);
    }

    #[test]
    fn concurrent_branches_are_all_heads() {
        let root = id(0);
        let m1 = entry(1, root, &[root]);
        let m2 = entry(2, root, &[root]);

        assert_eq!(heads(root, &[m2.clone(), m1.clone()]), vec![m1.id, m2.id]);
    }

    #[test]
    fn merge_collapses_branches() {
        let root = id(0);
        let m1 = entry(1, root, &[root]);
        let m2 = entry(2, root, &[root]);
        let m3 = entry(3, root, &[m1.id, m2.id]);

        assert_eq!(heads(root, &[m1, m2, m3.clone()]), vec![m3.id]);
    }

    #[test]
    fn entries_from_other_tangles_are_ignored() {
        let root = id(0);
        let other = id(9);
        let m1 = entry(1, root, &[root]);
        let stray = entry(2, other, &[other]);

        assert_eq!(heads(root, &[m1.clone(), stray]), vec![m1.id]);
    }

    #[test]
    fn stray_root_entry_does_not_cite_itself_away() {
        let root = id(0);
        let bogus = TangleEntry { id: root, root, previous: vec![root] };

        assert_eq!(heads(root, &[bogus]), vec![root]);
    }

    #[test]
    fn citation_cycle_falls_back_to_root() {
        let root = id(0);
        let m1 = entry(1, root, &[root, id(2)]);
        let m2 = entry(2, root, &[id(1)]);

        assert_eq!(heads(root, &[m1, m2]), vec![root]);
    }

    #[test]
    fn duplicate_entries_are_deduplicated() {
        let root = id(0);
        let m1 = entry(1, root, &[root]);

        assert_eq!(heads(root, &[m1.clone(), m1.clone()]), vec![m1.id]);
    }

    #[test]
    fn origin_update_is_incomplete() {
        assert!(!TangleUpdate::origin().is_complete());
        assert!(TangleEntry::from_update(id(1), &TangleUpdate::origin()).is_none());

        let update = TangleUpdate::extending(id(0), vec![id(0)]);
        assert!(update.is_complete());
        assert_eq!(TangleEntry::from_update(id(1), &update), Some(entry(1, id(0), &[id(0)])));
    }

    #[test]
    fn origin_update_serializes_nulls() {
        let json = serde_json::to_value(TangleUpdate::origin()).unwrap();
        assert_eq!(json, serde_json::json!({ "root": null, "previous": null }));
    }
}
