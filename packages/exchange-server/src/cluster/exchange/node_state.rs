//! Keyed mapping from cluster member to per-peer exchange progress.
//!
//! Owned exclusively by the single [`super::fsm::ExchangeActor`] task, so no
//! internal synchronization is needed: the actor model (see module docs on
//! `exchange-server::cluster::exchange`) already serializes every access.

use std::collections::HashMap;

use exchange_core::exchange::{NodeId, PerPeerState};

/// Per-round mapping from succession member to protocol progress.
#[derive(Debug, Default)]
pub struct NodeStateTable {
    entries: HashMap<NodeId, PerPeerState>,
}

impl NodeStateTable {
    /// An empty table.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Reshapes the table to match `succession`: entries for members no
    /// longer present are dropped, entries for new members are inserted with
    /// defaults, and entries for retained members have their flags and data
    /// size reset (their buffer's capacity is kept).
    pub fn reset_for_succession(&mut self, succession: &[NodeId]) {
        let keep: std::collections::HashSet<NodeId> = succession.iter().copied().collect();
        self.entries.retain(|node, _| keep.contains(node));
        for &node in succession {
            self.entries
                .entry(node)
                .and_modify(PerPeerState::reset)
                .or_default();
        }
    }

    /// Direct lookup. Missing lookups during steady-state protocol handling
    /// indicate an invariant violation (a peer not in the current
    /// succession was referenced) and are the caller's responsibility to
    /// treat as fatal.
    #[must_use]
    pub fn get(&self, node: NodeId) -> Option<&PerPeerState> {
        self.entries.get(&node)
    }

    /// Mutable direct lookup; see [`Self::get`].
    pub fn get_mut(&mut self, node: NodeId) -> Option<&mut PerPeerState> {
        self.entries.get_mut(&node)
    }

    /// Inserts or replaces the state for `node`.
    pub fn put(&mut self, node: NodeId, state: PerPeerState) {
        self.entries.insert(node, state);
    }

    /// Number of tracked peers.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// `true` if no peers are tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// All tracked node identifiers, sorted for deterministic iteration
    /// (retransmit-target ordering in tests).
    #[must_use]
    pub fn nodes(&self) -> Vec<NodeId> {
        let mut nodes: Vec<NodeId> = self.entries.keys().copied().collect();
        nodes.sort();
        nodes
    }

    /// The set of peers for which `flag(state)` is `false`, sorted by
    /// `NodeId` for deterministic retransmit-target ordering.
    #[must_use]
    pub fn find_not(&self, flag: impl Fn(&PerPeerState) -> bool) -> Vec<NodeId> {
        let mut out: Vec<NodeId> = self
            .entries
            .iter()
            .filter(|(_, state)| !flag(state))
            .map(|(node, _)| *node)
            .collect();
        out.sort();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_for_succession_drops_and_adds() {
        let mut table = NodeStateTable::new();
        table.reset_for_succession(&[NodeId(1), NodeId(2)]);
        assert_eq!(table.nodes(), vec![NodeId(1), NodeId(2)]);

        table
            .get_mut(NodeId(1))
            .unwrap()
            .send_acked = true;

        table.reset_for_succession(&[NodeId(2), NodeId(3)]);
        assert_eq!(table.nodes(), vec![NodeId(2), NodeId(3)]);
    }

    #[test]
    fn reset_keeps_flags_reset_for_retained_members() {
        let mut table = NodeStateTable::new();
        table.reset_for_succession(&[NodeId(1)]);
        table.get_mut(NodeId(1)).unwrap().send_acked = true;

        table.reset_for_succession(&[NodeId(1)]);
        assert!(!table.get(NodeId(1)).unwrap().send_acked);
    }

    #[test]
    fn find_not_sorted() {
        let mut table = NodeStateTable::new();
        table.reset_for_succession(&[NodeId(3), NodeId(1), NodeId(2)]);
        table.get_mut(NodeId(2)).unwrap().send_acked = true;

        let not_acked = table.find_not(|s| s.send_acked);
        assert_eq!(not_acked, vec![NodeId(1), NodeId(3)]);
    }
}
