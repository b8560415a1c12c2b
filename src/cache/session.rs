//! Session-scoped transient overlays.
//!
//! Each session buffers its mutations in a diff log keyed by node; the
//! shared store is only touched at commit. This makes read-your-writes and
//! cross-session isolation structural rather than conventional.

use std::fmt;

use rustc_hash::FxHashMap;

use crate::document::{Mutation, MutationSet};
use crate::key::NodeKey;

/// Identifier of one client session.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash, Ord, PartialOrd)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "session-{}", self.0)
    }
}

/// The buffered, uncommitted changes of one session.
#[derive(Debug, Default)]
pub struct SessionChanges {
    by_node: FxHashMap<NodeKey, MutationSet>,
    touch_order: Vec<NodeKey>,
}

impl SessionChanges {
    /// Appends a mutation to the node's diff log, in program order.
    pub fn record(&mut self, key: NodeKey, mutation: Mutation) {
        let set = self.by_node.entry(key.clone()).or_insert_with(|| {
            self.touch_order.push(key);
            MutationSet::default()
        });
        set.changes.push(mutation);
    }

    /// The buffered changes for one node, if any.
    pub fn for_node(&self, key: &NodeKey) -> Option<&MutationSet> {
        self.by_node.get(key)
    }

    /// Nodes in first-touch order, paired with their mutation sets.
    pub fn drain_in_order(self) -> Vec<(NodeKey, MutationSet)> {
        let mut by_node = self.by_node;
        self.touch_order
            .iter()
            .filter_map(|k| by_node.remove(k).map(|set| (k.clone(), set)))
            .collect()
    }

    /// Whether the session has buffered anything.
    pub fn is_empty(&self) -> bool {
        self.by_node.is_empty()
    }

    /// Number of touched nodes.
    pub fn touched(&self) -> usize {
        self.by_node.len()
    }
}
