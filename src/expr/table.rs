use std::sync::{Arc, Weak};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use log::trace;
use rustc_hash::FxBuildHasher;

use super::{Expr, Node, Op};
use crate::types::Type;

/// Structural identity of a node: operator, operand identities, result type.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub(crate) struct NodeKey {
    pub op: Op,
    pub args: Vec<u64>,
    pub ty: Type,
}

/// Weak hash-consing table.
///
/// Entries point to nodes weakly; a slot whose node has been dropped is
/// treated as a miss and overwritten. Dropping nodes remove their own slot,
/// but only while the slot is still dead.
pub(crate) struct NodeTable {
    map: DashMap<NodeKey, Weak<Node>, FxBuildHasher>,
}

impl NodeTable {
    pub fn new() -> Self {
        Self {
            map: DashMap::with_hasher(FxBuildHasher),
        }
    }

    /// Number of slots, including dead ones not yet removed.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn lookup(&self, key: &NodeKey) -> Option<Expr> {
        self.map.get(key).and_then(|w| w.upgrade()).map(Expr)
    }

    /// Return the live node for `key`, or install the node built by `make`.
    pub fn get_or_insert(&self, key: NodeKey, make: impl FnOnce(NodeKey) -> Node) -> Expr {
        if let Some(e) = self.lookup(&key) {
            return e;
        }

        trace!("table miss: {} with {} operands", key.op.name(), key.args.len());
        let candidate = Arc::new(make(key.clone()));

        // The losing candidate must be dropped after the shard guard is
        // released: its destructor locks the same shard.
        let mut loser = None;
        let result = match self.map.entry(key) {
            Entry::Occupied(mut slot) => match slot.get().upgrade() {
                Some(existing) => {
                    loser = Some(candidate);
                    existing
                }
                None => {
                    slot.insert(Arc::downgrade(&candidate));
                    candidate
                }
            },
            Entry::Vacant(slot) => {
                slot.insert(Arc::downgrade(&candidate));
                candidate
            }
        };
        drop(loser);
        Expr(result)
    }

    /// Remove the slot for `key` if its node is gone.
    pub fn forget(&self, key: &NodeKey) {
        self.map.remove_if(key, |_, w| w.strong_count() == 0);
    }
}
