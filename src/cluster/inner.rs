//! Inner node: routing entries to child nodes, used only when the tree has
//! more than one level.
//!
//! Each entry stores the first relative key of the child's subtree
//! (`key_base`, doubling as the child's offset delta) and the child's block
//! ref. The bases are strictly increasing and the first one is 0 except
//! transiently around pruning, so child i's maximum relative key is below
//! child i+1's minimum.

use crate::arena::BlockRef;
use crate::error::{CairnError, Result};

/// One routing entry of an inner node.
#[derive(Clone, Copy, Debug)]
pub struct InnerEntry {
    /// First relative key of the child subtree, relative to this node's
    /// offset. Added to the accumulated offset when descending.
    pub key_base: u64,
    /// Child node block.
    pub child: BlockRef,
}

/// Inner routing node block.
#[derive(Clone, Debug)]
pub struct InnerBlock {
    pub(crate) sub_tree_depth: usize,
    pub(crate) entries: Vec<InnerEntry>,
}

impl InnerBlock {
    /// Creates an inner node. `sub_tree_depth` of 1 means the children are
    /// leaves.
    pub fn new(sub_tree_depth: usize, entries: Vec<InnerEntry>) -> Self {
        Self {
            sub_tree_depth,
            entries,
        }
    }

    /// Depth of the subtrees below this node.
    pub fn sub_tree_depth(&self) -> usize {
        self.sub_tree_depth
    }

    /// Number of routing entries.
    pub fn node_size(&self) -> usize {
        self.entries.len()
    }

    /// The routing entries in key order.
    pub fn entries(&self) -> &[InnerEntry] {
        &self.entries
    }

    /// Index of the child responsible for relative key `rel`: the last
    /// entry whose base is <= `rel`, clamped to the first child.
    pub fn choose_child(&self, rel: u64) -> usize {
        let count = self.entries.partition_point(|e| e.key_base <= rel);
        count.saturating_sub(1)
    }

    /// The key-ordering invariant: bases strictly increasing.
    pub fn check_order(&self) -> Result<()> {
        if self.entries.is_empty() {
            return Err(CairnError::Corruption("inner node without children"));
        }
        for pair in self.entries.windows(2) {
            if pair[0].key_base >= pair[1].key_base {
                return Err(CairnError::Corruption("inner node keys out of order"));
            }
        }
        Ok(())
    }

    /// Relocates entries `[from..]` to `dst`, a fresh right sibling,
    /// subtracting `key_adj` from every moved base.
    pub(crate) fn move_tail(&mut self, from: usize, dst: &mut InnerBlock, key_adj: u64) {
        debug_assert!(dst.entries.is_empty());
        dst.entries.extend(self.entries.drain(from..).map(|mut e| {
            e.key_base -= key_adj;
            e
        }));
    }

    /// Shifts every base up by `delta` (offset renormalization).
    pub(crate) fn adjust_keys(&mut self, delta: u64) {
        for e in &mut self.entries {
            e.key_base += delta;
        }
    }
}
