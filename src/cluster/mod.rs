//! The cluster tree: a copy-on-write, key-ordered tree mapping object keys
//! to per-column row data.
//!
//! Leaves ("clusters") hold one row range with one payload leaf per column;
//! inner nodes hold routing entries to children. Nodes live in the arena as
//! tagged [`Block`]s and are dispatched by match; every node stores small
//! relative keys, with the global key recovered by accumulating offsets
//! down the descent path.

pub mod cascade;
pub mod inner;
pub mod keys;
pub mod leaf;
pub mod tree;

pub use cascade::CascadeState;
pub use inner::{InnerBlock, InnerEntry};
pub use keys::ClusterKeys;
pub use leaf::LeafBlock;
pub use tree::ClusterTree;

use crate::arena::{Arena, BlockRef};
use crate::error::{CairnError, Result};
use crate::types::Value;

/// Maximum rows in a cluster leaf before a split. Tuning constant.
pub const MAX_CLUSTER_SIZE: usize = 64;

/// Maximum routing entries in an inner node before a split.
pub const MAX_INNER_SIZE: usize = 32;

/// One block of store memory: a tree node or a value sequence.
#[derive(Clone, Debug)]
pub enum Block {
    /// Cluster leaf holding row data.
    Leaf(LeafBlock),
    /// Inner routing node.
    Inner(InnerBlock),
    /// Growable value sequence (dictionary substrate).
    Seq(Vec<Value>),
}

/// Arena specialization used by the whole store.
pub type StoreArena = Arena<Block>;

impl Block {
    /// `true` for leaf blocks.
    pub fn is_leaf(&self) -> bool {
        matches!(self, Block::Leaf(_))
    }

    /// Views the block as a leaf.
    pub fn as_leaf(&self) -> Result<&LeafBlock> {
        match self {
            Block::Leaf(leaf) => Ok(leaf),
            _ => Err(CairnError::Corruption("block is not a cluster leaf")),
        }
    }

    /// Mutable leaf view.
    pub fn as_leaf_mut(&mut self) -> Result<&mut LeafBlock> {
        match self {
            Block::Leaf(leaf) => Ok(leaf),
            _ => Err(CairnError::Corruption("block is not a cluster leaf")),
        }
    }

    /// Views the block as an inner node.
    pub fn as_inner(&self) -> Result<&InnerBlock> {
        match self {
            Block::Inner(inner) => Ok(inner),
            _ => Err(CairnError::Corruption("block is not an inner node")),
        }
    }

    /// Mutable inner-node view.
    pub fn as_inner_mut(&mut self) -> Result<&mut InnerBlock> {
        match self {
            Block::Inner(inner) => Ok(inner),
            _ => Err(CairnError::Corruption("block is not an inner node")),
        }
    }

    /// Views the block as a value sequence.
    pub fn as_seq(&self) -> Result<&Vec<Value>> {
        match self {
            Block::Seq(seq) => Ok(seq),
            _ => Err(CairnError::Corruption("block is not a value sequence")),
        }
    }

    /// Mutable value-sequence view.
    pub fn as_seq_mut(&mut self) -> Result<&mut Vec<Value>> {
        match self {
            Block::Seq(seq) => Ok(seq),
            _ => Err(CairnError::Corruption("block is not a value sequence")),
        }
    }
}

/// Position of an object within the tree: the leaf holding it and the row
/// index inside that leaf. Brought back up from descent operations.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ClusterState {
    /// Leaf block holding the object.
    pub node: BlockRef,
    /// Row index within the leaf.
    pub index: usize,
}

/// Split indication propagated to the parent: the new sibling and the first
/// relative key of that sibling (relative to the splitting node's offset).
#[derive(Clone, Copy, Debug)]
pub(crate) struct Split {
    pub(crate) key: u64,
    pub(crate) node: BlockRef,
}
