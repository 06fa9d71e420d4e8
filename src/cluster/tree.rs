//! Cluster tree owner: holds the root node, orchestrates descent,
//! propagates splits upward, and owns the offset arithmetic that lets every
//! node store small relative keys instead of full 64-bit identifiers.
//!
//! All mutating descents copy-on-write every node on the path via the
//! arena's clone-if-shared primitive, rewriting each ancestor's child ref,
//! so an in-flight write never corrupts a previously committed snapshot.

use crate::arena::BlockRef;
use crate::cluster::inner::{InnerBlock, InnerEntry};
use crate::cluster::leaf::{LeafBlock, LeafInsert};
use crate::cluster::{Block, ClusterState, Split, StoreArena, MAX_INNER_SIZE};
use crate::error::{CairnError, Result};
use crate::schema::{ColumnSpec, Schema};
use crate::types::ObjKey;
use tracing::trace;

/// The key-ordered tree storing all rows of one table.
#[derive(Debug)]
pub struct ClusterTree {
    root: BlockRef,
    next_key: i64,
    size: usize,
}

impl ClusterTree {
    /// Creates a tree consisting of a single empty leaf.
    pub fn new(arena: &mut StoreArena, schema: &Schema) -> Self {
        let root = arena.allocate(Block::Leaf(LeafBlock::new(schema)));
        Self {
            root,
            next_key: 0,
            size: 0,
        }
    }

    /// Current root block.
    pub fn root_ref(&self) -> BlockRef {
        self.root
    }

    /// Total number of objects in the tree.
    pub fn size(&self) -> usize {
        self.size
    }

    /// Depth of the tree: 0 while the root is a leaf.
    pub fn depth(&self, arena: &StoreArena) -> Result<usize> {
        match arena.translate(self.root)? {
            Block::Leaf(_) => Ok(0),
            Block::Inner(inner) => Ok(inner.sub_tree_depth()),
            Block::Seq(_) => Err(CairnError::Corruption("sequence block as tree root")),
        }
    }

    /// Allocates the next monotonic object key.
    pub fn allocate_key(&mut self) -> ObjKey {
        let key = ObjKey(self.next_key);
        self.next_key += 1;
        key
    }

    /// Inserts a new object identified by `key`. Duplicates are rejected.
    pub fn insert(
        &mut self,
        arena: &mut StoreArena,
        schema: &Schema,
        key: ObjKey,
    ) -> Result<ClusterState> {
        if key.0 < 0 {
            return Err(CairnError::Invalid("negative object key"));
        }
        let (root, _) = arena.ensure_writeable(self.root)?;
        self.root = root;
        let (state, split) = insert_at(arena, schema, root, key.0 as u64, 0)?;
        if let Some(split) = split {
            self.grow_root(arena, split)?;
        }
        self.size += 1;
        if key.0 >= self.next_key {
            self.next_key = key.0 + 1;
        }
        Ok(state)
    }

    fn grow_root(&mut self, arena: &mut StoreArena, split: Split) -> Result<()> {
        let depth = match arena.translate(self.root)? {
            Block::Leaf(_) => 1,
            Block::Inner(inner) => inner.sub_tree_depth() + 1,
            Block::Seq(_) => return Err(CairnError::Corruption("sequence block as tree root")),
        };
        let entries = vec![
            InnerEntry {
                key_base: 0,
                child: self.root,
            },
            InnerEntry {
                key_base: split.key,
                child: split.node,
            },
        ];
        self.root = arena.allocate(Block::Inner(InnerBlock::new(depth, entries)));
        trace!(depth, root = self.root.raw(), "cluster.tree.grow_root");
        Ok(())
    }

    /// Locates the object identified by `key`.
    pub fn get(&self, arena: &StoreArena, key: ObjKey) -> Result<ClusterState> {
        if key.0 < 0 {
            return Err(CairnError::NotFound("object"));
        }
        let mut node = self.root;
        let mut rel = key.0 as u64;
        loop {
            match arena.translate(node)? {
                Block::Leaf(leaf) => {
                    let index = leaf.get_by_key(rel)?;
                    return Ok(ClusterState { node, index });
                }
                Block::Inner(inner) => {
                    inner.check_order()?;
                    if rel < inner.entries()[0].key_base {
                        return Err(CairnError::NotFound("object"));
                    }
                    let ix = inner.choose_child(rel);
                    rel -= inner.entries()[ix].key_base;
                    node = inner.entries()[ix].child;
                }
                Block::Seq(_) => {
                    return Err(CairnError::Corruption("sequence block inside cluster tree"))
                }
            }
        }
    }

    /// Locates the object at position `ndx` in key order.
    pub fn get_by_index(
        &self,
        arena: &StoreArena,
        mut ndx: usize,
    ) -> Result<(ObjKey, ClusterState)> {
        if ndx >= self.size {
            return Err(CairnError::NotFound("index"));
        }
        let mut node = self.root;
        let mut offset: u64 = 0;
        loop {
            match arena.translate(node)? {
                Block::Leaf(leaf) => {
                    let rel = leaf.key_value(ndx)?;
                    return Ok((
                        ObjKey((offset + rel) as i64),
                        ClusterState { node, index: ndx },
                    ));
                }
                Block::Inner(inner) => {
                    let mut next = None;
                    for entry in inner.entries() {
                        let sz = self.subtree_size(arena, entry.child)?;
                        if ndx < sz {
                            next = Some(*entry);
                            break;
                        }
                        ndx -= sz;
                    }
                    let entry =
                        next.ok_or(CairnError::Corruption("child sizes below declared size"))?;
                    offset += entry.key_base;
                    node = entry.child;
                }
                Block::Seq(_) => {
                    return Err(CairnError::Corruption("sequence block inside cluster tree"))
                }
            }
        }
    }

    /// Number of rows stored directly in `node` (children count for inner
    /// nodes).
    pub fn node_size(&self, arena: &StoreArena, node: BlockRef) -> Result<usize> {
        match arena.translate(node)? {
            Block::Leaf(leaf) => Ok(leaf.node_size()),
            Block::Inner(inner) => Ok(inner.node_size()),
            Block::Seq(_) => Err(CairnError::Corruption("sequence block inside cluster tree")),
        }
    }

    /// Number of objects in the subtree rooted at `node`.
    pub fn subtree_size(&self, arena: &StoreArena, node: BlockRef) -> Result<usize> {
        match arena.translate(node)? {
            Block::Leaf(leaf) => Ok(leaf.node_size()),
            Block::Inner(inner) => {
                let mut total = 0;
                for entry in inner.entries() {
                    total += self.subtree_size(arena, entry.child)?;
                }
                Ok(total)
            }
            Block::Seq(_) => Err(CairnError::Corruption("sequence block inside cluster tree")),
        }
    }

    /// Last key in the subtree rooted at `node`, relative to that node's
    /// offset; -1 when empty.
    pub fn last_key_value(&self, arena: &StoreArena, node: BlockRef) -> Result<i64> {
        match arena.translate(node)? {
            Block::Leaf(leaf) => Ok(leaf.last_key_value()),
            Block::Inner(inner) => {
                let last = inner
                    .entries()
                    .last()
                    .ok_or(CairnError::Corruption("inner node without children"))?;
                let below = self.last_key_value(arena, last.child)?;
                if below < 0 {
                    return Err(CairnError::Corruption("inner node routing to empty child"));
                }
                Ok(last.key_base as i64 + below)
            }
            Block::Seq(_) => Err(CairnError::Corruption("sequence block inside cluster tree")),
        }
    }

    /// Descends to the leaf owning `key`, cloning every block on the path
    /// that is still shared with an older committed version and rewriting
    /// each ancestor's child ref. The returned leaf is exclusively owned by
    /// the in-progress write.
    pub fn ensure_writeable(
        &mut self,
        arena: &mut StoreArena,
        key: ObjKey,
    ) -> Result<ClusterState> {
        if key.0 < 0 {
            return Err(CairnError::NotFound("object"));
        }
        let (root, _) = arena.ensure_writeable(self.root)?;
        self.root = root;
        let mut node = root;
        let mut rel = key.0 as u64;
        loop {
            let is_leaf = arena.translate(node)?.is_leaf();
            if is_leaf {
                let index = arena.translate(node)?.as_leaf()?.get_by_key(rel)?;
                return Ok(ClusterState { node, index });
            }
            let (ix, base, child) = {
                let inner = arena.translate(node)?.as_inner()?;
                inner.check_order()?;
                if rel < inner.entries()[0].key_base {
                    return Err(CairnError::NotFound("object"));
                }
                let ix = inner.choose_child(rel);
                (ix, inner.entries()[ix].key_base, inner.entries()[ix].child)
            };
            let (child_w, cloned) = arena.ensure_writeable(child)?;
            if cloned {
                arena.translate_mut(node)?.as_inner_mut()?.entries[ix].child = child_w;
            }
            rel -= base;
            node = child_w;
        }
    }

    /// Physically removes the object identified by `key`, pruning nodes
    /// that become empty and collapsing a single-child root. Backlink and
    /// cascade handling happen one layer up, before this call.
    pub fn erase(
        &mut self,
        arena: &mut StoreArena,
        schema: &Schema,
        key: ObjKey,
    ) -> Result<()> {
        if key.0 < 0 {
            return Err(CairnError::NotFound("object"));
        }
        let (root, _) = arena.ensure_writeable(self.root)?;
        self.root = root;
        let root_empty = erase_at(arena, root, key.0 as u64)?;
        if root_empty && !arena.translate(self.root)?.is_leaf() {
            arena.free(self.root)?;
            self.root = arena.allocate(Block::Leaf(LeafBlock::new(schema)));
        } else {
            self.maybe_collapse_root(arena)?;
        }
        self.size -= 1;
        Ok(())
    }

    fn maybe_collapse_root(&mut self, arena: &mut StoreArena) -> Result<()> {
        loop {
            let entry = match arena.translate(self.root)? {
                Block::Inner(inner) if inner.node_size() == 1 => inner.entries()[0],
                _ => return Ok(()),
            };
            let (child, _) = arena.ensure_writeable(entry.child)?;
            if entry.key_base > 0 {
                adjust_keys(arena, child, entry.key_base)?;
            }
            arena.free(self.root)?;
            trace!(root = child.raw(), "cluster.tree.collapse_root");
            self.root = child;
        }
    }

    /// All object keys in key order.
    pub fn keys(&self, arena: &StoreArena) -> Result<Vec<ObjKey>> {
        let mut out = Vec::with_capacity(self.size);
        collect_keys(arena, self.root, 0, &mut out)?;
        Ok(out)
    }

    /// Adds a payload leaf for a new column at schema position `ndx` to
    /// every cluster in the tree.
    pub fn insert_column(
        &mut self,
        arena: &mut StoreArena,
        ndx: usize,
        spec: &ColumnSpec,
    ) -> Result<()> {
        let (root, _) = arena.ensure_writeable(self.root)?;
        self.root = root;
        for_each_leaf_mut(arena, root, &mut |leaf| leaf.insert_column(ndx, spec))
    }

    /// Discards the payload leaf at schema position `ndx` from every
    /// cluster in the tree.
    pub fn remove_column(&mut self, arena: &mut StoreArena, ndx: usize) -> Result<()> {
        let (root, _) = arena.ensure_writeable(self.root)?;
        self.root = root;
        for_each_leaf_mut(arena, root, &mut |leaf| leaf.remove_column(ndx))
    }
}

fn insert_at(
    arena: &mut StoreArena,
    schema: &Schema,
    node: BlockRef,
    rel: u64,
    offset: u64,
) -> Result<(ClusterState, Option<Split>)> {
    if arena.translate(node)?.is_leaf() {
        let result = arena
            .translate_mut(node)?
            .as_leaf_mut()?
            .insert(rel, offset, schema)?;
        return match result {
            LeafInsert::Done { index } => Ok((ClusterState { node, index }, None)),
            LeafInsert::Split {
                sibling,
                split_key,
                index,
                in_sibling,
            } => {
                let new_ref = arena.allocate(Block::Leaf(sibling));
                trace!(
                    left = node.raw(),
                    right = new_ref.raw(),
                    split_key,
                    "cluster.leaf.split"
                );
                let state = ClusterState {
                    node: if in_sibling { new_ref } else { node },
                    index,
                };
                Ok((state, Some(Split { key: split_key, node: new_ref })))
            }
        };
    }

    let (ix, mut base, child) = {
        let inner = arena.translate(node)?.as_inner()?;
        inner.check_order()?;
        let ix = inner.choose_child(rel);
        (ix, inner.entries()[ix].key_base, inner.entries()[ix].child)
    };
    let (child_w, cloned) = arena.ensure_writeable(child)?;
    if cloned {
        arena.translate_mut(node)?.as_inner_mut()?.entries[ix].child = child_w;
    }
    if rel < base {
        // The key precedes every child: renormalize the first child's keys
        // so its subtree covers `rel`.
        let delta = base - rel;
        adjust_keys(arena, child_w, delta)?;
        arena.translate_mut(node)?.as_inner_mut()?.entries[0].key_base = rel;
        base = rel;
    }

    let (state, split) = insert_at(arena, schema, child_w, rel - base, offset + base)?;
    let split = match split {
        None => None,
        Some(split) => {
            let overflow = {
                let inner = arena.translate_mut(node)?.as_inner_mut()?;
                inner.entries.insert(
                    ix + 1,
                    InnerEntry {
                        key_base: split.key + base,
                        child: split.node,
                    },
                );
                if inner.node_size() > MAX_INNER_SIZE {
                    let mid = inner.node_size() / 2;
                    let split_key = inner.entries[mid].key_base;
                    let mut sibling = InnerBlock::new(inner.sub_tree_depth(), Vec::new());
                    inner.move_tail(mid, &mut sibling, split_key);
                    Some((split_key, sibling))
                } else {
                    None
                }
            };
            match overflow {
                Some((split_key, sibling)) => {
                    let new_ref = arena.allocate(Block::Inner(sibling));
                    trace!(
                        left = node.raw(),
                        right = new_ref.raw(),
                        split_key,
                        "cluster.inner.split"
                    );
                    Some(Split {
                        key: split_key,
                        node: new_ref,
                    })
                }
                None => None,
            }
        }
    };
    Ok((state, split))
}

fn erase_at(arena: &mut StoreArena, node: BlockRef, rel: u64) -> Result<bool> {
    if arena.translate(node)?.is_leaf() {
        let leaf = arena.translate_mut(node)?.as_leaf_mut()?;
        let ndx = leaf.get_by_key(rel)?;
        leaf.erase(ndx)?;
        return Ok(leaf.node_size() == 0);
    }
    let (ix, base, child) = {
        let inner = arena.translate(node)?.as_inner()?;
        inner.check_order()?;
        if rel < inner.entries()[0].key_base {
            return Err(CairnError::NotFound("object"));
        }
        let ix = inner.choose_child(rel);
        (ix, inner.entries()[ix].key_base, inner.entries()[ix].child)
    };
    let (child_w, cloned) = arena.ensure_writeable(child)?;
    if cloned {
        arena.translate_mut(node)?.as_inner_mut()?.entries[ix].child = child_w;
    }
    let child_empty = erase_at(arena, child_w, rel - base)?;
    if child_empty {
        arena.free(child_w)?;
        let inner = arena.translate_mut(node)?.as_inner_mut()?;
        inner.entries.remove(ix);
        trace!(node = node.raw(), child = ix, "cluster.inner.prune");
        return Ok(inner.entries.is_empty());
    }
    Ok(false)
}

fn adjust_keys(arena: &mut StoreArena, node: BlockRef, delta: u64) -> Result<()> {
    match arena.translate_mut(node)? {
        Block::Leaf(leaf) => leaf.adjust_keys(delta),
        Block::Inner(inner) => inner.adjust_keys(delta),
        Block::Seq(_) => {
            return Err(CairnError::Corruption("sequence block inside cluster tree"))
        }
    }
    Ok(())
}

fn collect_keys(
    arena: &StoreArena,
    node: BlockRef,
    offset: u64,
    out: &mut Vec<ObjKey>,
) -> Result<()> {
    match arena.translate(node)? {
        Block::Leaf(leaf) => {
            for ndx in 0..leaf.node_size() {
                out.push(ObjKey((offset + leaf.key_value(ndx)?) as i64));
            }
            Ok(())
        }
        Block::Inner(inner) => {
            for entry in inner.entries() {
                collect_keys(arena, entry.child, offset + entry.key_base, out)?;
            }
            Ok(())
        }
        Block::Seq(_) => Err(CairnError::Corruption("sequence block inside cluster tree")),
    }
}

fn for_each_leaf_mut<F>(arena: &mut StoreArena, node: BlockRef, f: &mut F) -> Result<()>
where
    F: FnMut(&mut LeafBlock) -> Result<()>,
{
    if arena.translate(node)?.is_leaf() {
        return f(arena.translate_mut(node)?.as_leaf_mut()?);
    }
    let count = arena.translate(node)?.as_inner()?.node_size();
    for ix in 0..count {
        let child = arena.translate(node)?.as_inner()?.entries()[ix].child;
        let (child_w, cloned) = arena.ensure_writeable(child)?;
        if cloned {
            arena.translate_mut(node)?.as_inner_mut()?.entries[ix].child = child_w;
        }
        for_each_leaf_mut(arena, child_w, f)?;
    }
    Ok(())
}
