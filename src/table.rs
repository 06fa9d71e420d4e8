//! Tables: the object-level API over one cluster tree.
//!
//! A table pairs a schema with a cluster tree and keeps the two consistent:
//! schema changes walk every cluster, link writes maintain the paired
//! backlink columns, and object erasure runs the full cross-reference
//! protocol (backlink removal, inbound link nullification, dictionary
//! release, strong-link cascades) before the row is physically removed.

use tracing::{debug, trace};

use crate::cluster::{CascadeState, ClusterTree, StoreArena};
use crate::dict::{DictCore, Dictionary};
use crate::error::{CairnError, Result};
use crate::schema::{ColumnSpec, Schema};
use crate::types::{ColIx, DataType, ObjKey, Value};

/// One table: a schema plus the cluster tree storing its objects.
#[derive(Debug)]
pub struct Table {
    schema: Schema,
    tree: ClusterTree,
}

impl Table {
    /// Creates a table with the given columns and an empty tree.
    pub fn new(arena: &mut StoreArena, specs: Vec<ColumnSpec>) -> Result<Self> {
        let schema = Schema::with_columns(specs)?;
        let tree = ClusterTree::new(arena, &schema);
        Ok(Self { schema, tree })
    }

    /// Column definitions.
    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    /// The underlying cluster tree.
    pub fn tree(&self) -> &ClusterTree {
        &self.tree
    }

    /// Mutable access to the underlying cluster tree.
    pub fn tree_mut(&mut self) -> &mut ClusterTree {
        &mut self.tree
    }

    /// Number of objects.
    pub fn size(&self) -> usize {
        self.tree.size()
    }

    /// All object keys in key order.
    pub fn keys(&self, arena: &StoreArena) -> Result<Vec<ObjKey>> {
        self.tree.keys(arena)
    }

    /// Whether an object with `key` exists.
    pub fn contains(&self, arena: &StoreArena, key: ObjKey) -> bool {
        self.tree.get(arena, key).is_ok()
    }

    /// Creates an object under the next monotonic key.
    pub fn create_object(&mut self, arena: &mut StoreArena) -> Result<ObjKey> {
        let key = self.tree.allocate_key();
        self.tree.insert(arena, &self.schema, key)?;
        trace!(key = key.0, "table.create_object");
        Ok(key)
    }

    /// Creates an object under an explicit key. The key must be
    /// non-negative and unused.
    pub fn create_object_with_key(
        &mut self,
        arena: &mut StoreArena,
        key: ObjKey,
    ) -> Result<ObjKey> {
        self.tree.insert(arena, &self.schema, key)?;
        trace!(key = key.0, "table.create_object");
        Ok(key)
    }

    /// Reads a scalar cell. Backlink and dictionary columns are not
    /// readable as plain values.
    pub fn get_value(&self, arena: &StoreArena, key: ObjKey, col: ColIx) -> Result<Value> {
        let state = self.tree.get(arena, key)?;
        arena
            .translate(state.node)?
            .as_leaf()?
            .column(col)?
            .get(state.index)
    }

    /// Writes a scalar cell. Link, backlink and dictionary columns have
    /// their own operations and are rejected here.
    pub fn set_value(
        &mut self,
        arena: &mut StoreArena,
        key: ObjKey,
        col: ColIx,
        value: Value,
    ) -> Result<()> {
        let spec = self.schema.col(col)?;
        match spec.ty {
            DataType::Link | DataType::Backlink | DataType::Dictionary => {
                return Err(CairnError::Invalid("column is not a scalar column"))
            }
            _ => {}
        }
        if value.is_null() && !spec.nullable {
            return Err(CairnError::Invalid("null in non-nullable column"));
        }
        let state = self.tree.ensure_writeable(arena, key)?;
        arena
            .translate_mut(state.node)?
            .as_leaf_mut()?
            .column_mut(col)?
            .set(state.index, value)
    }

    /// Current target of a link cell.
    pub fn get_link(&self, arena: &StoreArena, key: ObjKey, col: ColIx) -> Result<Option<ObjKey>> {
        let spec = self.schema.col(col)?;
        if spec.ty != DataType::Link {
            return Err(CairnError::Invalid("not a link column"));
        }
        let state = self.tree.get(arena, key)?;
        arena
            .translate(state.node)?
            .as_leaf()?
            .column(col)?
            .link(state.index)
    }

    /// Points a link cell at `target` (or clears it), maintaining the
    /// paired backlink column on both the old and the new target. Removing
    /// the last inbound reference from a strong link enqueues the old
    /// target on `cascade` for the caller to erase.
    pub fn set_link(
        &mut self,
        arena: &mut StoreArena,
        key: ObjKey,
        col: ColIx,
        target: Option<ObjKey>,
        cascade: &mut CascadeState,
    ) -> Result<()> {
        let spec = self.schema.col(col)?;
        if spec.ty != DataType::Link {
            return Err(CairnError::Invalid("not a link column"));
        }
        let backlink_col = spec
            .backlink_col
            .ok_or(CairnError::Corruption("link column without backlink"))?;
        let strong = spec.strong;
        if let Some(t) = target {
            // Validate before any mutation.
            self.tree.get(arena, t)?;
        }
        let state = self.tree.get(arena, key)?;
        let old = arena
            .translate(state.node)?
            .as_leaf()?
            .column(col)?
            .link(state.index)?;
        if old == target {
            return Ok(());
        }

        if let Some(old) = old {
            let old_state = self.tree.ensure_writeable(arena, old)?;
            arena
                .translate_mut(old_state.node)?
                .as_leaf_mut()?
                .column_mut(backlink_col)?
                .remove_backlink(old_state.index, key)?;
            if strong && old != key && self.backlink_total(arena, old)? == 0 {
                if cascade.enqueue(old) {
                    trace!(key = old.0, "table.cascade.enqueue");
                }
            }
        }
        if let Some(t) = target {
            let t_state = self.tree.ensure_writeable(arena, t)?;
            arena
                .translate_mut(t_state.node)?
                .as_leaf_mut()?
                .column_mut(backlink_col)?
                .add_backlink(t_state.index, key)?;
        }
        let state = self.tree.ensure_writeable(arena, key)?;
        arena
            .translate_mut(state.node)?
            .as_leaf_mut()?
            .column_mut(col)?
            .set_link(state.index, target)
    }

    /// Keys of the objects pointing at `key` through the link column paired
    /// with `backlink_col`.
    pub fn backlinks(
        &self,
        arena: &StoreArena,
        key: ObjKey,
        backlink_col: ColIx,
    ) -> Result<Vec<ObjKey>> {
        let spec = self.schema.col(backlink_col)?;
        if spec.ty != DataType::Backlink {
            return Err(CairnError::Invalid("not a backlink column"));
        }
        let state = self.tree.get(arena, key)?;
        Ok(arena
            .translate(state.node)?
            .as_leaf()?
            .column(backlink_col)?
            .backlinks(state.index)?
            .iter()
            .copied()
            .collect())
    }

    fn backlink_total(&self, arena: &StoreArena, key: ObjKey) -> Result<usize> {
        let state = self.tree.get(arena, key)?;
        let leaf = arena.translate(state.node)?.as_leaf()?;
        let mut total = 0;
        for (ix, spec) in self.schema.cols().iter().enumerate() {
            if spec.ty == DataType::Backlink {
                total += leaf.column(ColIx(ix))?.backlinks(state.index)?.len();
            }
        }
        Ok(total)
    }

    /// Erases an object and everything its removal cascades to.
    pub fn erase_object(&mut self, arena: &mut StoreArena, key: ObjKey) -> Result<()> {
        let mut cascade = CascadeState::new();
        cascade.enqueue(key);
        while let Some(next) = cascade.pop_pending() {
            self.erase_object_with_state(arena, next, &mut cascade)?;
        }
        Ok(())
    }

    /// Erases one object, recording any further strong-cascade victims on
    /// `cascade` instead of erasing them. Callers draining a cascade loop
    /// over this.
    pub fn erase_object_with_state(
        &mut self,
        arena: &mut StoreArena,
        key: ObjKey,
        cascade: &mut CascadeState,
    ) -> Result<()> {
        cascade.mark_processed(key);
        let state = self.tree.get(arena, key)?;
        let refs = arena
            .translate(state.node)?
            .as_leaf()?
            .row_refs(state.index, &self.schema)?;

        // Unhook this object's outgoing links from their targets.
        for link in &refs.outgoing {
            if link.target == key {
                continue;
            }
            let t_state = self.tree.ensure_writeable(arena, link.target)?;
            arena
                .translate_mut(t_state.node)?
                .as_leaf_mut()?
                .column_mut(link.backlink_col)?
                .remove_backlink(t_state.index, key)?;
            if link.strong && self.backlink_total(arena, link.target)? == 0 {
                if cascade.enqueue(link.target) {
                    trace!(key = link.target.0, "table.cascade.enqueue");
                }
            }
        }

        // Null out every inbound link still pointing here.
        for inbound in &refs.inbound {
            for origin in &inbound.origins {
                if *origin == key {
                    continue;
                }
                let o_state = self.tree.ensure_writeable(arena, *origin)?;
                let col = arena
                    .translate_mut(o_state.node)?
                    .as_leaf_mut()?
                    .column_mut(inbound.origin_col)?;
                if col.link(o_state.index)? != Some(key) {
                    return Err(CairnError::Corruption("backlink without matching link"));
                }
                col.set_link(o_state.index, None)?;
            }
        }

        for d in &refs.dictionaries {
            DictCore::from_refs(*d).release(arena)?;
        }

        self.tree.erase(arena, &self.schema, key)?;
        debug!(key = key.0, "table.erase_object");
        Ok(())
    }

    /// Appends a column, walking every cluster to add its payload leaf.
    /// Link columns get their paired backlink column in the same pass.
    pub fn add_column(&mut self, arena: &mut StoreArena, spec: ColumnSpec) -> Result<ColIx> {
        let (ix, back) = self.schema.add_column(spec)?;
        let col_spec = self.schema.col(ix)?.clone();
        self.tree.insert_column(arena, ix.0, &col_spec)?;
        if let Some(bix) = back {
            let back_spec = self.schema.col(bix)?.clone();
            self.tree.insert_column(arena, bix.0, &back_spec)?;
        }
        debug!(col = ix.0, name = %col_spec.name, "table.add_column");
        Ok(ix)
    }

    /// Removes a column (and its paired backlink column for links), walking
    /// every cluster to discard the payload leaves. Dictionary storage
    /// owned by the column is released first.
    pub fn remove_column(&mut self, arena: &mut StoreArena, col: ColIx) -> Result<()> {
        if self.schema.col(col)?.ty == DataType::Dictionary {
            for key in self.tree.keys(arena)? {
                let state = self.tree.get(arena, key)?;
                let refs = arena
                    .translate(state.node)?
                    .as_leaf()?
                    .column(col)?
                    .dict_refs(state.index)?;
                if let Some(refs) = refs {
                    DictCore::from_refs(refs).release(arena)?;
                }
            }
        }
        let indices = self.schema.remove_column(col)?;
        for ndx in indices {
            self.tree.remove_column(arena, ndx)?;
        }
        debug!(col = col.0, "table.remove_column");
        Ok(())
    }

    /// Attached view over the dictionary cell of `key` at column `col`.
    pub fn get_dictionary(
        &self,
        arena: &StoreArena,
        key: ObjKey,
        col: ColIx,
    ) -> Result<Dictionary> {
        if self.schema.col(col)?.ty != DataType::Dictionary {
            return Err(CairnError::Invalid("not a dictionary column"));
        }
        self.tree.get(arena, key)?;
        Ok(Dictionary::new(key, col))
    }
}
