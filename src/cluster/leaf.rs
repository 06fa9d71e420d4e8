//! Cluster leaf: a fixed-capacity, key-ordered container holding one row
//! range, with one payload leaf per column plus the key container.

use crate::cluster::keys::ClusterKeys;
use crate::cluster::MAX_CLUSTER_SIZE;
use crate::column::{ColumnLeaf, DictRefs};
use crate::error::{CairnError, Result};
use crate::schema::{ColumnSpec, Schema};
use crate::types::{ColIx, DataType, ObjKey};

/// Outcome of a leaf insert.
#[derive(Debug)]
pub(crate) enum LeafInsert {
    /// Row stored in this leaf at `index`.
    Done {
        /// Row index of the new row.
        index: usize,
    },
    /// The leaf was full and split.
    Split {
        /// New right sibling holding the moved tail (or the single new row).
        sibling: LeafBlock,
        /// First relative key of the sibling, relative to this leaf's offset.
        split_key: u64,
        /// Row index of the new row within whichever half received it.
        index: usize,
        /// `true` when the new row landed in the sibling.
        in_sibling: bool,
    },
}

/// Leaf node ("cluster") block.
#[derive(Clone, Debug)]
pub struct LeafBlock {
    pub(crate) keys: ClusterKeys,
    pub(crate) columns: Vec<ColumnLeaf>,
}

impl LeafBlock {
    /// Creates an empty leaf with one payload leaf per schema column.
    pub fn new(schema: &Schema) -> Self {
        Self {
            keys: ClusterKeys::new(),
            columns: schema.cols().iter().map(|c| ColumnLeaf::init(c.ty)).collect(),
        }
    }

    fn new_sibling(&self) -> Self {
        Self {
            keys: ClusterKeys::new(),
            columns: self
                .columns
                .iter()
                .map(|c| ColumnLeaf::init(c.data_type()))
                .collect(),
        }
    }

    /// Number of rows in this leaf.
    pub fn node_size(&self) -> usize {
        self.keys.size()
    }

    /// Last relative key, or -1 when empty.
    pub fn last_key_value(&self) -> i64 {
        self.keys.last().map(|k| k as i64).unwrap_or(-1)
    }

    /// Index of the first key >= `key`, clamped to `[0, size]`.
    pub fn lower_bound_key(&self, key: u64) -> usize {
        self.keys.lower_bound(key)
    }

    /// Relative key stored at `ndx`.
    pub fn key_value(&self, ndx: usize) -> Result<u64> {
        self.keys.get(ndx)
    }

    /// The key container, for form inspection.
    pub fn key_array(&self) -> &ClusterKeys {
        &self.keys
    }

    /// Payload leaf for `col`.
    pub fn column(&self, col: ColIx) -> Result<&ColumnLeaf> {
        self.columns.get(col.0).ok_or(CairnError::NotFound("column index"))
    }

    /// Mutable payload leaf for `col`.
    pub fn column_mut(&mut self, col: ColIx) -> Result<&mut ColumnLeaf> {
        self.columns
            .get_mut(col.0)
            .ok_or(CairnError::NotFound("column index"))
    }

    /// The declared row count must agree with every payload leaf.
    pub(crate) fn check_sync(&self) -> Result<()> {
        let sz = self.keys.size();
        for col in &self.columns {
            if col.len() != sz {
                return Err(CairnError::Corruption("leaf column length desynchronized"));
            }
        }
        Ok(())
    }

    /// Inserts a new row for relative key `rel`. `offset` is only used to
    /// report the global key on duplicate rejection.
    pub(crate) fn insert(
        &mut self,
        rel: u64,
        offset: u64,
        schema: &Schema,
    ) -> Result<LeafInsert> {
        self.check_sync()?;
        let sz = self.keys.size();
        let ndx = self.keys.lower_bound(rel);
        if ndx < sz && self.keys.get(ndx)? == rel {
            return Err(CairnError::KeyAlreadyUsed((rel + offset) as i64));
        }
        if sz < MAX_CLUSTER_SIZE {
            self.insert_row(ndx, rel, schema)?;
            return Ok(LeafInsert::Done { index: ndx });
        }
        // Overflow: split at the insertion point so both halves stay below
        // capacity. The new sibling's keys are rebased to start near zero.
        if ndx == sz {
            let mut sibling = self.new_sibling();
            sibling.insert_row(0, 0, schema)?;
            return Ok(LeafInsert::Split {
                sibling,
                split_key: rel,
                index: 0,
                in_sibling: true,
            });
        }
        let split_key = self.keys.get(ndx)?;
        let mut sibling = self.new_sibling();
        self.move_tail(ndx, &mut sibling, split_key)?;
        self.insert_row(ndx, rel, schema)?;
        Ok(LeafInsert::Split {
            sibling,
            split_key,
            index: ndx,
            in_sibling: false,
        })
    }

    fn insert_row(&mut self, ndx: usize, rel: u64, schema: &Schema) -> Result<()> {
        self.keys.insert(ndx, rel)?;
        for (col, spec) in self.columns.iter_mut().zip(schema.cols()) {
            col.insert(ndx, spec.nullable)?;
        }
        Ok(())
    }

    /// Row index of the object with relative key `rel`.
    pub fn get_by_key(&self, rel: u64) -> Result<usize> {
        let ndx = self.keys.lower_bound(rel);
        if ndx < self.keys.size() && self.keys.get(ndx)? == rel {
            Ok(ndx)
        } else {
            Err(CairnError::NotFound("object"))
        }
    }

    /// Physically removes row `ndx` from the key container and every
    /// payload leaf. Cross-reference cleanup happens before this call.
    pub(crate) fn erase(&mut self, ndx: usize) -> Result<()> {
        self.check_sync()?;
        self.keys.erase(ndx)?;
        for col in &mut self.columns {
            col.erase(ndx)?;
        }
        Ok(())
    }

    /// Relocates rows `[from..]` to `dst`, a fresh right sibling,
    /// subtracting `key_adj` from every moved key.
    pub(crate) fn move_tail(
        &mut self,
        from: usize,
        dst: &mut LeafBlock,
        key_adj: u64,
    ) -> Result<()> {
        debug_assert!(dst.keys.is_empty());
        dst.keys = self.keys.move_tail(from, key_adj)?;
        for (src, dst_col) in self.columns.iter_mut().zip(dst.columns.iter_mut()) {
            src.move_tail(from, dst_col)?;
        }
        Ok(())
    }

    /// Forces the key container into general form.
    pub fn ensure_general_form(&mut self) {
        self.keys.ensure_general_form();
    }

    /// Shifts every key up by `delta` (offset renormalization).
    pub(crate) fn adjust_keys(&mut self, delta: u64) {
        self.keys.adjust(delta);
    }

    /// Adds a payload leaf for a new column at position `ndx`, default-
    /// initializing a cell for every existing row.
    pub(crate) fn insert_column(&mut self, ndx: usize, spec: &ColumnSpec) -> Result<()> {
        if ndx > self.columns.len() {
            return Err(CairnError::NotFound("column index"));
        }
        let mut col = ColumnLeaf::init(spec.ty);
        for row in 0..self.keys.size() {
            col.insert(row, spec.nullable)?;
        }
        self.columns.insert(ndx, col);
        Ok(())
    }

    /// Discards the payload leaf at position `ndx`.
    pub(crate) fn remove_column(&mut self, ndx: usize) -> Result<()> {
        if ndx >= self.columns.len() {
            return Err(CairnError::NotFound("column index"));
        }
        self.columns.remove(ndx);
        Ok(())
    }

    /// Collects the cross-references of row `ndx` ahead of an erase:
    /// outgoing links, inbound backlink origins, and dictionary storage.
    pub(crate) fn row_refs(&self, ndx: usize, schema: &Schema) -> Result<RowRefs> {
        let mut refs = RowRefs::default();
        for (ix, spec) in schema.cols().iter().enumerate() {
            let col = self
                .columns
                .get(ix)
                .ok_or(CairnError::Corruption("leaf column length desynchronized"))?;
            match spec.ty {
                DataType::Link => {
                    if let Some(target) = col.link(ndx)? {
                        refs.outgoing.push(OutgoingLink {
                            backlink_col: spec
                                .backlink_col
                                .ok_or(CairnError::Corruption("link column without backlink"))?,
                            strong: spec.strong,
                            target,
                        });
                    }
                }
                DataType::Backlink => {
                    let origins = col.backlinks(ndx)?;
                    if !origins.is_empty() {
                        refs.inbound.push(InboundLinks {
                            origin_col: spec
                                .backlink_of
                                .ok_or(CairnError::Corruption("backlink column without origin"))?,
                            origins: origins.iter().copied().collect(),
                        });
                    }
                }
                DataType::Dictionary => {
                    if let Some(d) = col.dict_refs(ndx)? {
                        refs.dictionaries.push(d);
                    }
                }
                _ => {}
            }
        }
        Ok(refs)
    }
}

/// One outgoing link from a row about to be erased.
#[derive(Clone, Copy, Debug)]
pub(crate) struct OutgoingLink {
    pub(crate) backlink_col: ColIx,
    pub(crate) strong: bool,
    pub(crate) target: ObjKey,
}

/// Inbound references recorded on a row about to be erased.
#[derive(Clone, Debug)]
pub(crate) struct InboundLinks {
    pub(crate) origin_col: ColIx,
    pub(crate) origins: Vec<ObjKey>,
}

/// Cross-references of one row, gathered before physical removal.
#[derive(Debug, Default)]
pub(crate) struct RowRefs {
    pub(crate) outgoing: Vec<OutgoingLink>,
    pub(crate) inbound: Vec<InboundLinks>,
    pub(crate) dictionaries: Vec<DictRefs>,
}
