//! Flat ordered value sequence stored as a single arena block.
//!
//! This is the storage primitive backing dictionary key and value columns.
//! A `ValueSeq` is only a block handle; the payload lives in the arena and
//! every accessor takes the arena explicitly, so a sequence can be embedded
//! in a row cell and resolved lazily.

use crate::arena::BlockRef;
use crate::cluster::{Block, StoreArena};
use crate::error::{CairnError, Result};
use crate::types::Value;

/// Handle to one value sequence block.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct ValueSeq(BlockRef);

impl ValueSeq {
    /// Allocates a new empty sequence.
    pub fn create(arena: &mut StoreArena) -> Self {
        Self(arena.allocate(Block::Seq(Vec::new())))
    }

    /// Wraps an existing sequence block.
    pub fn from_ref(r: BlockRef) -> Self {
        Self(r)
    }

    /// Underlying block ref, for embedding in a row cell.
    pub fn block_ref(self) -> BlockRef {
        self.0
    }

    /// Releases the sequence block.
    pub fn destroy(self, arena: &mut StoreArena) -> Result<()> {
        arena.free(self.0)
    }

    /// Number of stored values.
    pub fn size(self, arena: &StoreArena) -> Result<usize> {
        Ok(arena.translate(self.0)?.as_seq()?.len())
    }

    /// Value at `ndx`.
    pub fn get(self, arena: &StoreArena, ndx: usize) -> Result<Value> {
        arena
            .translate(self.0)?
            .as_seq()?
            .get(ndx)
            .cloned()
            .ok_or(CairnError::NotFound("index"))
    }

    /// Overwrites the value at `ndx`.
    pub fn set(self, arena: &mut StoreArena, ndx: usize, value: Value) -> Result<()> {
        let seq = arena.translate_mut(self.0)?.as_seq_mut()?;
        let slot = seq.get_mut(ndx).ok_or(CairnError::NotFound("index"))?;
        *slot = value;
        Ok(())
    }

    /// Appends a value.
    pub fn add(self, arena: &mut StoreArena, value: Value) -> Result<()> {
        arena.translate_mut(self.0)?.as_seq_mut()?.push(value);
        Ok(())
    }

    /// Inserts a value at `ndx`, shifting the tail.
    pub fn insert(self, arena: &mut StoreArena, ndx: usize, value: Value) -> Result<()> {
        let seq = arena.translate_mut(self.0)?.as_seq_mut()?;
        if ndx > seq.len() {
            return Err(CairnError::NotFound("index"));
        }
        seq.insert(ndx, value);
        Ok(())
    }

    /// Removes the value at `ndx`, shifting the tail.
    pub fn erase(self, arena: &mut StoreArena, ndx: usize) -> Result<()> {
        let seq = arena.translate_mut(self.0)?.as_seq_mut()?;
        if ndx >= seq.len() {
            return Err(CairnError::NotFound("index"));
        }
        seq.remove(ndx);
        Ok(())
    }

    /// Removes all values.
    pub fn clear(self, arena: &mut StoreArena) -> Result<()> {
        arena.translate_mut(self.0)?.as_seq_mut()?.clear();
        Ok(())
    }

    /// Position of the first value equal to `value`. Linear scan.
    pub fn find_first(self, arena: &StoreArena, value: &Value) -> Result<Option<usize>> {
        Ok(arena
            .translate(self.0)?
            .as_seq()?
            .iter()
            .position(|v| v == value))
    }

    /// Clones the block if it is shared with a committed version. Returns
    /// the possibly relocated handle and whether it relocated.
    pub fn ensure_writeable(&mut self, arena: &mut StoreArena) -> Result<bool> {
        let (r, cloned) = arena.ensure_writeable(self.0)?;
        self.0 = r;
        Ok(cloned)
    }

    /// Allocates an independent copy of the sequence.
    pub fn deep_copy(self, arena: &mut StoreArena) -> Result<ValueSeq> {
        let values = arena.translate(self.0)?.as_seq()?.clone();
        Ok(Self(arena.allocate(Block::Seq(values))))
    }
}
