//! Versioned copy-on-write block arena.
//!
//! Blocks are addressed by stable handles ([`BlockRef`]) and tagged with the
//! write generation that created them. A block created before the current
//! write generation is read-only; mutating it requires
//! [`Arena::ensure_writeable`], which clones the block into a fresh slot and
//! leaves the original untouched for readers holding a pre-commit handle.
//!
//! The content version is the sole cross-component synchronization signal:
//! it advances on every structural mutation, and any component caching
//! derived state must re-validate against it before trusting cached refs.

use crate::error::{CairnError, Result};
use tracing::trace;

/// Stable handle to a block in the arena.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub struct BlockRef(u64);

impl BlockRef {
    /// Returns the raw slot index.
    pub fn raw(self) -> u64 {
        self.0
    }
}

#[derive(Clone, Debug)]
struct Slot<B> {
    generation: u64,
    block: Option<B>,
}

/// Generation-tagged arena of copy-on-write blocks.
#[derive(Debug)]
pub struct Arena<B> {
    slots: Vec<Slot<B>>,
    free: Vec<usize>,
    write_generation: u64,
    content_version: u64,
}

impl<B: Clone> Arena<B> {
    /// Creates an empty arena at write generation 1.
    pub fn new() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            write_generation: 1,
            content_version: 1,
        }
    }

    /// Stores `block` in a fresh slot owned by the current write generation.
    pub fn allocate(&mut self, block: B) -> BlockRef {
        self.content_version += 1;
        let generation = self.write_generation;
        let ix = match self.free.pop() {
            Some(ix) => {
                self.slots[ix] = Slot {
                    generation,
                    block: Some(block),
                };
                ix
            }
            None => {
                self.slots.push(Slot {
                    generation,
                    block: Some(block),
                });
                self.slots.len() - 1
            }
        };
        BlockRef(ix as u64)
    }

    /// Releases the block behind `r`. The slot may be recycled by a later
    /// allocation.
    pub fn free(&mut self, r: BlockRef) -> Result<()> {
        let ix = self.check(r)?;
        self.slots[ix].block = None;
        self.free.push(ix);
        self.content_version += 1;
        Ok(())
    }

    /// Resolves `r` to a shared reference.
    pub fn translate(&self, r: BlockRef) -> Result<&B> {
        let ix = self.check(r)?;
        self.slots[ix]
            .block
            .as_ref()
            .ok_or(CairnError::Corruption("block ref points at freed slot"))
    }

    /// Resolves `r` to a mutable reference and bumps the content version.
    ///
    /// Fails on blocks owned by an earlier write generation; those must be
    /// cloned via [`Arena::ensure_writeable`] first.
    pub fn translate_mut(&mut self, r: BlockRef) -> Result<&mut B> {
        let ix = self.check(r)?;
        if self.slots[ix].generation < self.write_generation {
            return Err(CairnError::Corruption(
                "write to a block owned by a committed version",
            ));
        }
        self.content_version += 1;
        self.slots[ix]
            .block
            .as_mut()
            .ok_or(CairnError::Corruption("block ref points at freed slot"))
    }

    /// Returns `true` when the block is owned by an earlier write generation
    /// and must be cloned before mutation. Unresolvable refs report `true`.
    pub fn is_read_only(&self, r: BlockRef) -> bool {
        match self.slots.get(r.0 as usize) {
            Some(slot) if slot.block.is_some() => slot.generation < self.write_generation,
            _ => true,
        }
    }

    /// Clone-if-shared: returns a ref that is exclusively owned by the
    /// in-progress write, and whether a clone happened.
    pub fn ensure_writeable(&mut self, r: BlockRef) -> Result<(BlockRef, bool)> {
        if !self.is_read_only(r) {
            return Ok((r, false));
        }
        let block = self.translate(r)?.clone();
        let clone = self.allocate(block);
        trace!(from = r.raw(), to = clone.raw(), "arena.clone_on_write");
        Ok((clone, true))
    }

    /// Seals the current write: every live block becomes read-only to
    /// subsequent writes. Returns the new write generation.
    pub fn commit(&mut self) -> u64 {
        self.write_generation += 1;
        trace!(generation = self.write_generation, "arena.commit");
        self.write_generation
    }

    /// Monotonic counter advanced on every structural mutation.
    pub fn content_version(&self) -> u64 {
        self.content_version
    }

    /// Number of live (non-freed) blocks, used by leak checks in tests.
    pub fn live_blocks(&self) -> usize {
        self.slots.iter().filter(|s| s.block.is_some()).count()
    }

    fn check(&self, r: BlockRef) -> Result<usize> {
        let ix = r.0 as usize;
        if ix >= self.slots.len() {
            return Err(CairnError::Corruption("block ref out of range"));
        }
        Ok(ix)
    }
}

impl<B: Clone> Default for Arena<B> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocate_translate_roundtrip() -> Result<()> {
        let mut arena: Arena<Vec<u8>> = Arena::new();
        let r = arena.allocate(vec![1, 2, 3]);
        assert_eq!(arena.translate(r)?, &vec![1, 2, 3]);
        arena.translate_mut(r)?.push(4);
        assert_eq!(arena.translate(r)?.len(), 4);
        Ok(())
    }

    #[test]
    fn commit_makes_blocks_read_only() -> Result<()> {
        let mut arena: Arena<u32> = Arena::new();
        let r = arena.allocate(7);
        assert!(!arena.is_read_only(r));
        arena.commit();
        assert!(arena.is_read_only(r));
        assert!(matches!(
            arena.translate_mut(r),
            Err(CairnError::Corruption(_))
        ));
        Ok(())
    }

    #[test]
    fn ensure_writeable_clones_shared_blocks() -> Result<()> {
        let mut arena: Arena<u32> = Arena::new();
        let r = arena.allocate(7);
        arena.commit();
        let (clone, cloned) = arena.ensure_writeable(r)?;
        assert!(cloned);
        assert_ne!(clone, r);
        *arena.translate_mut(clone)? = 9;
        // The committed block is untouched.
        assert_eq!(*arena.translate(r)?, 7);
        assert_eq!(*arena.translate(clone)?, 9);
        // Already-writeable blocks are returned as-is.
        let (same, cloned_again) = arena.ensure_writeable(clone)?;
        assert!(!cloned_again);
        assert_eq!(same, clone);
        Ok(())
    }

    #[test]
    fn free_recycles_slots() -> Result<()> {
        let mut arena: Arena<u32> = Arena::new();
        let a = arena.allocate(1);
        arena.free(a)?;
        assert!(arena.translate(a).is_err());
        let b = arena.allocate(2);
        assert_eq!(b.raw(), a.raw());
        assert_eq!(arena.live_blocks(), 1);
        Ok(())
    }

    #[test]
    fn content_version_is_monotonic() -> Result<()> {
        let mut arena: Arena<u32> = Arena::new();
        let v0 = arena.content_version();
        let r = arena.allocate(1);
        let v1 = arena.content_version();
        assert!(v1 > v0);
        arena.translate_mut(r)?;
        assert!(arena.content_version() > v1);
        let v2 = arena.content_version();
        arena.translate(r)?;
        assert_eq!(arena.content_version(), v2);
        Ok(())
    }
}
