//! Leaf-local key container with compact and general storage forms.
//!
//! A leaf stores its keys in exactly one of two forms. The compact form
//! represents the implicit contiguous run `0..size` of relative keys and
//! carries only the size; it is valid while no row has ever been removed
//! from the middle and no gap exists. The general form is an explicit
//! ordered array of relative keys. Transitions are compact to general only,
//! on demand, and never reverse automatically.

use crate::error::{CairnError, Result};

/// Key storage for one cluster leaf, in relative (offset-free) form.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ClusterKeys {
    /// Implicit run of `size` consecutive keys starting at 0.
    Compact(usize),
    /// Explicit strictly-increasing key array.
    General(Vec<u64>),
}

impl ClusterKeys {
    /// Creates an empty compact container.
    pub fn new() -> Self {
        ClusterKeys::Compact(0)
    }

    /// Number of keys stored.
    pub fn size(&self) -> usize {
        match self {
            ClusterKeys::Compact(sz) => *sz,
            ClusterKeys::General(v) => v.len(),
        }
    }

    /// `true` when the container holds no keys.
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the key at position `ndx`.
    pub fn get(&self, ndx: usize) -> Result<u64> {
        match self {
            ClusterKeys::Compact(sz) => {
                if ndx < *sz {
                    Ok(ndx as u64)
                } else {
                    Err(CairnError::NotFound("row index"))
                }
            }
            ClusterKeys::General(v) => {
                v.get(ndx).copied().ok_or(CairnError::NotFound("row index"))
            }
        }
    }

    /// Returns the last key, if any.
    pub fn last(&self) -> Option<u64> {
        match self {
            ClusterKeys::Compact(0) => None,
            ClusterKeys::Compact(sz) => Some(*sz as u64 - 1),
            ClusterKeys::General(v) => v.last().copied(),
        }
    }

    /// Index of the first key >= `key`, clamped to `[0, size]`.
    ///
    /// Compact form admits a closed-form answer because the implicit key
    /// sequence is the identity mapping; general form binary-searches.
    pub fn lower_bound(&self, key: u64) -> usize {
        match self {
            ClusterKeys::Compact(sz) => (key as usize).min(*sz),
            ClusterKeys::General(v) => v.partition_point(|k| *k < key),
        }
    }

    /// `true` when `key` is present.
    pub fn contains(&self, key: u64) -> bool {
        let ndx = self.lower_bound(key);
        ndx < self.size() && self.get(ndx).map(|k| k == key).unwrap_or(false)
    }

    /// Forces the general form, materializing the implicit key range if the
    /// container is still compact.
    pub fn ensure_general_form(&mut self) -> &mut Vec<u64> {
        if let ClusterKeys::Compact(sz) = *self {
            *self = ClusterKeys::General((0..sz as u64).collect());
        }
        match self {
            ClusterKeys::General(v) => v,
            ClusterKeys::Compact(_) => unreachable!(),
        }
    }

    /// Inserts `key` at position `ndx`. The compact form survives only a
    /// tail append of the next consecutive key.
    pub fn insert(&mut self, ndx: usize, key: u64) -> Result<()> {
        if ndx > self.size() {
            return Err(CairnError::NotFound("row index"));
        }
        if let ClusterKeys::Compact(sz) = self {
            if ndx == *sz && key == *sz as u64 {
                *sz += 1;
                return Ok(());
            }
        }
        let v = self.ensure_general_form();
        v.insert(ndx, key);
        Ok(())
    }

    /// Removes the key at position `ndx`. The compact form survives a tail
    /// removal; anything else converts to general form first.
    pub fn erase(&mut self, ndx: usize) -> Result<()> {
        let sz = self.size();
        if ndx >= sz {
            return Err(CairnError::NotFound("row index"));
        }
        if let ClusterKeys::Compact(n) = self {
            if ndx + 1 == *n {
                *n -= 1;
                return Ok(());
            }
        }
        let v = self.ensure_general_form();
        v.remove(ndx);
        Ok(())
    }

    /// Adds `delta` to every key. Forces general form first, as a shifted
    /// run is no longer the identity mapping.
    pub fn adjust(&mut self, delta: u64) {
        if delta == 0 {
            return;
        }
        let v = self.ensure_general_form();
        for k in v.iter_mut() {
            *k += delta;
        }
    }

    /// Removes the tail starting at `from` and returns it rebased by
    /// `-key_adj`, so the destination's keys stay node-local-relative.
    pub fn move_tail(&mut self, from: usize, key_adj: u64) -> Result<ClusterKeys> {
        let sz = self.size();
        if from > sz {
            return Err(CairnError::NotFound("row index"));
        }
        match self {
            ClusterKeys::Compact(n) => {
                // Compact keys are the identity mapping, so the tail rebased
                // by its own first key is again a compact run.
                if key_adj != from as u64 {
                    return Err(CairnError::Corruption("compact split key mismatch"));
                }
                let moved = sz - from;
                *n = from;
                Ok(ClusterKeys::Compact(moved))
            }
            ClusterKeys::General(v) => {
                let tail: Vec<u64> = v.drain(from..).map(|k| k - key_adj).collect();
                Ok(ClusterKeys::General(tail))
            }
        }
    }
}

impl Default for ClusterKeys {
    fn default() -> Self {
        Self::new()
    }
}
