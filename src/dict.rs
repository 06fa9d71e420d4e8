//! Dictionaries: insertion-ordered key/value collections stored in a row
//! cell.
//!
//! Storage is a pair of parallel value sequences, keys and values matched by
//! position. [`DictCore`] is the raw pair; [`Dictionary`] is the attached
//! view an application holds, pinned to an owning object and column rather
//! than to block refs, so it survives copy-on-write relocation and row
//! movement. The view caches its resolved block refs and revalidates them
//! against the arena content version on every access.

use std::cell::Cell;

use tracing::trace;

use crate::cluster::{ClusterState, StoreArena};
use crate::column::DictRefs;
use crate::error::{CairnError, Result};
use crate::seq::ValueSeq;
use crate::table::Table;
use crate::types::{ColIx, ObjKey, Value};

/// Raw dictionary storage: two parallel sequences.
#[derive(Clone, Copy, Debug)]
pub struct DictCore {
    keys: ValueSeq,
    values: ValueSeq,
}

impl DictCore {
    /// Allocates an empty dictionary.
    pub fn create(arena: &mut StoreArena) -> Self {
        Self {
            keys: ValueSeq::create(arena),
            values: ValueSeq::create(arena),
        }
    }

    /// Wraps the block refs stored in a row cell.
    pub fn from_refs(refs: DictRefs) -> Self {
        Self {
            keys: ValueSeq::from_ref(refs.keys),
            values: ValueSeq::from_ref(refs.values),
        }
    }

    /// Block refs for embedding in a row cell.
    pub fn refs(self) -> DictRefs {
        DictRefs {
            keys: self.keys.block_ref(),
            values: self.values.block_ref(),
        }
    }

    /// Releases both sequence blocks.
    pub fn destroy(self, arena: &mut StoreArena) -> Result<()> {
        self.keys.destroy(arena)?;
        self.values.destroy(arena)
    }

    /// Releases only the sequence blocks owned by the in-progress write.
    /// Blocks shared with a committed generation stay live so readers of
    /// that snapshot keep resolving them; their slots are never recycled
    /// under a snapshot reader.
    pub fn release(self, arena: &mut StoreArena) -> Result<()> {
        for r in [self.keys.block_ref(), self.values.block_ref()] {
            if !arena.is_read_only(r) {
                arena.free(r)?;
            }
        }
        Ok(())
    }

    /// Number of entries.
    pub fn size(self, arena: &StoreArena) -> Result<usize> {
        self.keys.size(arena)
    }

    /// Position of `key`, if present. Linear scan.
    pub fn find_first(self, arena: &StoreArena, key: &Value) -> Result<Option<usize>> {
        self.keys.find_first(arena, key)
    }

    /// Value stored under `key`.
    pub fn get(self, arena: &StoreArena, key: &Value) -> Result<Value> {
        match self.find_first(arena, key)? {
            Some(ndx) => self.values.get(arena, ndx),
            None => Err(CairnError::NotFound("dictionary key")),
        }
    }

    /// Entry at position `ndx`.
    pub fn get_at(self, arena: &StoreArena, ndx: usize) -> Result<(Value, Value)> {
        Ok((self.keys.get(arena, ndx)?, self.values.get(arena, ndx)?))
    }

    /// Overwrites the value at position `ndx`, leaving the key in place.
    pub fn set_at(self, arena: &mut StoreArena, ndx: usize, value: Value) -> Result<()> {
        if ndx >= self.size(arena)? {
            return Err(CairnError::NotFound("index"));
        }
        self.values.set(arena, ndx, value)
    }

    /// Update-or-insert: overwrites the value when `key` is present,
    /// otherwise appends a new entry. Returns the entry position and whether
    /// the entry was newly inserted.
    pub fn insert(
        self,
        arena: &mut StoreArena,
        key: Value,
        value: Value,
    ) -> Result<(usize, bool)> {
        check_key(&key)?;
        match self.find_first(arena, &key)? {
            Some(ndx) => {
                self.values.set(arena, ndx, value)?;
                Ok((ndx, false))
            }
            None => {
                let ndx = self.keys.size(arena)?;
                self.keys.add(arena, key)?;
                self.values.add(arena, value)?;
                Ok((ndx, true))
            }
        }
    }

    /// Looks up `key`, inserting a null entry when absent. Returns the entry
    /// position and whether an entry was created.
    pub fn get_or_insert_placeholder(
        self,
        arena: &mut StoreArena,
        key: Value,
    ) -> Result<(usize, bool)> {
        check_key(&key)?;
        match self.find_first(arena, &key)? {
            Some(ndx) => Ok((ndx, false)),
            None => {
                let ndx = self.keys.size(arena)?;
                self.keys.add(arena, key)?;
                self.values.add(arena, Value::Null)?;
                Ok((ndx, true))
            }
        }
    }

    /// Removes the entry at position `ndx`.
    pub fn erase_at(self, arena: &mut StoreArena, ndx: usize) -> Result<()> {
        self.keys.erase(arena, ndx)?;
        self.values.erase(arena, ndx)
    }

    /// Removes the entry for `key`. Returns whether an entry was removed.
    pub fn erase_key(self, arena: &mut StoreArena, key: &Value) -> Result<bool> {
        match self.find_first(arena, key)? {
            Some(ndx) => {
                self.erase_at(arena, ndx)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Removes all entries.
    pub fn clear(self, arena: &mut StoreArena) -> Result<()> {
        self.keys.clear(arena)?;
        self.values.clear(arena)
    }

    /// All entries in storage order.
    pub fn entries(self, arena: &StoreArena) -> Result<Vec<(Value, Value)>> {
        let size = self.size(arena)?;
        let mut out = Vec::with_capacity(size);
        for ndx in 0..size {
            out.push(self.get_at(arena, ndx)?);
        }
        Ok(out)
    }

    /// Storage-order equality with another dictionary.
    pub fn eq(self, arena: &StoreArena, other: DictCore) -> Result<bool> {
        Ok(self.entries(arena)? == other.entries(arena)?)
    }

    /// Allocates an independent copy of both sequences.
    pub fn deep_copy(self, arena: &mut StoreArena) -> Result<DictCore> {
        Ok(Self {
            keys: self.keys.deep_copy(arena)?,
            values: self.values.deep_copy(arena)?,
        })
    }

    /// Clones any sequence block shared with a committed version. Returns
    /// whether a block relocated, in which case the owning row cell must be
    /// updated with the new [`DictRefs`].
    pub fn ensure_writeable(&mut self, arena: &mut StoreArena) -> Result<bool> {
        let k = self.keys.ensure_writeable(arena)?;
        let v = self.values.ensure_writeable(arena)?;
        Ok(k || v)
    }
}

/// Keys must be equal to themselves under value equality, or update-or-
/// insert could never find them again: null and non-finite floats (NaN is
/// never equal to itself) are rejected up front.
fn check_key(key: &Value) -> Result<()> {
    match key {
        Value::Null => Err(CairnError::Invalid("null dictionary key")),
        Value::Float(f) if !f.is_finite() => {
            Err(CairnError::Invalid("non-finite float dictionary key"))
        }
        _ => Ok(()),
    }
}

#[derive(Clone, Copy, Debug)]
struct Cached {
    refs: DictRefs,
    version: u64,
}

/// Attached dictionary view, pinned to an owning object and column.
///
/// The view never stores block refs across arena mutations: it remembers the
/// refs it last resolved together with the arena content version, and
/// re-resolves through the owning object whenever the content version has
/// moved on. An erased owner surfaces as `NotFound`.
#[derive(Debug)]
pub struct Dictionary {
    owner: ObjKey,
    col: ColIx,
    cached: Cell<Option<Cached>>,
}

impl Dictionary {
    /// Creates a view over the dictionary cell of `owner` at column `col`.
    pub fn new(owner: ObjKey, col: ColIx) -> Self {
        Self {
            owner,
            col,
            cached: Cell::new(None),
        }
    }

    /// Owning object key.
    pub fn owner(&self) -> ObjKey {
        self.owner
    }

    /// Dictionary column.
    pub fn col(&self) -> ColIx {
        self.col
    }

    fn owner_cell(&self, table: &Table, arena: &StoreArena) -> Result<ClusterState> {
        table.tree().get(arena, self.owner)
    }

    /// Resolves the stored refs, consulting the cache first. `None` means
    /// the cell is empty: no entry was ever inserted.
    fn resolve(&self, table: &Table, arena: &StoreArena) -> Result<Option<DictCore>> {
        let version = arena.content_version();
        if let Some(cached) = self.cached.get() {
            if cached.version == version {
                return Ok(Some(DictCore::from_refs(cached.refs)));
            }
        }
        let state = self.owner_cell(table, arena)?;
        let refs = arena
            .translate(state.node)?
            .as_leaf()?
            .column(self.col)?
            .dict_refs(state.index)?;
        if let Some(refs) = refs {
            trace!(
                owner = self.owner.0,
                col = self.col.0,
                version,
                "dict.view.refresh"
            );
            self.cached.set(Some(Cached { refs, version }));
        }
        Ok(refs.map(DictCore::from_refs))
    }

    /// Resolves a writeable core, creating the storage on first write and
    /// writing relocated refs back into the owning row cell. The returned
    /// core is exclusively owned by the in-progress write.
    fn writeable(&self, table: &mut Table, arena: &mut StoreArena) -> Result<DictCore> {
        // Any write invalidates the cached refs; re-resolve afterwards.
        self.cached.set(None);
        let state = table.tree_mut().ensure_writeable(arena, self.owner)?;
        let refs = arena
            .translate(state.node)?
            .as_leaf()?
            .column(self.col)?
            .dict_refs(state.index)?;
        let (core, relocated) = match refs {
            Some(refs) => {
                let mut core = DictCore::from_refs(refs);
                let relocated = core.ensure_writeable(arena)?;
                (core, relocated)
            }
            None => (DictCore::create(arena), true),
        };
        if relocated {
            arena
                .translate_mut(state.node)?
                .as_leaf_mut()?
                .column_mut(self.col)?
                .set_dict_refs(state.index, Some(core.refs()))?;
        }
        Ok(core)
    }

    /// Number of entries. Zero when nothing was ever inserted.
    pub fn size(&self, table: &Table, arena: &StoreArena) -> Result<usize> {
        match self.resolve(table, arena)? {
            Some(core) => core.size(arena),
            None => Ok(0),
        }
    }

    /// Whether `key` has an entry.
    pub fn contains_key(&self, table: &Table, arena: &StoreArena, key: &Value) -> Result<bool> {
        match self.resolve(table, arena)? {
            Some(core) => Ok(core.find_first(arena, key)?.is_some()),
            None => Ok(false),
        }
    }

    /// Value stored under `key`.
    pub fn get(&self, table: &Table, arena: &StoreArena, key: &Value) -> Result<Value> {
        match self.resolve(table, arena)? {
            Some(core) => core.get(arena, key),
            None => Err(CairnError::NotFound("dictionary key")),
        }
    }

    /// Entry at position `ndx` in storage order.
    pub fn get_by_position(
        &self,
        table: &Table,
        arena: &StoreArena,
        ndx: usize,
    ) -> Result<(Value, Value)> {
        match self.resolve(table, arena)? {
            Some(core) => core.get_at(arena, ndx),
            None => Err(CairnError::NotFound("index")),
        }
    }

    /// Update-or-insert. Returns the entry position and whether the entry
    /// was newly inserted.
    pub fn insert(
        &self,
        table: &mut Table,
        arena: &mut StoreArena,
        key: Value,
        value: Value,
    ) -> Result<(usize, bool)> {
        let core = self.writeable(table, arena)?;
        core.insert(arena, key, value)
    }

    /// Overwrites the value at position `ndx`.
    pub fn set_by_position(
        &self,
        table: &mut Table,
        arena: &mut StoreArena,
        ndx: usize,
        value: Value,
    ) -> Result<()> {
        if self.resolve(table, arena)?.is_none() {
            return Err(CairnError::NotFound("index"));
        }
        let core = self.writeable(table, arena)?;
        core.set_at(arena, ndx, value)
    }

    /// Looks up `key`, inserting a null entry when absent.
    pub fn get_or_insert_placeholder(
        &self,
        table: &mut Table,
        arena: &mut StoreArena,
        key: Value,
    ) -> Result<(usize, bool)> {
        let core = self.writeable(table, arena)?;
        core.get_or_insert_placeholder(arena, key)
    }

    /// Removes the entry for `key`. A missing key is a no-op; returns
    /// whether an entry was removed.
    pub fn erase(&self, table: &mut Table, arena: &mut StoreArena, key: &Value) -> Result<bool> {
        if self.resolve(table, arena)?.is_none() {
            return Ok(false);
        }
        let core = self.writeable(table, arena)?;
        core.erase_key(arena, key)
    }

    /// Removes all entries. A no-op when no storage was ever created.
    pub fn clear(&self, table: &mut Table, arena: &mut StoreArena) -> Result<()> {
        if self.resolve(table, arena)?.is_none() {
            return Ok(());
        }
        let core = self.writeable(table, arena)?;
        core.clear(arena)
    }

    /// All entries in storage order.
    pub fn entries(&self, table: &Table, arena: &StoreArena) -> Result<Vec<(Value, Value)>> {
        match self.resolve(table, arena)? {
            Some(core) => core.entries(arena),
            None => Ok(Vec::new()),
        }
    }

    /// Cursor over the entries in storage order.
    pub fn cursor(&self) -> DictCursor<'_> {
        DictCursor { dict: self, pos: 0 }
    }
}

/// Position-based cursor over a dictionary view. Re-resolves the view on
/// every step, so it tolerates copy-on-write relocation between steps;
/// entries inserted or erased mid-iteration may be skipped or seen twice,
/// as with any position-based scan.
#[derive(Debug)]
pub struct DictCursor<'a> {
    dict: &'a Dictionary,
    pos: usize,
}

impl DictCursor<'_> {
    /// Next entry, or `None` past the end.
    pub fn next(&mut self, table: &Table, arena: &StoreArena) -> Result<Option<(Value, Value)>> {
        if self.pos >= self.dict.size(table, arena)? {
            return Ok(None);
        }
        let entry = self.dict.get_by_position(table, arena, self.pos)?;
        self.pos += 1;
        Ok(Some(entry))
    }
}
