//! Payload leaf codecs: per-column typed storage inside a cluster leaf.
//!
//! One [`ColumnLeaf`] holds a single column's values for every row of one
//! cluster, indexed by row position. The variant set is closed and dispatch
//! is by match; all leaves of a cluster stay length-synchronized with its
//! key container.

use crate::arena::BlockRef;
use crate::error::{CairnError, Result};
use crate::types::{DataType, ObjKey, Value};
use smallvec::SmallVec;

/// Reverse references stored per row for one paired link column.
pub type BacklinkSet = SmallVec<[ObjKey; 2]>;

/// Refs to the two out-of-row sequences backing one dictionary cell.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub struct DictRefs {
    /// Key sequence block.
    pub keys: BlockRef,
    /// Value sequence block.
    pub values: BlockRef,
}

/// Typed storage for one column of one cluster leaf.
#[derive(Clone, Debug)]
pub enum ColumnLeaf {
    /// Integer cells.
    Int(Vec<Option<i64>>),
    /// Boolean cells.
    Bool(Vec<Option<bool>>),
    /// Float cells.
    Float(Vec<Option<f64>>),
    /// String cells.
    String(Vec<Option<String>>),
    /// Link cells.
    Link(Vec<Option<ObjKey>>),
    /// Backlink cells (reverse reference lists).
    Backlink(Vec<BacklinkSet>),
    /// Dictionary cells (refs to out-of-row storage).
    Dict(Vec<Option<DictRefs>>),
}

impl ColumnLeaf {
    /// Creates an empty leaf for the given column type.
    pub fn init(ty: DataType) -> Self {
        match ty {
            DataType::Int => ColumnLeaf::Int(Vec::new()),
            DataType::Bool => ColumnLeaf::Bool(Vec::new()),
            DataType::Float => ColumnLeaf::Float(Vec::new()),
            DataType::String => ColumnLeaf::String(Vec::new()),
            DataType::Link => ColumnLeaf::Link(Vec::new()),
            DataType::Backlink => ColumnLeaf::Backlink(Vec::new()),
            DataType::Dictionary => ColumnLeaf::Dict(Vec::new()),
        }
    }

    /// The column type this leaf stores.
    pub fn data_type(&self) -> DataType {
        match self {
            ColumnLeaf::Int(_) => DataType::Int,
            ColumnLeaf::Bool(_) => DataType::Bool,
            ColumnLeaf::Float(_) => DataType::Float,
            ColumnLeaf::String(_) => DataType::String,
            ColumnLeaf::Link(_) => DataType::Link,
            ColumnLeaf::Backlink(_) => DataType::Backlink,
            ColumnLeaf::Dict(_) => DataType::Dictionary,
        }
    }

    /// Number of rows stored.
    pub fn len(&self) -> usize {
        match self {
            ColumnLeaf::Int(v) => v.len(),
            ColumnLeaf::Bool(v) => v.len(),
            ColumnLeaf::Float(v) => v.len(),
            ColumnLeaf::String(v) => v.len(),
            ColumnLeaf::Link(v) => v.len(),
            ColumnLeaf::Backlink(v) => v.len(),
            ColumnLeaf::Dict(v) => v.len(),
        }
    }

    /// `true` when no rows are stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Reads the scalar value at `ndx`. Backlink and dictionary leaves have
    /// no scalar representation.
    pub fn get(&self, ndx: usize) -> Result<Value> {
        match self {
            ColumnLeaf::Int(v) => cell(v, ndx).map(|c| c.map_or(Value::Null, Value::Int)),
            ColumnLeaf::Bool(v) => cell(v, ndx).map(|c| c.map_or(Value::Null, Value::Bool)),
            ColumnLeaf::Float(v) => cell(v, ndx).map(|c| c.map_or(Value::Null, Value::Float)),
            ColumnLeaf::String(v) => {
                cell_ref(v, ndx).map(|c| c.clone().map_or(Value::Null, Value::Str))
            }
            ColumnLeaf::Link(v) => cell(v, ndx).map(|c| c.map_or(Value::Null, Value::Link)),
            ColumnLeaf::Backlink(_) => Err(CairnError::Invalid(
                "backlink column has no scalar value",
            )),
            ColumnLeaf::Dict(_) => Err(CairnError::Invalid(
                "dictionary column accessed as scalar",
            )),
        }
    }

    /// Writes the scalar value at `ndx`; the value type must match the
    /// column type. Nullability is enforced one layer up.
    pub fn set(&mut self, ndx: usize, value: Value) -> Result<()> {
        match (self, value) {
            (ColumnLeaf::Int(v), Value::Int(x)) => *cell_mut(v, ndx)? = Some(x),
            (ColumnLeaf::Int(v), Value::Null) => *cell_mut(v, ndx)? = None,
            (ColumnLeaf::Bool(v), Value::Bool(x)) => *cell_mut(v, ndx)? = Some(x),
            (ColumnLeaf::Bool(v), Value::Null) => *cell_mut(v, ndx)? = None,
            (ColumnLeaf::Float(v), Value::Float(x)) => *cell_mut(v, ndx)? = Some(x),
            (ColumnLeaf::Float(v), Value::Null) => *cell_mut(v, ndx)? = None,
            (ColumnLeaf::String(v), Value::Str(x)) => *cell_mut(v, ndx)? = Some(x),
            (ColumnLeaf::String(v), Value::Null) => *cell_mut(v, ndx)? = None,
            (ColumnLeaf::Link(v), Value::Link(x)) => *cell_mut(v, ndx)? = Some(x),
            (ColumnLeaf::Link(v), Value::Null) => *cell_mut(v, ndx)? = None,
            _ => return Err(CairnError::Invalid("value type does not match column")),
        }
        Ok(())
    }

    /// Inserts a default-initialized cell at `ndx`: null for nullable
    /// columns, the type's zero value otherwise.
    pub fn insert(&mut self, ndx: usize, nullable: bool) -> Result<()> {
        if ndx > self.len() {
            return Err(CairnError::NotFound("row index"));
        }
        match self {
            ColumnLeaf::Int(v) => v.insert(ndx, if nullable { None } else { Some(0) }),
            ColumnLeaf::Bool(v) => v.insert(ndx, if nullable { None } else { Some(false) }),
            ColumnLeaf::Float(v) => v.insert(ndx, if nullable { None } else { Some(0.0) }),
            ColumnLeaf::String(v) => {
                v.insert(ndx, if nullable { None } else { Some(String::new()) })
            }
            // Links and dictionaries start absent regardless of nullability.
            ColumnLeaf::Link(v) => v.insert(ndx, None),
            ColumnLeaf::Backlink(v) => v.insert(ndx, BacklinkSet::new()),
            ColumnLeaf::Dict(v) => v.insert(ndx, None),
        }
        Ok(())
    }

    /// Removes the cell at `ndx`.
    pub fn erase(&mut self, ndx: usize) -> Result<()> {
        if ndx >= self.len() {
            return Err(CairnError::NotFound("row index"));
        }
        match self {
            ColumnLeaf::Int(v) => {
                v.remove(ndx);
            }
            ColumnLeaf::Bool(v) => {
                v.remove(ndx);
            }
            ColumnLeaf::Float(v) => {
                v.remove(ndx);
            }
            ColumnLeaf::String(v) => {
                v.remove(ndx);
            }
            ColumnLeaf::Link(v) => {
                v.remove(ndx);
            }
            ColumnLeaf::Backlink(v) => {
                v.remove(ndx);
            }
            ColumnLeaf::Dict(v) => {
                v.remove(ndx);
            }
        }
        Ok(())
    }

    /// Relocates the tail starting at `from` onto the end of `dst`, which
    /// must store the same column type.
    pub fn move_tail(&mut self, from: usize, dst: &mut ColumnLeaf) -> Result<()> {
        if from > self.len() {
            return Err(CairnError::NotFound("row index"));
        }
        match (self, dst) {
            (ColumnLeaf::Int(s), ColumnLeaf::Int(d)) => d.extend(s.drain(from..)),
            (ColumnLeaf::Bool(s), ColumnLeaf::Bool(d)) => d.extend(s.drain(from..)),
            (ColumnLeaf::Float(s), ColumnLeaf::Float(d)) => d.extend(s.drain(from..)),
            (ColumnLeaf::String(s), ColumnLeaf::String(d)) => d.extend(s.drain(from..)),
            (ColumnLeaf::Link(s), ColumnLeaf::Link(d)) => d.extend(s.drain(from..)),
            (ColumnLeaf::Backlink(s), ColumnLeaf::Backlink(d)) => d.extend(s.drain(from..)),
            (ColumnLeaf::Dict(s), ColumnLeaf::Dict(d)) => d.extend(s.drain(from..)),
            _ => return Err(CairnError::Corruption("column type mismatch between siblings")),
        }
        Ok(())
    }

    /// Reads a link cell.
    pub fn link(&self, ndx: usize) -> Result<Option<ObjKey>> {
        match self {
            ColumnLeaf::Link(v) => cell(v, ndx),
            _ => Err(CairnError::Invalid("not a link column")),
        }
    }

    /// Writes a link cell without backlink bookkeeping; callers own the
    /// reverse-reference updates.
    pub fn set_link(&mut self, ndx: usize, target: Option<ObjKey>) -> Result<()> {
        match self {
            ColumnLeaf::Link(v) => {
                *cell_mut(v, ndx)? = target;
                Ok(())
            }
            _ => Err(CairnError::Invalid("not a link column")),
        }
    }

    /// Reads a backlink cell.
    pub fn backlinks(&self, ndx: usize) -> Result<&BacklinkSet> {
        match self {
            ColumnLeaf::Backlink(v) => {
                v.get(ndx).ok_or(CairnError::NotFound("row index"))
            }
            _ => Err(CairnError::Invalid("not a backlink column")),
        }
    }

    /// Records `origin` as an inbound reference on row `ndx`.
    pub fn add_backlink(&mut self, ndx: usize, origin: ObjKey) -> Result<()> {
        match self {
            ColumnLeaf::Backlink(v) => {
                let set = v.get_mut(ndx).ok_or(CairnError::NotFound("row index"))?;
                set.push(origin);
                Ok(())
            }
            _ => Err(CairnError::Invalid("not a backlink column")),
        }
    }

    /// Removes one inbound reference from `origin` on row `ndx`. Returns
    /// whether an entry was removed.
    pub fn remove_backlink(&mut self, ndx: usize, origin: ObjKey) -> Result<bool> {
        match self {
            ColumnLeaf::Backlink(v) => {
                let set = v.get_mut(ndx).ok_or(CairnError::NotFound("row index"))?;
                match set.iter().position(|k| *k == origin) {
                    Some(pos) => {
                        set.remove(pos);
                        Ok(true)
                    }
                    None => Ok(false),
                }
            }
            _ => Err(CairnError::Invalid("not a backlink column")),
        }
    }

    /// Reads a dictionary cell.
    pub fn dict_refs(&self, ndx: usize) -> Result<Option<DictRefs>> {
        match self {
            ColumnLeaf::Dict(v) => cell(v, ndx),
            _ => Err(CairnError::Invalid("not a dictionary column")),
        }
    }

    /// Writes a dictionary cell.
    pub fn set_dict_refs(&mut self, ndx: usize, refs: Option<DictRefs>) -> Result<()> {
        match self {
            ColumnLeaf::Dict(v) => {
                *cell_mut(v, ndx)? = refs;
                Ok(())
            }
            _ => Err(CairnError::Invalid("not a dictionary column")),
        }
    }
}

fn cell<T: Copy>(v: &[Option<T>], ndx: usize) -> Result<Option<T>> {
    v.get(ndx).copied().ok_or(CairnError::NotFound("row index"))
}

fn cell_ref<T>(v: &[Option<T>], ndx: usize) -> Result<&Option<T>> {
    v.get(ndx).ok_or(CairnError::NotFound("row index"))
}

fn cell_mut<T>(v: &mut [Option<T>], ndx: usize) -> Result<&mut Option<T>> {
    v.get_mut(ndx).ok_or(CairnError::NotFound("row index"))
}
