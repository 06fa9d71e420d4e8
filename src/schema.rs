//! Table schema: column definitions consumed by the cluster layer.
//!
//! Every link column is implicitly paired with a backlink column that keeps
//! the reverse references needed for cascade detection. The pair is created
//! and removed together.

use crate::error::{CairnError, Result};
use crate::types::{ColIx, DataType};

/// Definition of a single column.
#[derive(Clone, Debug)]
pub struct ColumnSpec {
    /// Column name, unique within the schema.
    pub name: String,
    /// Column data type.
    pub ty: DataType,
    /// Whether the column accepts nulls.
    pub nullable: bool,
    /// Link columns only: a strong link owns its target, so losing the last
    /// inbound strong reference cascades the target's deletion.
    pub strong: bool,
    /// Backlink columns only: the link column these reverse references
    /// belong to.
    pub backlink_of: Option<ColIx>,
    /// Link columns only: the paired backlink column.
    pub backlink_col: Option<ColIx>,
}

impl ColumnSpec {
    /// Creates a scalar column spec.
    pub fn new(name: &str, ty: DataType, nullable: bool) -> Self {
        Self {
            name: name.to_owned(),
            ty,
            nullable,
            strong: false,
            backlink_of: None,
            backlink_col: None,
        }
    }

    /// Creates a link column spec. Links are always nullable.
    pub fn link(name: &str, strong: bool) -> Self {
        Self {
            name: name.to_owned(),
            ty: DataType::Link,
            nullable: true,
            strong,
            backlink_of: None,
            backlink_col: None,
        }
    }

    /// Creates a dictionary column spec.
    pub fn dictionary(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            ty: DataType::Dictionary,
            nullable: true,
            strong: false,
            backlink_of: None,
            backlink_col: None,
        }
    }
}

/// Ordered list of column definitions for one table.
#[derive(Clone, Debug, Default)]
pub struct Schema {
    cols: Vec<ColumnSpec>,
}

impl Schema {
    /// Creates an empty schema.
    pub fn new() -> Self {
        Self { cols: Vec::new() }
    }

    /// Builds a schema from user-facing specs, pairing each link column
    /// with its backlink column.
    pub fn with_columns(specs: Vec<ColumnSpec>) -> Result<Self> {
        let mut schema = Self::new();
        for spec in specs {
            schema.add_column(spec)?;
        }
        Ok(schema)
    }

    /// Appends a column; link columns get a paired backlink column appended
    /// right after. Returns the new column's index and, for links, the
    /// backlink column's index.
    pub fn add_column(&mut self, spec: ColumnSpec) -> Result<(ColIx, Option<ColIx>)> {
        if spec.ty == DataType::Backlink {
            return Err(CairnError::Invalid(
                "backlink columns are managed by their link column",
            ));
        }
        if self.cols.iter().any(|c| c.name == spec.name) {
            return Err(CairnError::Invalid("duplicate column name"));
        }
        let ix = ColIx(self.cols.len());
        let is_link = spec.ty == DataType::Link;
        let strong = spec.strong;
        let mut spec = spec;
        if is_link {
            spec.backlink_col = Some(ColIx(self.cols.len() + 1));
        }
        let name = spec.name.clone();
        self.cols.push(spec);
        if is_link {
            let bl_ix = ColIx(self.cols.len());
            self.cols.push(ColumnSpec {
                name: format!("{name}#backlink"),
                ty: DataType::Backlink,
                nullable: false,
                strong,
                backlink_of: Some(ix),
                backlink_col: None,
            });
            Ok((ix, Some(bl_ix)))
        } else {
            Ok((ix, None))
        }
    }

    /// Removes a column; a link column removes its paired backlink column as
    /// well. Returns the removed indices in descending order so the caller
    /// can mirror the removal on every cluster leaf.
    pub fn remove_column(&mut self, col: ColIx) -> Result<Vec<usize>> {
        let spec = self.col(col)?;
        if spec.ty == DataType::Backlink {
            return Err(CairnError::Invalid(
                "backlink columns are removed with their link column",
            ));
        }
        let mut removed = vec![col.0];
        if let Some(bl) = spec.backlink_col {
            removed.push(bl.0);
        }
        removed.sort_unstable();
        removed.reverse();
        for &ix in &removed {
            self.cols.remove(ix);
            for c in &mut self.cols {
                if let Some(other) = c.backlink_of {
                    if other.0 > ix {
                        c.backlink_of = Some(ColIx(other.0 - 1));
                    }
                }
                if let Some(other) = c.backlink_col {
                    if other.0 > ix {
                        c.backlink_col = Some(ColIx(other.0 - 1));
                    }
                }
            }
        }
        Ok(removed)
    }

    /// Resolves a column index.
    pub fn col(&self, ix: ColIx) -> Result<&ColumnSpec> {
        self.cols
            .get(ix.0)
            .ok_or(CairnError::NotFound("column index"))
    }

    /// Looks a column up by name.
    pub fn col_ix(&self, name: &str) -> Option<ColIx> {
        self.cols.iter().position(|c| c.name == name).map(ColIx)
    }

    /// All column definitions in schema order.
    pub fn cols(&self) -> &[ColumnSpec] {
        &self.cols
    }

    /// Number of columns, backlink columns included.
    pub fn len(&self) -> usize {
        self.cols.len()
    }

    /// `true` when no columns are defined.
    pub fn is_empty(&self) -> bool {
        self.cols.is_empty()
    }
}
