//! Cairn: an embedded, transactional, copy-on-write object store.
//!
//! Objects live in tables, each backed by a cluster tree: a shallow
//! key-ordered tree whose leaves hold rows in column-major form under
//! compact relative keys. Every object is addressable both by its stable
//! 64-bit key and by its position in key order. Writes never touch blocks
//! owned by a committed version; the arena clones shared blocks on first
//! write, so readers of an older version keep a consistent snapshot.
//!
//! Link columns maintain paired backlink columns automatically, strong
//! links cascade deletion to orphaned targets, and dictionary cells store
//! key/value collections through views that survive copy-on-write
//! relocation.
//!
//! ```
//! use cairn::cluster::StoreArena;
//! use cairn::schema::ColumnSpec;
//! use cairn::table::Table;
//! use cairn::types::{ColIx, DataType, Value};
//!
//! # fn main() -> cairn::Result<()> {
//! let mut arena = StoreArena::new();
//! let mut table = Table::new(
//!     &mut arena,
//!     vec![ColumnSpec::new("name", DataType::String, false)],
//! )?;
//! let key = table.create_object(&mut arena)?;
//! table.set_value(&mut arena, key, ColIx(0), Value::Str("cairn".into()))?;
//! assert_eq!(
//!     table.get_value(&arena, key, ColIx(0))?,
//!     Value::Str("cairn".into())
//! );
//! arena.commit();
//! # Ok(())
//! # }
//! ```

pub mod arena;
pub mod cluster;
pub mod column;
pub mod dict;
pub mod error;
pub mod schema;
pub mod seq;
pub mod table;
pub mod types;

pub use error::{CairnError, Result};
