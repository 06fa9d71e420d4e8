//! Core identifier and value types shared by every layer of the store.

use std::fmt;

/// Stable 64-bit object identifier.
///
/// Unique within a table for the lifetime of the object, never reused while
/// the table exists, and never mutated after creation.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ObjKey(pub i64);

impl ObjKey {
    /// Returns the raw key value.
    pub fn value(self) -> i64 {
        self.0
    }
}

impl fmt::Display for ObjKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "ObjKey({})", self.0)
    }
}

/// Index of a column within a table's schema.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Ord, PartialOrd, Hash)]
pub struct ColIx(pub usize);

/// Column data types understood by the payload leaf codecs.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum DataType {
    /// 64-bit signed integer.
    Int,
    /// Boolean.
    Bool,
    /// 64-bit floating point number.
    Float,
    /// Owned string.
    String,
    /// Reference to another object in the same table.
    Link,
    /// Reverse references maintained for a paired link column.
    Backlink,
    /// Per-object dictionary (two value sequences stored out of row).
    Dictionary,
}

/// Heterogeneous scalar-or-reference value.
///
/// One slot of the generic ordered map primitive, or one cell of a scalar
/// column. There is no total order across variants, which is why dictionary
/// key lookup is a linear scan rather than a binary search.
#[derive(Clone, Debug, PartialEq)]
pub enum Value {
    /// Absent value.
    Null,
    /// Boolean value.
    Bool(bool),
    /// 64-bit signed integer.
    Int(i64),
    /// 64-bit floating point number.
    Float(f64),
    /// Owned string.
    Str(String),
    /// Reference to another object.
    Link(ObjKey),
}

impl Value {
    /// Returns `true` for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Returns the integer payload, if this is an `Int`.
    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the string payload, if this is a `Str`.
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(v) => Some(v.as_str()),
            _ => None,
        }
    }

    /// Returns the boolean payload, if this is a `Bool`.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the float payload, if this is a `Float`.
    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    /// Returns the link payload, if this is a `Link`.
    pub fn as_link(&self) -> Option<ObjKey> {
        match self {
            Value::Link(k) => Some(*k),
            _ => None,
        }
    }
}

impl From<bool> for Value {
    fn from(v: bool) -> Self {
        Value::Bool(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Int(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_owned())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<ObjKey> for Value {
    fn from(k: ObjKey) -> Self {
        Value::Link(k)
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Bool(v) => write!(f, "{v}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Str(v) => write!(f, "{v}"),
            Value::Link(k) => write!(f, "{k}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn equality_is_type_sensitive() {
        assert_ne!(Value::Int(1), Value::Float(1.0));
        assert_ne!(Value::Null, Value::Int(0));
        assert_eq!(Value::Str("a".into()), Value::from("a"));
        assert_eq!(Value::Link(ObjKey(7)), Value::from(ObjKey(7)));
    }

    #[test]
    fn accessors_reject_other_variants() {
        assert_eq!(Value::Int(3).as_int(), Some(3));
        assert_eq!(Value::Int(3).as_str(), None);
        assert!(Value::Null.is_null());
    }
}
