//! The closed tagged-kind value graph the engines traverse.

use crate::descriptor::RecordShape;
use parking_lot::{RwLock, RwLockReadGuard};
use std::fmt;
use std::sync::Arc;

/// The closed set of value kinds. Every engine dispatch resolves against
/// this enum rather than open-ended trait objects.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Kind {
    Nil,
    Bool,
    Int,
    Uint,
    Float,
    Str,
    Bytes,
    Seq,
    Map,
    Record,
    Shared,
    Ext,
}

impl fmt::Display for Kind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Kind::Nil => "nil",
            Kind::Bool => "bool",
            Kind::Int => "int",
            Kind::Uint => "uint",
            Kind::Float => "float",
            Kind::Str => "str",
            Kind::Bytes => "bytes",
            Kind::Seq => "seq",
            Kind::Map => "map",
            Kind::Record => "record",
            Kind::Shared => "shared",
            Kind::Ext => "ext",
        };
        write!(f, "{}", s)
    }
}

/// An opaque extension value: a wire tag plus a custom-encoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtValue {
    pub tag: u64,
    pub data: Vec<u8>,
}

/// A value graph node.
///
/// `Map` preserves insertion order; canonical mode reorders keys at encode
/// time without mutating the value. `Shared` nodes give a subgraph aliasable
/// identity, which is what cycle detection keys on.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    Seq(Vec<Value>),
    Map(Vec<(Value, Value)>),
    Record(Record),
    Shared(SharedValue),
    Ext(ExtValue),
}

impl Value {
    pub fn kind(&self) -> Kind {
        match self {
            Value::Nil => Kind::Nil,
            Value::Bool(_) => Kind::Bool,
            Value::Int(_) => Kind::Int,
            Value::Uint(_) => Kind::Uint,
            Value::Float(_) => Kind::Float,
            Value::Str(_) => Kind::Str,
            Value::Bytes(_) => Kind::Bytes,
            Value::Seq(_) => Kind::Seq,
            Value::Map(_) => Kind::Map,
            Value::Record(_) => Kind::Record,
            Value::Shared(_) => Kind::Shared,
            Value::Ext(_) => Kind::Ext,
        }
    }

    /// Whether this value is its kind's zero value. Drives `omit_empty`.
    pub fn is_empty(&self) -> bool {
        match self {
            Value::Nil => true,
            Value::Bool(b) => !b,
            Value::Int(v) => *v == 0,
            Value::Uint(v) => *v == 0,
            Value::Float(v) => *v == 0.0,
            Value::Str(s) => s.is_empty(),
            Value::Bytes(b) => b.is_empty(),
            Value::Seq(s) => s.is_empty(),
            Value::Map(m) => m.is_empty(),
            Value::Record(_) | Value::Ext(_) => false,
            Value::Shared(s) => s.read().is_empty(),
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self {
            Value::Int(v) => Some(*v),
            Value::Uint(v) => i64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_uint(&self) -> Option<u64> {
        match self {
            Value::Uint(v) => Some(*v),
            Value::Int(v) => u64::try_from(*v).ok(),
            _ => None,
        }
    }

    pub fn as_float(&self) -> Option<f64> {
        match self {
            Value::Float(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_bytes(&self) -> Option<&[u8]> {
        match self {
            Value::Bytes(b) => Some(b),
            _ => None,
        }
    }

    pub fn as_seq(&self) -> Option<&[Value]> {
        match self {
            Value::Seq(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_map(&self) -> Option<&[(Value, Value)]> {
        match self {
            Value::Map(m) => Some(m),
            _ => None,
        }
    }

    /// Looks up a map entry by string key.
    pub fn map_get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Map(m) => m
                .iter()
                .find(|(k, _)| k.as_str() == Some(key))
                .map(|(_, v)| v),
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

impl From<i32> for Value {
    fn from(v: i32) -> Self {
        Value::Int(v as i64)
    }
}

impl From<u64> for Value {
    fn from(v: u64) -> Self {
        Value::Uint(v)
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Float(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<Vec<u8>> for Value {
    fn from(v: Vec<u8>) -> Self {
        Value::Bytes(v)
    }
}

impl From<Vec<Value>> for Value {
    fn from(v: Vec<Value>) -> Self {
        Value::Seq(v)
    }
}

/// A reference node: an aliasable, interiorly mutable slot in a value graph.
///
/// Cloning shares identity. Two clones of one `SharedValue` are the same
/// node to the cycle detector; building a cycle means storing a clone of a
/// node somewhere beneath itself.
#[derive(Debug, Clone)]
pub struct SharedValue(Arc<RwLock<Value>>);

impl SharedValue {
    pub fn new(v: Value) -> Self {
        Self(Arc::new(RwLock::new(v)))
    }

    /// Replaces the contained value.
    pub fn set(&self, v: Value) {
        *self.0.write() = v;
    }

    /// Clones the contained value out.
    pub fn get(&self) -> Value {
        self.0.read().clone()
    }

    /// Stable identity for the lifetime of the node.
    pub fn id(&self) -> usize {
        Arc::as_ptr(&self.0) as *const () as usize
    }

    /// Read access without cloning. Recursive reads are legal because the
    /// encoder may traverse the same node from a nested position when cycle
    /// detection is off.
    pub(crate) fn read(&self) -> RwLockReadGuard<'_, Value> {
        self.0.read_recursive()
    }

    /// Write access for decode-into.
    pub(crate) fn write(&self) -> parking_lot::RwLockWriteGuard<'_, Value> {
        self.0.write()
    }
}

impl PartialEq for SharedValue {
    fn eq(&self, other: &Self) -> bool {
        if Arc::ptr_eq(&self.0, &other.0) {
            return true;
        }
        *self.read() == *other.read()
    }
}

/// An instance of a [`RecordShape`]: one value slot per direct field.
///
/// Embedded fields hold a nested `Value::Record` so that flattened field
/// paths resolve through them.
#[derive(Debug, Clone)]
pub struct Record {
    shape: Arc<RecordShape>,
    fields: Vec<Value>,
}

impl Record {
    /// Creates a record with every field at its zero value. Embedded slots
    /// are initialized to empty nested records so field paths stay valid.
    pub fn new(shape: Arc<RecordShape>) -> Self {
        let fields = shape
            .fields()
            .iter()
            .map(|f| match f.embedded() {
                Some(nested) => Value::Record(Record::new(nested.clone())),
                None => Value::Nil,
            })
            .collect();
        Self { shape, fields }
    }

    pub fn shape(&self) -> &Arc<RecordShape> {
        &self.shape
    }

    /// Sets a direct field by declared name. Returns false if the shape has
    /// no such field.
    pub fn set(&mut self, name: &str, v: Value) -> bool {
        match self.shape.index_of(name) {
            Some(i) => {
                self.fields[i] = v;
                true
            }
            None => false,
        }
    }

    /// Reads a direct field by declared name.
    pub fn get(&self, name: &str) -> Option<&Value> {
        self.shape.index_of(name).map(|i| &self.fields[i])
    }

    pub(crate) fn slot(&self, i: usize) -> &Value {
        &self.fields[i]
    }

    pub(crate) fn slot_mut(&mut self, i: usize) -> &mut Value {
        &mut self.fields[i]
    }

    /// Resolves a flattened field path produced by the type model.
    pub fn field_at_path(&self, path: &[usize]) -> Option<&Value> {
        let (&first, rest) = path.split_first()?;
        let v = self.fields.get(first)?;
        if rest.is_empty() {
            return Some(v);
        }
        match v {
            Value::Record(nested) => nested.field_at_path(rest),
            _ => None,
        }
    }

    /// Mutable variant of [`Record::field_at_path`].
    pub fn field_at_path_mut(&mut self, path: &[usize]) -> Option<&mut Value> {
        let (&first, rest) = path.split_first()?;
        let v = self.fields.get_mut(first)?;
        if rest.is_empty() {
            return Some(v);
        }
        match v {
            Value::Record(nested) => nested.field_at_path_mut(rest),
            _ => None,
        }
    }
}

impl PartialEq for Record {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.shape, &other.shape) && self.fields == other.fields
    }
}
