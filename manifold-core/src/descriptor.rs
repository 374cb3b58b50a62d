//! Runtime type shapes.
//!
//! A [`RecordShape`] describes a structured type the way the engine needs to
//! see it: an ordered list of fields with their wire options. Shapes are
//! built once, validated, and shared behind `Arc`; the `Arc` pointer doubles
//! as the type identity the model cache and extension registry key on.

use crate::error::Error;
use crate::value::Record;
use fxhash::FxHashMap;
use std::fmt;
use std::sync::Arc;

/// Custom encode half of a self-describing shape codec.
pub type ExtEncodeFn = Arc<dyn Fn(&Record) -> Result<Vec<u8>, Error> + Send + Sync>;

/// Custom decode half of a self-describing shape codec.
pub type ExtDecodeFn = Arc<dyn Fn(&[u8]) -> Result<Record, Error> + Send + Sync>;

/// A custom wire codec attached directly to a shape. Takes precedence over
/// any registry entry for the same shape.
#[derive(Clone)]
pub struct ShapeCodec {
    pub tag: u64,
    pub encode: ExtEncodeFn,
    pub decode: ExtDecodeFn,
}

/// Identity of a shape for cache and registry keys. Stable for as long as
/// any `Arc` to the shape is alive.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ShapeId(usize);

impl ShapeId {
    pub fn of(shape: &Arc<RecordShape>) -> Self {
        ShapeId(Arc::as_ptr(shape) as *const () as usize)
    }
}

/// One field of a [`RecordShape`].
#[derive(Clone)]
pub struct FieldSpec {
    name: String,
    wire_name: Option<String>,
    omit_empty: bool,
    no_extension: bool,
    embedded: Option<Arc<RecordShape>>,
}

impl FieldSpec {
    /// A plain named field.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            wire_name: None,
            omit_empty: false,
            no_extension: false,
            embedded: None,
        }
    }

    /// An embedded (anonymous) field whose own fields flatten into the
    /// containing shape.
    pub fn embed(name: impl Into<String>, shape: Arc<RecordShape>) -> Self {
        Self {
            name: name.into(),
            wire_name: None,
            omit_empty: false,
            no_extension: false,
            embedded: Some(shape),
        }
    }

    /// Explicit wire-name override. Wins name collisions regardless of
    /// embedding depth.
    pub fn rename(mut self, wire: impl Into<String>) -> Self {
        self.wire_name = Some(wire.into());
        self
    }

    /// Skip this field when its value is the kind's zero value.
    pub fn omit_empty(mut self) -> Self {
        self.omit_empty = true;
        self
    }

    /// Encode this field structurally even if its shape has an extension.
    pub fn no_extension(mut self) -> Self {
        self.no_extension = true;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn wire_name(&self) -> Option<&str> {
        self.wire_name.as_deref()
    }

    pub fn is_omit_empty(&self) -> bool {
        self.omit_empty
    }

    pub fn is_no_extension(&self) -> bool {
        self.no_extension
    }

    pub fn embedded(&self) -> Option<&Arc<RecordShape>> {
        self.embedded.as_ref()
    }
}

impl fmt::Debug for FieldSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FieldSpec")
            .field("name", &self.name)
            .field("wire_name", &self.wire_name)
            .field("omit_empty", &self.omit_empty)
            .field("embedded", &self.embedded.as_ref().map(|s| s.name()))
            .finish()
    }
}

/// A validated, immutable type shape.
///
/// Mutual embedding cycles cannot be constructed: embedding requires an
/// already-built `Arc<RecordShape>`, so shapes form a DAG.
pub struct RecordShape {
    name: String,
    fields: Vec<FieldSpec>,
    index: FxHashMap<String, usize>,
    codec: Option<ShapeCodec>,
}

impl RecordShape {
    /// Starts building a shape with the given type name.
    pub fn new(name: impl Into<String>) -> RecordShapeBuilder {
        RecordShapeBuilder {
            name: name.into(),
            fields: Vec::new(),
            codec: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    /// Slot index of a direct field by declared name.
    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.index.get(name).copied()
    }

    pub fn codec(&self) -> Option<&ShapeCodec> {
        self.codec.as_ref()
    }
}

impl fmt::Debug for RecordShape {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordShape")
            .field("name", &self.name)
            .field("fields", &self.fields)
            .field("has_codec", &self.codec.is_some())
            .finish()
    }
}

/// Builder for [`RecordShape`]. Validation happens once, at build.
pub struct RecordShapeBuilder {
    name: String,
    fields: Vec<FieldSpec>,
    codec: Option<ShapeCodec>,
}

impl RecordShapeBuilder {
    pub fn field(mut self, spec: FieldSpec) -> Self {
        self.fields.push(spec);
        self
    }

    /// Attaches a self-describing wire codec.
    pub fn codec<E, D>(mut self, tag: u64, encode: E, decode: D) -> Self
    where
        E: Fn(&Record) -> Result<Vec<u8>, Error> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<Record, Error> + Send + Sync + 'static,
    {
        self.codec = Some(ShapeCodec {
            tag,
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        });
        self
    }

    pub fn build(self) -> Result<Arc<RecordShape>, Error> {
        if self.name.is_empty() {
            return Err(Error::structural("<unnamed>", "empty type name"));
        }
        let mut index = FxHashMap::default();
        for (i, f) in self.fields.iter().enumerate() {
            if f.name.is_empty() {
                return Err(Error::structural(&self.name, "empty field name"));
            }
            if let Some(w) = &f.wire_name {
                if w.is_empty() {
                    return Err(Error::structural(
                        &self.name,
                        format!("empty wire name on field `{}`", f.name),
                    ));
                }
            }
            if index.insert(f.name.clone(), i).is_some() {
                return Err(Error::structural(
                    &self.name,
                    format!("duplicate field `{}`", f.name),
                ));
            }
        }
        Ok(Arc::new(RecordShape {
            name: self.name,
            fields: self.fields,
            index,
            codec: self.codec,
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_and_index() {
        let shape = RecordShape::new("User")
            .field(FieldSpec::new("id"))
            .field(FieldSpec::new("name").rename("display_name").omit_empty())
            .build()
            .unwrap();
        assert_eq!(shape.name(), "User");
        assert_eq!(shape.index_of("name"), Some(1));
        assert_eq!(shape.fields()[1].wire_name(), Some("display_name"));
        assert!(shape.fields()[1].is_omit_empty());
    }

    #[test]
    fn test_duplicate_field_rejected() {
        let err = RecordShape::new("T")
            .field(FieldSpec::new("a"))
            .field(FieldSpec::new("a"))
            .build()
            .unwrap_err();
        assert!(matches!(err, Error::Structural { .. }));
    }

    #[test]
    fn test_empty_names_rejected() {
        assert!(RecordShape::new("").build().is_err());
        assert!(RecordShape::new("T")
            .field(FieldSpec::new(""))
            .build()
            .is_err());
        assert!(RecordShape::new("T")
            .field(FieldSpec::new("a").rename(""))
            .build()
            .is_err());
    }

    #[test]
    fn test_shape_identity() {
        let a = RecordShape::new("A").build().unwrap();
        let b = RecordShape::new("A").build().unwrap();
        assert_eq!(ShapeId::of(&a), ShapeId::of(&a.clone()));
        assert_ne!(ShapeId::of(&a), ShapeId::of(&b));
    }
}
