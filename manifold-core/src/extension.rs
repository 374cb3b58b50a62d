//! Registry mapping shapes to custom wire codecs.

use crate::descriptor::{ExtDecodeFn, ExtEncodeFn, RecordShape, ShapeId};
use crate::error::Error;
use crate::value::Record;
use dashmap::DashMap;
use std::sync::Arc;

/// One registered extension: a shape, its wire tag, and the codec pair.
pub struct ExtensionEntry {
    shape: Arc<RecordShape>,
    tag: u64,
    encode: ExtEncodeFn,
    decode: ExtDecodeFn,
}

impl ExtensionEntry {
    pub fn shape(&self) -> &Arc<RecordShape> {
        &self.shape
    }

    pub fn tag(&self) -> u64 {
        self.tag
    }

    pub fn encode(&self, record: &Record) -> Result<Vec<u8>, Error> {
        (self.encode)(record)
    }

    pub fn decode(&self, data: &[u8]) -> Result<Record, Error> {
        (self.decode)(data)
    }
}

/// Type-to-extension mapping consulted before generic structural encoding.
///
/// Entries are registered once and read-only thereafter. A shape that
/// carries its own codec ([`RecordShape::codec`]) is never looked up here;
/// self-description takes precedence.
#[derive(Default)]
pub struct ExtensionRegistry {
    by_shape: DashMap<ShapeId, Arc<ExtensionEntry>>,
    by_tag: DashMap<u64, Arc<ExtensionEntry>>,
}

impl ExtensionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a codec for a shape under a wire tag. Re-registering a
    /// shape or reusing a tag is an error.
    pub fn register<E, D>(
        &self,
        shape: Arc<RecordShape>,
        tag: u64,
        encode: E,
        decode: D,
    ) -> Result<(), Error>
    where
        E: Fn(&Record) -> Result<Vec<u8>, Error> + Send + Sync + 'static,
        D: Fn(&[u8]) -> Result<Record, Error> + Send + Sync + 'static,
    {
        let id = ShapeId::of(&shape);
        if self.by_shape.contains_key(&id) {
            return Err(Error::Extension {
                tag,
                detail: format!("shape `{}` already registered", shape.name()),
            });
        }
        if self.by_tag.contains_key(&tag) {
            return Err(Error::Extension {
                tag,
                detail: "tag already registered".to_string(),
            });
        }
        let entry = Arc::new(ExtensionEntry {
            shape,
            tag,
            encode: Arc::new(encode),
            decode: Arc::new(decode),
        });
        self.by_shape.insert(id, entry.clone());
        self.by_tag.insert(tag, entry);
        Ok(())
    }

    pub fn lookup_shape(&self, id: ShapeId) -> Option<Arc<ExtensionEntry>> {
        self.by_shape.get(&id).map(|e| e.clone())
    }

    pub fn lookup_tag(&self, tag: u64) -> Option<Arc<ExtensionEntry>> {
        self.by_tag.get(&tag).map(|e| e.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::descriptor::FieldSpec;
    use crate::value::Value;

    fn shape() -> Arc<RecordShape> {
        RecordShape::new("Stamp")
            .field(FieldSpec::new("secs"))
            .build()
            .unwrap()
    }

    #[test]
    fn test_register_and_lookup() {
        let reg = ExtensionRegistry::new();
        let s = shape();
        reg.register(
            s.clone(),
            7,
            |r| {
                let secs = r.get("secs").and_then(Value::as_uint).unwrap_or(0);
                Ok(secs.to_be_bytes().to_vec())
            },
            |_| Ok(Record::new(shape())),
        )
        .unwrap();

        let entry = reg.lookup_shape(ShapeId::of(&s)).unwrap();
        assert_eq!(entry.tag(), 7);
        assert!(reg.lookup_tag(7).is_some());
        assert!(reg.lookup_tag(8).is_none());

        let mut r = Record::new(s.clone());
        r.set("secs", Value::Uint(5));
        assert_eq!(entry.encode(&r).unwrap(), 5u64.to_be_bytes().to_vec());
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let reg = ExtensionRegistry::new();
        let s = shape();
        reg.register(s.clone(), 1, |_| Ok(vec![]), |_| Ok(Record::new(shape())))
            .unwrap();

        let err = reg
            .register(s.clone(), 2, |_| Ok(vec![]), |_| Ok(Record::new(shape())))
            .unwrap_err();
        assert!(matches!(err, Error::Extension { .. }));

        let other = shape();
        let err = reg
            .register(other, 1, |_| Ok(vec![]), |_| Ok(Record::new(shape())))
            .unwrap_err();
        assert!(matches!(err, Error::Extension { tag: 1, .. }));
    }
}
