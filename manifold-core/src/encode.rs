//! The encode engine: value-graph traversal emitting tokens.

use crate::descriptor::ShapeId;
use crate::error::Error;
use crate::extension::ExtensionRegistry;
use crate::handle::{Handle, SymbolMode};
use crate::model::{model_for, FieldPlan};
use crate::token::{Format, FormatCaps, TokenWriter};
use crate::value::{Record, Value};
use fxhash::FxHashMap;
use manifold_io::WriteBuf;
use std::io::Write;

static NIL: Value = Value::Nil;

/// Depth ceiling for canonical key pre-encoding, independent of the handle
/// so key sorting cannot recurse unboundedly through shared nodes.
const CANONICAL_KEY_DEPTH: usize = 64;

/// Per-call mutable encode context. Owned by the calling thread; never
/// shared.
#[derive(Default)]
struct EncodeState {
    depth: usize,
    /// Identities of shared nodes on the active recursion path.
    active: Vec<usize>,
    /// Interning scope: name to assigned symbol id.
    symbols: FxHashMap<String, u32>,
    next_symbol: u32,
}

impl EncodeState {
    fn reset(&mut self) {
        self.depth = 0;
        self.active.clear();
        self.symbols.clear();
        self.next_symbol = 0;
    }
}

/// Drives a [`TokenWriter`] over a value graph.
///
/// One encoder per logical call; reusing an encoder for several values on
/// one stream extends the symbol-interning scope across them, which is the
/// opt-in stream-scoped interning behavior. [`Encoder::reset_scope`] starts
/// a fresh scope without rebuilding the encoder.
pub struct Encoder<'h, W> {
    handle: &'h Handle,
    writer: W,
    caps: FormatCaps,
    ext: Option<&'h ExtensionRegistry>,
    state: EncodeState,
}

impl<'h, W: TokenWriter> Encoder<'h, W> {
    pub fn new(handle: &'h Handle, writer: W) -> Self {
        let caps = writer.caps();
        Self {
            handle,
            writer,
            caps,
            ext: None,
            state: EncodeState::default(),
        }
    }

    /// Consults `registry` for record shapes before structural encoding.
    pub fn with_extensions(mut self, registry: &'h ExtensionRegistry) -> Self {
        self.ext = Some(registry);
        self
    }

    /// Starts a fresh interning/cycle scope, keeping allocations.
    pub fn reset_scope(&mut self) {
        self.state.reset();
    }

    /// Drains buffered output.
    pub fn flush(&mut self) -> Result<(), Error> {
        self.writer.flush()
    }

    fn enter(&mut self) -> Result<(), Error> {
        self.state.depth += 1;
        if self.state.depth > self.handle.max_depth() {
            return Err(Error::DepthExceeded {
                limit: self.handle.max_depth(),
            });
        }
        Ok(())
    }

    fn leave(&mut self) {
        self.state.depth -= 1;
    }

    /// Encodes one value graph.
    pub fn encode_value(&mut self, v: &Value) -> Result<(), Error> {
        match v {
            Value::Nil => self.writer.write_nil(),
            Value::Bool(b) => self.writer.write_bool(*b),
            Value::Int(n) => self.writer.write_int(*n),
            Value::Uint(n) => self.writer.write_uint(*n),
            Value::Float(f) => self.writer.write_float(*f),
            Value::Str(s) => self.writer.write_str(s),
            Value::Bytes(b) => self.writer.write_bytes(b),
            Value::Seq(items) => self.encode_seq(items),
            Value::Map(entries) => self.encode_map(entries),
            Value::Record(r) => self.record_value(r, true),
            Value::Shared(s) => {
                if self.handle.detect_circular_ref() {
                    let id = s.id();
                    if self.state.active.contains(&id) {
                        return Err(Error::CircularRef {
                            context: "shared value".to_string(),
                        });
                    }
                    self.state.active.push(id);
                    let inner = s.read();
                    let res = self.encode_value(&inner);
                    drop(inner);
                    // Fully encoded identities come off the stack; a later
                    // re-encounter is legal and re-encodes in full.
                    self.state.active.pop();
                    res
                } else {
                    let inner = s.read();
                    self.encode_value(&inner)
                }
            }
            Value::Ext(e) => self.write_ext_value(e.tag, &e.data),
        }
    }

    /// Encodes a record, honoring its codec and the extension registry.
    pub fn encode_record(&mut self, r: &Record) -> Result<(), Error> {
        self.record_value(r, true)
    }

    /// Encodes a sequence whose length is unknown up front.
    ///
    /// On formats with indefinite-length framing the elements stream
    /// through; elsewhere the producer is drained into a buffer first so a
    /// definite count can be framed.
    pub fn encode_stream<I>(&mut self, iter: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = Value>,
    {
        self.enter()?;
        if self.caps.indefinite_len {
            self.writer.begin_seq(None)?;
            for v in iter {
                self.encode_value(&v)?;
            }
        } else {
            let items: Vec<Value> = iter.into_iter().collect();
            self.writer.begin_seq(Some(items.len()))?;
            for v in &items {
                self.encode_value(v)?;
            }
        }
        self.writer.end_seq()?;
        self.leave();
        Ok(())
    }

    fn encode_seq(&mut self, items: &[Value]) -> Result<(), Error> {
        self.enter()?;
        self.writer.begin_seq(Some(items.len()))?;
        if items.iter().all(is_plain_scalar) {
            // Uniformly scalar: skip per-element graph dispatch. Emits the
            // same writer calls as the generic arm below.
            for v in items {
                self.write_scalar(v)?;
            }
        } else {
            for v in items {
                self.encode_value(v)?;
            }
        }
        self.writer.end_seq()?;
        self.leave();
        Ok(())
    }

    fn write_scalar(&mut self, v: &Value) -> Result<(), Error> {
        match v {
            Value::Nil => self.writer.write_nil(),
            Value::Bool(b) => self.writer.write_bool(*b),
            Value::Int(n) => self.writer.write_int(*n),
            Value::Uint(n) => self.writer.write_uint(*n),
            Value::Float(f) => self.writer.write_float(*f),
            Value::Str(s) => self.writer.write_str(s),
            Value::Bytes(b) => self.writer.write_bytes(b),
            _ => unreachable!("non-scalar on the scalar fast path"),
        }
    }

    fn encode_map(&mut self, entries: &[(Value, Value)]) -> Result<(), Error> {
        self.enter()?;
        self.writer.begin_map(Some(entries.len()))?;
        if self.handle.canonical() && entries.len() > 1 {
            let mut order: Vec<(Vec<u8>, usize)> = Vec::with_capacity(entries.len());
            for (i, (k, _)) in entries.iter().enumerate() {
                let mut key = Vec::new();
                canonical_key_bytes(k, 0, &mut key)?;
                order.push((key, i));
            }
            order.sort();
            for (_, i) in order {
                self.write_map_key(&entries[i].0)?;
                self.encode_value(&entries[i].1)?;
            }
        } else {
            for (k, v) in entries {
                self.write_map_key(k)?;
                self.encode_value(v)?;
            }
        }
        self.writer.end_map()?;
        self.leave();
        Ok(())
    }

    fn write_map_key(&mut self, k: &Value) -> Result<(), Error> {
        if self.handle.map_key_as_string() {
            if let Some(s) = scalar_to_key_string(k) {
                return self.write_key_str(&s);
            }
        }
        match k {
            Value::Str(s) => self.write_key_str(s),
            other => self.encode_value(other),
        }
    }

    /// Writes a field name or string map key, interned when the handle and
    /// format both allow it.
    fn write_key_str(&mut self, s: &str) -> Result<(), Error> {
        if self.caps.symbols && self.handle.symbol_mode() == SymbolMode::All {
            if let Some(&id) = self.state.symbols.get(s) {
                return self.writer.write_symbol_ref(id);
            }
            let id = self.state.next_symbol;
            self.state.next_symbol += 1;
            self.state.symbols.insert(s.to_string(), id);
            self.writer.write_symbol_def(id, s)
        } else {
            self.writer.write_str(s)
        }
    }

    fn record_value(&mut self, r: &Record, allow_ext: bool) -> Result<(), Error> {
        if allow_ext {
            if let Some(codec) = r.shape().codec() {
                let data = (codec.encode)(r)?;
                tracing::trace!(shape = r.shape().name(), tag = codec.tag, "shape codec encode");
                return self.write_ext_value(codec.tag, &data);
            }
            if let Some(reg) = self.ext {
                if let Some(entry) = reg.lookup_shape(ShapeId::of(r.shape())) {
                    let data = entry.encode(r)?;
                    tracing::trace!(
                        shape = r.shape().name(),
                        tag = entry.tag(),
                        "registry extension encode"
                    );
                    return self.write_ext_value(entry.tag(), &data);
                }
            }
        }

        let model = model_for(r.shape(), self.handle.layout_opts())?;
        self.enter()?;
        if self.handle.struct_to_array() {
            self.writer.begin_seq(Some(model.fields().len()))?;
            for f in model.fields() {
                let v = r.field_at_path(&f.path).unwrap_or(&NIL);
                self.field_value(v, f)?;
            }
            self.writer.end_seq()?;
        } else {
            let emit: Vec<&FieldPlan> = model
                .fields()
                .iter()
                .filter(|f| {
                    let v = r.field_at_path(&f.path).unwrap_or(&NIL);
                    !(f.omit_empty && v.is_empty())
                })
                .collect();
            self.writer.begin_map(Some(emit.len()))?;
            for f in emit {
                self.write_key_str(&f.wire_name)?;
                let v = r.field_at_path(&f.path).unwrap_or(&NIL);
                self.field_value(v, f)?;
            }
            self.writer.end_map()?;
        }
        self.leave();
        Ok(())
    }

    fn field_value(&mut self, v: &Value, f: &FieldPlan) -> Result<(), Error> {
        if f.no_extension {
            if let Value::Record(r) = v {
                return self.record_value(r, false);
            }
        }
        self.encode_value(v)
    }

    fn write_ext_value(&mut self, tag: u64, data: &[u8]) -> Result<(), Error> {
        if self.caps.native_ext {
            self.writer.write_ext(tag, data)
        } else {
            // Structural envelope for formats without an ext kind.
            self.enter()?;
            self.writer.begin_map(Some(2))?;
            self.writer.write_str("__ext")?;
            self.writer.write_uint(tag)?;
            self.writer.write_str("data")?;
            self.writer.write_bytes(data)?;
            self.writer.end_map()?;
            self.leave();
            Ok(())
        }
    }
}

/// Deterministic byte image of a map key, used only for canonical ordering.
/// Format-independent so every handle sorts identically.
fn canonical_key_bytes(v: &Value, depth: usize, out: &mut Vec<u8>) -> Result<(), Error> {
    if depth > CANONICAL_KEY_DEPTH {
        return Err(Error::DepthExceeded {
            limit: CANONICAL_KEY_DEPTH,
        });
    }
    match v {
        Value::Nil => out.push(0),
        Value::Bool(b) => {
            out.push(1);
            out.push(u8::from(*b));
        }
        Value::Int(n) => {
            out.push(2);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Value::Uint(n) => {
            out.push(3);
            out.extend_from_slice(&n.to_be_bytes());
        }
        Value::Float(f) => {
            out.push(4);
            out.extend_from_slice(&f.to_bits().to_be_bytes());
        }
        Value::Str(s) => {
            out.push(5);
            out.extend_from_slice(s.as_bytes());
        }
        Value::Bytes(b) => {
            out.push(6);
            out.extend_from_slice(b);
        }
        Value::Seq(items) => {
            out.push(7);
            for item in items {
                canonical_key_bytes(item, depth + 1, out)?;
            }
        }
        Value::Map(entries) => {
            out.push(8);
            for (k, val) in entries {
                canonical_key_bytes(k, depth + 1, out)?;
                canonical_key_bytes(val, depth + 1, out)?;
            }
        }
        Value::Record(r) => {
            out.push(9);
            out.extend_from_slice(r.shape().name().as_bytes());
            for i in 0..r.shape().fields().len() {
                canonical_key_bytes(r.slot(i), depth + 1, out)?;
            }
        }
        Value::Shared(s) => {
            let inner = s.get();
            canonical_key_bytes(&inner, depth + 1, out)?;
        }
        Value::Ext(e) => {
            out.push(10);
            out.extend_from_slice(&e.tag.to_be_bytes());
            out.extend_from_slice(&e.data);
        }
    }
    Ok(())
}

fn is_plain_scalar(v: &Value) -> bool {
    matches!(
        v,
        Value::Nil
            | Value::Bool(_)
            | Value::Int(_)
            | Value::Uint(_)
            | Value::Float(_)
            | Value::Str(_)
            | Value::Bytes(_)
    )
}

fn scalar_to_key_string(v: &Value) -> Option<String> {
    match v {
        Value::Str(s) => Some(s.clone()),
        Value::Int(n) => Some(n.to_string()),
        Value::Uint(n) => Some(n.to_string()),
        Value::Float(f) => Some(f.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Nil => Some("null".to_string()),
        _ => None,
    }
}

/// Encodes one value to an in-memory buffer.
pub fn to_vec(format: &dyn Format, handle: &Handle, value: &Value) -> Result<Vec<u8>, Error> {
    let mut out = WriteBuf::to_vec();
    {
        let writer = format.writer(handle, &mut out);
        let mut enc = Encoder::new(handle, writer);
        enc.encode_value(value)?;
        enc.flush()?;
    }
    Ok(out.into_vec())
}

/// Encodes one value to an arbitrary sink, flushing on completion.
pub fn to_writer(
    format: &dyn Format,
    handle: &Handle,
    value: &Value,
    sink: Box<dyn Write>,
) -> Result<(), Error> {
    let mut out = WriteBuf::to_writer(sink);
    let writer = format.writer(handle, &mut out);
    let mut enc = Encoder::new(handle, writer);
    enc.encode_value(value)?;
    enc.flush()?;
    Ok(())
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use crate::token::Token;

    /// Token-recording writer for engine tests that do not need wire bytes.
    pub struct RecordingWriter {
        pub tokens: Vec<Token>,
        pub caps: FormatCaps,
    }

    impl RecordingWriter {
        pub fn new(caps: FormatCaps) -> Self {
            Self {
                tokens: Vec::new(),
                caps,
            }
        }

        pub fn plain() -> Self {
            Self::new(FormatCaps {
                indefinite_len: false,
                binary_bytes: true,
                symbols: false,
                native_ext: true,
                canonical_by_default: false,
            })
        }

        pub fn with_symbols() -> Self {
            Self::new(FormatCaps {
                indefinite_len: true,
                binary_bytes: true,
                symbols: true,
                native_ext: true,
                canonical_by_default: false,
            })
        }
    }

    impl TokenWriter for RecordingWriter {
        fn caps(&self) -> FormatCaps {
            self.caps
        }
        fn begin_seq(&mut self, len: Option<usize>) -> Result<(), Error> {
            self.tokens.push(Token::SeqStart(len));
            Ok(())
        }
        fn end_seq(&mut self) -> Result<(), Error> {
            self.tokens.push(Token::SeqEnd);
            Ok(())
        }
        fn begin_map(&mut self, len: Option<usize>) -> Result<(), Error> {
            self.tokens.push(Token::MapStart(len));
            Ok(())
        }
        fn end_map(&mut self) -> Result<(), Error> {
            self.tokens.push(Token::MapEnd);
            Ok(())
        }
        fn write_nil(&mut self) -> Result<(), Error> {
            self.tokens.push(Token::Nil);
            Ok(())
        }
        fn write_bool(&mut self, v: bool) -> Result<(), Error> {
            self.tokens.push(Token::Bool(v));
            Ok(())
        }
        fn write_int(&mut self, v: i64) -> Result<(), Error> {
            self.tokens.push(Token::Int(v));
            Ok(())
        }
        fn write_uint(&mut self, v: u64) -> Result<(), Error> {
            self.tokens.push(Token::Uint(v));
            Ok(())
        }
        fn write_float(&mut self, v: f64) -> Result<(), Error> {
            self.tokens.push(Token::Float(v));
            Ok(())
        }
        fn write_str(&mut self, v: &str) -> Result<(), Error> {
            self.tokens.push(Token::Str(v.to_string()));
            Ok(())
        }
        fn write_bytes(&mut self, v: &[u8]) -> Result<(), Error> {
            self.tokens.push(Token::Bytes(v.to_vec()));
            Ok(())
        }
        fn write_symbol_def(&mut self, id: u32, name: &str) -> Result<(), Error> {
            self.tokens.push(Token::SymbolDef(id, name.to_string()));
            Ok(())
        }
        fn write_symbol_ref(&mut self, id: u32) -> Result<(), Error> {
            self.tokens.push(Token::SymbolRef(id));
            Ok(())
        }
        fn write_ext(&mut self, tag: u64, data: &[u8]) -> Result<(), Error> {
            self.tokens.push(Token::Ext {
                tag,
                data: data.to_vec(),
            });
            Ok(())
        }
        fn flush(&mut self) -> Result<(), Error> {
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::RecordingWriter;
    use super::*;
    use crate::descriptor::{FieldSpec, RecordShape};
    use crate::token::Token;
    use crate::value::SharedValue;

    fn encode_tokens(handle: &Handle, writer: RecordingWriter, v: &Value) -> Vec<Token> {
        let mut enc = Encoder::new(handle, writer);
        enc.encode_value(v).unwrap();
        enc.writer.tokens
    }

    #[test]
    fn test_scalar_tokens() {
        let h = Handle::new();
        let toks = encode_tokens(&h, RecordingWriter::plain(), &Value::Int(-4));
        assert_eq!(toks, vec![Token::Int(-4)]);
    }

    #[test]
    fn test_seq_fast_path_matches_generic() {
        let h = Handle::new();
        let uniform = Value::Seq(vec![Value::Int(1), Value::Int(2)]);
        let mixed = Value::Seq(vec![Value::Int(1), Value::Seq(vec![Value::Int(2)])]);

        let toks = encode_tokens(&h, RecordingWriter::plain(), &uniform);
        assert_eq!(
            toks,
            vec![
                Token::SeqStart(Some(2)),
                Token::Int(1),
                Token::Int(2),
                Token::SeqEnd
            ]
        );

        let toks = encode_tokens(&h, RecordingWriter::plain(), &mixed);
        assert_eq!(
            toks,
            vec![
                Token::SeqStart(Some(2)),
                Token::Int(1),
                Token::SeqStart(Some(1)),
                Token::Int(2),
                Token::SeqEnd,
                Token::SeqEnd
            ]
        );
    }

    #[test]
    fn test_canonical_map_order() {
        let h = Handle::new().with_canonical(true);
        let ab = Value::Map(vec![
            (Value::Str("a".into()), Value::Int(1)),
            (Value::Str("b".into()), Value::Int(2)),
        ]);
        let ba = Value::Map(vec![
            (Value::Str("b".into()), Value::Int(2)),
            (Value::Str("a".into()), Value::Int(1)),
        ]);
        let t1 = encode_tokens(&h, RecordingWriter::plain(), &ab);
        let t2 = encode_tokens(&h, RecordingWriter::plain(), &ba);
        assert_eq!(t1, t2);
        assert_eq!(t1[1], Token::Str("a".into()));
    }

    #[test]
    fn test_cycle_detected() {
        let h = Handle::new().with_detect_circular_ref(true);
        let node = SharedValue::new(Value::Nil);
        node.set(Value::Seq(vec![Value::Shared(node.clone())]));

        let mut enc = Encoder::new(&h, RecordingWriter::plain());
        let err = enc.encode_value(&Value::Shared(node)).unwrap_err();
        assert!(matches!(err, Error::CircularRef { .. }));
    }

    #[test]
    fn test_popped_identity_reencoded() {
        let h = Handle::new().with_detect_circular_ref(true);
        let node = SharedValue::new(Value::Int(9));
        // The same identity appears twice as siblings; each occurrence is
        // fully popped before the next begins.
        let v = Value::Seq(vec![
            Value::Shared(node.clone()),
            Value::Shared(node.clone()),
        ]);
        let toks = encode_tokens(&h, RecordingWriter::plain(), &v);
        assert_eq!(
            toks,
            vec![
                Token::SeqStart(Some(2)),
                Token::Int(9),
                Token::Int(9),
                Token::SeqEnd
            ]
        );
    }

    #[test]
    fn test_depth_exceeded() {
        let h = Handle::new().with_max_depth(3);
        let mut v = Value::Int(1);
        for _ in 0..5 {
            v = Value::Seq(vec![v]);
        }
        let mut enc = Encoder::new(&h, RecordingWriter::plain());
        let err = enc.encode_value(&v).unwrap_err();
        assert!(matches!(err, Error::DepthExceeded { limit: 3 }));
    }

    #[test]
    fn test_record_map_layout_and_omit_empty() {
        let shape = RecordShape::new("T")
            .field(FieldSpec::new("a"))
            .field(FieldSpec::new("b").omit_empty())
            .build()
            .unwrap();
        let mut r = Record::new(shape);
        r.set("a", Value::Int(1));

        let h = Handle::new();
        let toks = encode_tokens(&h, RecordingWriter::plain(), &Value::Record(r));
        assert_eq!(
            toks,
            vec![
                Token::MapStart(Some(1)),
                Token::Str("a".into()),
                Token::Int(1),
                Token::MapEnd
            ]
        );
    }

    #[test]
    fn test_record_struct_to_array() {
        let shape = RecordShape::new("T")
            .field(FieldSpec::new("a"))
            .field(FieldSpec::new("b").omit_empty())
            .build()
            .unwrap();
        let mut r = Record::new(shape);
        r.set("a", Value::Int(1));

        let h = Handle::new().with_struct_to_array(true);
        let toks = encode_tokens(&h, RecordingWriter::plain(), &Value::Record(r));
        // Positional layout keeps empty slots.
        assert_eq!(
            toks,
            vec![
                Token::SeqStart(Some(2)),
                Token::Int(1),
                Token::Nil,
                Token::SeqEnd
            ]
        );
    }

    #[test]
    fn test_symbol_interning_scope() {
        let shape = RecordShape::new("T")
            .field(FieldSpec::new("name"))
            .build()
            .unwrap();
        let mut r = Record::new(shape);
        r.set("name", Value::Str("x".into()));

        let h = Handle::new().with_symbol_mode(SymbolMode::All);
        let mut enc = Encoder::new(&h, RecordingWriter::with_symbols());
        enc.encode_value(&Value::Record(r.clone())).unwrap();
        enc.encode_value(&Value::Record(r.clone())).unwrap();
        let toks = enc.writer.tokens.clone();
        assert!(toks.contains(&Token::SymbolDef(0, "name".into())));
        assert!(toks.contains(&Token::SymbolRef(0)));
        // Exactly one definition across the shared scope.
        let defs = toks
            .iter()
            .filter(|t| matches!(t, Token::SymbolDef(..)))
            .count();
        assert_eq!(defs, 1);

        // A fresh scope re-defines.
        enc.reset_scope();
        enc.encode_value(&Value::Record(r)).unwrap();
        let defs = enc
            .writer
            .tokens
            .iter()
            .filter(|t| matches!(t, Token::SymbolDef(..)))
            .count();
        assert_eq!(defs, 2);
    }

    #[test]
    fn test_interning_skipped_without_caps() {
        let shape = RecordShape::new("T")
            .field(FieldSpec::new("name"))
            .build()
            .unwrap();
        let r = Record::new(shape);
        let h = Handle::new().with_symbol_mode(SymbolMode::All);
        let toks = encode_tokens(&h, RecordingWriter::plain(), &Value::Record(r));
        assert!(toks.iter().all(|t| !matches!(t, Token::SymbolDef(..))));
    }

    #[test]
    fn test_stream_definite_fallback() {
        let h = Handle::new();
        let mut enc = Encoder::new(&h, RecordingWriter::plain());
        enc.encode_stream((0..3).map(Value::Int)).unwrap();
        assert_eq!(enc.writer.tokens[0], Token::SeqStart(Some(3)));
    }

    #[test]
    fn test_stream_indefinite_when_supported() {
        let h = Handle::new();
        let mut enc = Encoder::new(&h, RecordingWriter::with_symbols());
        enc.encode_stream((0..3).map(Value::Int)).unwrap();
        assert_eq!(enc.writer.tokens[0], Token::SeqStart(None));
        assert_eq!(*enc.writer.tokens.last().unwrap(), Token::SeqEnd);
    }

    #[test]
    fn test_ext_envelope_without_native_ext() {
        let mut caps = RecordingWriter::plain().caps;
        caps.native_ext = false;
        let h = Handle::new();
        let mut enc = Encoder::new(&h, RecordingWriter::new(caps));
        enc.encode_value(&Value::Ext(crate::value::ExtValue {
            tag: 3,
            data: vec![1, 2],
        }))
        .unwrap();
        assert_eq!(
            enc.writer.tokens,
            vec![
                Token::MapStart(Some(2)),
                Token::Str("__ext".into()),
                Token::Uint(3),
                Token::Str("data".into()),
                Token::Bytes(vec![1, 2]),
                Token::MapEnd
            ]
        );
    }

    #[test]
    fn test_map_key_as_string() {
        let h = Handle::new().with_map_key_as_string(true);
        let v = Value::Map(vec![(Value::Int(7), Value::Bool(true))]);
        let toks = encode_tokens(&h, RecordingWriter::plain(), &v);
        assert_eq!(toks[1], Token::Str("7".into()));
    }
}
