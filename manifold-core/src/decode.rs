//! The decode engine: a token state machine reconstructing value graphs.

use crate::descriptor::RecordShape;
use crate::error::Error;
use crate::extension::ExtensionRegistry;
use crate::handle::Handle;
use crate::model::model_for;
use crate::token::{Format, FormatCaps, Token, TokenReader};
use crate::value::{ExtValue, Kind, Record, Value};
use bytes::Bytes;
use fxhash::FxHashMap;
use manifold_io::ReadBuf;
use std::io::Read;
use std::sync::Arc;

/// Cap on speculative `Vec::with_capacity` even for lengths under the
/// handle ceiling; the vector still grows to the announced size.
const PREALLOC_CAP: usize = 4096;

/// Per-call mutable decode context.
#[derive(Default)]
struct DecodeState {
    depth: usize,
    /// Interning scope: symbol id to name.
    symbols: FxHashMap<u32, String>,
}

impl DecodeState {
    fn reset(&mut self) {
        self.depth = 0;
        self.symbols.clear();
    }
}

/// Drives a [`TokenReader`] into values.
///
/// Reusing one decoder across several values on a stream extends the
/// symbol scope, mirroring the encoder; [`Decoder::reset_scope`] starts a
/// fresh scope.
pub struct Decoder<'h, R> {
    handle: &'h Handle,
    reader: R,
    caps: FormatCaps,
    ext: Option<&'h ExtensionRegistry>,
    state: DecodeState,
}

impl<'h, R: TokenReader> Decoder<'h, R> {
    pub fn new(handle: &'h Handle, reader: R) -> Self {
        let caps = reader.caps();
        Self {
            handle,
            reader,
            caps,
            ext: None,
            state: DecodeState::default(),
        }
    }

    /// Resolves extension tags through `registry` while decoding.
    pub fn with_extensions(mut self, registry: &'h ExtensionRegistry) -> Self {
        self.ext = Some(registry);
        self
    }

    /// Starts a fresh symbol scope, keeping allocations.
    pub fn reset_scope(&mut self) {
        self.state.reset();
    }

    /// Absolute offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.reader.position()
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

    fn check_len(&self, len: usize) -> Result<(), Error> {
        if len > self.handle.max_init_len() {
            return Err(Error::LenExceeded {
                len,
                max: self.handle.max_init_len(),
            });
        }
        Ok(())
    }

    /// Decodes the next value generically.
    pub fn decode_value(&mut self) -> Result<Value, Error> {
        let tok = self.reader.next_token()?;
        self.value_from(tok)
    }

    fn value_from(&mut self, tok: Token) -> Result<Value, Error> {
        match tok {
            Token::Nil => Ok(Value::Nil),
            Token::Bool(v) => Ok(Value::Bool(v)),
            Token::Int(v) => Ok(Value::Int(v)),
            Token::Uint(v) => Ok(Value::Uint(v)),
            Token::Float(v) => Ok(Value::Float(v)),
            Token::Str(v) => Ok(Value::Str(v)),
            Token::Bytes(v) => Ok(Value::Bytes(v)),
            Token::SymbolDef(id, name) => {
                self.state.symbols.insert(id, name.clone());
                Ok(Value::Str(name))
            }
            Token::SymbolRef(id) => self
                .state
                .symbols
                .get(&id)
                .cloned()
                .map(Value::Str)
                .ok_or(Error::UnknownSymbol { id }),
            Token::SeqStart(len) => self.finish_seq(len),
            Token::MapStart(len) => self.finish_map(len),
            Token::SeqEnd | Token::MapEnd => Err(Error::wire(
                self.reader.position(),
                "unexpected container end",
            )),
            Token::Ext { tag, data } => self.ext_value(tag, data),
        }
    }

    fn finish_seq(&mut self, len: Option<usize>) -> Result<Value, Error> {
        self.enter()?;
        let mut items = match len {
            Some(n) => {
                self.check_len(n)?;
                Vec::with_capacity(n.min(PREALLOC_CAP))
            }
            None => Vec::new(),
        };
        match len {
            Some(n) => {
                for _ in 0..n {
                    let v = self.decode_value()?;
                    items.push(v);
                }
            }
            None => loop {
                let tok = self.reader.next_token()?;
                if tok == Token::SeqEnd {
                    break;
                }
                let v = self.value_from(tok)?;
                items.push(v);
            },
        }
        self.leave();
        Ok(Value::Seq(items))
    }

    fn finish_map(&mut self, len: Option<usize>) -> Result<Value, Error> {
        self.enter()?;
        let mut entries = match len {
            Some(n) => {
                self.check_len(n)?;
                Vec::with_capacity(n.min(PREALLOC_CAP))
            }
            None => Vec::new(),
        };
        match len {
            Some(n) => {
                for _ in 0..n {
                    let k = self.decode_value()?;
                    let v = self.decode_value()?;
                    entries.push((k, v));
                }
            }
            None => loop {
                let tok = self.reader.next_token()?;
                if tok == Token::MapEnd {
                    break;
                }
                let k = self.value_from(tok)?;
                let v = self.decode_value()?;
                entries.push((k, v));
            },
        }
        self.leave();

        // Formats without a native ext kind carry extensions as a
        // structural envelope; fold it back here.
        if !self.caps.native_ext {
            if let Some((tag, data)) = ext_envelope(&entries) {
                return self.ext_value(tag, data);
            }
        }
        Ok(Value::Map(entries))
    }

    fn ext_value(&mut self, tag: u64, data: Vec<u8>) -> Result<Value, Error> {
        if let Some(reg) = self.ext {
            if let Some(entry) = reg.lookup_tag(tag) {
                tracing::trace!(tag, shape = entry.shape().name(), "registry extension decode");
                return entry.decode(&data).map(Value::Record);
            }
        }
        Ok(Value::Ext(ExtValue { tag, data }))
    }

    /// Reads and discards the next value. Symbol definitions inside the
    /// discarded region still register, so later references resolve.
    pub fn skip_value(&mut self) -> Result<(), Error> {
        let tok = self.reader.next_token()?;
        self.skip_from(tok)
    }

    fn skip_from(&mut self, tok: Token) -> Result<(), Error> {
        match tok {
            Token::SeqStart(len) => {
                self.enter()?;
                match len {
                    Some(n) => {
                        for _ in 0..n {
                            self.skip_value()?;
                        }
                    }
                    None => loop {
                        let t = self.reader.next_token()?;
                        if t == Token::SeqEnd {
                            break;
                        }
                        self.skip_from(t)?;
                    },
                }
                self.leave();
                Ok(())
            }
            Token::MapStart(len) => {
                self.enter()?;
                match len {
                    Some(n) => {
                        for _ in 0..n {
                            self.skip_value()?;
                            self.skip_value()?;
                        }
                    }
                    None => loop {
                        let t = self.reader.next_token()?;
                        if t == Token::MapEnd {
                            break;
                        }
                        self.skip_from(t)?;
                        self.skip_value()?;
                    },
                }
                self.leave();
                Ok(())
            }
            Token::SymbolDef(id, name) => {
                self.state.symbols.insert(id, name);
                Ok(())
            }
            Token::SeqEnd | Token::MapEnd => Err(Error::wire(
                self.reader.position(),
                "unexpected container end",
            )),
            _ => Ok(()),
        }
    }

    /// Decodes the next value into a fresh record of `shape`.
    pub fn decode_record(&mut self, shape: &Arc<RecordShape>) -> Result<Record, Error> {
        let mut rec = Record::new(shape.clone());
        let tok = self.reader.next_token()?;
        match tok {
            Token::Nil => Ok(rec),
            Token::Ext { tag, data } => self.apply_ext(tag, &data, shape),
            Token::SeqStart(len) => {
                self.record_from_seq(len, &mut rec)?;
                Ok(rec)
            }
            Token::MapStart(len) => {
                self.record_from_map(len, &mut rec)?;
                Ok(rec)
            }
            other => Err(Error::Mismatch {
                expected: Kind::Record,
                found: token_kind(&other),
                context: shape.name().to_string(),
            }),
        }
    }

    fn apply_ext(
        &mut self,
        tag: u64,
        data: &[u8],
        shape: &Arc<RecordShape>,
    ) -> Result<Record, Error> {
        if let Some(codec) = shape.codec() {
            if codec.tag == tag {
                return (codec.decode)(data);
            }
            return Err(Error::Extension {
                tag,
                detail: format!("tag does not match shape `{}`", shape.name()),
            });
        }
        if let Some(reg) = self.ext {
            if let Some(entry) = reg.lookup_tag(tag) {
                return entry.decode(data);
            }
        }
        Err(Error::Extension {
            tag,
            detail: format!("no codec for shape `{}`", shape.name()),
        })
    }

    /// Positional decode: input elements map onto type-model order.
    /// Surplus positions are swallowed; deficit leaves trailing fields at
    /// their zero value.
    fn record_from_seq(&mut self, len: Option<usize>, rec: &mut Record) -> Result<(), Error> {
        let model = model_for(rec.shape(), self.handle.layout_opts())?;
        self.enter()?;
        let nfields = model.fields().len();
        match len {
            Some(n) => {
                self.check_len(n)?;
                for i in 0..n {
                    if i < nfields {
                        let plan = &model.fields()[i];
                        let tok = self.reader.next_token()?;
                        let slot = rec
                            .field_at_path_mut(&plan.path)
                            .expect("model path resolves in its own shape");
                        self.decode_into_from(tok, slot, &plan.wire_name)?;
                    } else {
                        self.skip_value()?;
                    }
                }
            }
            None => {
                let mut i = 0;
                loop {
                    let tok = self.reader.next_token()?;
                    if tok == Token::SeqEnd {
                        break;
                    }
                    if i < nfields {
                        let plan = &model.fields()[i];
                        let slot = rec
                            .field_at_path_mut(&plan.path)
                            .expect("model path resolves in its own shape");
                        self.decode_into_from(tok, slot, &plan.wire_name)?;
                    } else {
                        self.skip_from(tok)?;
                    }
                    i += 1;
                }
            }
        }
        self.leave();
        Ok(())
    }

    /// Keyed decode. Unrecognized keys are read fully and discarded without
    /// aborting the rest of the record.
    fn record_from_map(&mut self, len: Option<usize>, rec: &mut Record) -> Result<(), Error> {
        let model = model_for(rec.shape(), self.handle.layout_opts())?;
        self.enter()?;
        let mut idx = 0usize;
        loop {
            let key_tok = match len {
                Some(n) if idx >= n => break,
                Some(_) => self.reader.next_token()?,
                None => {
                    let t = self.reader.next_token()?;
                    if t == Token::MapEnd {
                        break;
                    }
                    t
                }
            };
            idx += 1;

            if idx == 1 && !self.caps.native_ext {
                if let Token::Str(k) = &key_tok {
                    let has_codec = rec.shape().codec().is_some() || self.ext.is_some();
                    if k == "__ext" && has_codec {
                        let shape = rec.shape().clone();
                        *rec = self.record_from_envelope(len, &shape)?;
                        self.leave();
                        return Ok(());
                    }
                }
            }

            let name = match key_tok {
                Token::Str(s) => s,
                Token::SymbolDef(id, s) => {
                    self.state.symbols.insert(id, s.clone());
                    s
                }
                Token::SymbolRef(id) => self
                    .state
                    .symbols
                    .get(&id)
                    .cloned()
                    .ok_or(Error::UnknownSymbol { id })?,
                Token::Int(n) => n.to_string(),
                Token::Uint(n) => n.to_string(),
                other => {
                    // Key of an unusable kind: discard the whole pair.
                    self.skip_from(other)?;
                    self.skip_value()?;
                    continue;
                }
            };

            match model.field_index(&name) {
                Some(fi) => {
                    let plan = &model.fields()[fi];
                    let tok = self.reader.next_token()?;
                    let slot = rec
                        .field_at_path_mut(&plan.path)
                        .expect("model path resolves in its own shape");
                    self.decode_into_from(tok, slot, &plan.wire_name)?;
                }
                None => self.skip_value()?,
            }
        }
        self.leave();
        Ok(())
    }

    /// Consumes the remainder of an extension envelope whose `__ext` key
    /// has already been read, and applies the matching codec.
    fn record_from_envelope(
        &mut self,
        len: Option<usize>,
        shape: &Arc<RecordShape>,
    ) -> Result<Record, Error> {
        let tag = self.decode_value()?.as_uint().ok_or_else(|| {
            Error::wire(self.reader.position(), "extension tag must be numeric")
        })?;
        let key = self.decode_value()?;
        if key.as_str() != Some("data") {
            return Err(Error::wire(
                self.reader.position(),
                "extension envelope missing `data`",
            ));
        }
        let payload = self.decode_value()?;
        let data = bytes_of(&payload).ok_or_else(|| {
            Error::wire(self.reader.position(), "extension payload must be bytes")
        })?;
        match len {
            Some(n) => {
                for _ in 2..n {
                    self.skip_value()?;
                    self.skip_value()?;
                }
            }
            None => {
                let t = self.reader.next_token()?;
                if t != Token::MapEnd {
                    return Err(Error::wire(
                        self.reader.position(),
                        "extension envelope has trailing entries",
                    ));
                }
            }
        }
        self.apply_ext(tag, &data, shape)
    }

    /// Decodes the next value into an existing one, merging containers and
    /// coercing scalars toward the target's kind.
    pub fn decode_into(&mut self, target: &mut Value) -> Result<(), Error> {
        let tok = self.reader.next_token()?;
        self.decode_into_from(tok, target, "value")
    }

    fn decode_into_from(
        &mut self,
        tok: Token,
        target: &mut Value,
        ctx: &str,
    ) -> Result<(), Error> {
        if let Value::Shared(s) = target {
            let shared = s.clone();
            let mut guard = shared.write();
            return self.decode_into_from(tok, &mut guard, ctx);
        }
        match tok {
            // Nil input zeroes the destination; containers empty in place.
            Token::Nil => {
                match target {
                    Value::Seq(items) => items.clear(),
                    Value::Map(entries) => entries.clear(),
                    other => *other = Value::Nil,
                }
                Ok(())
            }
            Token::SymbolDef(id, name) => {
                self.state.symbols.insert(id, name.clone());
                self.assign_scalar(Token::Str(name), target, ctx)
            }
            Token::SymbolRef(id) => {
                let name = self
                    .state
                    .symbols
                    .get(&id)
                    .cloned()
                    .ok_or(Error::UnknownSymbol { id })?;
                self.assign_scalar(Token::Str(name), target, ctx)
            }
            Token::SeqStart(len) => match target {
                Value::Nil => {
                    *target = self.finish_seq(len)?;
                    Ok(())
                }
                Value::Seq(_) => {
                    let Value::Seq(items) = target else { unreachable!() };
                    self.seq_into(len, items, ctx)
                }
                Value::Bytes(bytes) => self.bytes_from_seq(len, bytes, ctx),
                Value::Record(_) => {
                    let Value::Record(rec) = target else { unreachable!() };
                    self.record_from_seq(len, rec)
                }
                other => Err(Error::Mismatch {
                    expected: other.kind(),
                    found: Kind::Seq,
                    context: ctx.to_string(),
                }),
            },
            Token::MapStart(len) => match target {
                Value::Nil => {
                    *target = self.finish_map(len)?;
                    Ok(())
                }
                Value::Map(_) => {
                    let Value::Map(entries) = target else { unreachable!() };
                    self.map_into(len, entries, ctx)
                }
                Value::Record(_) => {
                    let Value::Record(rec) = target else { unreachable!() };
                    self.record_from_map(len, rec)
                }
                other => Err(Error::Mismatch {
                    expected: other.kind(),
                    found: Kind::Map,
                    context: ctx.to_string(),
                }),
            },
            Token::Ext { tag, data } => match target {
                Value::Record(rec) => {
                    let shape = rec.shape().clone();
                    *rec = self.apply_ext(tag, &data, &shape)?;
                    Ok(())
                }
                _ => {
                    *target = self.ext_value(tag, data)?;
                    Ok(())
                }
            },
            Token::SeqEnd | Token::MapEnd => Err(Error::wire(
                self.reader.position(),
                "unexpected container end",
            )),
            scalar => self.assign_scalar(scalar, target, ctx),
        }
    }

    /// Scalar-to-scalar assignment with the documented coercions. Anything
    /// not listed fails with a mismatch naming both kinds.
    fn assign_scalar(&mut self, tok: Token, target: &mut Value, ctx: &str) -> Result<(), Error> {
        let found = token_kind(&tok);
        let mismatch = |expected: Kind| Error::Mismatch {
            expected,
            found,
            context: ctx.to_string(),
        };
        match target {
            Value::Nil => {
                *target = self.value_from(tok)?;
                Ok(())
            }
            Value::Bool(b) => match tok {
                Token::Bool(v) => {
                    *b = v;
                    Ok(())
                }
                _ => Err(mismatch(Kind::Bool)),
            },
            Value::Int(n) => match tok {
                Token::Int(v) => {
                    *n = v;
                    Ok(())
                }
                Token::Uint(v) => {
                    *n = i64::try_from(v).map_err(|_| mismatch(Kind::Int))?;
                    Ok(())
                }
                Token::Str(s) => {
                    *n = s.parse().map_err(|_| mismatch(Kind::Int))?;
                    Ok(())
                }
                _ => Err(mismatch(Kind::Int)),
            },
            Value::Uint(n) => match tok {
                Token::Uint(v) => {
                    *n = v;
                    Ok(())
                }
                Token::Int(v) => {
                    *n = u64::try_from(v).map_err(|_| mismatch(Kind::Uint))?;
                    Ok(())
                }
                Token::Str(s) => {
                    *n = s.parse().map_err(|_| mismatch(Kind::Uint))?;
                    Ok(())
                }
                _ => Err(mismatch(Kind::Uint)),
            },
            Value::Float(f) => match tok {
                Token::Float(v) => {
                    *f = v;
                    Ok(())
                }
                Token::Int(v) => {
                    *f = v as f64;
                    Ok(())
                }
                Token::Uint(v) => {
                    *f = v as f64;
                    Ok(())
                }
                Token::Str(s) => {
                    *f = s.parse().map_err(|_| mismatch(Kind::Float))?;
                    Ok(())
                }
                _ => Err(mismatch(Kind::Float)),
            },
            Value::Str(s) => match tok {
                Token::Str(v) => {
                    *s = v;
                    Ok(())
                }
                Token::Bytes(b) => {
                    *s = String::from_utf8(b).map_err(|_| mismatch(Kind::Str))?;
                    Ok(())
                }
                _ => Err(mismatch(Kind::Str)),
            },
            Value::Bytes(bs) => match tok {
                Token::Bytes(b) => {
                    *bs = b;
                    Ok(())
                }
                Token::Str(s) => {
                    *bs = s.into_bytes();
                    Ok(())
                }
                _ => Err(mismatch(Kind::Bytes)),
            },
            other => Err(mismatch(other.kind())),
        }
    }

    fn seq_into(
        &mut self,
        len: Option<usize>,
        items: &mut Vec<Value>,
        ctx: &str,
    ) -> Result<(), Error> {
        self.enter()?;
        match len {
            Some(n) => {
                self.check_len(n)?;
                for i in 0..n {
                    if i < items.len() {
                        let tok = self.reader.next_token()?;
                        self.decode_into_from(tok, &mut items[i], ctx)?;
                    } else {
                        let v = self.decode_value()?;
                        items.push(v);
                    }
                }
                items.truncate(n);
            }
            None => {
                let mut i = 0;
                loop {
                    let tok = self.reader.next_token()?;
                    if tok == Token::SeqEnd {
                        break;
                    }
                    if i < items.len() {
                        self.decode_into_from(tok, &mut items[i], ctx)?;
                    } else {
                        let v = self.value_from(tok)?;
                        items.push(v);
                    }
                    i += 1;
                }
                items.truncate(i);
            }
        }
        self.leave();
        Ok(())
    }

    fn bytes_from_seq(
        &mut self,
        len: Option<usize>,
        bytes: &mut Vec<u8>,
        ctx: &str,
    ) -> Result<(), Error> {
        let v = self.finish_seq(len)?;
        match v {
            Value::Seq(ref items) => {
                let mut out = Vec::with_capacity(items.len());
                for item in items {
                    match item.as_uint() {
                        Some(b) if b <= u8::MAX as u64 => out.push(b as u8),
                        _ => {
                            return Err(Error::Mismatch {
                                expected: Kind::Bytes,
                                found: Kind::Seq,
                                context: ctx.to_string(),
                            })
                        }
                    }
                }
                *bytes = out;
                Ok(())
            }
            _ => unreachable!("finish_seq yields a seq"),
        }
    }

    /// Map merge. A colliding key either resets its value to zero before
    /// decoding or decodes in place over it, per `Handle::map_value_reset`.
    fn map_into(
        &mut self,
        len: Option<usize>,
        entries: &mut Vec<(Value, Value)>,
        ctx: &str,
    ) -> Result<(), Error> {
        self.enter()?;
        let reset = self.handle.map_value_reset();
        let mut remaining = len;
        loop {
            let key = match remaining {
                Some(0) => break,
                Some(ref mut n) => {
                    *n -= 1;
                    self.decode_value()?
                }
                None => {
                    let tok = self.reader.next_token()?;
                    if tok == Token::MapEnd {
                        break;
                    }
                    self.value_from(tok)?
                }
            };
            match entries.iter().position(|(k, _)| keys_match(k, &key)) {
                Some(i) => {
                    if reset {
                        entries[i].1 = Value::Nil;
                    }
                    let tok = self.reader.next_token()?;
                    self.decode_into_from(tok, &mut entries[i].1, ctx)?;
                }
                None => {
                    let v = self.decode_value()?;
                    entries.push((key, v));
                }
            }
        }
        self.leave();
        Ok(())
    }
}

fn token_kind(tok: &Token) -> Kind {
    match tok {
        Token::Nil => Kind::Nil,
        Token::Bool(_) => Kind::Bool,
        Token::Int(_) => Kind::Int,
        Token::Uint(_) => Kind::Uint,
        Token::Float(_) => Kind::Float,
        Token::Str(_) | Token::SymbolDef(..) | Token::SymbolRef(_) => Kind::Str,
        Token::Bytes(_) => Kind::Bytes,
        Token::SeqStart(_) | Token::SeqEnd => Kind::Seq,
        Token::MapStart(_) | Token::MapEnd => Kind::Map,
        Token::Ext { .. } => Kind::Ext,
    }
}

/// Key equality for map merging, with numeric-text coercion so string-keyed
/// wire forms find their numerically keyed targets.
fn keys_match(existing: &Value, incoming: &Value) -> bool {
    if existing == incoming {
        return true;
    }
    match (existing, incoming) {
        (Value::Int(a), Value::Str(s)) => s.parse::<i64>().map(|v| v == *a).unwrap_or(false),
        (Value::Uint(a), Value::Str(s)) => s.parse::<u64>().map(|v| v == *a).unwrap_or(false),
        (Value::Float(a), Value::Str(s)) => s.parse::<f64>().map(|v| v == *a).unwrap_or(false),
        (Value::Int(a), Value::Uint(b)) => u64::try_from(*a).map(|v| v == *b).unwrap_or(false),
        (Value::Uint(a), Value::Int(b)) => u64::try_from(*b).map(|v| v == *a).unwrap_or(false),
        _ => false,
    }
}

fn bytes_of(v: &Value) -> Option<Vec<u8>> {
    match v {
        Value::Bytes(b) => Some(b.clone()),
        Value::Seq(items) => {
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                match item.as_uint() {
                    Some(b) if b <= u8::MAX as u64 => out.push(b as u8),
                    _ => return None,
                }
            }
            Some(out)
        }
        _ => None,
    }
}

fn ext_envelope(entries: &[(Value, Value)]) -> Option<(u64, Vec<u8>)> {
    if entries.len() != 2 {
        return None;
    }
    let (k0, v0) = &entries[0];
    let (k1, v1) = &entries[1];
    if k0.as_str() != Some("__ext") || k1.as_str() != Some("data") {
        return None;
    }
    Some((v0.as_uint()?, bytes_of(v1)?))
}

/// Decodes one value from a byte slice.
pub fn from_slice(format: &dyn Format, handle: &Handle, data: &[u8]) -> Result<Value, Error> {
    let mut src = ReadBuf::from_slice(data);
    let reader = format.reader(handle, &mut src);
    let mut dec = Decoder::new(handle, reader);
    dec.decode_value()
}

/// Decodes one value from shared bytes without copying the input.
pub fn from_bytes(format: &dyn Format, handle: &Handle, data: Bytes) -> Result<Value, Error> {
    let mut src = ReadBuf::from_bytes(data);
    let reader = format.reader(handle, &mut src);
    let mut dec = Decoder::new(handle, reader);
    dec.decode_value()
}

/// Decodes one value from an arbitrary stream.
pub fn from_reader(
    format: &dyn Format,
    handle: &Handle,
    src: Box<dyn Read>,
) -> Result<Value, Error> {
    let mut src = ReadBuf::from_reader(src);
    let reader = format.reader(handle, &mut src);
    let mut dec = Decoder::new(handle, reader);
    dec.decode_value()
}

/// Decodes one record of `shape` from a byte slice.
pub fn record_from_slice(
    format: &dyn Format,
    handle: &Handle,
    shape: &Arc<RecordShape>,
    data: &[u8],
) -> Result<Record, Error> {
    let mut src = ReadBuf::from_slice(data);
    let reader = format.reader(handle, &mut src);
    let mut dec = Decoder::new(handle, reader);
    dec.decode_record(shape)
}
