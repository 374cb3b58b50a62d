//! The token-level contract between the engines and concrete formats.
//!
//! Everything format-specific lives behind [`TokenWriter`] and
//! [`TokenReader`]; the engines never see wire bytes. A format advertises
//! what it can express through [`FormatCaps`] and the engines adapt
//! (indefinite-length framing, symbol interning, extension envelopes)
//! instead of special-casing any format by name.

use crate::error::Error;
use crate::handle::Handle;
use manifold_io::{ReadBuf, WriteBuf};

/// The format-agnostic unit exchanged between engine and format.
///
/// Container starts carry `Some(len)` when the element count was known up
/// front and `None` for indefinite framing. Readers only produce `SeqEnd` /
/// `MapEnd` for indefinite containers; definite ones are delimited by their
/// announced count.
#[derive(Debug, Clone, PartialEq)]
pub enum Token {
    SeqStart(Option<usize>),
    SeqEnd,
    MapStart(Option<usize>),
    MapEnd,
    Nil,
    Bool(bool),
    Int(i64),
    Uint(u64),
    Float(f64),
    Str(String),
    Bytes(Vec<u8>),
    /// First occurrence of an interned name: id plus the full text.
    SymbolDef(u32, String),
    /// Later occurrence: id only.
    SymbolRef(u32),
    Ext { tag: u64, data: Vec<u8> },
}

/// What a wire format can natively express.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FormatCaps {
    /// Containers may be framed without an upfront element count.
    pub indefinite_len: bool,
    /// Byte strings are a distinct kind from text.
    pub binary_bytes: bool,
    /// The wire has a symbol table (SymbolDef/SymbolRef survive).
    pub symbols: bool,
    /// The wire has a native extension kind; otherwise the engine emits a
    /// structural envelope.
    pub native_ext: bool,
    /// Output is deterministic without the engine sorting map keys.
    pub canonical_by_default: bool,
}

/// Token sink implemented by every format's writer.
///
/// `end_seq` / `end_map` are always called, including after definite-length
/// starts; formats without end markers treat them as no-ops.
pub trait TokenWriter {
    fn caps(&self) -> FormatCaps;

    fn begin_seq(&mut self, len: Option<usize>) -> Result<(), Error>;
    fn end_seq(&mut self) -> Result<(), Error>;
    fn begin_map(&mut self, len: Option<usize>) -> Result<(), Error>;
    fn end_map(&mut self) -> Result<(), Error>;

    fn write_nil(&mut self) -> Result<(), Error>;
    fn write_bool(&mut self, v: bool) -> Result<(), Error>;
    fn write_int(&mut self, v: i64) -> Result<(), Error>;
    fn write_uint(&mut self, v: u64) -> Result<(), Error>;
    fn write_float(&mut self, v: f64) -> Result<(), Error>;
    fn write_str(&mut self, v: &str) -> Result<(), Error>;
    fn write_bytes(&mut self, v: &[u8]) -> Result<(), Error>;
    fn write_symbol_def(&mut self, id: u32, name: &str) -> Result<(), Error>;
    fn write_symbol_ref(&mut self, id: u32) -> Result<(), Error>;
    fn write_ext(&mut self, tag: u64, data: &[u8]) -> Result<(), Error>;

    /// Drains buffered output to the underlying stream.
    fn flush(&mut self) -> Result<(), Error>;

    /// Generic dispatch, mostly useful to tests and adapters.
    fn write_token(&mut self, tok: &Token) -> Result<(), Error> {
        match tok {
            Token::SeqStart(len) => self.begin_seq(*len),
            Token::SeqEnd => self.end_seq(),
            Token::MapStart(len) => self.begin_map(*len),
            Token::MapEnd => self.end_map(),
            Token::Nil => self.write_nil(),
            Token::Bool(v) => self.write_bool(*v),
            Token::Int(v) => self.write_int(*v),
            Token::Uint(v) => self.write_uint(*v),
            Token::Float(v) => self.write_float(*v),
            Token::Str(v) => self.write_str(v),
            Token::Bytes(v) => self.write_bytes(v),
            Token::SymbolDef(id, name) => self.write_symbol_def(*id, name),
            Token::SymbolRef(id) => self.write_symbol_ref(*id),
            Token::Ext { tag, data } => self.write_ext(*tag, data),
        }
    }
}

/// Token source implemented by every format's reader.
pub trait TokenReader {
    fn caps(&self) -> FormatCaps;

    /// Pulls the next token. Errors carry the byte offset where decoding
    /// failed.
    fn next_token(&mut self) -> Result<Token, Error>;

    /// Absolute offset of the next unread byte.
    fn position(&self) -> u64;
}

/// A pluggable wire format: a writer/reader factory plus capability flags.
pub trait Format: Send + Sync {
    fn name(&self) -> &'static str;
    fn caps(&self) -> FormatCaps;
    fn writer<'a>(&self, handle: &'a Handle, out: &'a mut WriteBuf) -> Box<dyn TokenWriter + 'a>;
    fn reader<'a>(&self, handle: &'a Handle, src: &'a mut ReadBuf) -> Box<dyn TokenReader + 'a>;
}

impl<W: TokenWriter + ?Sized> TokenWriter for &mut W {
    fn caps(&self) -> FormatCaps {
        (**self).caps()
    }
    fn begin_seq(&mut self, len: Option<usize>) -> Result<(), Error> {
        (**self).begin_seq(len)
    }
    fn end_seq(&mut self) -> Result<(), Error> {
        (**self).end_seq()
    }
    fn begin_map(&mut self, len: Option<usize>) -> Result<(), Error> {
        (**self).begin_map(len)
    }
    fn end_map(&mut self) -> Result<(), Error> {
        (**self).end_map()
    }
    fn write_nil(&mut self) -> Result<(), Error> {
        (**self).write_nil()
    }
    fn write_bool(&mut self, v: bool) -> Result<(), Error> {
        (**self).write_bool(v)
    }
    fn write_int(&mut self, v: i64) -> Result<(), Error> {
        (**self).write_int(v)
    }
    fn write_uint(&mut self, v: u64) -> Result<(), Error> {
        (**self).write_uint(v)
    }
    fn write_float(&mut self, v: f64) -> Result<(), Error> {
        (**self).write_float(v)
    }
    fn write_str(&mut self, v: &str) -> Result<(), Error> {
        (**self).write_str(v)
    }
    fn write_bytes(&mut self, v: &[u8]) -> Result<(), Error> {
        (**self).write_bytes(v)
    }
    fn write_symbol_def(&mut self, id: u32, name: &str) -> Result<(), Error> {
        (**self).write_symbol_def(id, name)
    }
    fn write_symbol_ref(&mut self, id: u32) -> Result<(), Error> {
        (**self).write_symbol_ref(id)
    }
    fn write_ext(&mut self, tag: u64, data: &[u8]) -> Result<(), Error> {
        (**self).write_ext(tag, data)
    }
    fn flush(&mut self) -> Result<(), Error> {
        (**self).flush()
    }
}

impl<W: TokenWriter + ?Sized> TokenWriter for Box<W> {
    fn caps(&self) -> FormatCaps {
        (**self).caps()
    }
    fn begin_seq(&mut self, len: Option<usize>) -> Result<(), Error> {
        (**self).begin_seq(len)
    }
    fn end_seq(&mut self) -> Result<(), Error> {
        (**self).end_seq()
    }
    fn begin_map(&mut self, len: Option<usize>) -> Result<(), Error> {
        (**self).begin_map(len)
    }
    fn end_map(&mut self) -> Result<(), Error> {
        (**self).end_map()
    }
    fn write_nil(&mut self) -> Result<(), Error> {
        (**self).write_nil()
    }
    fn write_bool(&mut self, v: bool) -> Result<(), Error> {
        (**self).write_bool(v)
    }
    fn write_int(&mut self, v: i64) -> Result<(), Error> {
        (**self).write_int(v)
    }
    fn write_uint(&mut self, v: u64) -> Result<(), Error> {
        (**self).write_uint(v)
    }
    fn write_float(&mut self, v: f64) -> Result<(), Error> {
        (**self).write_float(v)
    }
    fn write_str(&mut self, v: &str) -> Result<(), Error> {
        (**self).write_str(v)
    }
    fn write_bytes(&mut self, v: &[u8]) -> Result<(), Error> {
        (**self).write_bytes(v)
    }
    fn write_symbol_def(&mut self, id: u32, name: &str) -> Result<(), Error> {
        (**self).write_symbol_def(id, name)
    }
    fn write_symbol_ref(&mut self, id: u32) -> Result<(), Error> {
        (**self).write_symbol_ref(id)
    }
    fn write_ext(&mut self, tag: u64, data: &[u8]) -> Result<(), Error> {
        (**self).write_ext(tag, data)
    }
    fn flush(&mut self) -> Result<(), Error> {
        (**self).flush()
    }
}

impl<R: TokenReader + ?Sized> TokenReader for &mut R {
    fn caps(&self) -> FormatCaps {
        (**self).caps()
    }
    fn next_token(&mut self) -> Result<Token, Error> {
        (**self).next_token()
    }
    fn position(&self) -> u64 {
        (**self).position()
    }
}

impl<R: TokenReader + ?Sized> TokenReader for Box<R> {
    fn caps(&self) -> FormatCaps {
        (**self).caps()
    }
    fn next_token(&mut self) -> Result<Token, Error> {
        (**self).next_token()
    }
    fn position(&self) -> u64 {
        (**self).position()
    }
}
