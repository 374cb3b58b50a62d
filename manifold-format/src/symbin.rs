//! Symbol-table binary format.
//!
//! A varint-based grammar with a wire-level symbol table: the first
//! occurrence of an interned name is a definition carrying id and text,
//! later occurrences are a bare id reference. Scalars use LEB128 varints
//! (zigzag for signed), so small values stay small:
//!
//! ```text
//! 0x00 nil     0x01 false   0x02 true    0x03 uint     0x04 int
//! 0x05 f64     0x06 str     0x07 bytes   0x08 seq      0x09 map
//! 0x0a ext     0x0b symdef  0x0c symref
//! ```

use manifold_core::{Error, Format, FormatCaps, Handle, Token, TokenReader, TokenWriter};
use manifold_io::{ReadBuf, WriteBuf};

pub const TAG_NIL: u8 = 0x00;
pub const TAG_FALSE: u8 = 0x01;
pub const TAG_TRUE: u8 = 0x02;
pub const TAG_UINT: u8 = 0x03;
pub const TAG_INT: u8 = 0x04;
pub const TAG_F64: u8 = 0x05;
pub const TAG_STR: u8 = 0x06;
pub const TAG_BYTES: u8 = 0x07;
pub const TAG_SEQ: u8 = 0x08;
pub const TAG_MAP: u8 = 0x09;
pub const TAG_EXT: u8 = 0x0a;
pub const TAG_SYMDEF: u8 = 0x0b;
pub const TAG_SYMREF: u8 = 0x0c;

const CAPS: FormatCaps = FormatCaps {
    indefinite_len: false,
    binary_bytes: true,
    symbols: true,
    native_ext: true,
    canonical_by_default: false,
};

/// The symbol-table binary format handle.
pub struct Symbin;

impl Format for Symbin {
    fn name(&self) -> &'static str {
        "symbin"
    }

    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn writer<'a>(&self, _handle: &'a Handle, out: &'a mut WriteBuf) -> Box<dyn TokenWriter + 'a> {
        Box::new(SymbinWriter { out })
    }

    fn reader<'a>(&self, handle: &'a Handle, src: &'a mut ReadBuf) -> Box<dyn TokenReader + 'a> {
        Box::new(SymbinReader { handle, src })
    }
}

fn zigzag(v: i64) -> u64 {
    ((v << 1) ^ (v >> 63)) as u64
}

fn unzigzag(v: u64) -> i64 {
    ((v >> 1) as i64) ^ -((v & 1) as i64)
}

struct SymbinWriter<'a> {
    out: &'a mut WriteBuf,
}

impl SymbinWriter<'_> {
    fn put_varint(&mut self, mut v: u64) -> Result<(), Error> {
        loop {
            let byte = (v & 0x7f) as u8;
            v >>= 7;
            if v == 0 {
                self.out.put_u8(byte)?;
                return Ok(());
            }
            self.out.put_u8(byte | 0x80)?;
        }
    }
}

impl TokenWriter for SymbinWriter<'_> {
    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn begin_seq(&mut self, len: Option<usize>) -> Result<(), Error> {
        let n = len.ok_or_else(|| Error::wire(0, "indefinite-length containers not supported"))?;
        self.out.put_u8(TAG_SEQ)?;
        self.put_varint(n as u64)
    }

    fn end_seq(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn begin_map(&mut self, len: Option<usize>) -> Result<(), Error> {
        let n = len.ok_or_else(|| Error::wire(0, "indefinite-length containers not supported"))?;
        self.out.put_u8(TAG_MAP)?;
        self.put_varint(n as u64)
    }

    fn end_map(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn write_nil(&mut self) -> Result<(), Error> {
        Ok(self.out.put_u8(TAG_NIL)?)
    }

    fn write_bool(&mut self, v: bool) -> Result<(), Error> {
        Ok(self.out.put_u8(if v { TAG_TRUE } else { TAG_FALSE })?)
    }

    fn write_int(&mut self, v: i64) -> Result<(), Error> {
        self.out.put_u8(TAG_INT)?;
        self.put_varint(zigzag(v))
    }

    fn write_uint(&mut self, v: u64) -> Result<(), Error> {
        self.out.put_u8(TAG_UINT)?;
        self.put_varint(v)
    }

    fn write_float(&mut self, v: f64) -> Result<(), Error> {
        self.out.put_u8(TAG_F64)?;
        Ok(self.out.put_u64_be(v.to_bits())?)
    }

    fn write_str(&mut self, v: &str) -> Result<(), Error> {
        self.out.put_u8(TAG_STR)?;
        self.put_varint(v.len() as u64)?;
        Ok(self.out.put_slice(v.as_bytes())?)
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<(), Error> {
        self.out.put_u8(TAG_BYTES)?;
        self.put_varint(v.len() as u64)?;
        Ok(self.out.put_slice(v)?)
    }

    fn write_symbol_def(&mut self, id: u32, name: &str) -> Result<(), Error> {
        self.out.put_u8(TAG_SYMDEF)?;
        self.put_varint(id as u64)?;
        self.put_varint(name.len() as u64)?;
        Ok(self.out.put_slice(name.as_bytes())?)
    }

    fn write_symbol_ref(&mut self, id: u32) -> Result<(), Error> {
        self.out.put_u8(TAG_SYMREF)?;
        self.put_varint(id as u64)
    }

    fn write_ext(&mut self, tag: u64, data: &[u8]) -> Result<(), Error> {
        self.out.put_u8(TAG_EXT)?;
        self.put_varint(tag)?;
        self.put_varint(data.len() as u64)?;
        Ok(self.out.put_slice(data)?)
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(self.out.flush()?)
    }
}

struct SymbinReader<'a> {
    handle: &'a Handle,
    src: &'a mut ReadBuf,
}

impl SymbinReader<'_> {
    fn read_varint(&mut self) -> Result<u64, Error> {
        let at = self.src.position();
        let mut v: u64 = 0;
        let mut shift = 0;
        loop {
            let b = self.src.read_u8()?;
            if shift == 63 && b > 1 {
                return Err(Error::wire(at, "varint overflows 64 bits"));
            }
            v |= ((b & 0x7f) as u64) << shift;
            if b & 0x80 == 0 {
                return Ok(v);
            }
            shift += 7;
            if shift > 63 {
                return Err(Error::wire(at, "varint overflows 64 bits"));
            }
        }
    }

    fn read_len(&mut self) -> Result<usize, Error> {
        let len = self.read_varint()? as usize;
        if len > self.handle.max_init_len() {
            return Err(Error::LenExceeded {
                len,
                max: self.handle.max_init_len(),
            });
        }
        Ok(len)
    }

    fn read_str(&mut self, at: u64) -> Result<String, Error> {
        let len = self.read_len()?;
        let raw = self.src.read_exact(len)?;
        match std::str::from_utf8(raw) {
            Ok(s) => Ok(s.to_string()),
            Err(_) => Err(Error::wire(at, "invalid utf-8 in string")),
        }
    }

    fn read_symbol_id(&mut self, at: u64) -> Result<u32, Error> {
        let id = self.read_varint()?;
        u32::try_from(id).map_err(|_| Error::wire(at, "symbol id out of range"))
    }
}

impl TokenReader for SymbinReader<'_> {
    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn position(&self) -> u64 {
        self.src.position()
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        let at = self.src.position();
        let tag = self.src.read_u8()?;
        match tag {
            TAG_NIL => Ok(Token::Nil),
            TAG_FALSE => Ok(Token::Bool(false)),
            TAG_TRUE => Ok(Token::Bool(true)),
            TAG_UINT => Ok(Token::Uint(self.read_varint()?)),
            TAG_INT => Ok(Token::Int(unzigzag(self.read_varint()?))),
            TAG_F64 => Ok(Token::Float(f64::from_bits(self.src.read_u64_be()?))),
            TAG_STR => Ok(Token::Str(self.read_str(at)?)),
            TAG_BYTES => {
                let len = self.read_len()?;
                Ok(Token::Bytes(self.src.read_exact(len)?.to_vec()))
            }
            TAG_SEQ => Ok(Token::SeqStart(Some(self.read_len()?))),
            TAG_MAP => Ok(Token::MapStart(Some(self.read_len()?))),
            TAG_EXT => {
                let ext_tag = self.read_varint()?;
                let len = self.read_len()?;
                Ok(Token::Ext {
                    tag: ext_tag,
                    data: self.src.read_exact(len)?.to_vec(),
                })
            }
            TAG_SYMDEF => {
                let id = self.read_symbol_id(at)?;
                let name = self.read_str(at)?;
                Ok(Token::SymbolDef(id, name))
            }
            TAG_SYMREF => Ok(Token::SymbolRef(self.read_symbol_id(at)?)),
            _ => Err(Error::wire(at, format!("unknown tag byte {tag:#04x}"))),
        }
    }
}
