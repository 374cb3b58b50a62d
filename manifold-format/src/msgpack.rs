//! MessagePack-like binary format.
//!
//! Follows the MessagePack layout: fixint/fixstr/fixarray/fixmap ranges,
//! width-suffixed scalars, `bin` for byte strings, and `ext`/`fixext` with a
//! one-byte type. Integer signedness is not preserved on the wire: on read,
//! non-negative integers surface as `Int` when they fit, `Uint` above
//! `i64::MAX`. Extension tags must fit the wire's signed byte. Containers
//! are always definite-length.

use manifold_core::{Error, Format, FormatCaps, Handle, Token, TokenReader, TokenWriter};
use manifold_io::{ReadBuf, WriteBuf};

const NIL: u8 = 0xc0;
const FALSE: u8 = 0xc2;
const TRUE: u8 = 0xc3;
const BIN8: u8 = 0xc4;
const BIN16: u8 = 0xc5;
const BIN32: u8 = 0xc6;
const EXT8: u8 = 0xc7;
const EXT16: u8 = 0xc8;
const EXT32: u8 = 0xc9;
const F32: u8 = 0xca;
const F64: u8 = 0xcb;
const U8: u8 = 0xcc;
const U16: u8 = 0xcd;
const U32: u8 = 0xce;
const U64: u8 = 0xcf;
const I8: u8 = 0xd0;
const I16: u8 = 0xd1;
const I32: u8 = 0xd2;
const I64: u8 = 0xd3;
const FIXEXT1: u8 = 0xd4;
const FIXEXT2: u8 = 0xd5;
const FIXEXT4: u8 = 0xd6;
const FIXEXT8: u8 = 0xd7;
const FIXEXT16: u8 = 0xd8;
const STR8: u8 = 0xd9;
const STR16: u8 = 0xda;
const STR32: u8 = 0xdb;
const ARR16: u8 = 0xdc;
const ARR32: u8 = 0xdd;
const MAP16: u8 = 0xde;
const MAP32: u8 = 0xdf;

const CAPS: FormatCaps = FormatCaps {
    indefinite_len: false,
    binary_bytes: true,
    symbols: false,
    native_ext: true,
    canonical_by_default: false,
};

/// The MessagePack-like format handle.
pub struct Msgpack;

impl Format for Msgpack {
    fn name(&self) -> &'static str {
        "msgpack"
    }

    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn writer<'a>(&self, _handle: &'a Handle, out: &'a mut WriteBuf) -> Box<dyn TokenWriter + 'a> {
        Box::new(MsgpackWriter { out })
    }

    fn reader<'a>(&self, handle: &'a Handle, src: &'a mut ReadBuf) -> Box<dyn TokenReader + 'a> {
        Box::new(MsgpackReader { handle, src })
    }
}

struct MsgpackWriter<'a> {
    out: &'a mut WriteBuf,
}

impl TokenWriter for MsgpackWriter<'_> {
    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn begin_seq(&mut self, len: Option<usize>) -> Result<(), Error> {
        let n = len.ok_or_else(|| Error::wire(0, "indefinite-length containers not supported"))?;
        if n <= 15 {
            self.out.put_u8(0x90 | n as u8)?;
        } else if n <= u16::MAX as usize {
            self.out.put_u8(ARR16)?;
            self.out.put_u16_be(n as u16)?;
        } else {
            self.out.put_u8(ARR32)?;
            self.out.put_u32_be(n as u32)?;
        }
        Ok(())
    }

    fn end_seq(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn begin_map(&mut self, len: Option<usize>) -> Result<(), Error> {
        let n = len.ok_or_else(|| Error::wire(0, "indefinite-length containers not supported"))?;
        if n <= 15 {
            self.out.put_u8(0x80 | n as u8)?;
        } else if n <= u16::MAX as usize {
            self.out.put_u8(MAP16)?;
            self.out.put_u16_be(n as u16)?;
        } else {
            self.out.put_u8(MAP32)?;
            self.out.put_u32_be(n as u32)?;
        }
        Ok(())
    }

    fn end_map(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn write_nil(&mut self) -> Result<(), Error> {
        Ok(self.out.put_u8(NIL)?)
    }

    fn write_bool(&mut self, v: bool) -> Result<(), Error> {
        Ok(self.out.put_u8(if v { TRUE } else { FALSE })?)
    }

    fn write_int(&mut self, v: i64) -> Result<(), Error> {
        if v >= 0 {
            return self.write_uint(v as u64);
        }
        if v >= -32 {
            self.out.put_u8(v as i8 as u8)?;
        } else if v >= i8::MIN as i64 {
            self.out.put_u8(I8)?;
            self.out.put_u8(v as i8 as u8)?;
        } else if v >= i16::MIN as i64 {
            self.out.put_u8(I16)?;
            self.out.put_u16_be(v as i16 as u16)?;
        } else if v >= i32::MIN as i64 {
            self.out.put_u8(I32)?;
            self.out.put_u32_be(v as i32 as u32)?;
        } else {
            self.out.put_u8(I64)?;
            self.out.put_u64_be(v as u64)?;
        }
        Ok(())
    }

    fn write_uint(&mut self, v: u64) -> Result<(), Error> {
        if v <= 0x7f {
            self.out.put_u8(v as u8)?;
        } else if v <= u8::MAX as u64 {
            self.out.put_u8(U8)?;
            self.out.put_u8(v as u8)?;
        } else if v <= u16::MAX as u64 {
            self.out.put_u8(U16)?;
            self.out.put_u16_be(v as u16)?;
        } else if v <= u32::MAX as u64 {
            self.out.put_u8(U32)?;
            self.out.put_u32_be(v as u32)?;
        } else {
            self.out.put_u8(U64)?;
            self.out.put_u64_be(v)?;
        }
        Ok(())
    }

    fn write_float(&mut self, v: f64) -> Result<(), Error> {
        self.out.put_u8(F64)?;
        Ok(self.out.put_u64_be(v.to_bits())?)
    }

    fn write_str(&mut self, v: &str) -> Result<(), Error> {
        let n = v.len();
        if n <= 31 {
            self.out.put_u8(0xa0 | n as u8)?;
        } else if n <= u8::MAX as usize {
            self.out.put_u8(STR8)?;
            self.out.put_u8(n as u8)?;
        } else if n <= u16::MAX as usize {
            self.out.put_u8(STR16)?;
            self.out.put_u16_be(n as u16)?;
        } else {
            self.out.put_u8(STR32)?;
            self.out.put_u32_be(n as u32)?;
        }
        Ok(self.out.put_slice(v.as_bytes())?)
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<(), Error> {
        let n = v.len();
        if n <= u8::MAX as usize {
            self.out.put_u8(BIN8)?;
            self.out.put_u8(n as u8)?;
        } else if n <= u16::MAX as usize {
            self.out.put_u8(BIN16)?;
            self.out.put_u16_be(n as u16)?;
        } else {
            self.out.put_u8(BIN32)?;
            self.out.put_u32_be(n as u32)?;
        }
        Ok(self.out.put_slice(v)?)
    }

    fn write_symbol_def(&mut self, _id: u32, name: &str) -> Result<(), Error> {
        self.write_str(name)
    }

    fn write_symbol_ref(&mut self, id: u32) -> Result<(), Error> {
        Err(Error::UnknownSymbol { id })
    }

    fn write_ext(&mut self, tag: u64, data: &[u8]) -> Result<(), Error> {
        if tag > i8::MAX as u64 {
            return Err(Error::Extension {
                tag,
                detail: "tag does not fit the wire's signed byte".to_string(),
            });
        }
        let n = data.len();
        match n {
            1 => self.out.put_u8(FIXEXT1)?,
            2 => self.out.put_u8(FIXEXT2)?,
            4 => self.out.put_u8(FIXEXT4)?,
            8 => self.out.put_u8(FIXEXT8)?,
            16 => self.out.put_u8(FIXEXT16)?,
            _ if n <= u8::MAX as usize => {
                self.out.put_u8(EXT8)?;
                self.out.put_u8(n as u8)?;
            }
            _ if n <= u16::MAX as usize => {
                self.out.put_u8(EXT16)?;
                self.out.put_u16_be(n as u16)?;
            }
            _ => {
                self.out.put_u8(EXT32)?;
                self.out.put_u32_be(n as u32)?;
            }
        }
        self.out.put_u8(tag as u8)?;
        Ok(self.out.put_slice(data)?)
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(self.out.flush()?)
    }
}

struct MsgpackReader<'a> {
    handle: &'a Handle,
    src: &'a mut ReadBuf,
}

impl MsgpackReader<'_> {
    fn check_len(&self, len: usize) -> Result<usize, Error> {
        if len > self.handle.max_init_len() {
            return Err(Error::LenExceeded {
                len,
                max: self.handle.max_init_len(),
            });
        }
        Ok(len)
    }

    fn str_token(&mut self, len: usize, at: u64) -> Result<Token, Error> {
        self.check_len(len)?;
        let raw = self.src.read_exact(len)?;
        match std::str::from_utf8(raw) {
            Ok(s) => Ok(Token::Str(s.to_string())),
            Err(_) => Err(Error::wire(at, "invalid utf-8 in string")),
        }
    }

    fn bytes_token(&mut self, len: usize) -> Result<Token, Error> {
        self.check_len(len)?;
        Ok(Token::Bytes(self.src.read_exact(len)?.to_vec()))
    }

    fn ext_token(&mut self, len: usize) -> Result<Token, Error> {
        self.check_len(len)?;
        let tag = self.src.read_u8()? as i8;
        if tag < 0 {
            return Err(Error::wire(
                self.src.position(),
                "reserved extension type",
            ));
        }
        let data = self.src.read_exact(len)?.to_vec();
        Ok(Token::Ext {
            tag: tag as u64,
            data,
        })
    }

    fn uint_token(v: u64) -> Token {
        if v <= i64::MAX as u64 {
            Token::Int(v as i64)
        } else {
            Token::Uint(v)
        }
    }
}

impl TokenReader for MsgpackReader<'_> {
    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn position(&self) -> u64 {
        self.src.position()
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        let at = self.src.position();
        let b = self.src.read_u8()?;
        match b {
            0x00..=0x7f => Ok(Token::Int(b as i64)),
            0x80..=0x8f => Ok(Token::MapStart(Some(
                self.check_len((b & 0x0f) as usize)?,
            ))),
            0x90..=0x9f => Ok(Token::SeqStart(Some(
                self.check_len((b & 0x0f) as usize)?,
            ))),
            0xa0..=0xbf => self.str_token((b & 0x1f) as usize, at),
            NIL => Ok(Token::Nil),
            FALSE => Ok(Token::Bool(false)),
            TRUE => Ok(Token::Bool(true)),
            BIN8 => {
                let n = self.src.read_u8()? as usize;
                self.bytes_token(n)
            }
            BIN16 => {
                let n = self.src.read_u16_be()? as usize;
                self.bytes_token(n)
            }
            BIN32 => {
                let n = self.src.read_u32_be()? as usize;
                self.bytes_token(n)
            }
            EXT8 => {
                let n = self.src.read_u8()? as usize;
                self.ext_token(n)
            }
            EXT16 => {
                let n = self.src.read_u16_be()? as usize;
                self.ext_token(n)
            }
            EXT32 => {
                let n = self.src.read_u32_be()? as usize;
                self.ext_token(n)
            }
            F32 => Ok(Token::Float(
                f32::from_bits(self.src.read_u32_be()?) as f64
            )),
            F64 => Ok(Token::Float(f64::from_bits(self.src.read_u64_be()?))),
            U8 => Ok(Self::uint_token(self.src.read_u8()? as u64)),
            U16 => Ok(Self::uint_token(self.src.read_u16_be()? as u64)),
            U32 => Ok(Self::uint_token(self.src.read_u32_be()? as u64)),
            U64 => Ok(Self::uint_token(self.src.read_u64_be()?)),
            I8 => Ok(Token::Int(self.src.read_u8()? as i8 as i64)),
            I16 => Ok(Token::Int(self.src.read_u16_be()? as i16 as i64)),
            I32 => Ok(Token::Int(self.src.read_u32_be()? as i32 as i64)),
            I64 => Ok(Token::Int(self.src.read_u64_be()? as i64)),
            FIXEXT1 => self.ext_token(1),
            FIXEXT2 => self.ext_token(2),
            FIXEXT4 => self.ext_token(4),
            FIXEXT8 => self.ext_token(8),
            FIXEXT16 => self.ext_token(16),
            STR8 => {
                let n = self.src.read_u8()? as usize;
                self.str_token(n, at)
            }
            STR16 => {
                let n = self.src.read_u16_be()? as usize;
                self.str_token(n, at)
            }
            STR32 => {
                let n = self.src.read_u32_be()? as usize;
                self.str_token(n, at)
            }
            ARR16 => {
                let n = self.src.read_u16_be()? as usize;
                Ok(Token::SeqStart(Some(self.check_len(n)?)))
            }
            ARR32 => {
                let n = self.src.read_u32_be()? as usize;
                Ok(Token::SeqStart(Some(self.check_len(n)?)))
            }
            MAP16 => {
                let n = self.src.read_u16_be()? as usize;
                Ok(Token::MapStart(Some(self.check_len(n)?)))
            }
            MAP32 => {
                let n = self.src.read_u32_be()? as usize;
                Ok(Token::MapStart(Some(self.check_len(n)?)))
            }
            0xe0..=0xff => Ok(Token::Int(b as i8 as i64)),
            _ => Err(Error::wire(at, format!("reserved marker {b:#04x}"))),
        }
    }
}
