//! Compact tag-length binary format.
//!
//! Every item is one tag byte followed by a big-endian payload. The low two
//! bits of width-coded tags select the payload width (1, 2, 4, or 8 bytes):
//!
//! ```text
//! 0x00 nil        0x01 false      0x02 true       0x05 f64 (8 bytes)
//! 0x08+w uint     0x10+w int      0x18+w str      0x20+w bytes
//! 0x28+w seq      0x30+w map      0x38+w ext
//! ```
//!
//! Strings, bytes, and ext carry a width-coded length then raw payload; seq
//! and map carry a width-coded element (pair) count. Ext is the data length,
//! an 8-byte tag, then the data. Containers are always definite-length.

use manifold_core::{Error, Format, FormatCaps, Handle, Token, TokenReader, TokenWriter};
use manifold_io::{ReadBuf, WriteBuf};

pub const TAG_NIL: u8 = 0x00;
pub const TAG_FALSE: u8 = 0x01;
pub const TAG_TRUE: u8 = 0x02;
pub const TAG_F64: u8 = 0x05;
pub const TAG_UINT: u8 = 0x08;
pub const TAG_INT: u8 = 0x10;
pub const TAG_STR: u8 = 0x18;
pub const TAG_BYTES: u8 = 0x20;
pub const TAG_SEQ: u8 = 0x28;
pub const TAG_MAP: u8 = 0x30;
pub const TAG_EXT: u8 = 0x38;

const CAPS: FormatCaps = FormatCaps {
    indefinite_len: false,
    binary_bytes: true,
    symbols: false,
    native_ext: true,
    canonical_by_default: false,
};

/// The tag-length format handle.
pub struct Taglen;

impl Format for Taglen {
    fn name(&self) -> &'static str {
        "taglen"
    }

    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn writer<'a>(&self, _handle: &'a Handle, out: &'a mut WriteBuf) -> Box<dyn TokenWriter + 'a> {
        Box::new(TaglenWriter { out })
    }

    fn reader<'a>(&self, handle: &'a Handle, src: &'a mut ReadBuf) -> Box<dyn TokenReader + 'a> {
        Box::new(TaglenReader { handle, src })
    }
}

/// Width code for a u64: 0..=3 selecting 1, 2, 4, or 8 bytes.
fn width_of(v: u64) -> u8 {
    if v <= u8::MAX as u64 {
        0
    } else if v <= u16::MAX as u64 {
        1
    } else if v <= u32::MAX as u64 {
        2
    } else {
        3
    }
}

struct TaglenWriter<'a> {
    out: &'a mut WriteBuf,
}

impl TaglenWriter<'_> {
    fn put_width_coded(&mut self, base: u8, v: u64) -> Result<(), Error> {
        let w = width_of(v);
        self.out.put_u8(base | w)?;
        match w {
            0 => self.out.put_u8(v as u8)?,
            1 => self.out.put_u16_be(v as u16)?,
            2 => self.out.put_u32_be(v as u32)?,
            _ => self.out.put_u64_be(v)?,
        }
        Ok(())
    }
}

impl TokenWriter for TaglenWriter<'_> {
    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn begin_seq(&mut self, len: Option<usize>) -> Result<(), Error> {
        match len {
            Some(n) => self.put_width_coded(TAG_SEQ, n as u64),
            None => Err(Error::wire(0, "indefinite-length containers not supported")),
        }
    }

    fn end_seq(&mut self) -> Result<(), Error> {
        Ok(())
    }

    fn begin_map(&mut self, len: Option<usize>) -> Result<(), Error> {
        match len {
            Some(n) => self.put_width_coded(TAG_MAP, n as u64),
            None => Err(Error::wire(0, "indefinite-length containers not supported")),
        }
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
        let w = if v >= i8::MIN as i64 && v <= i8::MAX as i64 {
            0
        } else if v >= i16::MIN as i64 && v <= i16::MAX as i64 {
            1
        } else if v >= i32::MIN as i64 && v <= i32::MAX as i64 {
            2
        } else {
            3
        };
        self.out.put_u8(TAG_INT | w)?;
        match w {
            0 => self.out.put_u8(v as i8 as u8)?,
            1 => self.out.put_u16_be(v as i16 as u16)?,
            2 => self.out.put_u32_be(v as i32 as u32)?,
            _ => self.out.put_u64_be(v as u64)?,
        }
        Ok(())
    }

    fn write_uint(&mut self, v: u64) -> Result<(), Error> {
        self.put_width_coded(TAG_UINT, v)
    }

    fn write_float(&mut self, v: f64) -> Result<(), Error> {
        self.out.put_u8(TAG_F64)?;
        Ok(self.out.put_u64_be(v.to_bits())?)
    }

    fn write_str(&mut self, v: &str) -> Result<(), Error> {
        self.put_width_coded(TAG_STR, v.len() as u64)?;
        Ok(self.out.put_slice(v.as_bytes())?)
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<(), Error> {
        self.put_width_coded(TAG_BYTES, v.len() as u64)?;
        Ok(self.out.put_slice(v)?)
    }

    fn write_symbol_def(&mut self, _id: u32, name: &str) -> Result<(), Error> {
        self.write_str(name)
    }

    fn write_symbol_ref(&mut self, id: u32) -> Result<(), Error> {
        Err(Error::UnknownSymbol { id })
    }

    fn write_ext(&mut self, tag: u64, data: &[u8]) -> Result<(), Error> {
        self.put_width_coded(TAG_EXT, data.len() as u64)?;
        self.out.put_u64_be(tag)?;
        Ok(self.out.put_slice(data)?)
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(self.out.flush()?)
    }
}

struct TaglenReader<'a> {
    handle: &'a Handle,
    src: &'a mut ReadBuf,
}

impl TaglenReader<'_> {
    fn read_width(&mut self, w: u8) -> Result<u64, Error> {
        Ok(match w {
            0 => self.src.read_u8()? as u64,
            1 => self.src.read_u16_be()? as u64,
            2 => self.src.read_u32_be()? as u64,
            _ => self.src.read_u64_be()?,
        })
    }

    fn read_len(&mut self, w: u8) -> Result<usize, Error> {
        let len = self.read_width(w)? as usize;
        if len > self.handle.max_init_len() {
            return Err(Error::LenExceeded {
                len,
                max: self.handle.max_init_len(),
            });
        }
        Ok(len)
    }
}

impl TokenReader for TaglenReader<'_> {
    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn position(&self) -> u64 {
        self.src.position()
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        let at = self.src.position();
        let tag = self.src.read_u8()?;
        let w = tag & 0x03;
        match tag & !0x03 {
            _ if tag == TAG_NIL => Ok(Token::Nil),
            _ if tag == TAG_FALSE => Ok(Token::Bool(false)),
            _ if tag == TAG_TRUE => Ok(Token::Bool(true)),
            _ if tag == TAG_F64 => Ok(Token::Float(f64::from_bits(self.src.read_u64_be()?))),
            TAG_UINT => Ok(Token::Uint(self.read_width(w)?)),
            TAG_INT => {
                let v = match w {
                    0 => self.src.read_u8()? as i8 as i64,
                    1 => self.src.read_u16_be()? as i16 as i64,
                    2 => self.src.read_u32_be()? as i32 as i64,
                    _ => self.src.read_u64_be()? as i64,
                };
                Ok(Token::Int(v))
            }
            TAG_STR => {
                let len = self.read_len(w)?;
                let raw = self.src.read_exact(len)?;
                match std::str::from_utf8(raw) {
                    Ok(s) => Ok(Token::Str(s.to_string())),
                    Err(_) => Err(Error::wire(at, "invalid utf-8 in string")),
                }
            }
            TAG_BYTES => {
                let len = self.read_len(w)?;
                Ok(Token::Bytes(self.src.read_exact(len)?.to_vec()))
            }
            TAG_SEQ => Ok(Token::SeqStart(Some(self.read_len(w)?))),
            TAG_MAP => Ok(Token::MapStart(Some(self.read_len(w)?))),
            TAG_EXT => {
                let len = self.read_len(w)?;
                let tag = self.src.read_u64_be()?;
                let data = self.src.read_exact(len)?.to_vec();
                Ok(Token::Ext { tag, data })
            }
            _ => Err(Error::wire(at, format!("unknown tag byte {tag:#04x}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::{from_slice, to_vec, Value};

    fn roundtrip(v: &Value) -> Value {
        let h = Handle::new();
        let bytes = to_vec(&Taglen, &h, v).unwrap();
        from_slice(&Taglen, &h, &bytes).unwrap()
    }

    #[test]
    fn test_scalar_bytes() {
        let h = Handle::new();
        assert_eq!(to_vec(&Taglen, &h, &Value::Nil).unwrap(), vec![0x00]);
        assert_eq!(to_vec(&Taglen, &h, &Value::Bool(true)).unwrap(), vec![0x02]);
        assert_eq!(
            to_vec(&Taglen, &h, &Value::Uint(0x1234)).unwrap(),
            vec![TAG_UINT | 1, 0x12, 0x34]
        );
        assert_eq!(
            to_vec(&Taglen, &h, &Value::Int(-2)).unwrap(),
            vec![TAG_INT, 0xFE]
        );
        assert_eq!(
            to_vec(&Taglen, &h, &Value::Str("hi".into())).unwrap(),
            vec![TAG_STR, 2, b'h', b'i']
        );
    }

    #[test]
    fn test_width_selection() {
        assert_eq!(width_of(0xFF), 0);
        assert_eq!(width_of(0x100), 1);
        assert_eq!(width_of(0x10000), 2);
        assert_eq!(width_of(u64::MAX), 3);
    }

    #[test]
    fn test_roundtrip_shapes() {
        let values = [
            Value::Nil,
            Value::Bool(false),
            Value::Int(i64::MIN),
            Value::Uint(u64::MAX),
            Value::Float(-2.75),
            Value::Str("héllo".into()),
            Value::Bytes(vec![0, 255, 3]),
            Value::Seq(vec![Value::Int(1), Value::Str("x".into())]),
            Value::Map(vec![(Value::Str("k".into()), Value::Uint(300))]),
        ];
        for v in values {
            assert_eq!(roundtrip(&v), v);
        }
    }

    #[test]
    fn test_ext_roundtrip() {
        let v = Value::Ext(manifold_core::ExtValue {
            tag: 77,
            data: vec![9, 8, 7],
        });
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_unknown_tag_errors() {
        let h = Handle::new();
        let err = from_slice(&Taglen, &h, &[0xFF]).unwrap_err();
        assert!(matches!(err, Error::Wire { offset: 0, .. }));
    }

    #[test]
    fn test_truncated_input_is_io_error() {
        let h = Handle::new();
        let err = from_slice(&Taglen, &h, &[TAG_STR, 5, b'a']).unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }

    #[test]
    fn test_len_ceiling_enforced_before_alloc() {
        let h = Handle::new().with_max_init_len(3);
        let err = from_slice(&Taglen, &h, &[TAG_BYTES, 200]).unwrap_err();
        assert!(matches!(err, Error::LenExceeded { len: 200, max: 3 }));
    }
}
