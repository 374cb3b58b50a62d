//! CBOR-like binary format.
//!
//! Major-type encoding per CBOR: the initial byte packs a 3-bit major type
//! and a 5-bit argument. Arrays and maps support both definite lengths and
//! indefinite framing terminated by the break byte. Extensions ride on
//! major type 6 (tag) followed by a byte string. Half-precision floats and
//! indefinite byte/text strings are not produced and are rejected on read.

use manifold_core::{Error, Format, FormatCaps, Handle, Token, TokenReader, TokenWriter};
use manifold_io::{ReadBuf, WriteBuf};

const MAJOR_UINT: u8 = 0;
const MAJOR_NEGINT: u8 = 1;
const MAJOR_BYTES: u8 = 2;
const MAJOR_TEXT: u8 = 3;
const MAJOR_ARRAY: u8 = 4;
const MAJOR_MAP: u8 = 5;
const MAJOR_TAG: u8 = 6;
const MAJOR_SIMPLE: u8 = 7;

const SIMPLE_FALSE: u8 = 20;
const SIMPLE_TRUE: u8 = 21;
const SIMPLE_NULL: u8 = 22;
const SIMPLE_UNDEFINED: u8 = 23;

const BREAK: u8 = 0xff;
const INDEFINITE: u8 = 31;

const CAPS: FormatCaps = FormatCaps {
    indefinite_len: true,
    binary_bytes: true,
    symbols: false,
    native_ext: true,
    canonical_by_default: false,
};

/// The CBOR-like format handle.
pub struct Cbor;

impl Format for Cbor {
    fn name(&self) -> &'static str {
        "cbor"
    }

    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn writer<'a>(&self, _handle: &'a Handle, out: &'a mut WriteBuf) -> Box<dyn TokenWriter + 'a> {
        Box::new(CborWriter {
            out,
            indefinite: Vec::new(),
        })
    }

    fn reader<'a>(&self, handle: &'a Handle, src: &'a mut ReadBuf) -> Box<dyn TokenReader + 'a> {
        Box::new(CborReader {
            handle,
            src,
            open: Vec::new(),
        })
    }
}

struct CborWriter<'a> {
    out: &'a mut WriteBuf,
    /// Per container: was it started indefinite (needs a break byte)?
    indefinite: Vec<bool>,
}

impl CborWriter<'_> {
    fn put_head(&mut self, major: u8, arg: u64) -> Result<(), Error> {
        let m = major << 5;
        if arg < 24 {
            self.out.put_u8(m | arg as u8)?;
        } else if arg <= u8::MAX as u64 {
            self.out.put_u8(m | 24)?;
            self.out.put_u8(arg as u8)?;
        } else if arg <= u16::MAX as u64 {
            self.out.put_u8(m | 25)?;
            self.out.put_u16_be(arg as u16)?;
        } else if arg <= u32::MAX as u64 {
            self.out.put_u8(m | 26)?;
            self.out.put_u32_be(arg as u32)?;
        } else {
            self.out.put_u8(m | 27)?;
            self.out.put_u64_be(arg)?;
        }
        Ok(())
    }

    fn begin_container(&mut self, major: u8, len: Option<usize>) -> Result<(), Error> {
        match len {
            Some(n) => {
                self.indefinite.push(false);
                self.put_head(major, n as u64)
            }
            None => {
                self.indefinite.push(true);
                Ok(self.out.put_u8((major << 5) | INDEFINITE)?)
            }
        }
    }

    fn end_container(&mut self) -> Result<(), Error> {
        if self.indefinite.pop() == Some(true) {
            self.out.put_u8(BREAK)?;
        }
        Ok(())
    }
}

impl TokenWriter for CborWriter<'_> {
    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn begin_seq(&mut self, len: Option<usize>) -> Result<(), Error> {
        self.begin_container(MAJOR_ARRAY, len)
    }

    fn end_seq(&mut self) -> Result<(), Error> {
        self.end_container()
    }

    fn begin_map(&mut self, len: Option<usize>) -> Result<(), Error> {
        self.begin_container(MAJOR_MAP, len)
    }

    fn end_map(&mut self) -> Result<(), Error> {
        self.end_container()
    }

    fn write_nil(&mut self) -> Result<(), Error> {
        Ok(self.out.put_u8((MAJOR_SIMPLE << 5) | SIMPLE_NULL)?)
    }

    fn write_bool(&mut self, v: bool) -> Result<(), Error> {
        let simple = if v { SIMPLE_TRUE } else { SIMPLE_FALSE };
        Ok(self.out.put_u8((MAJOR_SIMPLE << 5) | simple)?)
    }

    fn write_int(&mut self, v: i64) -> Result<(), Error> {
        if v >= 0 {
            self.put_head(MAJOR_UINT, v as u64)
        } else {
            self.put_head(MAJOR_NEGINT, !(v as u64))
        }
    }

    fn write_uint(&mut self, v: u64) -> Result<(), Error> {
        self.put_head(MAJOR_UINT, v)
    }

    fn write_float(&mut self, v: f64) -> Result<(), Error> {
        self.out.put_u8((MAJOR_SIMPLE << 5) | 27)?;
        Ok(self.out.put_u64_be(v.to_bits())?)
    }

    fn write_str(&mut self, v: &str) -> Result<(), Error> {
        self.put_head(MAJOR_TEXT, v.len() as u64)?;
        Ok(self.out.put_slice(v.as_bytes())?)
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<(), Error> {
        self.put_head(MAJOR_BYTES, v.len() as u64)?;
        Ok(self.out.put_slice(v)?)
    }

    fn write_symbol_def(&mut self, _id: u32, name: &str) -> Result<(), Error> {
        self.write_str(name)
    }

    fn write_symbol_ref(&mut self, id: u32) -> Result<(), Error> {
        Err(Error::UnknownSymbol { id })
    }

    fn write_ext(&mut self, tag: u64, data: &[u8]) -> Result<(), Error> {
        self.put_head(MAJOR_TAG, tag)?;
        self.write_bytes(data)
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(self.out.flush()?)
    }
}

struct CborReader<'a> {
    handle: &'a Handle,
    src: &'a mut ReadBuf,
    /// Open indefinite containers, true for maps. Break bytes resolve
    /// against this; definite containers never emit ends.
    open: Vec<bool>,
}

impl CborReader<'_> {
    fn read_arg(&mut self, info: u8, at: u64) -> Result<u64, Error> {
        match info {
            0..=23 => Ok(info as u64),
            24 => Ok(self.src.read_u8()? as u64),
            25 => Ok(self.src.read_u16_be()? as u64),
            26 => Ok(self.src.read_u32_be()? as u64),
            27 => Ok(self.src.read_u64_be()?),
            _ => Err(Error::wire(at, format!("reserved argument info {info}"))),
        }
    }

    fn check_len(&self, len: u64) -> Result<usize, Error> {
        let len = len as usize;
        if len > self.handle.max_init_len() {
            return Err(Error::LenExceeded {
                len,
                max: self.handle.max_init_len(),
            });
        }
        Ok(len)
    }
}

impl TokenReader for CborReader<'_> {
    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn position(&self) -> u64 {
        self.src.position()
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        let at = self.src.position();
        let b = self.src.read_u8()?;
        if b == BREAK {
            return match self.open.pop() {
                Some(true) => Ok(Token::MapEnd),
                Some(false) => Ok(Token::SeqEnd),
                None => Err(Error::wire(at, "break outside indefinite container")),
            };
        }
        let major = b >> 5;
        let info = b & 0x1f;
        match major {
            MAJOR_UINT => {
                let v = self.read_arg(info, at)?;
                if v <= i64::MAX as u64 {
                    Ok(Token::Int(v as i64))
                } else {
                    Ok(Token::Uint(v))
                }
            }
            MAJOR_NEGINT => {
                let n = self.read_arg(info, at)?;
                if n > i64::MAX as u64 {
                    return Err(Error::wire(at, "negative integer out of range"));
                }
                Ok(Token::Int(-1 - n as i64))
            }
            MAJOR_BYTES => {
                if info == INDEFINITE {
                    return Err(Error::wire(at, "indefinite byte strings not supported"));
                }
                let arg = self.read_arg(info, at)?;
                let len = self.check_len(arg)?;
                Ok(Token::Bytes(self.src.read_exact(len)?.to_vec()))
            }
            MAJOR_TEXT => {
                if info == INDEFINITE {
                    return Err(Error::wire(at, "indefinite text strings not supported"));
                }
                let arg = self.read_arg(info, at)?;
                let len = self.check_len(arg)?;
                let raw = self.src.read_exact(len)?;
                match std::str::from_utf8(raw) {
                    Ok(s) => Ok(Token::Str(s.to_string())),
                    Err(_) => Err(Error::wire(at, "invalid utf-8 in text string")),
                }
            }
            MAJOR_ARRAY => {
                if info == INDEFINITE {
                    self.open.push(false);
                    Ok(Token::SeqStart(None))
                } else {
                    let arg = self.read_arg(info, at)?;
                    Ok(Token::SeqStart(Some(self.check_len(arg)?)))
                }
            }
            MAJOR_MAP => {
                if info == INDEFINITE {
                    self.open.push(true);
                    Ok(Token::MapStart(None))
                } else {
                    let arg = self.read_arg(info, at)?;
                    Ok(Token::MapStart(Some(self.check_len(arg)?)))
                }
            }
            MAJOR_TAG => {
                let tag = self.read_arg(info, at)?;
                let next = self.src.read_u8()?;
                if next >> 5 != MAJOR_BYTES || next & 0x1f == INDEFINITE {
                    return Err(Error::wire(at, "extension payload must be a byte string"));
                }
                let arg = self.read_arg(next & 0x1f, at)?;
                let len = self.check_len(arg)?;
                let data = self.src.read_exact(len)?.to_vec();
                Ok(Token::Ext { tag, data })
            }
            MAJOR_SIMPLE => match info {
                SIMPLE_FALSE => Ok(Token::Bool(false)),
                SIMPLE_TRUE => Ok(Token::Bool(true)),
                SIMPLE_NULL | SIMPLE_UNDEFINED => Ok(Token::Nil),
                25 => Err(Error::wire(at, "half-precision floats not supported")),
                26 => Ok(Token::Float(f32::from_bits(self.src.read_u32_be()?) as f64)),
                27 => Ok(Token::Float(f64::from_bits(self.src.read_u64_be()?))),
                _ => Err(Error::wire(at, format!("unknown simple value {info}"))),
            },
            _ => unreachable!("major type is three bits"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::{from_slice, to_vec, Value};

    fn encode(v: &Value) -> Vec<u8> {
        to_vec(&Cbor, &Handle::new(), v).unwrap()
    }

    fn roundtrip(v: &Value) -> Value {
        from_slice(&Cbor, &Handle::new(), &encode(v)).unwrap()
    }

    #[test]
    fn test_known_vectors() {
        assert_eq!(encode(&Value::Int(0)), vec![0x00]);
        assert_eq!(encode(&Value::Int(23)), vec![0x17]);
        assert_eq!(encode(&Value::Int(24)), vec![0x18, 24]);
        assert_eq!(encode(&Value::Int(-1)), vec![0x20]);
        assert_eq!(encode(&Value::Int(-100)), vec![0x38, 99]);
        assert_eq!(encode(&Value::Nil), vec![0xf6]);
        assert_eq!(encode(&Value::Bool(true)), vec![0xf5]);
        assert_eq!(encode(&Value::Str("a".into())), vec![0x61, b'a']);
        assert_eq!(
            encode(&Value::Seq(vec![Value::Int(1), Value::Int(2)])),
            vec![0x82, 0x01, 0x02]
        );
        assert_eq!(
            encode(&Value::Float(1.5)),
            vec![0xfb, 0x3f, 0xf8, 0, 0, 0, 0, 0, 0]
        );
    }

    #[test]
    fn test_roundtrip_shapes() {
        let values = [
            Value::Int(-1),
            Value::Int(i64::MIN),
            Value::Uint(u64::MAX),
            Value::Float(0.1),
            Value::Str("héllo".into()),
            Value::Bytes(vec![1, 2, 3]),
            Value::Map(vec![(
                Value::Str("k".into()),
                Value::Seq(vec![Value::Bool(true), Value::Nil]),
            )]),
        ];
        for v in values {
            assert_eq!(roundtrip(&v), v);
        }
    }

    #[test]
    fn test_indefinite_containers_decode() {
        // [_ 1, [_ 2], {_ "a": 3}]
        let bytes = [
            0x9f, 0x01, 0x9f, 0x02, 0xff, 0xbf, 0x61, b'a', 0x03, 0xff, 0xff,
        ];
        let v = from_slice(&Cbor, &Handle::new(), &bytes).unwrap();
        assert_eq!(
            v,
            Value::Seq(vec![
                Value::Int(1),
                Value::Seq(vec![Value::Int(2)]),
                Value::Map(vec![(Value::Str("a".into()), Value::Int(3))]),
            ])
        );
    }

    #[test]
    fn test_stray_break_errors() {
        let err = from_slice(&Cbor, &Handle::new(), &[0xff]).unwrap_err();
        assert!(matches!(err, Error::Wire { .. }));
    }

    #[test]
    fn test_ext_roundtrip() {
        let v = Value::Ext(manifold_core::ExtValue {
            tag: 1000,
            data: vec![1, 2],
        });
        let bytes = encode(&v);
        // tag(1000) = 0xd9 0x03 0xe8, then bytes(2)
        assert_eq!(&bytes[..3], &[0xd9, 0x03, 0xe8]);
        assert_eq!(roundtrip(&v), v);
    }

    #[test]
    fn test_half_precision_rejected() {
        let err = from_slice(&Cbor, &Handle::new(), &[0xf9, 0x3c, 0x00]).unwrap_err();
        assert!(matches!(err, Error::Wire { .. }));
    }

    #[test]
    fn test_forged_length_capped() {
        let h = Handle::new().with_max_init_len(8);
        // array announcing 2^32 elements
        let err = from_slice(&Cbor, &h, &[0x9a, 0xff, 0xff, 0xff, 0xff]).unwrap_err();
        assert!(matches!(err, Error::LenExceeded { .. }));
    }
}
