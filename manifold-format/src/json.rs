//! JSON text format.
//!
//! Human-formatting options live on the handle: `indent` produces pretty
//! output, `html_chars_as_is` disables the `<`-style escaping of `<`,
//! `>`, `&`. Byte strings have no native JSON kind and are written as
//! arrays of numbers; scalars written in object-key position are quoted.
//! Containers are inherently indefinite-length on this wire, so readers
//! always produce `SeqStart(None)` / `MapStart(None)` with explicit ends.

use manifold_core::{Error, Format, FormatCaps, Handle, Token, TokenReader, TokenWriter};
use manifold_io::{ReadBuf, WriteBuf};
use std::io;

const CAPS: FormatCaps = FormatCaps {
    indefinite_len: true,
    binary_bytes: false,
    symbols: false,
    native_ext: false,
    canonical_by_default: false,
};

/// The JSON format handle.
pub struct Json;

impl Format for Json {
    fn name(&self) -> &'static str {
        "json"
    }

    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn writer<'a>(&self, handle: &'a Handle, out: &'a mut WriteBuf) -> Box<dyn TokenWriter + 'a> {
        Box::new(JsonWriter {
            handle,
            out,
            stack: Vec::new(),
        })
    }

    fn reader<'a>(&self, handle: &'a Handle, src: &'a mut ReadBuf) -> Box<dyn TokenReader + 'a> {
        Box::new(JsonReader {
            handle,
            src,
            stack: Vec::new(),
        })
    }
}

#[derive(Clone, Copy)]
struct Frame {
    is_map: bool,
    items: usize,
}

struct JsonWriter<'a> {
    handle: &'a Handle,
    out: &'a mut WriteBuf,
    stack: Vec<Frame>,
}

impl JsonWriter<'_> {
    fn newline_indent(&mut self, depth: usize) -> Result<(), Error> {
        if self.handle.indent() > 0 {
            self.out.put_u8(b'\n')?;
            for _ in 0..depth * self.handle.indent() {
                self.out.put_u8(b' ')?;
            }
        }
        Ok(())
    }

    fn in_key_position(&self) -> bool {
        self.stack
            .last()
            .map(|f| f.is_map && f.items % 2 == 0)
            .unwrap_or(false)
    }

    /// Emits the separator owed before the next key or value.
    fn pre_value(&mut self) -> Result<(), Error> {
        let depth = self.stack.len();
        if let Some(top) = self.stack.last().copied() {
            if top.is_map && top.items % 2 == 1 {
                self.out.put_u8(b':')?;
                if self.handle.indent() > 0 {
                    self.out.put_u8(b' ')?;
                }
            } else {
                if top.items > 0 {
                    self.out.put_u8(b',')?;
                }
                self.newline_indent(depth)?;
            }
        }
        Ok(())
    }

    fn post_value(&mut self) {
        if let Some(top) = self.stack.last_mut() {
            top.items += 1;
        }
    }

    /// Writes an unquoted literal, quoting it in object-key position.
    fn emit_atom(&mut self, text: &str) -> Result<(), Error> {
        let key = self.in_key_position();
        self.pre_value()?;
        if key {
            self.out.put_u8(b'"')?;
        }
        self.out.put_slice(text.as_bytes())?;
        if key {
            self.out.put_u8(b'"')?;
        }
        self.post_value();
        Ok(())
    }

    fn put_escaped(&mut self, s: &str) -> Result<(), Error> {
        let escape_html = !self.handle.html_chars_as_is();
        self.out.put_u8(b'"')?;
        let mut utf8 = [0u8; 4];
        for c in s.chars() {
            match c {
                '"' => self.out.put_slice(b"\\\"")?,
                '\\' => self.out.put_slice(b"\\\\")?,
                '\n' => self.out.put_slice(b"\\n")?,
                '\t' => self.out.put_slice(b"\\t")?,
                '\r' => self.out.put_slice(b"\\r")?,
                '\u{8}' => self.out.put_slice(b"\\b")?,
                '\u{c}' => self.out.put_slice(b"\\f")?,
                '<' | '>' | '&' if escape_html => {
                    let esc = format!("\\u{:04x}", c as u32);
                    self.out.put_slice(esc.as_bytes())?;
                }
                c if (c as u32) < 0x20 => {
                    let esc = format!("\\u{:04x}", c as u32);
                    self.out.put_slice(esc.as_bytes())?;
                }
                c => self.out.put_slice(c.encode_utf8(&mut utf8).as_bytes())?,
            }
        }
        Ok(self.out.put_u8(b'"')?)
    }
}

impl TokenWriter for JsonWriter<'_> {
    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn begin_seq(&mut self, _len: Option<usize>) -> Result<(), Error> {
        self.pre_value()?;
        self.out.put_u8(b'[')?;
        self.stack.push(Frame {
            is_map: false,
            items: 0,
        });
        Ok(())
    }

    fn end_seq(&mut self) -> Result<(), Error> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| Error::wire(0, "unbalanced container end"))?;
        if frame.items > 0 {
            self.newline_indent(self.stack.len())?;
        }
        self.out.put_u8(b']')?;
        self.post_value();
        Ok(())
    }

    fn begin_map(&mut self, _len: Option<usize>) -> Result<(), Error> {
        self.pre_value()?;
        self.out.put_u8(b'{')?;
        self.stack.push(Frame {
            is_map: true,
            items: 0,
        });
        Ok(())
    }

    fn end_map(&mut self) -> Result<(), Error> {
        let frame = self
            .stack
            .pop()
            .ok_or_else(|| Error::wire(0, "unbalanced container end"))?;
        if frame.items > 0 {
            self.newline_indent(self.stack.len())?;
        }
        self.out.put_u8(b'}')?;
        self.post_value();
        Ok(())
    }

    fn write_nil(&mut self) -> Result<(), Error> {
        self.emit_atom("null")
    }

    fn write_bool(&mut self, v: bool) -> Result<(), Error> {
        self.emit_atom(if v { "true" } else { "false" })
    }

    fn write_int(&mut self, v: i64) -> Result<(), Error> {
        self.emit_atom(&v.to_string())
    }

    fn write_uint(&mut self, v: u64) -> Result<(), Error> {
        self.emit_atom(&v.to_string())
    }

    fn write_float(&mut self, v: f64) -> Result<(), Error> {
        if !v.is_finite() {
            // JSON has no NaN or infinities.
            return self.emit_atom("null");
        }
        if v.fract() == 0.0 {
            // Keep a decimal point so the value reads back as a float.
            self.emit_atom(&format!("{v:.1}"))
        } else {
            self.emit_atom(&v.to_string())
        }
    }

    fn write_str(&mut self, v: &str) -> Result<(), Error> {
        self.pre_value()?;
        self.put_escaped(v)?;
        self.post_value();
        Ok(())
    }

    fn write_bytes(&mut self, v: &[u8]) -> Result<(), Error> {
        self.begin_seq(Some(v.len()))?;
        for b in v {
            self.write_uint(*b as u64)?;
        }
        self.end_seq()
    }

    fn write_symbol_def(&mut self, _id: u32, name: &str) -> Result<(), Error> {
        self.write_str(name)
    }

    fn write_symbol_ref(&mut self, id: u32) -> Result<(), Error> {
        Err(Error::UnknownSymbol { id })
    }

    fn write_ext(&mut self, tag: u64, _data: &[u8]) -> Result<(), Error> {
        Err(Error::Extension {
            tag,
            detail: "format has no native extension kind".to_string(),
        })
    }

    fn flush(&mut self) -> Result<(), Error> {
        Ok(self.out.flush()?)
    }
}

struct JsonReader<'a> {
    handle: &'a Handle,
    src: &'a mut ReadBuf,
    stack: Vec<Frame>,
}

impl JsonReader<'_> {
    fn skip_ws(&mut self) -> Result<(), Error> {
        while let Some(b) = self.src.peek_u8()? {
            match b {
                b' ' | b'\t' | b'\n' | b'\r' => {
                    self.src.read_u8()?;
                }
                _ => break,
            }
        }
        Ok(())
    }

    fn peek_req(&mut self) -> Result<u8, Error> {
        self.src.peek_u8()?.ok_or_else(|| {
            Error::Io(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                "unexpected end of input",
            ))
        })
    }

    fn expect(&mut self, c: u8) -> Result<(), Error> {
        let at = self.src.position();
        let b = self.src.read_u8()?;
        if b != c {
            return Err(Error::wire(
                at,
                format!("expected `{}`, found `{}`", c as char, b as char),
            ));
        }
        Ok(())
    }

    fn bump(&mut self) {
        if let Some(f) = self.stack.last_mut() {
            f.items += 1;
        }
    }

    fn parse_value(&mut self) -> Result<Token, Error> {
        let at = self.src.position();
        match self.peek_req()? {
            b'{' => {
                self.src.read_u8()?;
                self.stack.push(Frame {
                    is_map: true,
                    items: 0,
                });
                Ok(Token::MapStart(None))
            }
            b'[' => {
                self.src.read_u8()?;
                self.stack.push(Frame {
                    is_map: false,
                    items: 0,
                });
                Ok(Token::SeqStart(None))
            }
            b'"' => Ok(Token::Str(self.parse_string()?)),
            b't' => {
                self.expect_literal(b"true")?;
                Ok(Token::Bool(true))
            }
            b'f' => {
                self.expect_literal(b"false")?;
                Ok(Token::Bool(false))
            }
            b'n' => {
                self.expect_literal(b"null")?;
                Ok(Token::Nil)
            }
            b'-' | b'0'..=b'9' => self.parse_number(at),
            other => Err(Error::wire(at, format!("unexpected character `{}`", other as char))),
        }
    }

    fn expect_literal(&mut self, lit: &[u8]) -> Result<(), Error> {
        let at = self.src.position();
        for &c in lit {
            if self.src.read_u8()? != c {
                return Err(Error::wire(at, "malformed literal"));
            }
        }
        Ok(())
    }

    fn parse_string(&mut self) -> Result<String, Error> {
        let at = self.src.position();
        self.expect(b'"')?;
        let mut buf: Vec<u8> = Vec::new();
        let mut utf8 = [0u8; 4];
        loop {
            if buf.len() > self.handle.max_init_len() {
                return Err(Error::LenExceeded {
                    len: buf.len(),
                    max: self.handle.max_init_len(),
                });
            }
            let b = self.src.read_u8()?;
            match b {
                b'"' => break,
                b'\\' => {
                    let esc = self.src.read_u8()?;
                    match esc {
                        b'"' => buf.push(b'"'),
                        b'\\' => buf.push(b'\\'),
                        b'/' => buf.push(b'/'),
                        b'n' => buf.push(b'\n'),
                        b't' => buf.push(b'\t'),
                        b'r' => buf.push(b'\r'),
                        b'b' => buf.push(0x08),
                        b'f' => buf.push(0x0c),
                        b'u' => {
                            let c = self.parse_unicode_escape(at)?;
                            buf.extend_from_slice(c.encode_utf8(&mut utf8).as_bytes());
                        }
                        _ => return Err(Error::wire(at, "invalid escape sequence")),
                    }
                }
                0x00..=0x1f => {
                    return Err(Error::wire(at, "unescaped control character in string"))
                }
                other => buf.push(other),
            }
        }
        String::from_utf8(buf).map_err(|_| Error::wire(at, "invalid utf-8 in string"))
    }

    fn parse_hex4(&mut self, at: u64) -> Result<u32, Error> {
        let mut v = 0u32;
        for _ in 0..4 {
            let b = self.src.read_u8()?;
            let d = (b as char)
                .to_digit(16)
                .ok_or_else(|| Error::wire(at, "invalid unicode escape"))?;
            v = v * 16 + d;
        }
        Ok(v)
    }

    fn parse_unicode_escape(&mut self, at: u64) -> Result<char, Error> {
        let hi = self.parse_hex4(at)?;
        if (0xD800..=0xDBFF).contains(&hi) {
            // Surrogate pair.
            if self.src.read_u8()? != b'\\' || self.src.read_u8()? != b'u' {
                return Err(Error::wire(at, "unpaired surrogate"));
            }
            let lo = self.parse_hex4(at)?;
            if !(0xDC00..=0xDFFF).contains(&lo) {
                return Err(Error::wire(at, "unpaired surrogate"));
            }
            let c = 0x10000 + ((hi - 0xD800) << 10) + (lo - 0xDC00);
            char::from_u32(c).ok_or_else(|| Error::wire(at, "invalid unicode escape"))
        } else {
            char::from_u32(hi).ok_or_else(|| Error::wire(at, "invalid unicode escape"))
        }
    }

    fn parse_number(&mut self, at: u64) -> Result<Token, Error> {
        let mut text = String::new();
        while let Some(b) = self.src.peek_u8()? {
            match b {
                b'0'..=b'9' | b'-' | b'+' | b'.' | b'e' | b'E' => {
                    self.src.read_u8()?;
                    text.push(b as char);
                }
                _ => break,
            }
        }
        let fractional = text.bytes().any(|b| matches!(b, b'.' | b'e' | b'E'));
        if self.handle.prefer_float() || fractional {
            return text
                .parse::<f64>()
                .map(Token::Float)
                .map_err(|_| Error::wire(at, "malformed number"));
        }
        if let Ok(v) = text.parse::<i64>() {
            return Ok(Token::Int(v));
        }
        if let Ok(v) = text.parse::<u64>() {
            return Ok(Token::Uint(v));
        }
        // Magnitude beyond 64 bits degrades to a float.
        text.parse::<f64>()
            .map(Token::Float)
            .map_err(|_| Error::wire(at, "malformed number"))
    }
}

impl TokenReader for JsonReader<'_> {
    fn caps(&self) -> FormatCaps {
        CAPS
    }

    fn position(&self) -> u64 {
        self.src.position()
    }

    fn next_token(&mut self) -> Result<Token, Error> {
        self.skip_ws()?;
        match self.stack.last().map(|f| (f.is_map, f.items)) {
            None => self.parse_value(),
            Some((false, items)) => {
                if self.peek_req()? == b']' {
                    self.src.read_u8()?;
                    self.stack.pop();
                    return Ok(Token::SeqEnd);
                }
                if items > 0 {
                    self.expect(b',')?;
                    self.skip_ws()?;
                }
                self.bump();
                self.parse_value()
            }
            Some((true, items)) => {
                if items % 2 == 0 {
                    if self.peek_req()? == b'}' {
                        self.src.read_u8()?;
                        self.stack.pop();
                        return Ok(Token::MapEnd);
                    }
                    if items > 0 {
                        self.expect(b',')?;
                        self.skip_ws()?;
                    }
                    self.bump();
                    if self.peek_req()? != b'"' {
                        return Err(Error::wire(
                            self.src.position(),
                            "object key must be a string",
                        ));
                    }
                    Ok(Token::Str(self.parse_string()?))
                } else {
                    self.expect(b':')?;
                    self.skip_ws()?;
                    self.bump();
                    self.parse_value()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_core::{from_slice, to_vec, Value};

    fn encode_with(h: &Handle, v: &Value) -> String {
        String::from_utf8(to_vec(&Json, h, v).unwrap()).unwrap()
    }

    fn encode(v: &Value) -> String {
        encode_with(&Handle::new(), v)
    }

    fn decode(s: &str) -> Value {
        from_slice(&Json, &Handle::new(), s.as_bytes()).unwrap()
    }

    fn sample() -> Value {
        Value::Map(vec![
            (Value::Str("a".into()), Value::Int(1)),
            (
                Value::Str("b".into()),
                Value::Seq(vec![Value::Bool(true), Value::Nil]),
            ),
        ])
    }

    #[test]
    fn test_compact_output() {
        assert_eq!(encode(&sample()), r#"{"a":1,"b":[true,null]}"#);
    }

    #[test]
    fn test_pretty_output() {
        let h = Handle::new().with_indent(2);
        let expected = "{\n  \"a\": 1,\n  \"b\": [\n    true,\n    null\n  ]\n}";
        assert_eq!(encode_with(&h, &sample()), expected);
    }

    #[test]
    fn test_output_is_valid_json() {
        let parsed: serde_json::Value = serde_json::from_str(&encode(&sample())).unwrap();
        assert_eq!(parsed["a"], serde_json::json!(1));
        let pretty = encode_with(&Handle::new().with_indent(4), &sample());
        assert!(serde_json::from_str::<serde_json::Value>(&pretty).is_ok());
    }

    #[test]
    fn test_escaping() {
        let v = Value::Str("a\"b\\c\nd\u{1}".into());
        let s = encode(&v);
        assert_eq!(s, "\"a\\\"b\\\\c\\nd\\u0001\"");
        assert_eq!(decode(&s), v);

        // HTML-significant characters are escaped by default.
        assert_eq!(
            encode(&Value::Str("<&>".into())),
            "\"\\u003c\\u0026\\u003e\""
        );
        assert_eq!(
            decode("\"\\u003c\\u0026\\u003e\""),
            Value::Str("<&>".into())
        );

        let h = Handle::new().with_html_chars_as_is(true);
        assert_eq!(encode_with(&h, &Value::Str("<&>".into())), "\"<&>\"");
    }


    #[test]
    fn test_unicode_escape_decode() {
        assert_eq!(decode("\"\\u00e9\""), Value::Str("é".into()));
        // Surrogate pair for U+1F600.
        assert_eq!(decode("\"\\ud83d\\ude00\""), Value::Str("\u{1F600}".into()));
        // Raw multi-byte text passes through untouched.
        assert_eq!(decode(r#""héllo""#), Value::Str("héllo".into()));
        assert!(decode2_err("\"\\ud83d\""));
    }

    fn decode2_err(s: &str) -> bool {
        from_slice(&Json, &Handle::new(), s.as_bytes()).is_err()
    }

    #[test]
    fn test_number_kinds() {
        assert_eq!(decode("42"), Value::Int(42));
        assert_eq!(decode("-3"), Value::Int(-3));
        assert_eq!(decode("1.5"), Value::Float(1.5));
        assert_eq!(decode("18446744073709551615"), Value::Uint(u64::MAX));

        let h = Handle::new().with_prefer_float(true);
        assert_eq!(
            from_slice(&Json, &h, b"42").unwrap(),
            Value::Float(42.0)
        );
    }

    #[test]
    fn test_float_keeps_decimal_point() {
        assert_eq!(encode(&Value::Float(3.0)), "3.0");
        assert_eq!(decode("3.0"), Value::Float(3.0));
        assert_eq!(encode(&Value::Float(f64::NAN)), "null");
    }

    #[test]
    fn test_scalar_keys_quoted() {
        let v = Value::Map(vec![(Value::Int(7), Value::Bool(true))]);
        assert_eq!(encode(&v), r#"{"7":true}"#);
    }

    #[test]
    fn test_bytes_as_number_array() {
        assert_eq!(encode(&Value::Bytes(vec![1, 2, 255])), "[1,2,255]");
    }

    #[test]
    fn test_whitespace_tolerated() {
        let v = decode(" { \"a\" : [ 1 , 2 ] } ");
        assert_eq!(
            v.map_get("a"),
            Some(&Value::Seq(vec![Value::Int(1), Value::Int(2)]))
        );
    }

    #[test]
    fn test_sequential_top_level_values() {
        let h = Handle::new();
        let data = br#"{"a":1}{"b":2}"#;
        let mut src = manifold_io::ReadBuf::from_slice(data);
        let reader = Json.reader(&h, &mut src);
        let mut dec = manifold_core::Decoder::new(&h, reader);
        let first = dec.decode_value().unwrap();
        let second = dec.decode_value().unwrap();
        assert_eq!(first.map_get("a"), Some(&Value::Int(1)));
        assert_eq!(second.map_get("b"), Some(&Value::Int(2)));
    }

    #[test]
    fn test_malformed_input_errors() {
        let h = Handle::new();
        assert!(from_slice(&Json, &h, b"{1: 2}").is_err());
        assert!(from_slice(&Json, &h, b"[1, ]").is_err());
        assert!(from_slice(&Json, &h, b"tru").is_err());
        assert!(from_slice(&Json, &h, b"\"abc").is_err());
    }

    #[test]
    fn test_nonstring_key_rejected() {
        let err = from_slice(&Json, &Handle::new(), b"{3:1}").unwrap_err();
        assert!(matches!(err, Error::Wire { .. }));
    }
}
