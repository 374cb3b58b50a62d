//! # manifold-rpc
//!
//! Request/response message framing over a shared byte stream.
//!
//! Each logical message is two values encoded back to back with the active
//! format: a small header map, then the body. Nothing is added beyond what
//! the format natively writes; a connection is just a byte stream the codec
//! reads one message at a time from. Transport setup (sockets, TLS,
//! reconnects) belongs to the caller.

use manifold_core::{Decoder, Encoder, Error, Format, Handle, Value};
use manifold_io::{ReadBuf, WriteBuf};
use std::io::{Read, Write};
use thiserror::Error as ThisError;

/// Errors surfaced by the RPC codec.
#[derive(Debug, ThisError)]
pub enum RpcError {
    #[error(transparent)]
    Codec(#[from] Error),

    /// The peer sent a structurally valid value that is not a message
    /// header.
    #[error("malformed message header: {detail}")]
    Protocol { detail: String },

    /// A response whose sequence number does not match the pending call.
    #[error("response out of sequence: expected {expected}, got {got}")]
    SeqMismatch { expected: u64, got: u64 },

    /// The peer answered with an error response.
    #[error("server error: {message}")]
    Server { message: String },
}

/// Parsed request header.
#[derive(Debug, Clone, PartialEq)]
pub struct RequestHeader {
    pub method: String,
    pub seq: u64,
}

/// Parsed response header.
#[derive(Debug, Clone, PartialEq)]
pub struct ResponseHeader {
    pub seq: u64,
    pub error: Option<String>,
}

/// Sequences encode/decode calls into messages over one stream pair.
///
/// The same type serves both sides: clients use [`RpcCodec::call`] (or the
/// split `send_request` / `read_response`), servers use
/// [`RpcCodec::serve_one`] or the symmetric split methods.
pub struct RpcCodec<'h> {
    format: &'h dyn Format,
    handle: &'h Handle,
    rbuf: ReadBuf,
    wbuf: WriteBuf,
    next_seq: u64,
}

impl<'h> RpcCodec<'h> {
    pub fn new(
        format: &'h dyn Format,
        handle: &'h Handle,
        reader: Box<dyn Read>,
        writer: Box<dyn Write>,
    ) -> Self {
        Self {
            format,
            handle,
            rbuf: ReadBuf::from_reader(reader),
            wbuf: WriteBuf::to_writer(writer),
            next_seq: 0,
        }
    }

    fn write_message(&mut self, header: &Value, body: &Value) -> Result<(), RpcError> {
        let writer = self.format.writer(self.handle, &mut self.wbuf);
        let mut enc = Encoder::new(self.handle, writer);
        enc.encode_value(header)?;
        enc.encode_value(body)?;
        enc.flush()?;
        Ok(())
    }

    fn read_message(&mut self) -> Result<(Value, Value), RpcError> {
        let reader = self.format.reader(self.handle, &mut self.rbuf);
        let mut dec = Decoder::new(self.handle, reader);
        let header = dec.decode_value()?;
        let body = dec.decode_value()?;
        Ok((header, body))
    }

    /// Writes one request message, returning its sequence number.
    pub fn send_request(&mut self, method: &str, body: &Value) -> Result<u64, RpcError> {
        let seq = self.next_seq;
        self.next_seq += 1;
        tracing::debug!(method, seq, format = self.format.name(), "rpc request");
        let header = Value::Map(vec![
            (Value::Str("method".to_string()), Value::Str(method.to_string())),
            (Value::Str("seq".to_string()), Value::Uint(seq)),
        ]);
        self.write_message(&header, body)?;
        Ok(seq)
    }

    /// Reads one request message.
    pub fn read_request(&mut self) -> Result<(RequestHeader, Value), RpcError> {
        let (header, body) = self.read_message()?;
        let method = header
            .map_get("method")
            .and_then(Value::as_str)
            .ok_or_else(|| RpcError::Protocol {
                detail: "missing method".to_string(),
            })?
            .to_string();
        let seq = header
            .map_get("seq")
            .and_then(Value::as_uint)
            .ok_or_else(|| RpcError::Protocol {
                detail: "missing seq".to_string(),
            })?;
        Ok((RequestHeader { method, seq }, body))
    }

    /// Writes one response message for `seq`.
    pub fn send_response(&mut self, seq: u64, result: Result<&Value, &str>) -> Result<(), RpcError> {
        let (error, body) = match result {
            Ok(v) => (Value::Nil, v.clone()),
            Err(msg) => (Value::Str(msg.to_string()), Value::Nil),
        };
        tracing::debug!(seq, ok = matches!(result, Ok(_)), "rpc response");
        let header = Value::Map(vec![
            (Value::Str("seq".to_string()), Value::Uint(seq)),
            (Value::Str("error".to_string()), error),
        ]);
        self.write_message(&header, &body)
    }

    /// Reads one response message.
    pub fn read_response(&mut self) -> Result<(ResponseHeader, Value), RpcError> {
        let (header, body) = self.read_message()?;
        let seq = header
            .map_get("seq")
            .and_then(Value::as_uint)
            .ok_or_else(|| RpcError::Protocol {
                detail: "missing seq".to_string(),
            })?;
        let error = match header.map_get("error") {
            None | Some(Value::Nil) => None,
            Some(Value::Str(s)) => Some(s.clone()),
            Some(other) => {
                return Err(RpcError::Protocol {
                    detail: format!("error field has kind {}", other.kind()),
                })
            }
        };
        Ok((ResponseHeader { seq, error }, body))
    }

    /// One full client exchange: request, then the matching response body.
    pub fn call(&mut self, method: &str, body: &Value) -> Result<Value, RpcError> {
        let seq = self.send_request(method, body)?;
        let (header, body) = self.read_response()?;
        if header.seq != seq {
            return Err(RpcError::SeqMismatch {
                expected: seq,
                got: header.seq,
            });
        }
        if let Some(message) = header.error {
            return Err(RpcError::Server { message });
        }
        Ok(body)
    }

    /// One full server exchange: read a request, answer it with `f`.
    pub fn serve_one<F>(&mut self, f: F) -> Result<(), RpcError>
    where
        F: FnOnce(&str, Value) -> Result<Value, String>,
    {
        let (req, body) = self.read_request()?;
        match f(&req.method, body) {
            Ok(v) => self.send_response(req.seq, Ok(&v)),
            Err(e) => self.send_response(req.seq, Err(&e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use manifold_format::{Json, Taglen};
    use std::collections::VecDeque;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// In-memory half-duplex pipe.
    #[derive(Clone, Default)]
    struct Pipe(Arc<Mutex<VecDeque<u8>>>);

    impl Read for Pipe {
        fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
            let mut q = self.0.lock().unwrap();
            let n = buf.len().min(q.len());
            for slot in buf.iter_mut().take(n) {
                *slot = q.pop_front().unwrap();
            }
            Ok(n)
        }
    }

    impl Write for Pipe {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().extend(buf.iter().copied());
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    fn request_body() -> Value {
        Value::Map(vec![(
            Value::Str("x".to_string()),
            Value::Seq(vec![Value::Int(1), Value::Int(2)]),
        )])
    }

    #[test]
    fn test_request_roundtrip_over_pipe() {
        for format in [&Taglen as &dyn Format, &Json] {
            let h = Handle::new();
            let c2s = Pipe::default();
            let s2c = Pipe::default();

            let mut client = RpcCodec::new(
                format,
                &h,
                Box::new(s2c.clone()),
                Box::new(c2s.clone()),
            );
            let seq = client.send_request("apply", &request_body()).unwrap();
            assert_eq!(seq, 0);

            let mut server = RpcCodec::new(
                format,
                &h,
                Box::new(c2s.clone()),
                Box::new(s2c.clone()),
            );
            server
                .serve_one(|method, body| {
                    assert_eq!(method, "apply");
                    Ok(Value::Map(vec![(
                        Value::Str("echo".to_string()),
                        body.map_get("x").cloned().unwrap_or(Value::Nil),
                    )]))
                })
                .unwrap();

            let (header, body) = client.read_response().unwrap();
            assert_eq!(header.seq, 0);
            assert!(header.error.is_none());
            assert_eq!(
                body.map_get("echo"),
                Some(&Value::Seq(vec![Value::Int(1), Value::Int(2)]))
            );
        }
    }

    #[test]
    fn test_call_surfaces_server_error() {
        let h = Handle::new();
        let c2s = Pipe::default();
        let s2c = Pipe::default();

        // Answer the pending seq-0 request before the client reads.
        {
            let mut prep = RpcCodec::new(
                &Taglen,
                &h,
                Box::new(Pipe::default()),
                Box::new(c2s.clone()),
            );
            prep.send_request("boom", &Value::Nil).unwrap();
            let mut server =
                RpcCodec::new(&Taglen, &h, Box::new(c2s.clone()), Box::new(s2c.clone()));
            server
                .serve_one(|_, _| Err("guard failed".to_string()))
                .unwrap();
        }

        let mut client = RpcCodec::new(
            &Taglen,
            &h,
            Box::new(s2c.clone()),
            Box::new(Pipe::default()),
        );
        let err = client.call("boom", &Value::Nil).unwrap_err();
        assert!(matches!(err, RpcError::Server { .. }));
        assert!(err.to_string().contains("guard failed"));
    }

    #[test]
    fn test_multiple_messages_share_stream() {
        let h = Handle::new();
        let c2s = Pipe::default();

        let mut client = RpcCodec::new(
            &Taglen,
            &h,
            Box::new(Pipe::default()),
            Box::new(c2s.clone()),
        );
        client.send_request("first", &Value::Int(1)).unwrap();
        client.send_request("second", &Value::Int(2)).unwrap();

        let mut server = RpcCodec::new(
            &Taglen,
            &h,
            Box::new(c2s.clone()),
            Box::new(Pipe::default()),
        );
        let (r1, b1) = server.read_request().unwrap();
        let (r2, b2) = server.read_request().unwrap();
        assert_eq!((r1.method.as_str(), r1.seq), ("first", 0));
        assert_eq!((r2.method.as_str(), r2.seq), ("second", 1));
        assert_eq!(b1, Value::Int(1));
        assert_eq!(b2, Value::Int(2));
    }

    #[test]
    fn test_header_validation() {
        let h = Handle::new();
        let pipe = Pipe::default();

        // Hand-write a bogus header: a map without `method`.
        {
            let mut out = manifold_io::WriteBuf::to_writer(Box::new(pipe.clone()));
            {
                let w = Taglen.writer(&h, &mut out);
                let mut enc = Encoder::new(&h, w);
                enc.encode_value(&Value::Map(vec![(
                    Value::Str("seq".to_string()),
                    Value::Uint(0),
                )]))
                .unwrap();
                enc.encode_value(&Value::Nil).unwrap();
                enc.flush().unwrap();
            }
        }

        let mut server = RpcCodec::new(
            &Taglen,
            &h,
            Box::new(pipe.clone()),
            Box::new(Pipe::default()),
        );
        let err = server.read_request().unwrap_err();
        assert!(matches!(err, RpcError::Protocol { .. }));
    }
}
