//! Buffered reading with byte-offset tracking.

use crate::DEFAULT_READ_CHUNK;
use bytes::Bytes;
use std::io::{self, Read};

enum Inner {
    /// Fully in-memory input. No second buffer is allocated; slices handed
    /// out borrow (or cheaply share) the original bytes.
    Slice { data: Bytes, pos: usize },
    /// Stream input, refilled on demand into a compactable buffer.
    Stream {
        src: Box<dyn Read>,
        buf: Vec<u8>,
        start: usize,
        end: usize,
        eof: bool,
    },
}

/// A buffered reader over a byte source.
///
/// Tracks the absolute byte offset of everything consumed so far, which
/// decoders surface in malformed-input errors.
pub struct ReadBuf {
    inner: Inner,
    consumed: u64,
}

impl ReadBuf {
    /// Creates a reader over an in-memory byte buffer without copying it.
    pub fn from_bytes(data: Bytes) -> Self {
        Self {
            inner: Inner::Slice { data, pos: 0 },
            consumed: 0,
        }
    }

    /// Creates a reader over an owned vector without copying it.
    pub fn from_vec(data: Vec<u8>) -> Self {
        Self::from_bytes(Bytes::from(data))
    }

    /// Creates a reader over a borrowed slice. The slice is copied once up
    /// front; prefer [`ReadBuf::from_bytes`] when the caller already owns the
    /// data.
    pub fn from_slice(data: &[u8]) -> Self {
        Self::from_bytes(Bytes::copy_from_slice(data))
    }

    /// Creates a reader over an arbitrary stream with the default chunk size.
    pub fn from_reader(src: Box<dyn Read>) -> Self {
        Self::with_chunk_size(src, DEFAULT_READ_CHUNK)
    }

    /// Creates a stream reader with an explicit refill chunk size.
    pub fn with_chunk_size(src: Box<dyn Read>, chunk: usize) -> Self {
        Self {
            inner: Inner::Stream {
                src,
                buf: Vec::with_capacity(chunk.max(64)),
                start: 0,
                end: 0,
                eof: false,
            },
            consumed: 0,
        }
    }

    /// Absolute offset of the next unread byte.
    pub fn position(&self) -> u64 {
        self.consumed
    }

    /// Ensures at least `n` unread bytes are buffered. Stream mode refills;
    /// slice mode only checks remaining length.
    fn fill(&mut self, n: usize) -> io::Result<()> {
        match &mut self.inner {
            Inner::Slice { data, pos } => {
                if data.len() - *pos < n {
                    Err(io::Error::new(
                        io::ErrorKind::UnexpectedEof,
                        "unexpected end of input",
                    ))
                } else {
                    Ok(())
                }
            }
            Inner::Stream {
                src,
                buf,
                start,
                end,
                eof,
            } => {
                while *end - *start < n {
                    if *eof {
                        return Err(io::Error::new(
                            io::ErrorKind::UnexpectedEof,
                            "unexpected end of input",
                        ));
                    }
                    // Compact before growing.
                    if *start > 0 {
                        buf.copy_within(*start..*end, 0);
                        *end -= *start;
                        *start = 0;
                    }
                    let want = (*end + n.max(DEFAULT_READ_CHUNK)).max(buf.len());
                    buf.resize(want, 0);
                    let read = src.read(&mut buf[*end..])?;
                    if read == 0 {
                        *eof = true;
                    }
                    *end += read;
                }
                Ok(())
            }
        }
    }

    /// Reads a single byte.
    pub fn read_u8(&mut self) -> io::Result<u8> {
        self.fill(1)?;
        let b = match &mut self.inner {
            Inner::Slice { data, pos } => {
                let b = data[*pos];
                *pos += 1;
                b
            }
            Inner::Stream { buf, start, .. } => {
                let b = buf[*start];
                *start += 1;
                b
            }
        };
        self.consumed += 1;
        Ok(b)
    }

    /// Peeks at the next byte without consuming it. Returns `None` at a
    /// clean end of input.
    pub fn peek_u8(&mut self) -> io::Result<Option<u8>> {
        match self.fill(1) {
            Ok(()) => {}
            Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Ok(None),
            Err(e) => return Err(e),
        }
        let b = match &self.inner {
            Inner::Slice { data, pos } => data[*pos],
            Inner::Stream { buf, start, .. } => buf[*start],
        };
        Ok(Some(b))
    }

    /// Reads exactly `n` bytes, returning a view into the internal buffer.
    pub fn read_exact(&mut self, n: usize) -> io::Result<&[u8]> {
        self.fill(n)?;
        self.consumed += n as u64;
        match &mut self.inner {
            Inner::Slice { data, pos } => {
                let s = &data[*pos..*pos + n];
                *pos += n;
                Ok(s)
            }
            Inner::Stream { buf, start, .. } => {
                let s = &buf[*start..*start + n];
                *start += n;
                Ok(s)
            }
        }
    }

    /// Reads exactly `n` bytes into an owned buffer. In slice mode this is a
    /// zero-copy share of the original input.
    pub fn read_bytes(&mut self, n: usize) -> io::Result<Bytes> {
        self.fill(n)?;
        self.consumed += n as u64;
        match &mut self.inner {
            Inner::Slice { data, pos } => {
                let s = data.slice(*pos..*pos + n);
                *pos += n;
                Ok(s)
            }
            Inner::Stream { buf, start, .. } => {
                let s = Bytes::copy_from_slice(&buf[*start..*start + n]);
                *start += n;
                Ok(s)
            }
        }
    }

    /// Reads a big-endian `u16`.
    pub fn read_u16_be(&mut self) -> io::Result<u16> {
        let s = self.read_exact(2)?;
        Ok(u16::from_be_bytes([s[0], s[1]]))
    }

    /// Reads a big-endian `u32`.
    pub fn read_u32_be(&mut self) -> io::Result<u32> {
        let s = self.read_exact(4)?;
        Ok(u32::from_be_bytes([s[0], s[1], s[2], s[3]]))
    }

    /// Reads a big-endian `u64`.
    pub fn read_u64_be(&mut self) -> io::Result<u64> {
        let s = self.read_exact(8)?;
        Ok(u64::from_be_bytes([
            s[0], s[1], s[2], s[3], s[4], s[5], s[6], s[7],
        ]))
    }
}

impl std::fmt::Debug for ReadBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReadBuf")
            .field("consumed", &self.consumed)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write as _;

    #[test]
    fn test_slice_read() {
        let mut r = ReadBuf::from_slice(&[1, 2, 3, 4]);
        assert_eq!(r.read_u8().unwrap(), 1);
        assert_eq!(r.read_exact(2).unwrap(), &[2, 3]);
        assert_eq!(r.position(), 3);
        assert_eq!(r.peek_u8().unwrap(), Some(4));
        assert_eq!(r.read_u8().unwrap(), 4);
        assert_eq!(r.peek_u8().unwrap(), None);
        assert!(r.read_u8().is_err());
    }

    #[test]
    fn test_slice_read_bytes_shares_input() {
        let data = Bytes::from(vec![9u8; 32]);
        let mut r = ReadBuf::from_bytes(data);
        let chunk = r.read_bytes(16).unwrap();
        assert_eq!(chunk.len(), 16);
        assert_eq!(r.position(), 16);
    }

    #[test]
    fn test_stream_refill_across_chunks() {
        let data: Vec<u8> = (0..=255u8).cycle().take(40_000).collect();
        let mut r = ReadBuf::with_chunk_size(Box::new(io::Cursor::new(data.clone())), 128);
        let mut got = Vec::new();
        while let Some(_) = r.peek_u8().unwrap() {
            got.push(r.read_u8().unwrap());
        }
        assert_eq!(got, data);
        assert_eq!(r.position(), 40_000);
    }

    #[test]
    fn test_stream_read_exact_larger_than_chunk() {
        let data = vec![7u8; 4096];
        let mut r = ReadBuf::with_chunk_size(Box::new(io::Cursor::new(data)), 64);
        let s = r.read_exact(4096).unwrap();
        assert_eq!(s.len(), 4096);
        assert!(s.iter().all(|&b| b == 7));
    }

    #[test]
    fn test_be_integers() {
        let mut r = ReadBuf::from_slice(&[0x01, 0x02, 0x00, 0x00, 0x00, 0x03]);
        assert_eq!(r.read_u16_be().unwrap(), 0x0102);
        assert_eq!(r.read_u32_be().unwrap(), 3);
    }

    #[test]
    fn test_eof_mid_read() {
        let mut r = ReadBuf::from_slice(&[1, 2]);
        let err = r.read_exact(3).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::UnexpectedEof);
    }

    #[test]
    fn test_file_backed_stream() {
        let mut f = tempfile::tempfile().unwrap();
        f.write_all(b"hello manifold").unwrap();
        use std::io::Seek;
        f.seek(io::SeekFrom::Start(0)).unwrap();

        let mut r = ReadBuf::from_reader(Box::new(f));
        assert_eq!(r.read_exact(5).unwrap(), b"hello");
        assert_eq!(r.read_u8().unwrap(), b' ');
        assert_eq!(r.read_exact(8).unwrap(), b"manifold");
    }
}
