//! Buffered writing with watermark flushing.

use crate::DEFAULT_WATERMARK;
use bytes::{BufMut, Bytes, BytesMut};
use std::io::{self, Write};

/// A growable write buffer.
///
/// In vec mode ([`WriteBuf::to_vec`]) bytes accumulate in memory and are
/// handed back with [`WriteBuf::into_vec`]. In stream mode
/// ([`WriteBuf::to_writer`]) the buffer drains to the underlying writer
/// whenever it crosses the watermark, and on [`WriteBuf::flush`]. Large
/// slices bypass the buffer entirely when it is empty, so an already
/// well-buffered caller does not pay for double buffering.
pub struct WriteBuf {
    buf: BytesMut,
    sink: Option<Box<dyn Write>>,
    watermark: usize,
    flushed: u64,
}

impl WriteBuf {
    /// Creates an in-memory accumulating buffer.
    pub fn to_vec() -> Self {
        Self {
            buf: BytesMut::with_capacity(256),
            sink: None,
            watermark: usize::MAX,
            flushed: 0,
        }
    }

    /// Creates a buffer draining to `sink` at the default watermark.
    pub fn to_writer(sink: Box<dyn Write>) -> Self {
        Self::with_watermark(sink, DEFAULT_WATERMARK)
    }

    /// Creates a buffer draining to `sink` at an explicit watermark.
    pub fn with_watermark(sink: Box<dyn Write>, watermark: usize) -> Self {
        Self {
            buf: BytesMut::with_capacity(watermark.min(64 * 1024).max(64)),
            sink: Some(sink),
            watermark: watermark.max(1),
            flushed: 0,
        }
    }

    /// Total bytes accepted so far (buffered plus drained).
    pub fn written(&self) -> u64 {
        self.flushed + self.buf.len() as u64
    }

    fn drain(&mut self) -> io::Result<()> {
        if let Some(sink) = &mut self.sink {
            if !self.buf.is_empty() {
                sink.write_all(&self.buf)?;
                self.flushed += self.buf.len() as u64;
                self.buf.clear();
            }
        }
        Ok(())
    }

    fn maybe_drain(&mut self) -> io::Result<()> {
        if self.sink.is_some() && self.buf.len() >= self.watermark {
            self.drain()?;
        }
        Ok(())
    }

    /// Appends a single byte.
    pub fn put_u8(&mut self, b: u8) -> io::Result<()> {
        self.buf.put_u8(b);
        self.maybe_drain()
    }

    /// Appends a slice. Slices at or above the watermark are passed straight
    /// through to the sink when nothing is buffered ahead of them.
    pub fn put_slice(&mut self, s: &[u8]) -> io::Result<()> {
        if let Some(sink) = &mut self.sink {
            if self.buf.is_empty() && s.len() >= self.watermark {
                sink.write_all(s)?;
                self.flushed += s.len() as u64;
                return Ok(());
            }
        }
        self.buf.put_slice(s);
        self.maybe_drain()
    }

    /// Appends a big-endian `u16`.
    pub fn put_u16_be(&mut self, v: u16) -> io::Result<()> {
        self.buf.put_u16(v);
        self.maybe_drain()
    }

    /// Appends a big-endian `u32`.
    pub fn put_u32_be(&mut self, v: u32) -> io::Result<()> {
        self.buf.put_u32(v);
        self.maybe_drain()
    }

    /// Appends a big-endian `u64`.
    pub fn put_u64_be(&mut self, v: u64) -> io::Result<()> {
        self.buf.put_u64(v);
        self.maybe_drain()
    }

    /// Drains the buffer and flushes the sink. A no-op in vec mode.
    pub fn flush(&mut self) -> io::Result<()> {
        self.drain()?;
        if let Some(sink) = &mut self.sink {
            sink.flush()?;
        }
        Ok(())
    }

    /// Consumes the buffer, returning accumulated bytes. Only meaningful in
    /// vec mode; in stream mode this returns whatever has not drained yet.
    pub fn into_vec(self) -> Vec<u8> {
        self.buf.to_vec()
    }

    /// Zero-copy variant of [`WriteBuf::into_vec`].
    pub fn into_bytes(self) -> Bytes {
        self.buf.freeze()
    }
}

impl std::fmt::Debug for WriteBuf {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WriteBuf")
            .field("buffered", &self.buf.len())
            .field("flushed", &self.flushed)
            .field("watermark", &self.watermark)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Test sink recording each write call separately.
    #[derive(Clone, Default)]
    struct Recorder(Arc<Mutex<Vec<Vec<u8>>>>);

    impl Write for Recorder {
        fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
            self.0.lock().unwrap().push(buf.to_vec());
            Ok(buf.len())
        }
        fn flush(&mut self) -> io::Result<()> {
            Ok(())
        }
    }

    #[test]
    fn test_vec_mode_accumulates() {
        let mut w = WriteBuf::to_vec();
        w.put_u8(1).unwrap();
        w.put_u16_be(0x0203).unwrap();
        w.put_slice(&[4, 5]).unwrap();
        assert_eq!(w.written(), 5);
        assert_eq!(w.into_vec(), vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn test_watermark_flush() {
        let rec = Recorder::default();
        let mut w = WriteBuf::with_watermark(Box::new(rec.clone()), 4);
        w.put_u8(1).unwrap();
        w.put_u8(2).unwrap();
        w.put_u8(3).unwrap();
        assert!(rec.0.lock().unwrap().is_empty());
        w.put_u8(4).unwrap();
        assert_eq!(rec.0.lock().unwrap().len(), 1);
        assert_eq!(rec.0.lock().unwrap()[0], vec![1, 2, 3, 4]);
    }

    #[test]
    fn test_large_slice_passthrough() {
        let rec = Recorder::default();
        let mut w = WriteBuf::with_watermark(Box::new(rec.clone()), 8);
        let big = vec![0xAB; 32];
        w.put_slice(&big).unwrap();
        // Written in one call, not copied through the buffer first.
        let calls = rec.0.lock().unwrap();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0], big);
    }

    #[test]
    fn test_passthrough_preserves_order() {
        let rec = Recorder::default();
        let mut w = WriteBuf::with_watermark(Box::new(rec.clone()), 8);
        w.put_u8(1).unwrap();
        // Buffer is non-empty, so the big slice must queue behind it.
        w.put_slice(&[2; 16]).unwrap();
        w.flush().unwrap();
        let flat: Vec<u8> = rec.0.lock().unwrap().concat();
        assert_eq!(flat[0], 1);
        assert_eq!(&flat[1..], &[2; 16]);
    }

    #[test]
    fn test_flush_drains_remainder() {
        let rec = Recorder::default();
        let mut w = WriteBuf::with_watermark(Box::new(rec.clone()), 1024);
        w.put_slice(b"tail").unwrap();
        assert!(rec.0.lock().unwrap().is_empty());
        w.flush().unwrap();
        assert_eq!(rec.0.lock().unwrap().concat(), b"tail");
        assert_eq!(w.written(), 4);
    }
}
