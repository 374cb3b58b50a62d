//! # manifold-io
//!
//! Buffered byte stream adapters used by every manifold format.
//!
//! This crate provides:
//! - [`ReadBuf`]: a refill-on-demand reader over any `std::io::Read`, with a
//!   zero-copy mode for input that is already fully in memory
//! - [`WriteBuf`]: a growable write buffer that flushes to an underlying
//!   `std::io::Write` at a configurable watermark, or accumulates in memory

pub mod read;
pub mod write;

pub use read::ReadBuf;
pub use write::WriteBuf;

/// Default refill chunk size for stream-backed readers.
pub const DEFAULT_READ_CHUNK: usize = 8 * 1024;

/// Default flush watermark for stream-backed writers.
pub const DEFAULT_WATERMARK: usize = 8 * 1024;
