//! # manifold-format
//!
//! Concrete wire formats behind the manifold token contract:
//!
//! - [`Taglen`]: compact tag-length binary
//! - [`Msgpack`]: MessagePack-like binary
//! - [`Cbor`]: CBOR-like binary with indefinite-length containers
//! - [`Symbin`]: varint binary with a wire-level symbol table
//! - [`Json`]: text, with human-formatting options
//!
//! The engines in `manifold-core` drive any of these unmodified; each
//! format advertises what it can express through its capability flags.

pub mod cbor;
pub mod json;
pub mod msgpack;
pub mod symbin;
pub mod taglen;

pub use cbor::Cbor;
pub use json::Json;
pub use msgpack::Msgpack;
pub use symbin::Symbin;
pub use taglen::Taglen;

use manifold_core::Format;

/// Every built-in format, for callers that iterate over the set.
pub static ALL: [&dyn Format; 5] = [&Taglen, &Msgpack, &Cbor, &Symbin, &Json];
