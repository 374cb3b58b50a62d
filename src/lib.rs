//! # manifold
//!
//! A multi-format data-interchange engine: one encode/decode engine over a
//! closed tagged-kind value graph, five wire formats behind a token-level
//! contract, and a thin RPC codec for request/response exchange.
//!
//! ```
//! use manifold::{from_slice, to_vec, Handle, Msgpack, Value};
//!
//! let handle = Handle::new();
//! let value = Value::Map(vec![
//!     (Value::Str("a".into()), Value::Int(1)),
//! ]);
//! let bytes = to_vec(&Msgpack, &handle, &value).unwrap();
//! let back = from_slice(&Msgpack, &handle, &bytes).unwrap();
//! assert_eq!(back.map_get("a"), Some(&Value::Int(1)));
//! ```
//!
//! Policy lives on an immutable [`Handle`] shared across calls: canonical
//! key ordering, positional struct layout, symbol interning, depth and
//! length ceilings, and the rest of the encode/decode options.

pub use manifold_core::{
    from_bytes, from_reader, from_slice, model_for, record_from_slice, to_vec, to_writer, Decoder,
    Encoder, Error, ExtValue, ExtensionEntry, ExtensionRegistry, FieldPlan, FieldSpec, Format,
    FormatCaps, Handle, Kind, LayoutOpts, Record, RecordShape, ShapeCodec, ShapeId, SharedValue,
    SymbolMode, Token, TokenReader, TokenWriter, TypeModel, Value,
};
pub use manifold_format::{Cbor, Json, Msgpack, Symbin, Taglen, ALL};
pub use manifold_io::{ReadBuf, WriteBuf};
pub use manifold_rpc::{RequestHeader, ResponseHeader, RpcCodec, RpcError};
