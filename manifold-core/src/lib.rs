//! # manifold-core
//!
//! The format-agnostic half of manifold: a closed tagged-kind value graph,
//! runtime type shapes with cached field-layout models, and the encode and
//! decode engines that drive any [`token::Format`] implementation through
//! the token-level contract.
//!
//! This crate knows nothing about wire bytes. Concrete formats live in
//! `manifold-format`; anything implementing [`TokenWriter`] and
//! [`TokenReader`] with honest [`FormatCaps`] works unmodified.

pub mod decode;
pub mod descriptor;
pub mod encode;
pub mod error;
pub mod extension;
pub mod handle;
pub mod model;
pub mod token;
pub mod value;

pub use decode::{from_bytes, from_reader, from_slice, record_from_slice, Decoder};
pub use descriptor::{FieldSpec, RecordShape, ShapeCodec, ShapeId};
pub use encode::{to_vec, to_writer, Encoder};
pub use error::Error;
pub use extension::{ExtensionEntry, ExtensionRegistry};
pub use handle::{Handle, SymbolMode, DEFAULT_MAX_DEPTH, DEFAULT_MAX_INIT_LEN};
pub use model::{model_for, FieldPlan, LayoutOpts, TypeModel};
pub use token::{Format, FormatCaps, Token, TokenReader, TokenWriter};
pub use value::{ExtValue, Kind, Record, SharedValue, Value};
