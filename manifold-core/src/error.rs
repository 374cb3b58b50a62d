//! Error taxonomy shared by the engine and every format.

use crate::value::Kind;
use thiserror::Error;

/// Errors raised by encoding, decoding, and model building.
#[derive(Debug, Error)]
pub enum Error {
    /// Bad type layout. Fatal at model-build time; the failure is cached and
    /// never retried for the same shape.
    #[error("bad layout for `{shape}`: {detail}")]
    Structural { shape: String, detail: String },

    /// A shared value was re-entered while still on the active encode path.
    #[error("circular reference detected in `{context}`")]
    CircularRef { context: String },

    /// A scalar could not be coerced into the destination kind.
    #[error("cannot decode {found} into {expected} at `{context}`")]
    Mismatch {
        expected: Kind,
        found: Kind,
        context: String,
    },

    /// Nesting exceeded the handle's depth ceiling.
    #[error("nesting depth exceeds limit of {limit}")]
    DepthExceeded { limit: usize },

    /// A length prefix exceeded the handle's pre-allocation ceiling.
    #[error("length prefix {len} exceeds limit of {max}")]
    LenExceeded { len: usize, max: usize },

    /// Malformed bytes on the wire.
    #[error("malformed input at byte {offset}: {detail}")]
    Wire { offset: u64, detail: String },

    /// A symbol reference with no preceding definition in this scope.
    #[error("unknown symbol reference {id}")]
    UnknownSymbol { id: u32 },

    /// A custom extension codec failed, or an extension tag cannot be
    /// represented by the active format.
    #[error("extension {tag} failed: {detail}")]
    Extension { tag: u64, detail: String },

    /// Propagated verbatim from the underlying stream; never retried.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl Error {
    /// Shorthand for a malformed-input error at a known offset.
    pub fn wire(offset: u64, detail: impl Into<String>) -> Self {
        Error::Wire {
            offset,
            detail: detail.into(),
        }
    }

    /// Shorthand for a model-build failure.
    pub fn structural(shape: impl Into<String>, detail: impl Into<String>) -> Self {
        Error::Structural {
            shape: shape.into(),
            detail: detail.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_messages() {
        let err = Error::structural("Point", "duplicate wire name `x`");
        assert_eq!(err.to_string(), "bad layout for `Point`: duplicate wire name `x`");

        let err = Error::Mismatch {
            expected: Kind::Int,
            found: Kind::Str,
            context: "count".to_string(),
        };
        assert!(err.to_string().contains("str"));
        assert!(err.to_string().contains("int"));
        assert!(err.to_string().contains("count"));

        let err = Error::wire(17, "truncated header");
        assert!(err.to_string().contains("byte 17"));
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::UnexpectedEof, "eof");
        let err: Error = io.into();
        assert!(matches!(err, Error::Io(_)));
    }
}
