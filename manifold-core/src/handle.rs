//! Encode/decode configuration.

use crate::model::LayoutOpts;

/// Default nesting ceiling for hostile or malformed input.
pub const DEFAULT_MAX_DEPTH: usize = 1024;

/// Default cap on any length prefix read from input, in elements or bytes,
/// checked before pre-allocation.
pub const DEFAULT_MAX_INIT_LEN: usize = 1 << 20;

/// Symbol interning policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SymbolMode {
    /// Names are always written in full.
    #[default]
    None,
    /// Record field names and string map keys are interned on formats that
    /// support a symbol table.
    All,
}

/// Immutable encode/decode policy, shared read-only across any number of
/// concurrent calls.
///
/// A `Handle` is configured entirely through consuming `with_*` builders
/// before first use and exposes no mutation afterwards, so sharing one
/// `&Handle` (or `Arc<Handle>`) between threads needs no locking.
#[derive(Debug, Clone)]
pub struct Handle {
    canonical: bool,
    struct_to_array: bool,
    symbol_mode: SymbolMode,
    map_key_as_string: bool,
    indent: usize,
    html_chars_as_is: bool,
    prefer_float: bool,
    detect_circular_ref: bool,
    map_value_reset: bool,
    max_init_len: usize,
    max_depth: usize,
}

impl Default for Handle {
    fn default() -> Self {
        Self {
            canonical: false,
            struct_to_array: false,
            symbol_mode: SymbolMode::None,
            map_key_as_string: false,
            indent: 0,
            html_chars_as_is: false,
            prefer_float: false,
            detect_circular_ref: false,
            map_value_reset: false,
            max_init_len: DEFAULT_MAX_INIT_LEN,
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

impl Handle {
    pub fn new() -> Self {
        Self::default()
    }

    /// Deterministic map-key ordering: semantically equal maps encode to
    /// byte-identical output regardless of native iteration order.
    pub fn with_canonical(mut self, on: bool) -> Self {
        self.canonical = on;
        self
    }

    /// Encode records positionally (in type-model order) instead of keyed.
    pub fn with_struct_to_array(mut self, on: bool) -> Self {
        self.struct_to_array = on;
        self
    }

    pub fn with_symbol_mode(mut self, mode: SymbolMode) -> Self {
        self.symbol_mode = mode;
        self
    }

    /// Stringify scalar map keys on every format, not just string-keyed ones.
    pub fn with_map_key_as_string(mut self, on: bool) -> Self {
        self.map_key_as_string = on;
        self
    }

    /// Human formatting indent width. Only meaningful on text formats.
    pub fn with_indent(mut self, width: usize) -> Self {
        self.indent = width;
        self
    }

    /// Leave `<`, `>`, `&` unescaped in text output.
    pub fn with_html_chars_as_is(mut self, on: bool) -> Self {
        self.html_chars_as_is = on;
        self
    }

    /// Decode ambiguous numerals as floats.
    pub fn with_prefer_float(mut self, on: bool) -> Self {
        self.prefer_float = on;
        self
    }

    /// Track the active encode path and fail on re-entered shared values.
    pub fn with_detect_circular_ref(mut self, on: bool) -> Self {
        self.detect_circular_ref = on;
        self
    }

    /// When decoding into a non-nil map, reset a colliding value to zero
    /// before decoding instead of decoding in place over it.
    pub fn with_map_value_reset(mut self, on: bool) -> Self {
        self.map_value_reset = on;
        self
    }

    /// Cap on untrusted length prefixes, checked before pre-allocation.
    pub fn with_max_init_len(mut self, max: usize) -> Self {
        self.max_init_len = max;
        self
    }

    /// Nesting ceiling for both encode and decode.
    pub fn with_max_depth(mut self, max: usize) -> Self {
        self.max_depth = max;
        self
    }

    pub fn canonical(&self) -> bool {
        self.canonical
    }

    pub fn struct_to_array(&self) -> bool {
        self.struct_to_array
    }

    pub fn symbol_mode(&self) -> SymbolMode {
        self.symbol_mode
    }

    pub fn map_key_as_string(&self) -> bool {
        self.map_key_as_string
    }

    pub fn indent(&self) -> usize {
        self.indent
    }

    pub fn html_chars_as_is(&self) -> bool {
        self.html_chars_as_is
    }

    pub fn prefer_float(&self) -> bool {
        self.prefer_float
    }

    pub fn detect_circular_ref(&self) -> bool {
        self.detect_circular_ref
    }

    pub fn map_value_reset(&self) -> bool {
        self.map_value_reset
    }

    pub fn max_init_len(&self) -> usize {
        self.max_init_len
    }

    pub fn max_depth(&self) -> usize {
        self.max_depth
    }

    /// The subset of options that affect type-model layout; part of the
    /// model cache key.
    pub fn layout_opts(&self) -> LayoutOpts {
        LayoutOpts {
            struct_to_array: self.struct_to_array,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let h = Handle::new();
        assert!(!h.canonical());
        assert!(!h.detect_circular_ref());
        assert_eq!(h.symbol_mode(), SymbolMode::None);
        assert_eq!(h.max_depth(), DEFAULT_MAX_DEPTH);
        assert_eq!(h.max_init_len(), DEFAULT_MAX_INIT_LEN);
    }

    #[test]
    fn test_builders() {
        let h = Handle::new()
            .with_canonical(true)
            .with_struct_to_array(true)
            .with_symbol_mode(SymbolMode::All)
            .with_indent(2)
            .with_max_depth(8);
        assert!(h.canonical());
        assert!(h.struct_to_array());
        assert_eq!(h.symbol_mode(), SymbolMode::All);
        assert_eq!(h.indent(), 2);
        assert_eq!(h.max_depth(), 8);
        assert!(h.layout_opts().struct_to_array);
    }
}
