//! Monomorphizer options.

/// Options for one monomorphization session.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MonoConfig {
    /// Maximum nesting of instantiations below a top-level request, which
    /// itself sits at depth 0. Exceeding it is reported as infinite
    /// expansion; 0 admits only structs without generic fields.
    pub max_depth: usize,
    /// Emit a `// Generated from generic struct ...` line above each C
    /// definition.
    pub emit_comments: bool,
    /// Pointer width in bytes for the default target layout.
    pub pointer_size: u32,
}

impl MonoConfig {
    pub const DEFAULT_MAX_DEPTH: usize = 64;

    #[must_use]
    pub fn with_max_depth(mut self, max_depth: usize) -> Self {
        self.max_depth = max_depth;
        self
    }

    #[must_use]
    pub fn with_comments(mut self, emit_comments: bool) -> Self {
        self.emit_comments = emit_comments;
        self
    }

    #[must_use]
    pub fn with_pointer_size(mut self, pointer_size: u32) -> Self {
        self.pointer_size = pointer_size;
        self
    }
}

impl Default for MonoConfig {
    fn default() -> Self {
        Self {
            max_depth: Self::DEFAULT_MAX_DEPTH,
            emit_comments: true,
            pointer_size: 8,
        }
    }
}
