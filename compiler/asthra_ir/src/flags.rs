//! Per-type metadata computed once at interning time.

use bitflags::bitflags;

bitflags! {
    /// Cached structural properties of an interned type.
    ///
    /// Presence flags propagate from children to parents; category flags
    /// describe only the outermost constructor.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct TypeFlags: u32 {
        // === Presence (propagated) ===

        /// Contains a type parameter somewhere inside.
        const HAS_PARAM = 1 << 0;
        /// Contains a generic application somewhere inside.
        const HAS_APPLIED = 1 << 1;
        /// Contains a non-generic named type somewhere inside.
        const HAS_NAMED = 1 << 2;

        // === Category (outermost constructor) ===

        const IS_PRIMITIVE = 1 << 8;
        const IS_INTEGER = 1 << 9;
        const IS_FLOAT = 1 << 10;
        const IS_POINTER = 1 << 11;
        const IS_AGGREGATE = 1 << 12;
        const IS_APPLIED = 1 << 13;
        const IS_NAMED = 1 << 14;
        const IS_PARAM = 1 << 15;
    }
}

impl TypeFlags {
    /// Flags inherited by a compound type from its children.
    pub const PROPAGATE_MASK: Self = Self::from_bits_truncate(
        Self::HAS_PARAM.bits() | Self::HAS_APPLIED.bits() | Self::HAS_NAMED.bits(),
    );

    #[inline]
    pub fn propagate_all(children: impl IntoIterator<Item = Self>) -> Self {
        children
            .into_iter()
            .fold(Self::empty(), |acc, child| acc | (child & Self::PROPAGATE_MASK))
    }

    /// No type parameters anywhere inside.
    #[inline]
    pub const fn is_concrete(self) -> bool {
        !self.contains(Self::HAS_PARAM)
    }

    #[inline]
    pub const fn is_numeric(self) -> bool {
        self.intersects(Self::IS_INTEGER.union(Self::IS_FLOAT))
    }
}
