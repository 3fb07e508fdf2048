//! Interned type descriptor handle.

use std::fmt;

/// Canonical handle for a type descriptor.
///
/// Two structurally equal descriptors always intern to the same `TypeId`, so
/// equality and hashing never depend on which AST node spelled the type.
///
/// # Layout
/// - Bits 31-28: shard index (0-15)
/// - Bits 27-0: local index within the shard
///
/// Primitives live in shard 0 at fixed local indices, so their ids are the
/// constants below.
#[derive(Copy, Clone, Eq, PartialEq, Ord, PartialOrd, Hash)]
#[repr(transparent)]
pub struct TypeId(u32);

impl TypeId {
    pub const I8: TypeId = TypeId(0);
    pub const I16: TypeId = TypeId(1);
    pub const I32: TypeId = TypeId(2);
    pub const I64: TypeId = TypeId(3);
    pub const ISIZE: TypeId = TypeId(4);
    pub const U8: TypeId = TypeId(5);
    pub const U16: TypeId = TypeId(6);
    pub const U32: TypeId = TypeId(7);
    pub const U64: TypeId = TypeId(8);
    pub const USIZE: TypeId = TypeId(9);
    pub const F32: TypeId = TypeId(10);
    pub const F64: TypeId = TypeId(11);
    pub const BOOL: TypeId = TypeId(12);
    pub const CHAR: TypeId = TypeId(13);
    pub const STRING: TypeId = TypeId(14);
    pub const VOID: TypeId = TypeId(15);

    /// First local index in shard 0 available for compound types.
    pub const FIRST_COMPOUND: u32 = 16;

    /// Maximum local index per shard (2^28 - 1).
    pub const MAX_LOCAL: u32 = 0x0FFF_FFFF;

    pub const NUM_SHARDS: usize = 16;

    #[inline]
    pub const fn from_shard_local(shard: u32, local: u32) -> Self {
        debug_assert!(shard < 16);
        debug_assert!(local <= Self::MAX_LOCAL);
        TypeId((shard << 28) | local)
    }

    #[inline]
    pub const fn shard(self) -> usize {
        (self.0 >> 28) as usize
    }

    #[inline]
    pub const fn local(self) -> usize {
        (self.0 & Self::MAX_LOCAL) as usize
    }

    #[inline]
    pub const fn raw(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn from_raw(raw: u32) -> Self {
        TypeId(raw)
    }

    /// Pre-interned primitive (shard 0, below `FIRST_COMPOUND`).
    #[inline]
    pub const fn is_primitive(self) -> bool {
        self.0 < Self::FIRST_COMPOUND
    }
}

impl fmt::Debug for TypeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const PRIMITIVES: [&str; 16] = [
            "i8", "i16", "i32", "i64", "isize", "u8", "u16", "u32", "u64", "usize", "f32", "f64",
            "bool", "char", "string", "void",
        ];
        match PRIMITIVES.get(self.0 as usize) {
            Some(name) => write!(f, "TypeId::{}", name.to_uppercase()),
            None => write!(f, "TypeId({}:{})", self.shard(), self.local()),
        }
    }
}
