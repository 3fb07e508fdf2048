//! Structural type descriptors stored in the `TypeInterner`.
//!
//! Children are `TypeId`s, never boxed descriptors, so hashing and equality
//! of a descriptor are shallow and O(arity).

use crate::{Name, TypeId};

/// Integer width and signedness.
#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum IntKind {
    I8,
    I16,
    I32,
    I64,
    Isize,
    U8,
    U16,
    U32,
    U64,
    Usize,
}

impl IntKind {
    pub const fn name(self) -> &'static str {
        match self {
            IntKind::I8 => "i8",
            IntKind::I16 => "i16",
            IntKind::I32 => "i32",
            IntKind::I64 => "i64",
            IntKind::Isize => "isize",
            IntKind::U8 => "u8",
            IntKind::U16 => "u16",
            IntKind::U32 => "u32",
            IntKind::U64 => "u64",
            IntKind::Usize => "usize",
        }
    }

    pub const fn is_signed(self) -> bool {
        matches!(
            self,
            IntKind::I8 | IntKind::I16 | IntKind::I32 | IntKind::I64 | IntKind::Isize
        )
    }

    /// Width in bytes; `None` for the pointer-sized kinds.
    pub const fn fixed_bytes(self) -> Option<u32> {
        match self {
            IntKind::I8 | IntKind::U8 => Some(1),
            IntKind::I16 | IntKind::U16 => Some(2),
            IntKind::I32 | IntKind::U32 => Some(4),
            IntKind::I64 | IntKind::U64 => Some(8),
            IntKind::Isize | IntKind::Usize => None,
        }
    }
}

#[derive(Copy, Clone, Eq, PartialEq, Hash, Debug)]
pub enum FloatKind {
    F32,
    F64,
}

impl FloatKind {
    pub const fn name(self) -> &'static str {
        match self {
            FloatKind::F32 => "f32",
            FloatKind::F64 => "f64",
        }
    }

    pub const fn bytes(self) -> u32 {
        match self {
            FloatKind::F32 => 4,
            FloatKind::F64 => 8,
        }
    }
}

/// A type descriptor.
///
/// `Param` is a type parameter reference (`T` inside `struct Box<T>`); a
/// descriptor that contains one anywhere is not a concrete type.
#[derive(Clone, Eq, PartialEq, Hash, Debug)]
pub enum TypeData {
    Int(IntKind),
    Float(FloatKind),
    Bool,
    Char,
    /// UTF-8 string slice (pointer + length).
    String,
    /// The unit type, zero-sized.
    Void,

    /// Raw pointer `*T` / `*mut T`.
    Ptr { pointee: TypeId, mutable: bool },
    /// Slice `[]T` (pointer + length).
    Slice(TypeId),
    /// Fixed-size array `[N]T`.
    Array { elem: TypeId, len: u64 },
    /// Tuple `(A, B, ...)`.
    Tuple(Box<[TypeId]>),

    /// Non-generic user-defined type, laid out by the target.
    Named(Name),
    /// Generic struct applied to arguments, e.g. `Box<i32>`.
    Applied { name: Name, args: Box<[TypeId]> },

    /// Type parameter reference.
    Param(Name),
}

impl TypeData {
    /// Child type ids, in declaration order.
    pub fn children(&self) -> &[TypeId] {
        match self {
            TypeData::Ptr { pointee, .. } => std::slice::from_ref(pointee),
            TypeData::Slice(elem) | TypeData::Array { elem, .. } => std::slice::from_ref(elem),
            TypeData::Tuple(elems) => elems,
            TypeData::Applied { args, .. } => args,
            TypeData::Int(_)
            | TypeData::Float(_)
            | TypeData::Bool
            | TypeData::Char
            | TypeData::String
            | TypeData::Void
            | TypeData::Named(_)
            | TypeData::Param(_) => &[],
        }
    }

    /// Pre-interned id for primitive descriptors.
    pub fn primitive_id(&self) -> Option<TypeId> {
        Some(match self {
            TypeData::Int(IntKind::I8) => TypeId::I8,
            TypeData::Int(IntKind::I16) => TypeId::I16,
            TypeData::Int(IntKind::I32) => TypeId::I32,
            TypeData::Int(IntKind::I64) => TypeId::I64,
            TypeData::Int(IntKind::Isize) => TypeId::ISIZE,
            TypeData::Int(IntKind::U8) => TypeId::U8,
            TypeData::Int(IntKind::U16) => TypeId::U16,
            TypeData::Int(IntKind::U32) => TypeId::U32,
            TypeData::Int(IntKind::U64) => TypeId::U64,
            TypeData::Int(IntKind::Usize) => TypeId::USIZE,
            TypeData::Float(FloatKind::F32) => TypeId::F32,
            TypeData::Float(FloatKind::F64) => TypeId::F64,
            TypeData::Bool => TypeId::BOOL,
            TypeData::Char => TypeId::CHAR,
            TypeData::String => TypeId::STRING,
            TypeData::Void => TypeId::VOID,
            _ => return None,
        })
    }
}
