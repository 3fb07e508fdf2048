//! Intermediate representation shared by the Asthra monomorphizer.
//!
//! - [`Name`] / [`StringInterner`]: interned identifiers
//! - [`TypeId`] / [`TypeData`] / [`TypeInterner`]: canonical, interned type
//!   descriptors with cached [`TypeFlags`]
//! - [`GenericStructDecl`]: the generic struct declarations consumed from the
//!   parser
//!
//! Everything here is `Send + Sync` so parallel code-generation workers can
//! share one interner pair.

mod decl;
mod flags;
mod interner;
mod name;
pub mod stack;
mod type_data;
mod type_id;
mod type_interner;

pub use decl::{FieldDecl, GenericStructDecl, TypeParam};
pub use flags::TypeFlags;
pub use interner::{InternError, SharedInterner, StringInterner, StringLookup};
pub use name::Name;
pub use type_data::{FloatKind, IntKind, TypeData};
pub use type_id::TypeId;
pub use type_interner::{SharedTypeInterner, TypeInternError, TypeInterner};

/// Compile-time size check.
#[macro_export]
macro_rules! static_assert_size {
    ($ty:ty, $size:expr) => {
        const _: [(); $size] = [(); ::std::mem::size_of::<$ty>()];
    };
}

#[cfg(target_pointer_width = "64")]
mod size_asserts {
    use super::{Name, TypeId};
    static_assert_size!(Name, 4);
    static_assert_size!(TypeId, 4);
}
