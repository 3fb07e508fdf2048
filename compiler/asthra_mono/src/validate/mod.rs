//! Pre-instantiation checks.
//!
//! [`validate`] is pure: it never touches the registry, so a rejected
//! request leaves no trace behind.

use asthra_ir::{GenericStructDecl, Name, StringInterner, TypeData, TypeId, TypeInterner};
use bitflags::bitflags;
use rustc_hash::{FxHashMap, FxHashSet};

use crate::error::ValidationError;

/// Decides whether a concrete type satisfies a named bound.
///
/// Implemented by the semantic analyzer; [`BuiltinBounds`] covers the
/// capabilities the language defines itself.
pub trait BoundChecker: Send + Sync {
    fn satisfies(&self, types: &TypeInterner, ty: TypeId, bound: Name) -> bool;
}

/// Check `args` against `decl`'s parameter list.
///
/// Order: generic-ness, arity, fully resolved arguments, then each
/// parameter's bounds. The first failure is returned.
#[tracing::instrument(level = "trace", skip_all, fields(generic = names.lookup(decl.name)))]
pub fn validate(
    names: &StringInterner,
    types: &TypeInterner,
    decl: &GenericStructDecl,
    args: &[TypeId],
    bounds: &dyn BoundChecker,
) -> Result<(), ValidationError> {
    let name = || names.lookup(decl.name).to_owned();

    if !decl.is_generic() {
        return Err(ValidationError::NotGeneric { name: name() });
    }

    if args.len() != decl.arity() {
        return Err(ValidationError::ArityMismatch {
            name: name(),
            expected: decl.arity(),
            got: args.len(),
        });
    }

    for (index, &arg) in args.iter().enumerate() {
        if !types.is_concrete(arg) {
            return Err(ValidationError::UnresolvedTypeArgument {
                name: name(),
                index,
                ty: types.display(arg, names),
            });
        }
    }

    for (index, (param, &arg)) in decl.type_params.iter().zip(args).enumerate() {
        for &bound in &param.bounds {
            if !bounds.satisfies(types, arg, bound) {
                return Err(ValidationError::ConstraintViolation {
                    index,
                    param: names.lookup(param.name).to_owned(),
                    bound: names.lookup(bound).to_owned(),
                    ty: types.display(arg, names),
                });
            }
        }
    }

    Ok(())
}

bitflags! {
    /// Built-in capabilities a type may have.
    #[derive(Copy, Clone, Eq, PartialEq, Hash, Debug, Default)]
    pub struct Capabilities: u16 {
        const COPY = 1 << 0;
        const EQ = 1 << 1;
        const HASH = 1 << 2;
        const ORD = 1 << 3;
        const NUMERIC = 1 << 4;
        const INTEGER = 1 << 5;
        const FLOAT = 1 << 6;
        const SIZED = 1 << 7;
        const SEND = 1 << 8;
    }
}

impl Capabilities {
    /// Capabilities a compound type inherits when all its parts have them.
    const STRUCTURAL: Self = Self::from_bits_truncate(
        Self::COPY.bits()
            | Self::EQ.bits()
            | Self::HASH.bits()
            | Self::ORD.bits()
            | Self::SEND.bits(),
    );

    /// Assumed for user structs and generic instances nobody described.
    const OPAQUE: Self = Self::from_bits_truncate(Self::SIZED.bits() | Self::SEND.bits());
}

/// Structural bound checking for the built-in capability names, plus a
/// table of user-declared implementations.
pub struct BuiltinBounds {
    capability_names: FxHashMap<Name, Capabilities>,
    named: FxHashMap<Name, Capabilities>,
    impls: FxHashSet<(Name, Name)>,
}

impl BuiltinBounds {
    pub fn new(names: &StringInterner) -> Self {
        let capability_names = [
            ("Copy", Capabilities::COPY),
            ("Eq", Capabilities::EQ),
            ("Hash", Capabilities::HASH),
            ("Ord", Capabilities::ORD),
            ("Numeric", Capabilities::NUMERIC),
            ("Integer", Capabilities::INTEGER),
            ("Float", Capabilities::FLOAT),
            ("Sized", Capabilities::SIZED),
            ("Send", Capabilities::SEND),
        ]
        .into_iter()
        .map(|(name, caps)| (names.intern(name), caps))
        .collect();

        Self {
            capability_names,
            named: FxHashMap::default(),
            impls: FxHashSet::default(),
        }
    }

    /// Declare the capabilities of a user struct or of every instance of a
    /// generic struct.
    #[must_use]
    pub fn with_capabilities(mut self, type_name: Name, caps: Capabilities) -> Self {
        self.named.insert(type_name, caps);
        self
    }

    /// Declare that `type_name` implements the non-builtin bound `bound`.
    #[must_use]
    pub fn with_impl(mut self, type_name: Name, bound: Name) -> Self {
        self.impls.insert((type_name, bound));
        self
    }

    pub fn capabilities(&self, types: &TypeInterner, ty: TypeId) -> Capabilities {
        asthra_ir::stack::ensure_sufficient_stack(|| self.capabilities_inner(types, ty))
    }

    fn capabilities_inner(&self, types: &TypeInterner, ty: TypeId) -> Capabilities {
        let all_of = |parts: &[TypeId]| {
            parts.iter().fold(Capabilities::STRUCTURAL, |acc, &part| {
                acc & self.capabilities_inner(types, part)
            })
        };

        match types.lookup(ty) {
            TypeData::Int(_) => {
                Capabilities::STRUCTURAL
                    | Capabilities::NUMERIC
                    | Capabilities::INTEGER
                    | Capabilities::SIZED
            }
            TypeData::Float(_) => {
                Capabilities::COPY
                    | Capabilities::NUMERIC
                    | Capabilities::FLOAT
                    | Capabilities::SIZED
                    | Capabilities::SEND
            }
            TypeData::Bool | TypeData::Char => Capabilities::STRUCTURAL | Capabilities::SIZED,
            TypeData::String => {
                Capabilities::EQ
                    | Capabilities::HASH
                    | Capabilities::ORD
                    | Capabilities::SIZED
                    | Capabilities::SEND
            }
            TypeData::Void | TypeData::Ptr { .. } => {
                Capabilities::COPY | Capabilities::EQ | Capabilities::HASH | Capabilities::SIZED
            }
            TypeData::Slice(elem) => {
                Capabilities::COPY
                    | Capabilities::SIZED
                    | (self.capabilities_inner(types, elem)
                        & (Capabilities::EQ | Capabilities::HASH | Capabilities::SEND))
            }
            TypeData::Array { elem, .. } => all_of(&[elem]) | Capabilities::SIZED,
            TypeData::Tuple(elems) => all_of(&elems[..]) | Capabilities::SIZED,
            TypeData::Named(name) | TypeData::Applied { name, .. } => {
                self.named.get(&name).copied().unwrap_or(Capabilities::OPAQUE)
            }
            TypeData::Param(_) => Capabilities::empty(),
        }
    }

    fn type_name(types: &TypeInterner, ty: TypeId) -> Option<Name> {
        match types.lookup(ty) {
            TypeData::Named(name) | TypeData::Applied { name, .. } => Some(name),
            _ => None,
        }
    }
}

impl BoundChecker for BuiltinBounds {
    fn satisfies(&self, types: &TypeInterner, ty: TypeId, bound: Name) -> bool {
        match self.capability_names.get(&bound) {
            Some(&required) => self.capabilities(types, ty).contains(required),
            None => Self::type_name(types, ty)
                .is_some_and(|name| self.impls.contains(&(name, bound))),
        }
    }
}

#[cfg(test)]
mod tests;
