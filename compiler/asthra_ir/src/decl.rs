//! Generic struct declarations as handed over by the parser.
//!
//! These are the only AST shapes the monomorphizer consumes. Field types are
//! interned `TypeId`s that may reference the declaration's own parameters
//! through `TypeData::Param`.

use crate::{Name, TypeId};

/// A type parameter with its capability bounds, e.g. `T: Copy + Eq`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct TypeParam {
    pub name: Name,
    pub bounds: Vec<Name>,
}

impl TypeParam {
    /// Unbounded parameter.
    pub fn new(name: Name) -> Self {
        Self {
            name,
            bounds: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_bound(mut self, bound: Name) -> Self {
        self.bounds.push(bound);
        self
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldDecl {
    pub name: Name,
    pub ty: TypeId,
}

impl FieldDecl {
    pub fn new(name: Name, ty: TypeId) -> Self {
        Self { name, ty }
    }
}

/// `struct Name<Params...> { fields... }`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct GenericStructDecl {
    pub name: Name,
    pub type_params: Vec<TypeParam>,
    pub fields: Vec<FieldDecl>,
}

impl GenericStructDecl {
    pub fn new(name: Name, type_params: Vec<TypeParam>, fields: Vec<FieldDecl>) -> Self {
        Self {
            name,
            type_params,
            fields,
        }
    }

    /// Declarations without type parameters are ordinary structs.
    #[inline]
    pub fn is_generic(&self) -> bool {
        !self.type_params.is_empty()
    }

    #[inline]
    pub fn arity(&self) -> usize {
        self.type_params.len()
    }

    pub fn param_names(&self) -> Vec<Name> {
        self.type_params.iter().map(|p| p.name).collect()
    }

    pub fn param_index(&self, name: Name) -> Option<usize> {
        self.type_params.iter().position(|p| p.name == name)
    }
}
