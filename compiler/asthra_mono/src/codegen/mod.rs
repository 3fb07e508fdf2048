//! Generation of concrete structs from a generic declaration.
//!
//! For each field, in declaration order: substitute the type arguments,
//! compute the layout, and instantiate any generic struct the field needs.
//!
//! - A generic instance stored **by value** must be complete first, so it is
//!   requested through the blocking registry path and its layout reused.
//! - An instance behind a **pointer** only has to exist eventually. It is
//!   queued on the request's [`Deferred`] list and instantiated after the
//!   request itself is published, one level deeper than the struct that
//!   points to it. Keys already being generated on the chain are not queued
//!   (`struct Node<T> { next: *Node<T> }`).
//!
//! Only by-value edges make up the chain, so `struct A<T> { b: *B<T> }` with
//! `struct B<T> { a: A<T> }` is finite whichever side is requested first.
//! Every nested request is checked against [`MonoConfig::max_depth`] and
//! by-value revisits against the chain, so expansions like
//! `struct Wrap<T> { inner: Wrap<Wrap<T>> }` end in `RecursiveInstantiation`.
//!
//! [`MonoConfig::max_depth`]: crate::MonoConfig::max_depth

mod emit;
mod layout;
mod mangle;

pub use emit::{CEmitter, StructSink};
pub use layout::{DataLayout, Layout, StructLayoutBuilder, TargetLayout};
pub use mangle::{mangle, mangle_applied};

use std::cell::RefCell;
use std::collections::VecDeque;

use asthra_ir::stack::ensure_sufficient_stack;
use asthra_ir::{GenericStructDecl, Name, TypeData, TypeId};

use crate::error::{CodegenError, InstantiationError};
use crate::instantiate::Monomorphizer;
use crate::record::{ConcreteField, ConcreteStruct, InstantiationKey, TaskId};

/// Pointer targets met while generating one top-level request, with the
/// nesting depth they are requested at.
#[derive(Default, Debug)]
pub(crate) struct Deferred {
    queue: RefCell<VecDeque<(InstantiationKey, usize)>>,
}

impl Deferred {
    fn push(&self, key: InstantiationKey, depth: usize) {
        let mut queue = self.queue.borrow_mut();
        if !queue.iter().any(|(queued, _)| *queued == key) {
            queue.push_back((key, depth));
        }
    }

    pub(crate) fn pop(&self) -> Option<(InstantiationKey, usize)> {
        self.queue.borrow_mut().pop_front()
    }
}

/// The keys currently being generated by one request, innermost first.
/// Each link is a by-value edge.
#[derive(Clone, Copy, Debug)]
pub(crate) struct Chain<'c> {
    task: TaskId,
    depth: usize,
    key: Option<&'c InstantiationKey>,
    parent: Option<&'c Chain<'c>>,
    deferred: &'c Deferred,
}

impl<'c> Chain<'c> {
    /// Empty chain for a request at nesting `depth`; 0 is a top-level request.
    pub(crate) fn new(task: TaskId, depth: usize, deferred: &'c Deferred) -> Self {
        Self {
            task,
            depth,
            key: None,
            parent: None,
            deferred,
        }
    }

    pub(crate) fn push<'n>(&'n self, key: &'n InstantiationKey) -> Chain<'n> {
        Chain {
            task: self.task,
            depth: self.depth + 1,
            key: Some(key),
            parent: Some(self),
            deferred: self.deferred,
        }
    }

    /// Queue a pointer target one level below the struct being generated.
    fn defer(&self, key: InstantiationKey) {
        self.deferred.push(key, self.depth);
    }

    #[inline]
    pub(crate) fn task(&self) -> TaskId {
        self.task
    }

    #[inline]
    pub(crate) fn depth(&self) -> usize {
        self.depth
    }

    pub(crate) fn contains(&self, key: &InstantiationKey) -> bool {
        let mut link = Some(self);
        while let Some(chain) = link {
            if chain.key == Some(key) {
                return true;
            }
            link = chain.parent;
        }
        false
    }
}

#[derive(Default)]
struct Deps {
    by_value: Vec<String>,
    pointer: Vec<String>,
}

impl Deps {
    fn add(list: &mut Vec<String>, symbol: String) {
        if !list.contains(&symbol) {
            list.push(symbol);
        }
    }
}

/// Generates one concrete struct within a request's chain.
pub struct StructGenerator<'m, 'ast> {
    mono: &'m Monomorphizer<'ast>,
    chain: &'m Chain<'m>,
}

impl<'m, 'ast> StructGenerator<'m, 'ast> {
    pub(crate) fn new(mono: &'m Monomorphizer<'ast>, chain: &'m Chain<'m>) -> Self {
        Self { mono, chain }
    }

    /// Substitute, lay out and name the instantiation `key` of `decl`.
    ///
    /// Errors are `InstantiationError` rather than `CodegenError` because a
    /// field may need an instance that fails validation on its own. Pointer
    /// targets are only queued here; see [`Deferred`].
    #[tracing::instrument(
        level = "debug",
        skip_all,
        fields(generic = self.mono.names().lookup(decl.name), depth = self.chain.depth())
    )]
    pub fn generate(
        &self,
        decl: &GenericStructDecl,
        key: &InstantiationKey,
    ) -> Result<ConcreteStruct, InstantiationError> {
        let (names, types) = (self.mono.names(), self.mono.types());
        let params = decl.param_names();
        let mut deps = Deps::default();
        let mut builder = StructLayoutBuilder::new();
        let mut fields = Vec::with_capacity(decl.fields.len());

        for field in &decl.fields {
            let ty = types.substitute(field.ty, &params, key.args());
            if !types.is_concrete(ty) {
                return Err(CodegenError::UnresolvedFieldType {
                    owner: key.display(types, names),
                    field: names.lookup(field.name).to_owned(),
                    ty: types.display(ty, names),
                }
                .into());
            }
            let layout = self.layout_of(ty, &mut deps)?;
            let offset = builder.push(layout).ok_or_else(|| self.overflow(key))?;
            fields.push(ConcreteField {
                name: field.name,
                ty,
                offset,
                size: layout.size,
                align: layout.align,
            });
        }

        let layout = builder.finish().ok_or_else(|| self.overflow(key))?;
        let symbol = mangle(names, types, key);
        tracing::debug!(%symbol, size = layout.size, align = layout.align, "generated struct");

        Ok(ConcreteStruct {
            symbol,
            source: key.display(types, names),
            fields,
            size: layout.size,
            align: layout.align,
            by_value_deps: deps.by_value,
            pointer_deps: deps.pointer,
        })
    }

    fn layout_of(&self, ty: TypeId, deps: &mut Deps) -> Result<Layout, InstantiationError> {
        ensure_sufficient_stack(|| {
            let target = self.mono.target();
            let data = self.mono.types().lookup(ty);
            if let Some(layout) = target.scalar(&data) {
                return self.checked(ty, layout);
            }
            match data {
                TypeData::Ptr { pointee, .. } => {
                    self.visit_pointee(pointee, deps)?;
                    self.checked(ty, target.pointer())
                }
                TypeData::Slice(elem) => {
                    self.visit_pointee(elem, deps)?;
                    self.checked(ty, target.slice())
                }
                TypeData::Array { elem, len } => {
                    let elem = self.layout_of(elem, deps)?;
                    elem.repeat(len).ok_or_else(|| self.type_overflow(ty))
                }
                TypeData::Tuple(elems) => {
                    let mut builder = StructLayoutBuilder::new();
                    for &elem in elems.iter() {
                        let layout = self.layout_of(elem, deps)?;
                        builder.push(layout).ok_or_else(|| self.type_overflow(ty))?;
                    }
                    builder.finish().ok_or_else(|| self.type_overflow(ty))
                }
                TypeData::Named(name) => {
                    let layout = target.named(name).ok_or_else(|| self.unknown_type(ty))?;
                    self.checked(ty, layout)
                }
                TypeData::Applied { name, args } => self.by_value_instance(name, &args, deps),
                TypeData::Int(_)
                | TypeData::Float(_)
                | TypeData::Bool
                | TypeData::Char
                | TypeData::String
                | TypeData::Void
                | TypeData::Param(_) => Err(self.unknown_type(ty)),
            }
        })
    }

    /// Layouts reported by the target must have a power-of-two alignment.
    fn checked(&self, ty: TypeId, layout: Layout) -> Result<Layout, InstantiationError> {
        if layout.is_valid() {
            Ok(layout)
        } else {
            Err(CodegenError::InvalidLayout {
                ty: self.mono.types().display(ty, self.mono.names()),
                align: layout.align,
            }
            .into())
        }
    }

    /// Instances reachable from a pointer target only need to exist.
    fn visit_pointee(&self, ty: TypeId, deps: &mut Deps) -> Result<(), InstantiationError> {
        match self.mono.types().lookup(ty) {
            TypeData::Applied { name, args } => self.pointer_instance(name, &args, deps),
            TypeData::Ptr { pointee: inner, .. }
            | TypeData::Slice(inner)
            | TypeData::Array { elem: inner, .. } => self.visit_pointee(inner, deps),
            TypeData::Tuple(elems) => elems
                .iter()
                .try_for_each(|&elem| self.visit_pointee(elem, deps)),
            _ => Ok(()),
        }
    }

    fn by_value_instance(
        &self,
        name: Name,
        args: &[TypeId],
        deps: &mut Deps,
    ) -> Result<Layout, InstantiationError> {
        let key = InstantiationKey::new(name, args);
        if self.chain.contains(&key) {
            return Err(self.recursive(&key));
        }
        let decl = self.declaration(name)?;
        let handle = self.mono.instantiate_in(decl, args, self.chain)?;
        let def = handle.wait()?;
        Deps::add(&mut deps.by_value, def.symbol.clone());
        Ok(Layout::new(def.size, def.align))
    }

    fn pointer_instance(
        &self,
        name: Name,
        args: &[TypeId],
        deps: &mut Deps,
    ) -> Result<(), InstantiationError> {
        let key = InstantiationKey::new(name, args);
        let symbol = mangle(self.mono.names(), self.mono.types(), &key);
        if !self.chain.contains(&key) {
            self.declaration(name)?;
            self.chain.defer(key);
        }
        Deps::add(&mut deps.pointer, symbol);
        Ok(())
    }

    fn declaration(&self, name: Name) -> Result<&'ast GenericStructDecl, InstantiationError> {
        self.mono.declaration(name).ok_or_else(|| {
            CodegenError::UnknownGeneric {
                name: self.mono.names().lookup(name).to_owned(),
            }
            .into()
        })
    }

    fn recursive(&self, key: &InstantiationKey) -> InstantiationError {
        CodegenError::RecursiveInstantiation {
            ty: key.display(self.mono.types(), self.mono.names()),
            depth: self.chain.depth(),
        }
        .into()
    }

    fn unknown_type(&self, ty: TypeId) -> InstantiationError {
        CodegenError::UnknownType {
            ty: self.mono.types().display(ty, self.mono.names()),
        }
        .into()
    }

    fn type_overflow(&self, ty: TypeId) -> InstantiationError {
        CodegenError::LayoutOverflow {
            ty: self.mono.types().display(ty, self.mono.names()),
        }
        .into()
    }

    fn overflow(&self, key: &InstantiationKey) -> InstantiationError {
        CodegenError::LayoutOverflow {
            ty: key.display(self.mono.types(), self.mono.names()),
        }
        .into()
    }
}
