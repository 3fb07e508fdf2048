//! The monomorphization session and its entry points.
//!
//! A request moves through
//! `Requested -> Validating -> (Rejected | Validated) -> (Hit | Miss) -> (Ready | Failed)`.
//! Rejected requests never reach the registry, and their declaration is not
//! registered. On a miss the concrete struct is generated and emitted before
//! the record is published. Instances only reachable through pointers are
//! instantiated afterwards, before the request returns.

use asthra_ir::{GenericStructDecl, Name, StringInterner, TypeId, TypeInterner};
use parking_lot::RwLock;
use rayon::prelude::*;
use rustc_hash::FxHashMap;
use std::collections::hash_map::Entry;
use std::sync::Arc;

use crate::codegen::{
    CEmitter, Chain, DataLayout, Deferred, StructGenerator, StructSink, TargetLayout,
};
use crate::config::MonoConfig;
use crate::error::{CodegenError, InstantiationError};
use crate::memory::{self, MemoryTracker};
use crate::record::{ConcreteStruct, InstantiationKey, RecordHandle, TaskId};
use crate::registry::{Registry, StatsSnapshot};
use crate::validate::{validate, BoundChecker, BuiltinBounds};

/// Owns everything one compilation unit's monomorphization needs. There is
/// no process-wide state; independent sessions can run side by side.
pub struct Monomorphizer<'ast> {
    names: &'ast StringInterner,
    types: &'ast TypeInterner,
    config: MonoConfig,
    registry: Registry<'ast>,
    decls: RwLock<FxHashMap<Name, &'ast GenericStructDecl>>,
    bounds: Box<dyn BoundChecker + 'ast>,
    target: Box<dyn TargetLayout + 'ast>,
    sink: Box<dyn StructSink + 'ast>,
}

impl<'ast> Monomorphizer<'ast> {
    /// Session with the built-in bounds, a [`DataLayout`] for
    /// `config.pointer_size`, and C output.
    pub fn new(names: &'ast StringInterner, types: &'ast TypeInterner, config: MonoConfig) -> Self {
        Self {
            names,
            types,
            registry: Registry::new(names, types),
            decls: RwLock::new(FxHashMap::default()),
            bounds: Box::new(BuiltinBounds::new(names)),
            target: Box::new(DataLayout::new(config.pointer_size)),
            sink: Box::new(CEmitter::new(names, types, config.emit_comments)),
            config,
        }
    }

    #[must_use]
    pub fn with_bounds(mut self, bounds: impl BoundChecker + 'ast) -> Self {
        self.bounds = Box::new(bounds);
        self
    }

    #[must_use]
    pub fn with_target(mut self, target: impl TargetLayout + 'ast) -> Self {
        self.target = Box::new(target);
        self
    }

    #[must_use]
    pub fn with_sink(mut self, sink: impl StructSink + 'ast) -> Self {
        self.sink = Box::new(sink);
        self
    }

    #[inline]
    pub fn names(&self) -> &'ast StringInterner {
        self.names
    }

    #[inline]
    pub fn types(&self) -> &'ast TypeInterner {
        self.types
    }

    #[inline]
    pub fn config(&self) -> &MonoConfig {
        &self.config
    }

    #[inline]
    pub fn registry(&self) -> &Registry<'ast> {
        &self.registry
    }

    pub(crate) fn target(&self) -> &dyn TargetLayout {
        &*self.target
    }

    /// Make a generic declaration available to by-name and nested requests.
    ///
    /// Registering the same declaration again is a no-op; a different
    /// declaration under a known name is rejected.
    pub fn register(&self, decl: &'ast GenericStructDecl) -> Result<(), InstantiationError> {
        if let Some(existing) = self.declaration(decl.name) {
            return self.same_declaration(existing, decl);
        }
        match self.decls.write().entry(decl.name) {
            Entry::Occupied(entry) => self.same_declaration(entry.get(), decl),
            Entry::Vacant(entry) => {
                tracing::debug!(generic = self.names.lookup(decl.name), "registered generic struct");
                entry.insert(decl);
                Ok(())
            }
        }
    }

    fn same_declaration(
        &self,
        existing: &GenericStructDecl,
        decl: &GenericStructDecl,
    ) -> Result<(), InstantiationError> {
        if std::ptr::eq(existing, decl) || existing == decl {
            Ok(())
        } else {
            Err(InstantiationError::DuplicateDeclaration {
                name: self.names.lookup(decl.name).to_owned(),
            })
        }
    }

    pub fn declaration(&self, name: Name) -> Option<&'ast GenericStructDecl> {
        self.decls.read().get(&name).copied()
    }

    /// Number of registered generic declarations.
    pub fn declaration_count(&self) -> usize {
        self.decls.read().len()
    }

    /// Instantiate `decl` with `args`, returning a retained handle to the
    /// ready record.
    ///
    /// `decl` is registered on the way if it is not yet known, so generic
    /// fields of other declarations can refer to it.
    ///
    /// # Errors
    /// Validation failures are returned without touching the registry.
    /// Generation failures leave no record behind; a later request retries.
    /// If an instance reached through a pointer fails, its error is returned
    /// even though the requested record itself is already published.
    #[tracing::instrument(level = "debug", skip_all, fields(generic = self.names.lookup(decl.name)))]
    pub fn instantiate(
        &self,
        decl: &'ast GenericStructDecl,
        args: &[TypeId],
    ) -> Result<RecordHandle<'ast>, InstantiationError> {
        validate(self.names, self.types, decl, args, &*self.bounds)?;
        self.register(decl)?;

        let task = self.registry.new_task();
        let deferred = Deferred::default();
        let handle = self.instantiate_validated(decl, args, &Chain::new(task, 0, &deferred))?;
        self.drain(task, &deferred)?;
        Ok(handle)
    }

    /// Instantiate queued pointer targets until none are left. Nothing of
    /// `task` is pending at this point, so waiting here cannot close a cycle.
    fn drain(&self, task: TaskId, deferred: &Deferred) -> Result<(), InstantiationError> {
        while let Some((key, depth)) = deferred.pop() {
            let decl = self.declaration(key.generic()).ok_or_else(|| {
                CodegenError::UnknownGeneric {
                    name: self.names.lookup(key.generic()).to_owned(),
                }
            })?;
            self.instantiate_in(decl, key.args(), &Chain::new(task, depth, deferred))?;
        }
        Ok(())
    }

    /// Instantiate a registered declaration by name.
    pub fn instantiate_by_name(
        &self,
        name: Name,
        args: &[TypeId],
    ) -> Result<RecordHandle<'ast>, InstantiationError> {
        let decl = self
            .declaration(name)
            .ok_or_else(|| InstantiationError::UnknownGeneric {
                name: self.names.lookup(name).to_owned(),
            })?;
        self.instantiate(decl, args)
    }

    /// Run a batch of requests on the rayon pool. Results are in request
    /// order.
    pub fn instantiate_all(
        &self,
        requests: &[(&'ast GenericStructDecl, Vec<TypeId>)],
    ) -> Vec<Result<RecordHandle<'ast>, InstantiationError>> {
        requests
            .par_iter()
            .map(|(decl, args)| self.instantiate(*decl, args))
            .collect()
    }

    /// Validate, then look up or generate within `chain`.
    pub(crate) fn instantiate_in(
        &self,
        decl: &'ast GenericStructDecl,
        args: &[TypeId],
        chain: &Chain<'_>,
    ) -> Result<RecordHandle<'ast>, InstantiationError> {
        validate(self.names, self.types, decl, args, &*self.bounds)?;
        self.instantiate_validated(decl, args, chain)
    }

    /// `chain.depth()` is the nesting of this request; only nested requests
    /// count against `max_depth`.
    fn instantiate_validated(
        &self,
        decl: &'ast GenericStructDecl,
        args: &[TypeId],
        chain: &Chain<'_>,
    ) -> Result<RecordHandle<'ast>, InstantiationError> {
        let key = InstantiationKey::new(decl.name, args);
        if chain.depth() > self.config.max_depth {
            return Err(CodegenError::RecursiveInstantiation {
                ty: key.display(self.types, self.names),
                depth: chain.depth(),
            }
            .into());
        }

        let generate = |key: &InstantiationKey| -> Result<ConcreteStruct, InstantiationError> {
            let chain = chain.push(key);
            let def = StructGenerator::new(self, &chain).generate(decl, key)?;
            self.sink.emit(&def, decl)?;
            Ok(def)
        };

        self.registry.lookup_or_create(key, decl, chain.task(), generate)
    }

    /// Take another reference to an instantiation.
    pub fn retain(&self, handle: &RecordHandle<'ast>) -> RecordHandle<'ast> {
        memory::retain(handle)
    }

    /// Give up a reference. The record is freed once every holder,
    /// including the registry, has released it.
    pub fn release(&self, handle: RecordHandle<'ast>) {
        memory::release(handle);
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.registry.stats()
    }

    /// Everything emitted so far, if the sink keeps its output.
    pub fn emitted_source(&self) -> String {
        self.sink.source()
    }

    /// One line per ready instantiation.
    pub fn debug_dump(&self) -> String {
        self.registry
            .records()
            .iter()
            .map(|record| record.debug_string(self.types, self.names))
            .collect::<Vec<_>>()
            .join("\n")
    }

    /// End the session. Records still held by callers stay alive until
    /// their handles are released.
    pub fn teardown(self) -> Arc<MemoryTracker> {
        self.registry.teardown()
    }
}

#[cfg(test)]
mod tests;
