//! Instantiation keys, records and the shared handles callers hold.
//!
//! A record is created `Pending` by the request that generates it, moves to
//! `Ready` once its concrete definition is set, or to `Failed` when
//! generation aborts. Only the generating request writes to it; everyone
//! else reads through a [`RecordHandle`].

use std::fmt;
use std::sync::{Arc, OnceLock, Weak};

use asthra_ir::{GenericStructDecl, Name, StringLookup, TypeId, TypeInterner};
use parking_lot::{Condvar, Mutex};
use smallvec::SmallVec;

use crate::error::{CodegenError, InstantiationError};
use crate::memory::MemoryTracker;

/// Identity of one monomorphization: generic declaration plus the ordered,
/// interned type arguments.
///
/// Arguments are `TypeId`s, so two argument lists built from different AST
/// nodes compare equal exactly when they describe the same types.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct InstantiationKey {
    generic: Name,
    args: SmallVec<[TypeId; 4]>,
}

impl InstantiationKey {
    pub fn new(generic: Name, args: &[TypeId]) -> Self {
        Self {
            generic,
            args: SmallVec::from_slice(args),
        }
    }

    #[inline]
    pub fn generic(&self) -> Name {
        self.generic
    }

    #[inline]
    pub fn args(&self) -> &[TypeId] {
        &self.args
    }

    /// The key as an applied type, e.g. `Pair<i32, string>`.
    pub fn as_type(&self, types: &TypeInterner) -> TypeId {
        types.applied(self.generic, self.args.as_slice())
    }

    pub fn display<L: StringLookup + ?Sized>(&self, types: &TypeInterner, names: &L) -> String {
        types.display(self.as_type(types), names)
    }
}

impl fmt::Debug for InstantiationKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}{:?}", self.generic, self.args.as_slice())
    }
}

/// Identifies one top-level instantiation request, including every nested
/// instantiation it triggers on the same thread.
#[derive(Copy, Clone, PartialEq, Eq, Hash, Debug)]
pub struct TaskId(pub(crate) u64);

impl TaskId {
    #[inline]
    pub fn raw(self) -> u64 {
        self.0
    }
}

/// Lifecycle state visible to callers.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
pub enum RecordStatus {
    Pending,
    Ready,
    Failed,
}

/// One field of a concrete struct, after substitution and layout.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcreteField {
    pub name: Name,
    pub ty: TypeId,
    pub offset: u64,
    pub size: u64,
    pub align: u64,
}

/// A generated, non-generic struct definition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConcreteStruct {
    /// Mangled symbol, unique per instantiation key.
    pub symbol: String,
    /// Source-level rendering, e.g. `Vec<i32>`.
    pub source: String,
    pub fields: Vec<ConcreteField>,
    pub size: u64,
    pub align: u64,
    /// Symbols of instances embedded by value. They are always generated
    /// before this struct.
    pub by_value_deps: Vec<String>,
    /// Symbols of instances referenced only through pointers.
    pub pointer_deps: Vec<String>,
}

#[derive(Debug)]
enum State {
    Pending,
    Ready,
    Failed(InstantiationError),
}

/// A single instantiation, shared between the registry and every caller
/// that requested it.
pub struct InstantiationRecord<'ast> {
    key: InstantiationKey,
    decl: &'ast GenericStructDecl,
    owner: TaskId,
    seq: u64,
    state: Mutex<State>,
    settled: Condvar,
    definition: OnceLock<ConcreteStruct>,
    tracker: Arc<MemoryTracker>,
}

impl<'ast> InstantiationRecord<'ast> {
    pub(crate) fn new(
        key: InstantiationKey,
        decl: &'ast GenericStructDecl,
        owner: TaskId,
        tracker: Arc<MemoryTracker>,
    ) -> Self {
        let seq = tracker.record_created();
        Self {
            key,
            decl,
            owner,
            seq,
            state: Mutex::new(State::Pending),
            settled: Condvar::new(),
            definition: OnceLock::new(),
            tracker,
        }
    }

    fn status(&self) -> RecordStatus {
        match &*self.state.lock() {
            State::Pending => RecordStatus::Pending,
            State::Ready => RecordStatus::Ready,
            State::Failed(_) => RecordStatus::Failed,
        }
    }
}

impl Drop for InstantiationRecord<'_> {
    fn drop(&mut self) {
        if matches!(self.state.get_mut(), State::Pending) {
            tracing::error!(
                key = ?self.key,
                "instantiation record freed while still pending"
            );
            debug_assert!(
                std::thread::panicking(),
                "instantiation record {:?} freed while pending",
                self.key
            );
        }
        self.tracker.record_freed();
        tracing::trace!(key = ?self.key, "instantiation record freed");
    }
}

/// Shared-ownership handle to an [`InstantiationRecord`].
///
/// Cloning is the atomic retain; dropping is the atomic release. The record
/// is freed when the last handle, including the registry's own, goes away.
pub struct RecordHandle<'ast>(Arc<InstantiationRecord<'ast>>);

impl<'ast> RecordHandle<'ast> {
    pub(crate) fn new(record: InstantiationRecord<'ast>) -> Self {
        Self(Arc::new(record))
    }

    #[inline]
    pub fn key(&self) -> &InstantiationKey {
        &self.0.key
    }

    #[inline]
    pub fn decl(&self) -> &'ast GenericStructDecl {
        self.0.decl
    }

    #[inline]
    pub fn owner(&self) -> TaskId {
        self.0.owner
    }

    /// Creation order within the owning tracker.
    #[inline]
    pub fn seq(&self) -> u64 {
        self.0.seq
    }

    pub fn status(&self) -> RecordStatus {
        self.0.status()
    }

    pub fn is_ready(&self) -> bool {
        self.status() == RecordStatus::Ready
    }

    /// The generated definition, once the record is `Ready`.
    pub fn definition(&self) -> Option<&ConcreteStruct> {
        self.0.definition.get()
    }

    pub fn mangled_name(&self) -> Option<&str> {
        self.definition().map(|def| def.symbol.as_str())
    }

    /// The error the record failed with, if any.
    pub fn error(&self) -> Option<InstantiationError> {
        match &*self.0.state.lock() {
            State::Failed(err) => Some(err.clone()),
            State::Pending | State::Ready => None,
        }
    }

    /// Number of live handles, the registry's included.
    #[inline]
    pub fn refcount(&self) -> usize {
        Arc::strong_count(&self.0)
    }

    #[inline]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    /// A non-owning reference that observes when the record is freed.
    pub fn downgrade(&self) -> WeakRecord<'ast> {
        WeakRecord(Arc::downgrade(&self.0))
    }

    /// Publish the generated definition and wake every waiter.
    ///
    /// Only the owning request calls this, exactly once.
    pub(crate) fn complete(&self, def: ConcreteStruct) {
        let mut state = self.0.state.lock();
        debug_assert!(matches!(*state, State::Pending));
        if self.0.definition.set(def).is_err() {
            tracing::error!(key = ?self.0.key, "instantiation completed twice");
        }
        *state = State::Ready;
        self.0.settled.notify_all();
    }

    /// Mark generation as aborted and wake every waiter with the error.
    pub(crate) fn fail(&self, err: InstantiationError) {
        let mut state = self.0.state.lock();
        debug_assert!(matches!(*state, State::Pending));
        *state = State::Failed(err);
        self.0.settled.notify_all();
    }

    /// Block until the record leaves `Pending`.
    pub(crate) fn wait(&self) -> Result<&ConcreteStruct, InstantiationError> {
        let mut state = self.0.state.lock();
        while matches!(*state, State::Pending) {
            self.0.settled.wait(&mut state);
        }
        if let State::Failed(err) = &*state {
            return Err(err.clone());
        }
        drop(state);
        // `complete` sets the definition before publishing `Ready`.
        self.definition().ok_or_else(|| {
            CodegenError::Emit {
                symbol: format!("{:?}", self.0.key),
                message: "record is ready without a definition".to_owned(),
            }
            .into()
        })
    }

    /// One-line summary for logs and debugging dumps.
    pub fn debug_string<L: StringLookup + ?Sized>(&self, types: &TypeInterner, names: &L) -> String {
        let status = self.status();
        let source = self.key().display(types, names);
        match self.definition() {
            Some(def) => format!(
                "{source} => {} [{status:?}, size={}, align={}, fields={}, refs={}]",
                def.symbol,
                def.size,
                def.align,
                def.fields.len(),
                self.refcount()
            ),
            None => format!("{source} [{status:?}, refs={}]", self.refcount()),
        }
    }
}

/// Non-owning observer of a record. Does not keep it alive.
#[derive(Clone)]
pub struct WeakRecord<'ast>(Weak<InstantiationRecord<'ast>>);

impl<'ast> WeakRecord<'ast> {
    pub fn upgrade(&self) -> Option<RecordHandle<'ast>> {
        self.0.upgrade().map(RecordHandle)
    }

    pub fn is_freed(&self) -> bool {
        self.0.strong_count() == 0
    }
}

impl Clone for RecordHandle<'_> {
    fn clone(&self) -> Self {
        tracing::trace!(key = ?self.0.key, refs = self.refcount() + 1, "retain");
        Self(Arc::clone(&self.0))
    }
}

impl fmt::Debug for RecordHandle<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RecordHandle")
            .field("key", &self.0.key)
            .field("status", &self.status())
            .field("symbol", &self.mangled_name())
            .finish()
    }
}
