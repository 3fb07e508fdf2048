//! Deduplicating store of instantiations.
//!
//! # Protocol
//! A request first claims its key in the map through the entry API. The
//! shard lock is held only for the claim itself:
//!
//! - **Miss**: a `Pending` record is inserted and the caller runs the
//!   generator with no lock held, then publishes `Ready` or `Failed`.
//! - **Hit**: the caller gets a new handle to the existing record and, on
//!   the blocking path, waits until the owner publishes.
//!
//! So an equal key is generated at most once while its record is live.
//! Failed records are evicted before waiters are woken; a later request for
//! the same key generates again.
//!
//! # Wait cycles
//! Every blocked request is entered in a wait-for graph (waiting task ->
//! awaited record, whose owner is a task). Before blocking, the chain of
//! owners is walked; reaching the waiting task means the two requests need
//! each other by value, which is reported as `RecursiveInstantiation`
//! instead of a deadlock.

use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use asthra_ir::{GenericStructDecl, Name, StringInterner, TypeInterner};
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use parking_lot::Mutex;
use rustc_hash::{FxBuildHasher, FxHashMap};

use crate::error::{CodegenError, InstantiationError};
use crate::memory::{create_record, MemoryTracker};
use crate::record::{ConcreteStruct, InstantiationKey, RecordHandle, RecordStatus, TaskId};

/// Request counters. Updated with relaxed atomics; read through
/// [`RegistryStats::snapshot`].
#[derive(Debug, Default)]
pub struct RegistryStats {
    requests: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    generated: AtomicU64,
    failed: AtomicU64,
    waits: AtomicU64,
    cycles: AtomicU64,
}

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct StatsSnapshot {
    pub requests: u64,
    pub hits: u64,
    pub misses: u64,
    /// Concrete structs successfully generated.
    pub generated: u64,
    pub failed: u64,
    /// Requests that blocked on another request's generation.
    pub waits: u64,
    pub cycles: u64,
}

impl RegistryStats {
    #[inline]
    fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        let load = |c: &AtomicU64| c.load(Ordering::Relaxed);
        StatsSnapshot {
            requests: load(&self.requests),
            hits: load(&self.hits),
            misses: load(&self.misses),
            generated: load(&self.generated),
            failed: load(&self.failed),
            waits: load(&self.waits),
            cycles: load(&self.cycles),
        }
    }
}

/// Whether a hit on a `Pending` record blocks until it is published.
#[derive(Copy, Clone, PartialEq, Eq, Debug)]
enum Wait {
    Block,
    Never,
}

/// Session-scoped map from [`InstantiationKey`] to record.
pub struct Registry<'ast> {
    names: &'ast StringInterner,
    types: &'ast TypeInterner,
    map: DashMap<InstantiationKey, RecordHandle<'ast>, FxBuildHasher>,
    /// Waiting task -> record it is blocked on.
    waits: Mutex<FxHashMap<TaskId, RecordHandle<'ast>>>,
    next_task: AtomicU64,
    tracker: Arc<MemoryTracker>,
    stats: RegistryStats,
}

impl<'ast> Registry<'ast> {
    pub fn new(names: &'ast StringInterner, types: &'ast TypeInterner) -> Self {
        Self {
            names,
            types,
            map: DashMap::with_hasher(FxBuildHasher),
            waits: Mutex::new(FxHashMap::default()),
            next_task: AtomicU64::new(0),
            tracker: MemoryTracker::new(),
            stats: RegistryStats::default(),
        }
    }

    /// Fresh id for a top-level request.
    pub fn new_task(&self) -> TaskId {
        TaskId(self.next_task.fetch_add(1, Ordering::Relaxed))
    }

    pub fn tracker(&self) -> &Arc<MemoryTracker> {
        &self.tracker
    }

    pub fn stats(&self) -> StatsSnapshot {
        self.stats.snapshot()
    }

    /// Return the record for `key`, generating it with `generate` if no
    /// live record exists. Blocks while another request is generating it.
    pub fn lookup_or_create<F>(
        &self,
        key: InstantiationKey,
        decl: &'ast GenericStructDecl,
        task: TaskId,
        generate: F,
    ) -> Result<RecordHandle<'ast>, InstantiationError>
    where
        F: FnOnce(&InstantiationKey) -> Result<ConcreteStruct, InstantiationError>,
    {
        self.acquire(key, decl, task, generate, Wait::Block)
    }

    /// Like [`lookup_or_create`](Self::lookup_or_create), but an existing
    /// record is returned as is, even if still `Pending`. For callers that
    /// only need the record to exist.
    pub fn peek_or_create<F>(
        &self,
        key: InstantiationKey,
        decl: &'ast GenericStructDecl,
        task: TaskId,
        generate: F,
    ) -> Result<RecordHandle<'ast>, InstantiationError>
    where
        F: FnOnce(&InstantiationKey) -> Result<ConcreteStruct, InstantiationError>,
    {
        self.acquire(key, decl, task, generate, Wait::Never)
    }

    fn acquire<F>(
        &self,
        key: InstantiationKey,
        decl: &'ast GenericStructDecl,
        task: TaskId,
        generate: F,
        wait: Wait,
    ) -> Result<RecordHandle<'ast>, InstantiationError>
    where
        F: FnOnce(&InstantiationKey) -> Result<ConcreteStruct, InstantiationError>,
    {
        RegistryStats::bump(&self.stats.requests);

        let (handle, created) = match self.map.entry(key) {
            Entry::Occupied(entry) => (entry.get().clone(), false),
            Entry::Vacant(entry) => {
                let handle = create_record(entry.key().clone(), decl, task, &self.tracker);
                entry.insert(handle.clone());
                (handle, true)
            }
        };

        if !created {
            RegistryStats::bump(&self.stats.hits);
            tracing::trace!(key = ?handle.key(), status = ?handle.status(), "registry hit");
            if wait == Wait::Block {
                self.wait_for(&handle, task)?;
            }
            return Ok(handle);
        }

        RegistryStats::bump(&self.stats.misses);
        tracing::debug!(key = ?handle.key(), task = task.raw(), "registry miss, generating");

        let mut in_flight = InFlight {
            registry: self,
            handle: &handle,
            armed: true,
        };
        let outcome = generate(handle.key());
        in_flight.armed = false;
        drop(in_flight);

        match outcome {
            Ok(def) => {
                tracing::debug!(key = ?handle.key(), symbol = %def.symbol, "instantiation ready");
                handle.complete(def);
                RegistryStats::bump(&self.stats.generated);
                Ok(handle)
            }
            Err(err) => {
                tracing::warn!(key = ?handle.key(), error = %err, "instantiation failed");
                self.abandon(&handle, err.clone());
                Err(err)
            }
        }
    }

    /// Evict a failed record, then wake its waiters with `err`.
    fn abandon(&self, handle: &RecordHandle<'ast>, err: InstantiationError) {
        RegistryStats::bump(&self.stats.failed);
        self.map.remove_if(handle.key(), |_, current| current.ptr_eq(handle));
        handle.fail(err);
    }

    fn wait_for(&self, handle: &RecordHandle<'ast>, task: TaskId) -> Result<(), InstantiationError> {
        if handle.status() == RecordStatus::Pending {
            {
                let mut waits = self.waits.lock();
                if let Some(length) = Self::cycle_length(&waits, handle, task) {
                    RegistryStats::bump(&self.stats.cycles);
                    tracing::warn!(key = ?handle.key(), length, "instantiation wait cycle");
                    return Err(CodegenError::RecursiveInstantiation {
                        ty: handle.key().display(self.types, self.names),
                        depth: length,
                    }
                    .into());
                }
                waits.insert(task, handle.clone());
            }
            RegistryStats::bump(&self.stats.waits);
            tracing::trace!(key = ?handle.key(), task = task.raw(), "waiting for generation");
            let outcome = handle.wait().map(|_| ());
            self.waits.lock().remove(&task);
            return outcome;
        }
        handle.wait().map(|_| ())
    }

    /// Follow owner -> awaited record -> owner ... from `target`. Returns the
    /// number of hops if the walk comes back to `task`.
    fn cycle_length(
        waits: &FxHashMap<TaskId, RecordHandle<'ast>>,
        target: &RecordHandle<'ast>,
        task: TaskId,
    ) -> Option<usize> {
        let mut owner = target.owner();
        let mut length = 1;
        while length <= waits.len() + 1 {
            if owner == task {
                return Some(length);
            }
            let next = waits.get(&owner)?;
            if next.status() != RecordStatus::Pending {
                return None;
            }
            owner = next.owner();
            length += 1;
        }
        None
    }

    pub fn get(&self, key: &InstantiationKey) -> Option<RecordHandle<'ast>> {
        self.map.get(key).map(|entry| entry.value().clone())
    }

    /// Records currently held, `Pending` ones included.
    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Ready records in creation order.
    pub fn records(&self) -> Vec<RecordHandle<'ast>> {
        let mut out: Vec<_> = self
            .map
            .iter()
            .filter(|entry| entry.value().is_ready())
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(RecordHandle::seq);
        out
    }

    /// Ready instantiations of one generic declaration, in creation order.
    pub fn instantiations_of(&self, generic: Name) -> Vec<RecordHandle<'ast>> {
        let mut out: Vec<_> = self
            .map
            .iter()
            .filter(|entry| entry.key().generic() == generic && entry.value().is_ready())
            .map(|entry| entry.value().clone())
            .collect();
        out.sort_by_key(RecordHandle::seq);
        out
    }

    /// Human-readable summary of counters and live instantiations.
    pub fn stats_report(&self) -> String {
        let stats = self.stats();
        let mut out = String::new();
        let _ = writeln!(out, "generic instantiation registry");
        for (label, value) in [
            ("requests", stats.requests),
            ("hits", stats.hits),
            ("misses", stats.misses),
            ("generated", stats.generated),
            ("failed", stats.failed),
            ("waits", stats.waits),
            ("wait cycles", stats.cycles),
            ("live records", self.tracker.live()),
        ] {
            let _ = writeln!(out, "  {label:<14}{value:>8}");
        }

        let mut by_generic: BTreeMap<&str, Vec<RecordHandle<'ast>>> = BTreeMap::new();
        for record in self.records() {
            by_generic
                .entry(self.names.lookup(record.key().generic()))
                .or_default()
                .push(record);
        }
        for (generic, records) in by_generic {
            let _ = writeln!(out, "  {generic}: {} instantiation(s)", records.len());
            for record in records {
                let _ = writeln!(out, "    {}", record.debug_string(self.types, self.names));
            }
        }
        out
    }

    /// End of the session: drop the registry's own references.
    ///
    /// Records still held by callers are freed when their last handle is
    /// released. Returns the tracker so callers can check for leaks.
    #[tracing::instrument(level = "debug", skip_all, fields(records = self.map.len()))]
    pub fn teardown(self) -> Arc<MemoryTracker> {
        for entry in &self.map {
            if entry.value().status() == RecordStatus::Pending {
                tracing::error!(key = ?entry.key(), "record still pending at teardown");
            }
        }
        let Registry { map, tracker, .. } = self;
        drop(map);
        tracing::debug!(live = tracker.live(), "registry torn down");
        tracker
    }
}

/// Fails the in-flight record if the generator unwinds, so waiters are
/// woken instead of blocking forever.
struct InFlight<'r, 'ast> {
    registry: &'r Registry<'ast>,
    handle: &'r RecordHandle<'ast>,
    armed: bool,
}

impl Drop for InFlight<'_, '_> {
    fn drop(&mut self) {
        if self.armed {
            tracing::error!(key = ?self.handle.key(), "generator panicked");
            self.registry.abandon(
                self.handle,
                CodegenError::Emit {
                    symbol: format!("{:?}", self.handle.key()),
                    message: "generator panicked".to_owned(),
                }
                .into(),
            );
        }
    }
}
