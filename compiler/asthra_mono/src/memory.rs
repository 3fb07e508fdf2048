//! Record lifetime.
//!
//! Records are reference counted through `Arc`: [`retain`] is a handle
//! clone, [`release`] a handle drop, and the record is freed synchronously
//! when the last handle goes away. A count below zero cannot be expressed.
//!
//! [`MemoryTracker`] counts allocations and frees per session so callers
//! can check that every record was freed exactly once.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use asthra_ir::GenericStructDecl;

use crate::record::{InstantiationKey, InstantiationRecord, RecordHandle, TaskId};

/// Allocation counters shared by every record of one session.
#[derive(Debug, Default)]
pub struct MemoryTracker {
    created: AtomicU64,
    freed: AtomicU64,
}

impl MemoryTracker {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Returns the creation sequence number of the new record.
    pub(crate) fn record_created(&self) -> u64 {
        self.created.fetch_add(1, Ordering::Relaxed)
    }

    pub(crate) fn record_freed(&self) {
        let prev_freed = self.freed.fetch_add(1, Ordering::AcqRel);
        let created = self.created.load(Ordering::Acquire);
        if prev_freed >= created {
            tracing::error!(created, freed = prev_freed + 1, "more records freed than created");
            debug_assert!(false, "more records freed than created");
        }
    }

    pub fn created(&self) -> u64 {
        self.created.load(Ordering::Acquire)
    }

    pub fn freed(&self) -> u64 {
        self.freed.load(Ordering::Acquire)
    }

    /// Records allocated and not yet freed.
    pub fn live(&self) -> u64 {
        self.created().saturating_sub(self.freed())
    }
}

/// Allocate a `Pending` record with a single owning handle.
pub fn create_record<'ast>(
    key: InstantiationKey,
    decl: &'ast GenericStructDecl,
    owner: TaskId,
    tracker: &Arc<MemoryTracker>,
) -> RecordHandle<'ast> {
    tracing::trace!(key = ?key, owner = owner.raw(), "create record");
    RecordHandle::new(InstantiationRecord::new(key, decl, owner, Arc::clone(tracker)))
}

/// Take another reference to the record.
#[inline]
pub fn retain<'ast>(handle: &RecordHandle<'ast>) -> RecordHandle<'ast> {
    handle.clone()
}

/// Give up a reference. Frees the record if it was the last one.
pub fn release(handle: RecordHandle<'_>) {
    tracing::trace!(key = ?handle.key(), refs = handle.refcount() - 1, "release");
    drop(handle);
}
