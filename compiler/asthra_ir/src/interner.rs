//! Sharded string interner for identifiers.
//!
//! Every identifier the monomorphizer compares (declaration names, field
//! names, type parameters, bound names) goes through here, so equality is a
//! `u32` comparison and worker threads can intern concurrently.

use std::borrow::Cow;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::FxHashMap;

use crate::Name;

/// Error when a shard runs out of local indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InternError {
    ShardOverflow { shard_idx: usize, count: usize },
}

impl std::fmt::Display for InternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            InternError::ShardOverflow { shard_idx, count } => write!(
                f,
                "string interner shard {shard_idx} is full ({count} entries, max {})",
                Name::MAX_LOCAL
            ),
        }
    }
}

impl std::error::Error for InternError {}

struct InternShard {
    map: FxHashMap<&'static str, u32>,
    strings: Vec<&'static str>,
}

impl InternShard {
    fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            strings: Vec::with_capacity(128),
        }
    }

    fn with_empty() -> Self {
        let mut shard = Self::new();
        shard.map.insert("", 0);
        shard.strings.push("");
        shard
    }
}

/// Sharded string interner.
///
/// # Thread Safety
/// One `RwLock` per shard. Lookups of already-interned strings only take a
/// read lock; inserts re-check under the write lock.
pub struct StringInterner {
    shards: [RwLock<InternShard>; Name::NUM_SHARDS],
    total_count: AtomicUsize,
}

impl StringInterner {
    /// Create an interner with the Asthra primitive type names pre-interned.
    pub fn new() -> Self {
        let shards = std::array::from_fn(|i| {
            if i == 0 {
                RwLock::new(InternShard::with_empty())
            } else {
                RwLock::new(InternShard::new())
            }
        });

        let interner = Self {
            shards,
            total_count: AtomicUsize::new(1),
        };
        interner.pre_intern_builtins();
        interner
    }

    #[inline]
    fn shard_for(s: &str) -> usize {
        let mut hash = 0u32;
        for byte in s.bytes().take(8) {
            hash = hash.wrapping_mul(31).wrapping_add(u32::from(byte));
        }
        (hash as usize) % Name::NUM_SHARDS
    }

    /// Intern `s`, leaking an owned copy only when it is new.
    fn try_intern_cow(&self, s: Cow<'_, str>) -> Result<Name, InternError> {
        let shard_idx = Self::shard_for(&s);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "shard_idx is bounded by NUM_SHARDS"
        )]
        let shard_u32 = shard_idx as u32;
        let shard = &self.shards[shard_idx];

        if let Some(&local) = shard.read().map.get(s.as_ref()) {
            return Ok(Name::new(shard_u32, local));
        }

        let mut guard = shard.write();
        if let Some(&local) = guard.map.get(s.as_ref()) {
            return Ok(Name::new(shard_u32, local));
        }

        let count = guard.strings.len();
        let local = u32::try_from(count)
            .ok()
            .filter(|&l| l <= Name::MAX_LOCAL)
            .ok_or(InternError::ShardOverflow { shard_idx, count })?;

        let leaked: &'static str = Box::leak(s.into_owned().into_boxed_str());
        guard.strings.push(leaked);
        guard.map.insert(leaked, local);
        self.total_count.fetch_add(1, Ordering::Relaxed);

        Ok(Name::new(shard_u32, local))
    }

    #[inline]
    pub fn try_intern(&self, s: &str) -> Result<Name, InternError> {
        self.try_intern_cow(Cow::Borrowed(s))
    }

    /// Intern a string.
    ///
    /// # Panics
    /// Panics if a shard is full. Use [`try_intern`](Self::try_intern) to
    /// handle that case.
    #[inline]
    pub fn intern(&self, s: &str) -> Name {
        self.try_intern(s).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Intern an owned string without copying it again.
    pub fn intern_owned(&self, s: String) -> Name {
        self.try_intern_cow(Cow::Owned(s))
            .unwrap_or_else(|e| panic!("{e}"))
    }

    /// Look up the string for a `Name`.
    pub fn lookup(&self, name: Name) -> &'static str {
        self.shards[name.shard()].read().strings[name.local()]
    }

    fn pre_intern_builtins(&self) {
        const BUILTINS: &[&str] = &[
            // Primitive types
            "i8", "i16", "i32", "i64", "isize", "u8", "u16", "u32", "u64", "usize", "f32", "f64",
            "bool", "char", "string", "void",
            // Capability bounds understood by the built-in checker
            "Copy", "Eq", "Hash", "Ord", "Numeric", "Integer", "Float", "Sized", "Send",
            // Builtin generics
            "Option", "Result",
        ];

        for name in BUILTINS {
            self.intern(name);
        }
    }

    /// Number of interned strings, including the empty string.
    pub fn len(&self) -> usize {
        self.total_count.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() <= 1
    }
}

impl Default for StringInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// Read access to interned names without depending on `StringInterner`.
pub trait StringLookup {
    fn lookup(&self, name: Name) -> &str;
}

impl StringLookup for StringInterner {
    fn lookup(&self, name: Name) -> &str {
        StringInterner::lookup(self, name)
    }
}

/// Clonable, thread-safe handle to one `StringInterner`.
#[derive(Clone, Default)]
pub struct SharedInterner(Arc<StringInterner>);

impl SharedInterner {
    pub fn new() -> Self {
        SharedInterner(Arc::new(StringInterner::new()))
    }
}

impl std::ops::Deref for SharedInterner {
    type Target = StringInterner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
