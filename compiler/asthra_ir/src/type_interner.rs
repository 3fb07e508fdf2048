//! Sharded, deduplicating type interner.
//!
//! The canonical representation of every type the monomorphizer sees. Two
//! type arguments that spell the same type intern to the same `TypeId`, which
//! is what lets instantiation keys compare by value in O(arity).

use std::fmt::Write as _;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use parking_lot::RwLock;
use rustc_hash::{FxHashMap, FxHasher};

use crate::stack::ensure_sufficient_stack;
use crate::{FloatKind, IntKind, Name, StringLookup, TypeData, TypeFlags, TypeId};

/// Error when a shard runs out of local indices.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TypeInternError {
    ShardOverflow { shard_idx: usize },
}

impl std::fmt::Display for TypeInternError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TypeInternError::ShardOverflow { shard_idx } => {
                write!(f, "type interner shard {shard_idx} exceeded {} types", TypeId::MAX_LOCAL)
            }
        }
    }
}

impl std::error::Error for TypeInternError {}

struct TypeShard {
    map: FxHashMap<TypeData, u32>,
    types: Vec<TypeData>,
    flags: Vec<TypeFlags>,
}

impl TypeShard {
    fn new() -> Self {
        Self {
            map: FxHashMap::default(),
            types: Vec::with_capacity(256),
            flags: Vec::with_capacity(256),
        }
    }

    /// Shard 0 with primitives at the local indices of the `TypeId` constants.
    fn with_primitives() -> Self {
        let mut shard = Self::new();

        let primitives = [
            TypeData::Int(IntKind::I8),
            TypeData::Int(IntKind::I16),
            TypeData::Int(IntKind::I32),
            TypeData::Int(IntKind::I64),
            TypeData::Int(IntKind::Isize),
            TypeData::Int(IntKind::U8),
            TypeData::Int(IntKind::U16),
            TypeData::Int(IntKind::U32),
            TypeData::Int(IntKind::U64),
            TypeData::Int(IntKind::Usize),
            TypeData::Float(FloatKind::F32),
            TypeData::Float(FloatKind::F64),
            TypeData::Bool,
            TypeData::Char,
            TypeData::String,
            TypeData::Void,
        ];

        for (local, data) in (0u32..).zip(primitives) {
            debug_assert_eq!(data.primitive_id(), Some(TypeId::from_raw(local)));
            shard.flags.push(own_flags(&data));
            shard.map.insert(data.clone(), local);
            shard.types.push(data);
        }

        shard
    }
}

/// Flags describing only the outermost constructor of `data`.
fn own_flags(data: &TypeData) -> TypeFlags {
    match data {
        TypeData::Int(_) => TypeFlags::IS_PRIMITIVE | TypeFlags::IS_INTEGER,
        TypeData::Float(_) => TypeFlags::IS_PRIMITIVE | TypeFlags::IS_FLOAT,
        TypeData::Bool | TypeData::Char | TypeData::String | TypeData::Void => {
            TypeFlags::IS_PRIMITIVE
        }
        TypeData::Ptr { .. } | TypeData::Slice(_) => TypeFlags::IS_POINTER,
        TypeData::Array { .. } | TypeData::Tuple(_) => TypeFlags::IS_AGGREGATE,
        TypeData::Named(_) => TypeFlags::IS_NAMED | TypeFlags::HAS_NAMED,
        TypeData::Applied { .. } => TypeFlags::IS_APPLIED | TypeFlags::HAS_APPLIED,
        TypeData::Param(_) => TypeFlags::IS_PARAM | TypeFlags::HAS_PARAM,
    }
}

/// Sharded type interner.
///
/// # Thread Safety
/// One `RwLock` per shard; flags of children are read before the owning
/// shard's write lock is taken, so no thread ever holds two shard locks.
pub struct TypeInterner {
    shards: [RwLock<TypeShard>; TypeId::NUM_SHARDS],
}

impl TypeInterner {
    pub fn new() -> Self {
        let shards = std::array::from_fn(|i| {
            if i == 0 {
                RwLock::new(TypeShard::with_primitives())
            } else {
                RwLock::new(TypeShard::new())
            }
        });
        Self { shards }
    }

    #[inline]
    fn shard_for(data: &TypeData) -> usize {
        let mut hasher = FxHasher::default();
        data.hash(&mut hasher);
        #[expect(
            clippy::cast_possible_truncation,
            reason = "truncation is fine for shard selection"
        )]
        let hash = hasher.finish() as usize;
        hash % TypeId::NUM_SHARDS
    }

    /// Intern a descriptor, returning the existing id if it was seen before.
    #[expect(
        clippy::cast_possible_truncation,
        reason = "shard_idx is bounded by NUM_SHARDS"
    )]
    pub fn try_intern(&self, data: TypeData) -> Result<TypeId, TypeInternError> {
        if let Some(id) = data.primitive_id() {
            return Ok(id);
        }

        let shard_idx = Self::shard_for(&data);
        let shard = &self.shards[shard_idx];

        if let Some(&local) = shard.read().map.get(&data) {
            return Ok(TypeId::from_shard_local(shard_idx as u32, local));
        }

        let flags = own_flags(&data)
            | TypeFlags::propagate_all(data.children().iter().map(|&c| self.flags(c)));

        let mut guard = shard.write();
        if let Some(&local) = guard.map.get(&data) {
            return Ok(TypeId::from_shard_local(shard_idx as u32, local));
        }

        let local = u32::try_from(guard.types.len())
            .ok()
            .filter(|&l| l <= TypeId::MAX_LOCAL)
            .ok_or(TypeInternError::ShardOverflow { shard_idx })?;

        guard.types.push(data.clone());
        guard.flags.push(flags);
        guard.map.insert(data, local);

        Ok(TypeId::from_shard_local(shard_idx as u32, local))
    }

    /// Intern a descriptor.
    ///
    /// # Panics
    /// Panics if a shard is full.
    pub fn intern(&self, data: TypeData) -> TypeId {
        self.try_intern(data).unwrap_or_else(|e| panic!("{e}"))
    }

    /// Descriptor for `id`.
    ///
    /// # Panics
    /// Panics if `id` did not come from this interner.
    pub fn lookup(&self, id: TypeId) -> TypeData {
        self.shards[id.shard()].read().types[id.local()].clone()
    }

    /// Cached flags for `id`.
    pub fn flags(&self, id: TypeId) -> TypeFlags {
        self.shards[id.shard()].read().flags[id.local()]
    }

    /// No type parameter appears anywhere inside `id`.
    #[inline]
    pub fn is_concrete(&self, id: TypeId) -> bool {
        self.flags(id).is_concrete()
    }

    pub fn ptr(&self, pointee: TypeId) -> TypeId {
        self.intern(TypeData::Ptr {
            pointee,
            mutable: false,
        })
    }

    pub fn ptr_mut(&self, pointee: TypeId) -> TypeId {
        self.intern(TypeData::Ptr {
            pointee,
            mutable: true,
        })
    }

    pub fn slice(&self, elem: TypeId) -> TypeId {
        self.intern(TypeData::Slice(elem))
    }

    pub fn array(&self, elem: TypeId, len: u64) -> TypeId {
        self.intern(TypeData::Array { elem, len })
    }

    pub fn tuple(&self, elems: impl Into<Box<[TypeId]>>) -> TypeId {
        self.intern(TypeData::Tuple(elems.into()))
    }

    pub fn named(&self, name: Name) -> TypeId {
        self.intern(TypeData::Named(name))
    }

    /// `name<args...>`; equal name and args always yield the same id.
    pub fn applied(&self, name: Name, args: impl Into<Box<[TypeId]>>) -> TypeId {
        self.intern(TypeData::Applied {
            name,
            args: args.into(),
        })
    }

    pub fn param(&self, name: Name) -> TypeId {
        self.intern(TypeData::Param(name))
    }

    /// Replace each `Param(params[i])` inside `ty` with `args[i]`.
    ///
    /// Parameters without a matching argument are left in place. Concrete
    /// subtrees are returned without rebuilding.
    pub fn substitute(&self, ty: TypeId, params: &[Name], args: &[TypeId]) -> TypeId {
        if self.is_concrete(ty) {
            return ty;
        }

        ensure_sufficient_stack(|| match self.lookup(ty) {
            TypeData::Param(name) => params
                .iter()
                .position(|&p| p == name)
                .and_then(|i| args.get(i).copied())
                .unwrap_or(ty),
            TypeData::Ptr { pointee, mutable } => self.intern(TypeData::Ptr {
                pointee: self.substitute(pointee, params, args),
                mutable,
            }),
            TypeData::Slice(elem) => self.slice(self.substitute(elem, params, args)),
            TypeData::Array { elem, len } => self.array(self.substitute(elem, params, args), len),
            TypeData::Tuple(elems) => self.tuple(
                elems
                    .iter()
                    .map(|&e| self.substitute(e, params, args))
                    .collect::<Vec<_>>(),
            ),
            TypeData::Applied { name, args: inner } => self.applied(
                name,
                inner
                    .iter()
                    .map(|&a| self.substitute(a, params, args))
                    .collect::<Vec<_>>(),
            ),
            TypeData::Int(_)
            | TypeData::Float(_)
            | TypeData::Bool
            | TypeData::Char
            | TypeData::String
            | TypeData::Void
            | TypeData::Named(_) => ty,
        })
    }

    /// Render `ty` in Asthra surface syntax, e.g. `Pair<*Box<i32>, []u8>`.
    pub fn display<L: StringLookup + ?Sized>(&self, ty: TypeId, names: &L) -> String {
        let mut out = String::new();
        self.write_type(ty, names, &mut out);
        out
    }

    fn write_type<L: StringLookup + ?Sized>(&self, ty: TypeId, names: &L, out: &mut String) {
        ensure_sufficient_stack(|| match self.lookup(ty) {
            TypeData::Int(kind) => out.push_str(kind.name()),
            TypeData::Float(kind) => out.push_str(kind.name()),
            TypeData::Bool => out.push_str("bool"),
            TypeData::Char => out.push_str("char"),
            TypeData::String => out.push_str("string"),
            TypeData::Void => out.push_str("void"),
            TypeData::Ptr { pointee, mutable } => {
                out.push_str(if mutable { "*mut " } else { "*" });
                self.write_type(pointee, names, out);
            }
            TypeData::Slice(elem) => {
                out.push_str("[]");
                self.write_type(elem, names, out);
            }
            TypeData::Array { elem, len } => {
                let _ = write!(out, "[{len}]");
                self.write_type(elem, names, out);
            }
            TypeData::Tuple(elems) => {
                out.push('(');
                self.write_list(&elems, names, out);
                out.push(')');
            }
            TypeData::Named(name) | TypeData::Param(name) => out.push_str(names.lookup(name)),
            TypeData::Applied { name, args } => {
                out.push_str(names.lookup(name));
                out.push('<');
                self.write_list(&args, names, out);
                out.push('>');
            }
        });
    }

    fn write_list<L: StringLookup + ?Sized>(&self, ids: &[TypeId], names: &L, out: &mut String) {
        for (i, &id) in ids.iter().enumerate() {
            if i > 0 {
                out.push_str(", ");
            }
            self.write_type(id, names, out);
        }
    }

    /// Number of interned types, primitives included.
    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.read().types.len()).sum()
    }

    /// Only the pre-interned primitives are present.
    pub fn is_empty(&self) -> bool {
        self.len() <= TypeId::FIRST_COMPOUND as usize
    }
}

impl Default for TypeInterner {
    fn default() -> Self {
        Self::new()
    }
}

/// Clonable, thread-safe handle to one `TypeInterner`.
#[derive(Clone, Default)]
pub struct SharedTypeInterner(Arc<TypeInterner>);

impl std::fmt::Debug for SharedTypeInterner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SharedTypeInterner")
            .field("len", &self.0.len())
            .finish()
    }
}

impl SharedTypeInterner {
    pub fn new() -> Self {
        SharedTypeInterner(Arc::new(TypeInterner::new()))
    }
}

impl std::ops::Deref for SharedTypeInterner {
    type Target = TypeInterner;

    fn deref(&self) -> &Self::Target {
        &self.0
    }
}
