//! Size and alignment of concrete types.
//!
//! Target-dependent answers (scalar widths, pointer width, layouts of
//! ordinary user structs) come from a [`TargetLayout`]. Aggregates are laid
//! out with C rules by [`StructLayoutBuilder`].

use asthra_ir::{Name, TypeData};
use rustc_hash::FxHashMap;

#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct Layout {
    pub size: u64,
    pub align: u64,
}

impl Layout {
    pub const fn new(size: u64, align: u64) -> Self {
        Self { size, align }
    }

    pub const ZERO_SIZED: Layout = Layout::new(0, 1);

    /// Alignment is a non-zero power of two.
    pub fn is_valid(self) -> bool {
        self.align.is_power_of_two()
    }

    /// `len` consecutive elements of this layout.
    pub fn repeat(self, len: u64) -> Option<Layout> {
        Some(Layout::new(self.size.checked_mul(len)?, self.align))
    }
}

/// Layout queries answered by the shared code generator.
pub trait TargetLayout: Send + Sync {
    /// Layout of a primitive; `None` for compound descriptors.
    fn scalar(&self, ty: &TypeData) -> Option<Layout>;

    fn pointer(&self) -> Layout;

    /// Layout of a non-generic user struct.
    fn named(&self, name: Name) -> Option<Layout>;

    /// Slices are a (pointer, length) pair.
    fn slice(&self) -> Layout {
        let ptr = self.pointer();
        Layout::new(ptr.size * 2, ptr.align)
    }
}

/// Default target description: natural alignment, configurable pointer
/// width, and a table of known user struct layouts.
#[derive(Clone, Debug)]
pub struct DataLayout {
    pointer_size: u64,
    structs: FxHashMap<Name, Layout>,
}

impl DataLayout {
    pub fn new(pointer_size: u32) -> Self {
        Self {
            pointer_size: u64::from(pointer_size),
            structs: FxHashMap::default(),
        }
    }

    #[must_use]
    pub fn with_struct(mut self, name: Name, layout: Layout) -> Self {
        self.structs.insert(name, layout);
        self
    }
}

impl TargetLayout for DataLayout {
    fn scalar(&self, ty: &TypeData) -> Option<Layout> {
        let natural = |bytes: u64| Layout::new(bytes, bytes);
        match ty {
            TypeData::Int(kind) => Some(natural(
                kind.fixed_bytes().map_or(self.pointer_size, u64::from),
            )),
            TypeData::Float(kind) => Some(natural(u64::from(kind.bytes()))),
            TypeData::Bool => Some(natural(1)),
            TypeData::Char => Some(natural(4)),
            TypeData::String => Some(self.slice()),
            TypeData::Void => Some(Layout::ZERO_SIZED),
            _ => None,
        }
    }

    fn pointer(&self) -> Layout {
        Layout::new(self.pointer_size, self.pointer_size)
    }

    fn named(&self, name: Name) -> Option<Layout> {
        self.structs.get(&name).copied()
    }
}

/// Lays out fields in declaration order with C rules: each field is placed
/// at the next multiple of its alignment, and the total size is rounded up
/// to the largest alignment.
#[derive(Debug)]
pub struct StructLayoutBuilder {
    offset: u64,
    align: u64,
}

impl StructLayoutBuilder {
    pub fn new() -> Self {
        Self {
            offset: 0,
            align: 1,
        }
    }

    /// Place a field; returns its offset, or `None` on overflow or an
    /// invalid alignment.
    pub fn push(&mut self, field: Layout) -> Option<u64> {
        let offset = align_up(self.offset, field.align)?;
        self.offset = offset.checked_add(field.size)?;
        self.align = self.align.max(field.align);
        Some(offset)
    }

    /// Final layout. An aggregate with no storage still occupies one byte so
    /// every instance has a distinct address.
    pub fn finish(self) -> Option<Layout> {
        let size = align_up(self.offset, self.align)?;
        Some(Layout::new(size.max(1), self.align))
    }
}

impl Default for StructLayoutBuilder {
    fn default() -> Self {
        Self::new()
    }
}

#[inline]
fn align_up(value: u64, align: u64) -> Option<u64> {
    if !align.is_power_of_two() {
        return None;
    }
    let mask = align - 1;
    Some(value.checked_add(mask)? & !mask)
}
