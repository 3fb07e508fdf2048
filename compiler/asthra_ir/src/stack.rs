//! Stack growth for recursive walks over type descriptors.
//!
//! Nested type arguments can be arbitrarily deep (`Box<Box<Box<...>>>`), and
//! substitution, rendering and flag computation all recurse structurally.

/// Keep at least this much stack free before recursing.
const RED_ZONE: usize = 64 * 1024;

/// Size of each new stack segment.
const STACK_PER_RECURSION: usize = 1024 * 1024;

/// Run `f`, growing the stack first if less than the red zone remains.
#[inline]
#[cfg(not(target_arch = "wasm32"))]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    stacker::maybe_grow(RED_ZONE, STACK_PER_RECURSION, f)
}

/// WASM manages its own stack.
#[inline]
#[cfg(target_arch = "wasm32")]
pub fn ensure_sufficient_stack<R>(f: impl FnOnce() -> R) -> R {
    f()
}
