//! Generic struct monomorphization for the Asthra compiler.
//!
//! Turns a generic declaration such as `struct Box<T> { value: T }` plus
//! concrete type arguments into a concrete, non-generic struct, exactly once
//! per distinct argument list, while many code-generation workers ask for
//! instantiations concurrently.
//!
//! # Pipeline
//! [`Monomorphizer::instantiate`] runs [`validate`] first, then asks the
//! [`Registry`] for the record. On a miss the [`StructGenerator`] substitutes
//! field types, lays the struct out through a [`TargetLayout`], names it with
//! [`mangle`], and hands it to a [`StructSink`] before the record is
//! published. Callers get a [`RecordHandle`]; the record is freed when the
//! last handle, the registry's included, is released.
//!
//! # Tracing
//! Set `RUST_LOG=asthra_mono=debug` (or `trace` for handle traffic) after
//! calling [`init_tracing`].

mod codegen;
mod config;
mod error;
mod instantiate;
pub mod memory;
mod record;
mod registry;
mod validate;

pub use codegen::{
    mangle, mangle_applied, CEmitter, DataLayout, Layout, StructGenerator, StructLayoutBuilder,
    StructSink, TargetLayout,
};
pub use config::MonoConfig;
pub use error::{CodegenError, InstantiationError, ValidationError};
pub use instantiate::Monomorphizer;
pub use memory::MemoryTracker;
pub use record::{
    ConcreteField, ConcreteStruct, InstantiationKey, InstantiationRecord, RecordHandle,
    RecordStatus, TaskId, WeakRecord,
};
pub use registry::{Registry, RegistryStats, StatsSnapshot};
pub use validate::{validate, BoundChecker, BuiltinBounds, Capabilities};

use std::sync::Once;

static TRACING_INIT: Once = Once::new();

/// Install a `tracing` subscriber filtered by `RUST_LOG`.
///
/// Does nothing when `RUST_LOG` is unset, and nothing after the first call.
pub fn init_tracing() {
    TRACING_INIT.call_once(|| {
        use tracing_subscriber::{fmt, prelude::*, EnvFilter};

        if std::env::var("RUST_LOG").is_ok() {
            let filter = EnvFilter::from_default_env();
            // Another subscriber may already be installed by the host.
            let _ = tracing_subscriber::registry()
                .with(fmt::layer().with_target(true).with_level(true))
                .with(filter)
                .try_init();
        }
    });
}
