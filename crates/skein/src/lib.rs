//! Skein: run script modules across worker threads over a shared buffer.
//!
//! This is the top-level facade crate that re-exports the public API from
//! all Skein sub-crates.
//!
//! # Quick start
//!
//! ```rust
//! use skein::prelude::*;
//!
//! struct Double;
//! impl Module for Double {
//!     fn name(&self) -> &str { "double" }
//!     fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
//!         Ok(())
//!     }
//!     fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
//!         let slot = ctx.slot()?;
//!         let x = slot.get()?;
//!         slot.set(x * 2.0)?;
//!         Ok(())
//!     }
//!     fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
//!         Ok(())
//!     }
//! }
//!
//! let buffer = BufferDescriptor::from_values(vec![1.0, 2.0, 3.0]);
//! let mut coordinator = Coordinator::new(CoordinatorConfig::default(), &buffer).unwrap();
//! let report = coordinator.run(&NativeSource::new(Double), 3).unwrap();
//! assert!(report.is_success());
//! assert_eq!(buffer.snapshot(), vec![2.0, 4.0, 6.0]);
//! ```
//!
//! # Modules
//!
//! | Module | Sub-crate | Contents |
//! |--------|-----------|----------|
//! | [`types`] | `skein-core` | Buffer descriptor, identity provider, auxiliary data, errors |
//! | [`module`] | `skein-module` | `Module` trait, bindings, contexts, lifecycle |
//! | [`engine`] | `skein-engine` | Execution coordinator, worker pool, run reports |
//! | `python` | `skein-python` | Embedded CPython adapter (feature `python`) |

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

/// Core types, errors, and IDs (`skein-core`).
///
/// Contains [`types::BufferDescriptor`], the [`types::identity`] provider,
/// and the auxiliary data registry.
pub use skein_core as types;

/// Module contract and lifecycle (`skein-module`).
///
/// The [`module::Module`] trait is the main extension point for native
/// modules; [`module::ModuleSource`] loads them for a run.
pub use skein_module as module;

/// Execution coordinator (`skein-engine`).
///
/// [`engine::Coordinator::run`] drives one initialize, `thread_count`
/// concurrent mains, and one finalize.
pub use skein_engine as engine;

/// Embedded CPython adapter (`skein-python`).
#[cfg(feature = "python")]
pub use skein_python as python;

/// Common imports for typical Skein usage.
///
/// ```rust
/// use skein::prelude::*;
/// ```
pub mod prelude {
    // Buffer and identity
    pub use skein_core::{
        identity, BufferDescriptor, BufferView, Layout, Slot, SlotOwnership, WorkerOrdinal,
    };

    // Auxiliary data
    pub use skein_core::{AuxNamespace, AuxRegistry, AuxValue};

    // Errors
    pub use skein_core::{BufferError, IdentityError, LoadError, ModuleFault};

    // Module contract
    pub use skein_module::{
        FinalizeContext, InitContext, Module, ModuleSource, NativeSource, WorkerContext,
    };

    // Engine
    pub use skein_engine::{Coordinator, CoordinatorConfig, RunError, RunReport};

    // Python
    #[cfg(feature = "python")]
    pub use skein_python::{ScriptConfig, ScriptSource};
}
