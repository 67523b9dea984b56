//! Module lifecycle contract for the Skein scripting bridge.
//!
//! Every loadable module implements [`Module`]: `initialize` once, `main`
//! once per worker thread, `finalize` once. Each phase receives an explicit
//! context struct listing exactly what it may touch; there is no ambient
//! namespace on the native side.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod bindings;
pub mod context;
pub mod lifecycle;
pub mod module;
pub mod state;

pub use bindings::{Bindings, ThreadIdentity};
pub use context::{FinalizeContext, InitContext, WorkerContext};
pub use lifecycle::{Lifecycle, LifecycleError, LifecycleState};
pub use module::{Module, ModuleHandle, ModuleSource, NativeSource};
pub use state::ModuleState;
