//! Core types for the Skein scripting bridge.
//!
//! This is the leaf crate with zero internal dependencies. It defines the
//! host-owned shared buffer and its views, the worker thread identity
//! provider, auxiliary value providers, IDs, and the error taxonomy used
//! throughout the workspace.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod buffer;
pub mod error;
pub mod id;
pub mod identity;
pub mod provider;

pub use buffer::{
    BufferDescriptor, BufferView, Layout, LayoutInfo, Order, Shape, Slot, SlotOwnership,
};
pub use error::{AuxError, BufferError, EntryPoint, IdentityError, LoadError, ModuleFault};
pub use id::{RunId, WorkerOrdinal};
pub use identity::OrdinalGuard;
pub use provider::{AuxAccessor, AuxNamespace, AuxRegistry, AuxValue};
