//! Execution coordinator for the Skein scripting bridge.
//!
//! [`Coordinator::run`] loads a module, binds the host buffer and thread
//! identity provider into it, and drives `initialize` → `main` × N →
//! `finalize` across a fixed pool of native worker threads, returning a
//! per-phase, per-worker [`RunReport`].

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![forbid(unsafe_code)]

pub mod config;
pub mod coordinator;
pub mod error;
pub(crate) mod pool;
pub mod report;

pub use config::{ConfigError, CoordinatorConfig};
pub use coordinator::Coordinator;
pub use error::RunError;
pub use report::{Phase, PhaseReport, RunReport};
