//! Test modules and module sources for Skein development.
//!
//! Every fixture in [`fixtures`] records what the coordinator did to it
//! in atomics or a mutex, so integration tests can assert call counts,
//! ordering, and per-ordinal outcomes after a run.

#![forbid(unsafe_code)]
#![allow(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]

pub mod fixtures;

pub use fixtures::{
    CallCounts, CountingSource, FailOnOrdinal, FailingFinalize, FailingInitialize, JitterModule,
    MissingEntrySource, OrdinalWriter, PanicOnOrdinal, PhaseRecorder, RecordedCall, Scale, SlotWriter,
    StateRoundTrip,
};
