//! Per-phase execution contexts.
//!
//! Each lifecycle phase gets its own context type, so what a phase may do
//! is visible in its signature:
//!
//! | Context | Buffer | Own slot | Ordinal | Aux | State |
//! |---------|--------|----------|---------|-----|-------|
//! | [`InitContext`] | yes | no | no | yes | set |
//! | [`WorkerContext`] | yes | yes | yes | yes | read |
//! | [`FinalizeContext`] | yes | no | no | yes | read / take |

use std::any::Any;

use skein_core::{AuxRegistry, BufferError, BufferView, RunId, Slot, WorkerOrdinal};

use crate::bindings::Bindings;
use crate::state::ModuleState;

/// Context passed to [`Module::initialize`](crate::Module::initialize).
///
/// Runs on the coordinator thread before any worker starts. There is no
/// ordinal accessor: no worker context exists yet.
pub struct InitContext<'a> {
    bindings: &'a Bindings,
    state: &'a mut ModuleState,
    run_id: RunId,
    thread_count: usize,
}

impl<'a> InitContext<'a> {
    /// Construct an init context. Typically called by the coordinator.
    pub fn new(
        bindings: &'a Bindings,
        state: &'a mut ModuleState,
        run_id: RunId,
        thread_count: usize,
    ) -> Self {
        Self {
            bindings,
            state,
            run_id,
            thread_count,
        }
    }

    /// The shared buffer.
    pub fn buffer(&self) -> &BufferView {
        self.bindings.buffer()
    }

    /// Auxiliary read-only providers.
    pub fn aux(&self) -> &AuxRegistry {
        self.bindings.aux()
    }

    /// Store module state for the later phases.
    pub fn set_state<T: Any + Send + Sync>(&mut self, value: T) {
        self.state.set(value);
    }

    /// Mutable access to the module state slot.
    pub fn state_mut(&mut self) -> &mut ModuleState {
        self.state
    }

    /// Current run.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Number of workers that will run `main`.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }
}

/// Context passed to [`Module::main`](crate::Module::main) on a worker thread.
pub struct WorkerContext<'a> {
    bindings: &'a Bindings,
    state: &'a ModuleState,
    slot: Option<&'a mut Slot>,
    ordinal: WorkerOrdinal,
    run_id: RunId,
    thread_count: usize,
}

impl<'a> WorkerContext<'a> {
    /// Construct a worker context. Typically called by the worker pool.
    ///
    /// `slot` is `None` when the buffer is shorter than the worker count
    /// and this ordinal has no cell of its own.
    pub fn new(
        bindings: &'a Bindings,
        state: &'a ModuleState,
        slot: Option<&'a mut Slot>,
        ordinal: WorkerOrdinal,
        run_id: RunId,
        thread_count: usize,
    ) -> Self {
        Self {
            bindings,
            state,
            slot,
            ordinal,
            run_id,
            thread_count,
        }
    }

    /// This worker's ordinal in `[0, thread_count)`.
    pub fn ordinal(&self) -> WorkerOrdinal {
        self.ordinal
    }

    /// The shared buffer.
    pub fn buffer(&self) -> &BufferView {
        self.bindings.buffer()
    }

    /// Shorthand for `self.buffer().write(index, value)`.
    pub fn write(&self, index: usize, value: f64) -> Result<(), BufferError> {
        self.bindings.buffer().write(index, value)
    }

    /// This worker's own cell.
    ///
    /// Fails with [`BufferError::OutOfRange`] if the buffer has no cell at
    /// this worker's ordinal.
    pub fn slot(&mut self) -> Result<&mut Slot, BufferError> {
        let index = self.ordinal.index();
        let length = self.bindings.buffer().len();
        self.slot
            .as_deref_mut()
            .ok_or(BufferError::OutOfRange { index, length })
    }

    /// Auxiliary read-only providers.
    pub fn aux(&self) -> &AuxRegistry {
        self.bindings.aux()
    }

    /// Module state set during `initialize`, if it has type `T`.
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state.get::<T>()
    }

    /// Current run.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Number of workers in this run.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }
}

/// Context passed to [`Module::finalize`](crate::Module::finalize).
///
/// Runs on the coordinator thread after every worker finished.
pub struct FinalizeContext<'a> {
    bindings: &'a Bindings,
    state: &'a mut ModuleState,
    run_id: RunId,
    thread_count: usize,
}

impl<'a> FinalizeContext<'a> {
    /// Construct a finalize context. Typically called by the coordinator.
    pub fn new(
        bindings: &'a Bindings,
        state: &'a mut ModuleState,
        run_id: RunId,
        thread_count: usize,
    ) -> Self {
        Self {
            bindings,
            state,
            run_id,
            thread_count,
        }
    }

    /// The shared buffer.
    pub fn buffer(&self) -> &BufferView {
        self.bindings.buffer()
    }

    /// Auxiliary read-only providers.
    pub fn aux(&self) -> &AuxRegistry {
        self.bindings.aux()
    }

    /// Module state, if it has type `T`.
    pub fn state<T: Any>(&self) -> Option<&T> {
        self.state.get::<T>()
    }

    /// Take the module state by value.
    pub fn take_state<T: Any>(&mut self) -> Option<T> {
        self.state.take::<T>()
    }

    /// Current run.
    pub fn run_id(&self) -> RunId {
        self.run_id
    }

    /// Number of workers that ran `main`.
    pub fn thread_count(&self) -> usize {
        self.thread_count
    }
}
