//! Reusable module fixtures.
//!
//! - [`OrdinalWriter`]: `buffer[ordinal()] = ordinal` through the identity provider.
//! - [`SlotWriter`]: writes `ordinal * scale` through the typed slot.
//! - [`PhaseRecorder`]: records the order of every lifecycle call.
//! - [`FailOnOrdinal`] / [`PanicOnOrdinal`]: one worker faults, the rest write.
//! - [`FailingInitialize`] / [`FailingFinalize`]: fault in a single-shot phase.
//! - [`JitterModule`]: seeded random sleeps in `main` to shake out ordering bugs.
//! - [`StateRoundTrip`]: state set in `initialize`, read in `main`, taken in `finalize`.
//! - [`MissingEntrySource`] / [`CountingSource`]: module sources.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use skein_core::{identity, EntryPoint, IdentityError, LoadError, ModuleFault, WorkerOrdinal};
use skein_module::{
    Bindings, FinalizeContext, InitContext, Module, ModuleHandle, ModuleSource, NativeSource,
    WorkerContext,
};

/// Per-phase invocation counters.
#[derive(Debug, Default)]
pub struct CallCounts {
    pub initialize: AtomicUsize,
    pub main: AtomicUsize,
    pub finalize: AtomicUsize,
}

impl CallCounts {
    /// `(initialize, main, finalize)` call counts.
    pub fn get(&self) -> (usize, usize, usize) {
        (
            self.initialize.load(Ordering::SeqCst),
            self.main.load(Ordering::SeqCst),
            self.finalize.load(Ordering::SeqCst),
        )
    }

    fn init(&self) {
        self.initialize.fetch_add(1, Ordering::SeqCst);
    }

    fn main(&self) {
        self.main.fetch_add(1, Ordering::SeqCst);
    }

    fn fin(&self) {
        self.finalize.fetch_add(1, Ordering::SeqCst);
    }
}

// ── OrdinalWriter ──────────────────────────────────────────────────

/// Each worker asks the identity provider for its ordinal and writes it
/// to that index.
#[derive(Debug, Default)]
pub struct OrdinalWriter {
    pub counts: CallCounts,
}

impl Module for OrdinalWriter {
    fn name(&self) -> &str {
        "ordinal_writer"
    }

    fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        self.counts.init();
        Ok(())
    }

    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        self.counts.main();
        let i = identity::ordinal()?.index();
        ctx.write(i, i as f64)?;
        Ok(())
    }

    fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        self.counts.fin();
        Ok(())
    }
}

// ── SlotWriter ─────────────────────────────────────────────────────

/// Writes `ordinal * scale` through the worker's typed slot.
#[derive(Debug)]
pub struct SlotWriter {
    pub scale: f64,
}

impl SlotWriter {
    pub fn new(scale: f64) -> Self {
        Self { scale }
    }
}

impl Module for SlotWriter {
    fn name(&self) -> &str {
        "slot_writer"
    }

    fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        Ok(())
    }

    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        let value = ctx.ordinal().index() as f64 * self.scale;
        ctx.slot()?.set(value)?;
        Ok(())
    }

    fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        Ok(())
    }
}

// ── PhaseRecorder ──────────────────────────────────────────────────

/// One lifecycle call as seen by [`PhaseRecorder`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum RecordedCall {
    Initialize,
    Main(usize),
    Finalize,
}

/// Records every call in arrival order, plus what the identity provider
/// answered during `initialize` and `finalize`.
#[derive(Debug, Default)]
pub struct PhaseRecorder {
    pub calls: Mutex<Vec<RecordedCall>>,
    pub init_identity: Mutex<Option<Result<WorkerOrdinal, IdentityError>>>,
    pub finalize_identity: Mutex<Option<Result<WorkerOrdinal, IdentityError>>>,
}

impl PhaseRecorder {
    pub fn calls(&self) -> Vec<RecordedCall> {
        self.calls.lock().unwrap().clone()
    }

    fn push(&self, call: RecordedCall) {
        self.calls.lock().unwrap().push(call);
    }
}

impl Module for PhaseRecorder {
    fn name(&self) -> &str {
        "phase_recorder"
    }

    fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        *self.init_identity.lock().unwrap() = Some(identity::ordinal());
        self.push(RecordedCall::Initialize);
        Ok(())
    }

    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        self.push(RecordedCall::Main(ctx.ordinal().index()));
        Ok(())
    }

    fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        *self.finalize_identity.lock().unwrap() = Some(identity::ordinal());
        self.push(RecordedCall::Finalize);
        Ok(())
    }
}

// ── Faulting modules ───────────────────────────────────────────────

/// Worker `target` returns an error; every other worker writes its ordinal.
#[derive(Debug)]
pub struct FailOnOrdinal {
    pub target: usize,
    pub counts: CallCounts,
}

impl FailOnOrdinal {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            counts: CallCounts::default(),
        }
    }
}

impl Module for FailOnOrdinal {
    fn name(&self) -> &str {
        "fail_on_ordinal"
    }

    fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        self.counts.init();
        Ok(())
    }

    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        self.counts.main();
        let i = ctx.ordinal().index();
        if i == self.target {
            return Err(ModuleFault::failed(format!("ordinal {i} refused")));
        }
        ctx.slot()?.set(i as f64)?;
        Ok(())
    }

    fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        self.counts.fin();
        Ok(())
    }
}

/// Worker `target` panics; every other worker writes its ordinal.
#[derive(Debug)]
pub struct PanicOnOrdinal {
    pub target: usize,
    pub counts: CallCounts,
}

impl PanicOnOrdinal {
    pub fn new(target: usize) -> Self {
        Self {
            target,
            counts: CallCounts::default(),
        }
    }
}

impl Module for PanicOnOrdinal {
    fn name(&self) -> &str {
        "panic_on_ordinal"
    }

    fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        self.counts.init();
        Ok(())
    }

    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        self.counts.main();
        let i = ctx.ordinal().index();
        if i == self.target {
            panic!("worker {i} gave up");
        }
        ctx.slot()?.set(i as f64)?;
        Ok(())
    }

    fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        self.counts.fin();
        Ok(())
    }
}

/// `initialize` always fails.
#[derive(Debug, Default)]
pub struct FailingInitialize {
    pub counts: CallCounts,
}

impl Module for FailingInitialize {
    fn name(&self) -> &str {
        "failing_initialize"
    }

    fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        self.counts.init();
        Err(ModuleFault::failed("missing configuration"))
    }

    fn main(&self, _ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        self.counts.main();
        Ok(())
    }

    fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        self.counts.fin();
        Ok(())
    }
}

/// `finalize` always fails after successful workers.
#[derive(Debug, Default)]
pub struct FailingFinalize {
    pub counts: CallCounts,
}

impl Module for FailingFinalize {
    fn name(&self) -> &str {
        "failing_finalize"
    }

    fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        self.counts.init();
        Ok(())
    }

    fn main(&self, _ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        self.counts.main();
        Ok(())
    }

    fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        self.counts.fin();
        Err(ModuleFault::failed("flush failed"))
    }
}

// ── JitterModule ───────────────────────────────────────────────────

/// Sleeps a seeded random time in `main`, then writes its ordinal.
///
/// `finalize` records how many workers had finished when it started, so
/// a test can assert the join barrier held under scheduling noise.
#[derive(Debug)]
pub struct JitterModule {
    pub seed: u64,
    pub max_micros: u64,
    pub finished: AtomicUsize,
    pub finished_at_finalize: AtomicUsize,
}

impl JitterModule {
    pub fn new(seed: u64, max_micros: u64) -> Self {
        Self {
            seed,
            max_micros,
            finished: AtomicUsize::new(0),
            finished_at_finalize: AtomicUsize::new(usize::MAX),
        }
    }
}

impl Module for JitterModule {
    fn name(&self) -> &str {
        "jitter"
    }

    fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        self.finished.store(0, Ordering::SeqCst);
        Ok(())
    }

    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        let i = ctx.ordinal().index();
        let mut rng = ChaCha8Rng::seed_from_u64(self.seed ^ (i as u64).rotate_left(17));
        thread::sleep(Duration::from_micros(rng.random_range(0..=self.max_micros)));
        ctx.slot()?.set(i as f64)?;
        self.finished.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        self.finished_at_finalize
            .store(self.finished.load(Ordering::SeqCst), Ordering::SeqCst);
        Ok(())
    }
}

// ── StateRoundTrip ─────────────────────────────────────────────────

/// Per-run state set by [`StateRoundTrip`]'s `initialize`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Scale(pub f64);

/// Passes a [`Scale`] from `initialize` through `main` to `finalize`.
#[derive(Debug)]
pub struct StateRoundTrip {
    pub scale: f64,
    pub taken: Mutex<Option<Scale>>,
}

impl StateRoundTrip {
    pub fn new(scale: f64) -> Self {
        Self {
            scale,
            taken: Mutex::new(None),
        }
    }
}

impl Module for StateRoundTrip {
    fn name(&self) -> &str {
        "state_round_trip"
    }

    fn initialize(&self, ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        ctx.set_state(Scale(self.scale));
        Ok(())
    }

    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        let Scale(s) = *ctx
            .state::<Scale>()
            .ok_or_else(|| ModuleFault::failed("state not set"))?;
        let v = ctx.ordinal().index() as f64 * s;
        ctx.slot()?.set(v)?;
        Ok(())
    }

    fn finalize(&self, ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        *self.taken.lock().unwrap() = ctx.take_state::<Scale>();
        Ok(())
    }
}

// ── Sources ────────────────────────────────────────────────────────

/// A source whose module lacks one entry point.
#[derive(Debug)]
pub struct MissingEntrySource {
    pub module: String,
    pub missing: EntryPoint,
    pub loads: AtomicUsize,
}

impl MissingEntrySource {
    pub fn new(module: impl Into<String>, missing: EntryPoint) -> Self {
        Self {
            module: module.into(),
            missing,
            loads: AtomicUsize::new(0),
        }
    }
}

impl ModuleSource for MissingEntrySource {
    fn name(&self) -> &str {
        &self.module
    }

    fn load(&self, _bindings: &Bindings) -> Result<ModuleHandle, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        Err(LoadError::EntryPointMissing {
            module: self.module.clone(),
            entry_point: self.missing,
        })
    }
}

/// Wraps a native module and counts loads.
pub struct CountingSource {
    inner: NativeSource,
    pub loads: AtomicUsize,
}

impl CountingSource {
    pub fn new(module: Arc<dyn Module>) -> Self {
        Self {
            inner: NativeSource::from_arc(module),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn loads(&self) -> usize {
        self.loads.load(Ordering::SeqCst)
    }
}

impl ModuleSource for CountingSource {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn load(&self, bindings: &Bindings) -> Result<ModuleHandle, LoadError> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load(bindings)
    }
}
