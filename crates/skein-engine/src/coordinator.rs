//! The execution coordinator.
//!
//! One [`Coordinator::run`] call is one complete lifecycle:
//!
//! 1. Validate `thread_count` and load the module (no entry point runs if
//!    either fails).
//! 2. `initialize` on the calling thread. A fault ends the run here.
//! 3. Dispatch `main` to workers `0..N` and wait for all N replies. A
//!    worker fault is recorded against that ordinal only.
//! 4. `finalize` on the calling thread, regardless of worker faults.
//! 5. Unload the module.

use std::sync::Arc;
use std::time::Instant;

use smallvec::SmallVec;
use tracing::{debug, info, warn};

use skein_core::{AuxRegistry, BufferDescriptor, RunId, Slot, WorkerOrdinal};
use skein_module::{
    Bindings, FinalizeContext, InitContext, Lifecycle, LifecycleState, ModuleSource, ModuleState,
};

use crate::config::{ConfigError, CoordinatorConfig};
use crate::error::RunError;
use crate::pool::{guarded, MainTask, RunShared, WorkerPool};
use crate::report::{Phase, PhaseReport, RunReport, SequenceClock};

/// Drives module lifecycles against one host-owned buffer.
///
/// The coordinator borrows the [`BufferDescriptor`], so the buffer
/// outlives every run. Worker threads persist between runs and are
/// respawned only when `thread_count` changes.
///
/// # Examples
///
/// ```
/// use skein_core::BufferDescriptor;
/// use skein_engine::{Coordinator, CoordinatorConfig};
/// use skein_module::NativeSource;
/// # use skein_core::ModuleFault;
/// # use skein_module::{FinalizeContext, InitContext, Module, WorkerContext};
/// # struct Fill;
/// # impl Module for Fill {
/// #     fn name(&self) -> &str { "fill" }
/// #     fn initialize(&self, _: &mut InitContext<'_>) -> Result<(), ModuleFault> { Ok(()) }
/// #     fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
/// #         let v = ctx.ordinal().index() as f64;
/// #         ctx.slot()?.set(v)?;
/// #         Ok(())
/// #     }
/// #     fn finalize(&self, _: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> { Ok(()) }
/// # }
///
/// let buffer = BufferDescriptor::zeroed(4);
/// let mut coordinator = Coordinator::new(CoordinatorConfig::default(), &buffer).unwrap();
/// let report = coordinator.run(&NativeSource::new(Fill), 4).unwrap();
/// assert!(report.is_success());
/// assert_eq!(buffer.snapshot(), vec![0.0, 1.0, 2.0, 3.0]);
/// ```
pub struct Coordinator<'buf> {
    config: CoordinatorConfig,
    buffer: &'buf BufferDescriptor,
    aux: AuxRegistry,
    pool: Option<WorkerPool>,
}

impl<'buf> Coordinator<'buf> {
    /// Validate `config` and bind `buffer`.
    pub fn new(config: CoordinatorConfig, buffer: &'buf BufferDescriptor) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            config,
            buffer,
            aux: AuxRegistry::new(),
            pool: None,
        })
    }

    /// Expose auxiliary providers to every subsequent run.
    pub fn with_aux(mut self, aux: AuxRegistry) -> Self {
        self.aux = aux;
        self
    }

    /// The active configuration.
    pub fn config(&self) -> &CoordinatorConfig {
        &self.config
    }

    /// The auxiliary providers bound into each run.
    pub fn aux(&self) -> &AuxRegistry {
        &self.aux
    }

    /// Number of live worker threads (0 before the first run).
    pub fn pool_size(&self) -> usize {
        self.pool.as_ref().map_or(0, WorkerPool::size)
    }

    /// Join all worker threads. The next `run()` respawns them.
    pub fn shutdown(&mut self) -> usize {
        self.pool.take().map_or(0, |mut pool| pool.shutdown())
    }

    /// Load `source` and run its full lifecycle on `thread_count` workers.
    ///
    /// Returns `Ok` only if every phase succeeded. If any entry point
    /// faulted the complete report is carried in
    /// [`RunError::LifecyclePhase`].
    ///
    /// Must not be called while holding a lock that a module entry point
    /// might need (for script modules: the interpreter lock).
    pub fn run(
        &mut self,
        source: &dyn ModuleSource,
        thread_count: usize,
    ) -> Result<RunReport, RunError> {
        let max = self.config.max_threads;
        if thread_count == 0 || thread_count > max {
            return Err(RunError::InvalidThreadCount {
                requested: thread_count,
                max,
            });
        }

        let run_id = RunId::next();
        let started = Instant::now();
        let view = self.buffer.view().with_ownership(self.config.slot_ownership);
        let bindings = Bindings::new(view, self.aux.clone());

        let handle = source.load(&bindings).map_err(|e| {
            warn!(run = %run_id, module = source.name(), error = %e, "module load failed");
            RunError::from(e)
        })?;
        let module = Arc::clone(handle.module());
        let name = handle.name().to_string();

        let pool = ensure_pool(&mut self.pool, &self.config, thread_count)?;
        info!(run = %run_id, module = %name, thread_count, "run starting");

        let clock = Arc::new(SequenceClock::new());
        let mut lifecycle = Lifecycle::new();
        let mut state = ModuleState::new();

        // ── initialize ──────────────────────────────────────────────
        let initialize = PhaseReport::measure(Phase::Initialize, &clock, || {
            guarded(|| {
                let mut ctx = InitContext::new(&bindings, &mut state, run_id, thread_count);
                module.initialize(&mut ctx)
            })
        });
        if let Some(fault) = initialize.fault() {
            warn!(run = %run_id, module = %name, %fault, "initialize faulted, run aborted");
            let report = RunReport {
                run_id,
                module: name,
                thread_count,
                initialize,
                mains: SmallVec::new(),
                finalize: None,
                elapsed: started.elapsed(),
            };
            return Err(RunError::LifecyclePhase(Box::new(report)));
        }
        lifecycle.initialized()?;
        debug!(run = %run_id, "initialize done");

        // ── main × N ────────────────────────────────────────────────
        let shared = Arc::new(RunShared {
            bindings: bindings.clone(),
            state,
        });
        let mut slots = self.buffer.partition(thread_count).into_iter();
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(thread_count);
        let mut mains: Vec<Option<PhaseReport>> = (0..thread_count).map(|_| None).collect();

        // Any worker that cannot be dispatched to or never replies poisons
        // the pool; it is dropped and respawned by the next run.
        let mut lost = false;
        lifecycle.start(thread_count)?;
        for (i, entry) in mains.iter_mut().enumerate() {
            let slot: Option<Slot> = slots.next();
            let task = MainTask {
                run_id,
                thread_count,
                module: Arc::clone(&module),
                shared: Arc::clone(&shared),
                clock: Arc::clone(&clock),
                slot,
                reply: reply_tx.clone(),
            };
            if let Err(task) = pool.dispatch(i, task) {
                drop(task);
                warn!(run = %run_id, ordinal = i, "worker unavailable");
                *entry = Some(PhaseReport::lost(WorkerOrdinal(i), &clock));
                lifecycle.complete_one()?;
                lost = true;
            }
        }
        drop(reply_tx);

        // Join barrier: every dispatched worker replies exactly once.
        while matches!(lifecycle.state(), LifecycleState::Running { pending, .. } if pending > 0) {
            let Ok(reply) = reply_rx.recv() else {
                break;
            };
            if let Some(fault) = reply.report.fault() {
                warn!(run = %run_id, ordinal = %reply.ordinal, %fault, "main faulted");
            }
            if let Some(entry) = mains.get_mut(reply.ordinal.index()) {
                *entry = Some(reply.report);
            }
            lifecycle.complete_one()?;
        }
        for (i, entry) in mains.iter_mut().enumerate() {
            if entry.is_none() {
                warn!(run = %run_id, ordinal = i, "worker exited without replying");
                *entry = Some(PhaseReport::lost(WorkerOrdinal(i), &clock));
                lifecycle.complete_one()?;
                lost = true;
            }
        }
        if lost {
            self.pool = None;
        }
        let mains: SmallVec<[PhaseReport; 8]> = mains.into_iter().flatten().collect();
        debug!(run = %run_id, "all workers joined");

        // ── finalize ────────────────────────────────────────────────
        let mut state = match Arc::try_unwrap(shared) {
            Ok(shared) => shared.state,
            Err(_) => {
                warn!(run = %run_id, "module state still shared after join, finalize sees empty state");
                ModuleState::new()
            }
        };
        lifecycle.finalized()?;
        let finalize = PhaseReport::measure(Phase::Finalize, &clock, || {
            guarded(|| {
                let mut ctx = FinalizeContext::new(&bindings, &mut state, run_id, thread_count);
                module.finalize(&mut ctx)
            })
        });
        if let Some(fault) = finalize.fault() {
            warn!(run = %run_id, module = %name, %fault, "finalize faulted");
        }

        drop(module);
        drop(handle);

        let report = RunReport {
            run_id,
            module: name,
            thread_count,
            initialize,
            mains,
            finalize: Some(finalize),
            elapsed: started.elapsed(),
        };
        let faults = report.faults().count();
        info!(
            run = %run_id,
            module = %report.module,
            faults,
            elapsed_us = report.elapsed.as_micros() as u64,
            "run finished"
        );
        if report.is_success() {
            Ok(report)
        } else {
            Err(RunError::LifecyclePhase(Box::new(report)))
        }
    }
}

/// Reuse the pool if it has exactly `size` workers, otherwise replace it.
fn ensure_pool<'p>(
    slot: &'p mut Option<WorkerPool>,
    config: &CoordinatorConfig,
    size: usize,
) -> Result<&'p WorkerPool, RunError> {
    let pool = match slot.take() {
        Some(pool) if pool.size() == size => pool,
        _ => WorkerPool::spawn(size, &config.thread_name_prefix, config.worker_stack_size)
            .map_err(|e| RunError::WorkerSpawnFailed {
                reason: e.to_string(),
            })?,
    };
    Ok(slot.insert(pool))
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::ModuleFault;
    use skein_module::{Module, NativeSource, WorkerContext};

    struct Fill;

    impl Module for Fill {
        fn name(&self) -> &str {
            "fill"
        }
        fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
            Ok(())
        }
        fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
            let v = ctx.ordinal().index() as f64;
            ctx.slot()?.set(v)?;
            Ok(())
        }
        fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
            Ok(())
        }
    }

    #[test]
    fn invalid_config_rejected_at_construction() {
        let buf = BufferDescriptor::zeroed(1);
        let cfg = CoordinatorConfig {
            max_threads: 0,
            ..Default::default()
        };
        assert!(Coordinator::new(cfg, &buf).is_err());
    }

    #[test]
    fn pool_is_reused_for_same_count_and_respawned_otherwise() {
        let buf = BufferDescriptor::zeroed(4);
        let mut c = Coordinator::new(CoordinatorConfig::default(), &buf).unwrap();
        assert_eq!(c.pool_size(), 0);
        c.run(&NativeSource::new(Fill), 4).unwrap();
        assert_eq!(c.pool_size(), 4);
        c.run(&NativeSource::new(Fill), 4).unwrap();
        assert_eq!(c.pool_size(), 4);
        c.run(&NativeSource::new(Fill), 2).unwrap();
        assert_eq!(c.pool_size(), 2);
        assert_eq!(c.shutdown(), 2);
        assert_eq!(c.pool_size(), 0);
    }

    #[test]
    fn more_workers_than_cells_reports_missing_slot() {
        let buf = BufferDescriptor::zeroed(2);
        let mut c = Coordinator::new(CoordinatorConfig::default(), &buf).unwrap();
        let err = c.run(&NativeSource::new(Fill), 3).unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.failed_ordinals(), vec![WorkerOrdinal(2)]);
        assert!(report.finalize.as_ref().unwrap().is_ok());
        assert_eq!(buf.snapshot(), vec![0.0, 1.0]);
    }

    #[test]
    fn undispatchable_worker_resets_the_pool() {
        let buf = BufferDescriptor::zeroed(2);
        let mut c = Coordinator::new(CoordinatorConfig::default(), &buf).unwrap();
        c.run(&NativeSource::new(Fill), 2).unwrap();
        c.pool.as_mut().unwrap().sever(1);

        let err = c.run(&NativeSource::new(Fill), 2).unwrap_err();
        let report = err.report().unwrap();
        assert_eq!(report.failed_ordinals(), vec![WorkerOrdinal(1)]);
        assert_eq!(report.main(1).unwrap().fault(), Some(&ModuleFault::WorkerLost));
        assert_eq!(c.pool_size(), 0);

        buf.set(1, -1.0).unwrap();
        c.run(&NativeSource::new(Fill), 2).unwrap();
        assert_eq!(c.pool_size(), 2);
        assert_eq!(buf.snapshot(), vec![0.0, 1.0]);
    }
}
