//! Fixed pool of native worker threads executing `main`.
//!
//! Worker `i` owns a dedicated task channel and always runs ordinal `i`,
//! so a worker's thread name and its ordinal agree for the lifetime of
//! the pool. Each task carries its own bounded reply channel; the
//! coordinator's receive loop over that channel is the join barrier.
//!
//! Workers drop every shared handle of a task *before* replying, so once
//! the coordinator holds all replies it is the sole owner of the run's
//! shared state again.

use std::any::Any;
use std::io;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

use crossbeam_channel::{Receiver, SendError, Sender};
use tracing::{debug, trace};

use skein_core::{identity, ModuleFault, RunId, Slot, WorkerOrdinal};
use skein_module::{Bindings, Module, ModuleState, WorkerContext};

use crate::report::{Phase, PhaseReport, SequenceClock};

/// State shared read-only by every worker of one run.
pub(crate) struct RunShared {
    pub bindings: Bindings,
    pub state: ModuleState,
}

/// One `main` invocation dispatched to a worker.
pub(crate) struct MainTask {
    pub run_id: RunId,
    pub thread_count: usize,
    pub module: Arc<dyn Module>,
    pub shared: Arc<RunShared>,
    pub clock: Arc<SequenceClock>,
    pub slot: Option<Slot>,
    pub reply: Sender<WorkerReply>,
}

/// A worker's answer to one [`MainTask`].
#[derive(Debug)]
pub(crate) struct WorkerReply {
    pub ordinal: WorkerOrdinal,
    pub report: PhaseReport,
}

/// Call an entry point, converting a panic into [`ModuleFault::Panicked`].
pub(crate) fn guarded(f: impl FnOnce() -> Result<(), ModuleFault>) -> Result<(), ModuleFault> {
    panic::catch_unwind(AssertUnwindSafe(f)).unwrap_or_else(|payload| {
        Err(ModuleFault::Panicked {
            message: panic_message(payload.as_ref()),
        })
    })
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}

/// Main loop for worker `ordinal`. Runs until its task channel closes.
fn worker_loop(ordinal: WorkerOrdinal, task_rx: Receiver<MainTask>) {
    while let Ok(task) = task_rx.recv() {
        let MainTask {
            run_id,
            thread_count,
            module,
            shared,
            clock,
            mut slot,
            reply,
        } = task;

        let report = {
            let _guard = identity::register(run_id, ordinal);
            PhaseReport::measure(Phase::Main(ordinal), &clock, || {
                guarded(|| {
                    let mut ctx = WorkerContext::new(
                        &shared.bindings,
                        &shared.state,
                        slot.as_mut(),
                        ordinal,
                        run_id,
                        thread_count,
                    );
                    module.main(&mut ctx)
                })
            })
        };
        trace!(run = %run_id, %ordinal, ok = report.is_ok(), "main returned");

        drop(slot);
        drop(shared);
        drop(module);
        drop(clock);
        // Coordinator gone means the run was abandoned; nothing to report to.
        let _ = reply.send(WorkerReply { ordinal, report });
    }
}

/// Worker threads with one task channel each.
pub(crate) struct WorkerPool {
    senders: Vec<Sender<MainTask>>,
    handles: Vec<JoinHandle<()>>,
}

impl WorkerPool {
    /// Spawn `size` workers named `{prefix}-{i}`.
    ///
    /// On failure the workers spawned so far are shut down and joined.
    pub fn spawn(size: usize, prefix: &str, stack_size: Option<usize>) -> io::Result<Self> {
        let mut pool = Self {
            senders: Vec::with_capacity(size),
            handles: Vec::with_capacity(size),
        };
        for i in 0..size {
            let (tx, rx) = crossbeam_channel::bounded(1);
            let mut builder = thread::Builder::new().name(format!("{prefix}-{i}"));
            if let Some(bytes) = stack_size {
                builder = builder.stack_size(bytes);
            }
            let handle = builder.spawn(move || worker_loop(WorkerOrdinal(i), rx))?;
            pool.senders.push(tx);
            pool.handles.push(handle);
        }
        debug!(size, prefix, "worker pool spawned");
        Ok(pool)
    }

    /// Number of workers.
    pub fn size(&self) -> usize {
        self.senders.len()
    }

    /// Hand `task` to worker `ordinal`. Returns the task if that worker is
    /// gone.
    pub fn dispatch(&self, ordinal: usize, task: MainTask) -> Result<(), MainTask> {
        match self.senders.get(ordinal) {
            Some(tx) => tx.send(task).map_err(|SendError(task)| task),
            None => Err(task),
        }
    }

    /// Replace worker `ordinal`'s task channel with a closed one, so
    /// dispatching to it fails and the worker itself exits.
    #[cfg(test)]
    pub(crate) fn sever(&mut self, ordinal: usize) {
        let (tx, _) = crossbeam_channel::bounded(1);
        if let Some(sender) = self.senders.get_mut(ordinal) {
            *sender = tx;
        }
    }

    /// Close every task channel and join the workers. Returns the number
    /// joined cleanly.
    pub fn shutdown(&mut self) -> usize {
        self.senders.clear();
        let mut joined = 0;
        for handle in self.handles.drain(..) {
            if handle.join().is_ok() {
                joined += 1;
            }
        }
        if joined > 0 {
            debug!(joined, "worker pool shut down");
        }
        joined
    }
}

impl Drop for WorkerPool {
    fn drop(&mut self) {
        self.shutdown();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{AuxRegistry, BufferDescriptor, SlotOwnership};
    use skein_module::{FinalizeContext, InitContext};

    struct WriteOrdinal;

    impl Module for WriteOrdinal {
        fn name(&self) -> &str {
            "write_ordinal"
        }
        fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
            Ok(())
        }
        fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
            let o = identity::ordinal()?;
            assert_eq!(o, ctx.ordinal());
            ctx.write(o.index(), o.index() as f64 + 10.0)?;
            Ok(())
        }
        fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
            Ok(())
        }
    }

    #[test]
    fn guarded_converts_panic_payloads() {
        let r = guarded(|| panic!("boom {}", 7));
        assert_eq!(
            r,
            Err(ModuleFault::Panicked {
                message: "boom 7".into()
            })
        );
        let r = guarded(|| std::panic::panic_any(42u32));
        assert!(matches!(r, Err(ModuleFault::Panicked { .. })));
    }

    #[test]
    fn worker_runs_its_own_ordinal_and_releases_shared_state() {
        let buf = BufferDescriptor::zeroed(2);
        let bindings = Bindings::new(
            buf.view().with_ownership(SlotOwnership::Enforced),
            AuxRegistry::new(),
        );
        let shared = Arc::new(RunShared {
            bindings,
            state: ModuleState::new(),
        });
        let clock = Arc::new(SequenceClock::new());
        let module: Arc<dyn Module> = Arc::new(WriteOrdinal);
        let mut pool = WorkerPool::spawn(2, "pool-test", None).unwrap();

        let (reply_tx, reply_rx) = crossbeam_channel::bounded(2);
        let run_id = RunId::next();
        for (i, slot) in buf.partition(2).into_iter().enumerate() {
            let task = MainTask {
                run_id,
                thread_count: 2,
                module: Arc::clone(&module),
                shared: Arc::clone(&shared),
                clock: Arc::clone(&clock),
                slot: Some(slot),
                reply: reply_tx.clone(),
            };
            assert!(pool.dispatch(i, task).is_ok());
        }
        drop(reply_tx);

        let mut replies: Vec<_> = reply_rx.iter().collect();
        replies.sort_by_key(|r| r.ordinal);
        assert_eq!(replies.len(), 2);
        assert!(replies.iter().all(|r| r.report.is_ok()));
        assert_eq!(buf.snapshot(), vec![10.0, 11.0]);
        assert!(Arc::try_unwrap(shared).is_ok());
        assert_eq!(pool.shutdown(), 2);
    }

    #[test]
    fn dispatch_past_pool_size_returns_task() {
        let buf = BufferDescriptor::zeroed(1);
        let pool = WorkerPool::spawn(1, "pool-test", None).unwrap();
        let (reply_tx, _reply_rx) = crossbeam_channel::bounded(1);
        let task = MainTask {
            run_id: RunId::next(),
            thread_count: 1,
            module: Arc::new(WriteOrdinal),
            shared: Arc::new(RunShared {
                bindings: Bindings::new(buf.view(), AuxRegistry::new()),
                state: ModuleState::new(),
            }),
            clock: Arc::new(SequenceClock::new()),
            slot: None,
            reply: reply_tx,
        };
        assert!(pool.dispatch(5, task).is_err());
    }
}
