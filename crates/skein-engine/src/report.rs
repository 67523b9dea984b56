//! Per-phase and per-run outcome reports.
//!
//! Every phase invocation is bracketed by two stamps from a run-local
//! sequence clock, taken by the coordinator or worker *around* the call.
//! The barrier property of a run is therefore checkable from the report
//! alone:
//!
//! ```text
//! initialize.seq_end < min(main.seq_start)
//! max(main.seq_end)  < finalize.seq_start
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use smallvec::SmallVec;

use skein_core::{ModuleFault, RunId, WorkerOrdinal};

/// Which lifecycle call a report describes.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Phase {
    /// The single `initialize` call.
    Initialize,
    /// One worker's `main` call.
    Main(WorkerOrdinal),
    /// The single `finalize` call.
    Finalize,
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Initialize => write!(f, "initialize"),
            Self::Main(o) => write!(f, "main[{o}]"),
            Self::Finalize => write!(f, "finalize"),
        }
    }
}

/// Monotonic counter shared by the coordinator and workers of one run.
#[derive(Debug, Default)]
pub(crate) struct SequenceClock {
    next: AtomicU64,
}

impl SequenceClock {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tick(&self) -> u64 {
        self.next.fetch_add(1, Ordering::AcqRel)
    }
}

/// Outcome of one phase invocation.
#[derive(Clone, Debug)]
pub struct PhaseReport {
    /// Which call this was.
    pub phase: Phase,
    /// Success, or the fault raised.
    pub outcome: Result<(), ModuleFault>,
    /// Sequence stamp taken just before the call.
    pub seq_start: u64,
    /// Sequence stamp taken just after the call.
    pub seq_end: u64,
    /// Wall-clock start.
    pub started: Instant,
    /// Wall-clock duration.
    pub elapsed: Duration,
}

impl PhaseReport {
    /// Run `f` bracketed by clock stamps and timing.
    pub(crate) fn measure(
        phase: Phase,
        clock: &SequenceClock,
        f: impl FnOnce() -> Result<(), ModuleFault>,
    ) -> Self {
        let seq_start = clock.tick();
        let started = Instant::now();
        let outcome = f();
        let elapsed = started.elapsed();
        let seq_end = clock.tick();
        Self {
            phase,
            outcome,
            seq_start,
            seq_end,
            started,
            elapsed,
        }
    }

    /// A report for a worker that never replied.
    pub(crate) fn lost(ordinal: WorkerOrdinal, clock: &SequenceClock) -> Self {
        let seq = clock.tick();
        Self {
            phase: Phase::Main(ordinal),
            outcome: Err(ModuleFault::WorkerLost),
            seq_start: seq,
            seq_end: seq,
            started: Instant::now(),
            elapsed: Duration::ZERO,
        }
    }

    /// Whether the phase succeeded.
    pub fn is_ok(&self) -> bool {
        self.outcome.is_ok()
    }

    /// The fault, if the phase failed.
    pub fn fault(&self) -> Option<&ModuleFault> {
        self.outcome.as_ref().err()
    }
}

/// Complete accounting of one coordinated run.
#[derive(Clone, Debug)]
pub struct RunReport {
    /// Run identifier.
    pub run_id: RunId,
    /// Module name.
    pub module: String,
    /// Number of workers requested.
    pub thread_count: usize,
    /// The `initialize` call.
    pub initialize: PhaseReport,
    /// One report per worker, ordered by ordinal. Empty if `initialize`
    /// failed.
    pub mains: SmallVec<[PhaseReport; 8]>,
    /// The `finalize` call. `None` if `initialize` failed.
    pub finalize: Option<PhaseReport>,
    /// Total wall-clock time of the lifecycle.
    pub elapsed: Duration,
}

impl RunReport {
    /// All phase reports in lifecycle order.
    pub fn phases(&self) -> impl Iterator<Item = &PhaseReport> {
        std::iter::once(&self.initialize)
            .chain(self.mains.iter())
            .chain(self.finalize.iter())
    }

    /// Whether every phase succeeded.
    pub fn is_success(&self) -> bool {
        self.finalize.is_some() && self.phases().all(PhaseReport::is_ok)
    }

    /// Every fault with the phase that raised it.
    pub fn faults(&self) -> impl Iterator<Item = (Phase, &ModuleFault)> {
        self.phases().filter_map(|p| p.fault().map(|f| (p.phase, f)))
    }

    /// The report for worker `ordinal`.
    pub fn main(&self, ordinal: usize) -> Option<&PhaseReport> {
        self.mains
            .iter()
            .find(|p| p.phase == Phase::Main(WorkerOrdinal(ordinal)))
    }

    /// Ordinals whose `main` faulted, ascending.
    pub fn failed_ordinals(&self) -> Vec<WorkerOrdinal> {
        self.mains
            .iter()
            .filter_map(|p| match (p.phase, p.is_ok()) {
                (Phase::Main(o), false) => Some(o),
                _ => None,
            })
            .collect()
    }

    /// Whether the stamps satisfy the initialize → main → finalize
    /// happens-before ordering.
    pub fn barriers_hold(&self) -> bool {
        let init_ok = self
            .mains
            .iter()
            .all(|m| self.initialize.seq_end < m.seq_start);
        let fin_ok = match &self.finalize {
            Some(fin) => self.mains.iter().all(|m| m.seq_end < fin.seq_start),
            None => true,
        };
        init_ok && fin_ok
    }
}

impl fmt::Display for RunReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let failed = self.faults().count();
        write!(
            f,
            "{} of module '{}' on {} workers: {} phase(s) faulted",
            self.run_id, self.module, self.thread_count, failed
        )?;
        for (phase, fault) in self.faults() {
            write!(f, "\n  {phase}: {fault}")?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ok(phase: Phase, clock: &SequenceClock) -> PhaseReport {
        PhaseReport::measure(phase, clock, || Ok(()))
    }

    #[test]
    fn measure_brackets_call_with_stamps() {
        let clock = SequenceClock::new();
        let r = PhaseReport::measure(Phase::Initialize, &clock, || {
            assert_eq!(clock.tick(), 1);
            Ok(())
        });
        assert_eq!((r.seq_start, r.seq_end), (0, 2));
    }

    #[test]
    fn report_accounts_faults_per_ordinal() {
        let clock = SequenceClock::new();
        let init = ok(Phase::Initialize, &clock);
        let mut mains = SmallVec::new();
        for i in 0..4 {
            let phase = Phase::Main(WorkerOrdinal(i));
            mains.push(if i == 2 {
                PhaseReport::measure(phase, &clock, || Err(ModuleFault::failed("boom")))
            } else {
                ok(phase, &clock)
            });
        }
        let fin = ok(Phase::Finalize, &clock);
        let report = RunReport {
            run_id: RunId(1),
            module: "m".into(),
            thread_count: 4,
            initialize: init,
            mains,
            finalize: Some(fin),
            elapsed: Duration::ZERO,
        };
        assert!(!report.is_success());
        assert!(report.barriers_hold());
        assert_eq!(report.failed_ordinals(), vec![WorkerOrdinal(2)]);
        assert!(report.main(1).unwrap().is_ok());
        let text = report.to_string();
        assert!(text.contains("main[2]: failed: boom"), "{text}");
    }

    #[test]
    fn lost_worker_is_a_fault() {
        let clock = SequenceClock::new();
        let r = PhaseReport::lost(WorkerOrdinal(3), &clock);
        assert_eq!(r.fault(), Some(&ModuleFault::WorkerLost));
    }
}
