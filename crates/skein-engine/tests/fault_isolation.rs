//! Integration test: faults stay with the phase that raised them.
//!
//! A failing or panicking worker must not prevent the other workers from
//! finishing or `finalize` from running. Load and `initialize` failures
//! stop the run before any later entry point is called.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use skein_core::{
    AuxNamespace, AuxRegistry, BufferDescriptor, BufferError, EntryPoint, ModuleFault,
    SlotOwnership, WorkerOrdinal,
};
use skein_engine::{Coordinator, CoordinatorConfig, Phase, RunError};
use skein_module::{FinalizeContext, InitContext, Module, NativeSource, WorkerContext};
use skein_test_utils::{
    FailOnOrdinal, FailingFinalize, FailingInitialize, MissingEntrySource, PanicOnOrdinal,
    SlotWriter,
};

fn coordinator(buffer: &BufferDescriptor) -> Coordinator<'_> {
    Coordinator::new(CoordinatorConfig::default(), buffer).unwrap()
}

#[test]
fn failing_worker_is_isolated_and_finalize_still_runs() {
    let buffer = BufferDescriptor::zeroed(4);
    let module = Arc::new(FailOnOrdinal::new(2));
    let err = coordinator(&buffer)
        .run(&NativeSource::from_arc(module.clone()), 4)
        .unwrap_err();

    let report = err.report().expect("lifecycle report");
    assert_eq!(report.failed_ordinals(), vec![WorkerOrdinal(2)]);
    for i in [0, 1, 3] {
        assert!(report.main(i).unwrap().is_ok(), "ordinal {i}");
    }
    assert!(matches!(
        report.main(2).unwrap().fault(),
        Some(ModuleFault::Failed { reason }) if reason.contains("ordinal 2")
    ));
    assert!(report.finalize.as_ref().unwrap().is_ok());
    assert_eq!(module.counts.get(), (1, 4, 1));
    assert_eq!(buffer.snapshot(), vec![0.0, 1.0, 0.0, 3.0]);
}

#[test]
fn panicking_worker_is_reported_not_propagated() {
    let buffer = BufferDescriptor::zeroed(3);
    let module = Arc::new(PanicOnOrdinal::new(0));
    let mut c = coordinator(&buffer);
    let err = c.run(&NativeSource::from_arc(module.clone()), 3).unwrap_err();

    let report = err.report().unwrap();
    assert!(matches!(
        report.main(0).unwrap().fault(),
        Some(ModuleFault::Panicked { message }) if message == "worker 0 gave up"
    ));
    assert_eq!(module.counts.get(), (1, 3, 1));
    assert_eq!(buffer.snapshot(), vec![0.0, 1.0, 2.0]);

    // The worker that panicked is still alive for the next run.
    assert_eq!(c.pool_size(), 3);
    c.run(&NativeSource::new(SlotWriter::new(2.0)), 3).unwrap();
    assert_eq!(buffer.snapshot(), vec![0.0, 2.0, 4.0]);
}

#[test]
fn missing_entry_point_calls_nothing() {
    let buffer = BufferDescriptor::zeroed(2);
    let source = MissingEntrySource::new("template", EntryPoint::Finalize);
    let mut c = coordinator(&buffer);
    let err = c.run(&source, 2).unwrap_err();

    assert!(matches!(
        err,
        RunError::EntryPointMissing {
            entry_point: EntryPoint::Finalize,
            ..
        }
    ));
    assert_eq!(source.loads.load(Ordering::SeqCst), 1);
    assert_eq!(c.pool_size(), 0);
    assert_eq!(buffer.snapshot(), vec![0.0, 0.0]);
}

#[test]
fn initialize_fault_skips_main_and_finalize() {
    let buffer = BufferDescriptor::zeroed(2);
    let module = Arc::new(FailingInitialize::default());
    let err = coordinator(&buffer)
        .run(&NativeSource::from_arc(module.clone()), 2)
        .unwrap_err();

    let report = err.report().unwrap();
    assert_eq!(report.initialize.phase, Phase::Initialize);
    assert!(report.initialize.fault().is_some());
    assert!(report.mains.is_empty());
    assert!(report.finalize.is_none());
    assert_eq!(module.counts.get(), (1, 0, 0));
}

#[test]
fn finalize_fault_is_reported_after_all_workers() {
    let buffer = BufferDescriptor::zeroed(2);
    let module = Arc::new(FailingFinalize::default());
    let err = coordinator(&buffer)
        .run(&NativeSource::from_arc(module.clone()), 2)
        .unwrap_err();

    let report = err.report().unwrap();
    assert!(report.mains.iter().all(|m| m.is_ok()));
    let faults: Vec<Phase> = report.faults().map(|(p, _)| p).collect();
    assert_eq!(faults, vec![Phase::Finalize]);
    assert_eq!(module.counts.get(), (1, 2, 1));
}

#[test]
fn thread_count_outside_bounds_is_rejected_before_load() {
    let buffer = BufferDescriptor::zeroed(1);
    let cfg = CoordinatorConfig {
        max_threads: 4,
        ..Default::default()
    };
    let mut c = Coordinator::new(cfg, &buffer).unwrap();
    let source = MissingEntrySource::new("never_loaded", EntryPoint::Main);

    for n in [0, 5] {
        let err = c.run(&source, n).unwrap_err();
        assert!(matches!(
            err,
            RunError::InvalidThreadCount { requested, max: 4 } if requested == n
        ));
    }
    assert_eq!(source.loads.load(Ordering::SeqCst), 0);
}

#[test]
fn read_only_buffer_faults_every_writer() {
    let buffer = BufferDescriptor::zeroed(2).read_only();
    let err = coordinator(&buffer)
        .run(&NativeSource::new(SlotWriter::new(1.0)), 2)
        .unwrap_err();

    let report = err.report().unwrap();
    assert_eq!(report.failed_ordinals().len(), 2);
    assert_eq!(
        report.main(1).unwrap().fault(),
        Some(&ModuleFault::Buffer(BufferError::NotWritable { index: 1 }))
    );
}

/// Writes one cell past its own ordinal.
struct NeighbourWriter;

impl Module for NeighbourWriter {
    fn name(&self) -> &str {
        "neighbour_writer"
    }
    fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        Ok(())
    }
    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        let i = ctx.ordinal().index();
        ctx.write(i + 1, 1.0)?;
        Ok(())
    }
    fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        Ok(())
    }
}

#[test]
fn enforced_ownership_rejects_foreign_writes() {
    let buffer = BufferDescriptor::zeroed(3);
    let cfg = CoordinatorConfig {
        slot_ownership: SlotOwnership::Enforced,
        ..Default::default()
    };
    let err = Coordinator::new(cfg, &buffer)
        .unwrap()
        .run(&NativeSource::new(NeighbourWriter), 2)
        .unwrap_err();

    let report = err.report().unwrap();
    assert_eq!(
        report.main(0).unwrap().fault(),
        Some(&ModuleFault::Buffer(BufferError::ForeignSlotWrite {
            index: 1,
            ordinal: WorkerOrdinal(0)
        }))
    );
    assert_eq!(buffer.snapshot(), vec![0.0, 0.0, 0.0]);
}

#[test]
fn unchecked_ownership_permits_out_of_slot_writes() {
    let buffer = BufferDescriptor::zeroed(3);
    let cfg = CoordinatorConfig {
        slot_ownership: SlotOwnership::Unchecked,
        ..Default::default()
    };
    Coordinator::new(cfg, &buffer)
        .unwrap()
        .run(&NativeSource::new(NeighbourWriter), 2)
        .unwrap();
    assert_eq!(buffer.snapshot(), vec![0.0, 1.0, 1.0]);
}

/// Reads a shaped aux array in every phase.
struct AuxReader;

impl Module for AuxReader {
    fn name(&self) -> &str {
        "aux_reader"
    }
    fn initialize(&self, ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        ctx.aux().get("static_data", "dt")?;
        Ok(())
    }
    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        let dt = ctx
            .aux()
            .get("static_data", "dt")?
            .as_f64()
            .ok_or_else(|| ModuleFault::failed("dt is not numeric"))?;
        let i = ctx.ordinal().index() as f64;
        ctx.slot()?.set(i * dt)?;
        Ok(())
    }
    fn finalize(&self, ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        ctx.aux().get("static_data", "missing")?;
        Ok(())
    }
}

#[test]
fn aux_providers_are_visible_and_misuse_is_a_fault() {
    let buffer = BufferDescriptor::zeroed(2);
    let aux = AuxRegistry::new()
        .with(AuxNamespace::new("static_data").value("dt", 0.5).unwrap())
        .unwrap();
    let err = coordinator(&buffer)
        .with_aux(aux)
        .run(&NativeSource::new(AuxReader), 2)
        .unwrap_err();

    assert_eq!(buffer.snapshot(), vec![0.0, 0.5]);
    let report = err.report().unwrap();
    assert!(matches!(
        report.finalize.as_ref().unwrap().fault(),
        Some(ModuleFault::Aux(_))
    ));
}
