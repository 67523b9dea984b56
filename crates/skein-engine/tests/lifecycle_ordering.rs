//! Integration test: lifecycle ordering and the join barrier.
//!
//! `initialize` must complete before any `main` starts, and every `main`
//! must complete before `finalize` starts. Checked twice: from the
//! report's sequence stamps and from what the module itself observed.

use std::sync::atomic::Ordering;
use std::sync::Arc;

use proptest::prelude::*;

use skein_core::{BufferDescriptor, IdentityError, WorkerOrdinal};
use skein_engine::{Coordinator, CoordinatorConfig, Phase};
use skein_module::NativeSource;
use skein_test_utils::{
    CountingSource, JitterModule, OrdinalWriter, PhaseRecorder, RecordedCall, Scale,
    StateRoundTrip,
};

fn coordinator(buffer: &BufferDescriptor) -> Coordinator<'_> {
    Coordinator::new(CoordinatorConfig::default(), buffer).unwrap()
}

#[test]
fn four_workers_write_their_ordinals() {
    let buffer = BufferDescriptor::zeroed(4);
    let module = Arc::new(OrdinalWriter::default());
    let report = coordinator(&buffer)
        .run(&NativeSource::from_arc(module.clone()), 4)
        .unwrap();

    assert_eq!(buffer.snapshot(), vec![0.0, 1.0, 2.0, 3.0]);
    assert_eq!(module.counts.get(), (1, 4, 1));
    assert!(report.is_success());
    assert!(report.barriers_hold());
    assert_eq!(report.mains.len(), 4);
}

#[test]
fn recorder_sees_initialize_first_and_finalize_last() {
    let buffer = BufferDescriptor::zeroed(8);
    let module = Arc::new(PhaseRecorder::default());
    coordinator(&buffer)
        .run(&NativeSource::from_arc(module.clone()), 8)
        .unwrap();

    let calls = module.calls();
    assert_eq!(calls.len(), 10);
    assert_eq!(calls.first(), Some(&RecordedCall::Initialize));
    assert_eq!(calls.last(), Some(&RecordedCall::Finalize));
    let mut ordinals: Vec<usize> = calls
        .iter()
        .filter_map(|c| match c {
            RecordedCall::Main(i) => Some(*i),
            _ => None,
        })
        .collect();
    ordinals.sort_unstable();
    assert_eq!(ordinals, (0..8).collect::<Vec<_>>());
}

#[test]
fn ordinal_is_unavailable_outside_main() {
    let buffer = BufferDescriptor::zeroed(2);
    let module = Arc::new(PhaseRecorder::default());
    coordinator(&buffer)
        .run(&NativeSource::from_arc(module.clone()), 2)
        .unwrap();

    assert_eq!(
        *module.init_identity.lock().unwrap(),
        Some(Err(IdentityError::NotInWorkerContext))
    );
    assert_eq!(
        *module.finalize_identity.lock().unwrap(),
        Some(Err(IdentityError::NotInWorkerContext))
    );
}

#[test]
fn finalize_starts_after_every_jittered_worker() {
    let buffer = BufferDescriptor::zeroed(12);
    let mut c = coordinator(&buffer);
    for seed in 0..5u64 {
        let module = Arc::new(JitterModule::new(seed, 2_000));
        let report = c.run(&NativeSource::from_arc(module.clone()), 12).unwrap();
        assert_eq!(module.finished_at_finalize.load(Ordering::SeqCst), 12);
        assert!(report.barriers_hold(), "seed {seed}: {report}");
    }
}

#[test]
fn state_flows_from_initialize_to_finalize() {
    let buffer = BufferDescriptor::zeroed(3);
    let module = Arc::new(StateRoundTrip::new(0.5));
    coordinator(&buffer)
        .run(&NativeSource::from_arc(module.clone()), 3)
        .unwrap();

    assert_eq!(buffer.snapshot(), vec![0.0, 0.5, 1.0]);
    assert_eq!(*module.taken.lock().unwrap(), Some(Scale(0.5)));
}

#[test]
fn repeated_runs_reload_and_reinitialize() {
    let buffer = BufferDescriptor::zeroed(2);
    let module = Arc::new(OrdinalWriter::default());
    let source = CountingSource::new(module.clone());
    let mut c = coordinator(&buffer);
    let a = c.run(&source, 2).unwrap();
    let b = c.run(&source, 2).unwrap();

    assert_eq!(source.loads(), 2);
    assert_eq!(module.counts.get(), (2, 4, 2));
    assert_ne!(a.run_id, b.run_id);
}

#[test]
fn main_reports_are_ordered_by_ordinal() {
    let buffer = BufferDescriptor::zeroed(6);
    let report = coordinator(&buffer)
        .run(&NativeSource::new(JitterModule::new(9, 500)), 6)
        .unwrap();
    let phases: Vec<Phase> = report.mains.iter().map(|m| m.phase).collect();
    let expected: Vec<Phase> = (0..6).map(|i| Phase::Main(WorkerOrdinal(i))).collect();
    assert_eq!(phases, expected);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(24))]

    #[test]
    fn every_ordinal_runs_exactly_once(n in 1usize..16) {
        let buffer = BufferDescriptor::from_values(vec![-1.0; n]);
        let module = Arc::new(OrdinalWriter::default());
        let report = coordinator(&buffer)
            .run(&NativeSource::from_arc(module.clone()), n)
            .unwrap();

        let expected: Vec<f64> = (0..n).map(|i| i as f64).collect();
        prop_assert_eq!(buffer.snapshot(), expected);
        prop_assert_eq!(module.counts.get(), (1, n, 1));
        prop_assert!(report.barriers_hold());
    }
}
