//! Benchmark profiles for the Skein execution coordinator.
//!
//! - [`seeded_buffer`]: deterministic buffer contents via seed
//! - [`StrideSweep`]: a native module where worker `i` relaxes every
//!   `thread_count`-th cell starting at `i`
//! - [`sweep_config`]: coordinator configuration the sweep needs

#![forbid(unsafe_code)]
#![deny(rustdoc::broken_intra_doc_links)]

use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use skein_core::{BufferDescriptor, ModuleFault, SlotOwnership};
use skein_engine::CoordinatorConfig;
use skein_module::{FinalizeContext, InitContext, Module, WorkerContext};

/// Buffer of `cells` values drawn uniformly from `[0, 1)`.
pub fn seeded_buffer(cells: usize, seed: u64) -> BufferDescriptor {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    BufferDescriptor::from_values((0..cells).map(|_| rng.random::<f64>()).collect())
}

/// Coordinator configuration for [`StrideSweep`]. Workers write outside
/// their own slot, so ownership checks are off.
pub fn sweep_config() -> CoordinatorConfig {
    CoordinatorConfig {
        slot_ownership: SlotOwnership::Unchecked,
        ..Default::default()
    }
}

/// Relaxes each cell toward `target` by `rate` per run.
pub struct StrideSweep {
    /// Value every cell converges to.
    pub target: f64,
    /// Fraction of the remaining distance covered per run, in `(0, 1]`.
    pub rate: f64,
}

impl Module for StrideSweep {
    fn name(&self) -> &str {
        "stride_sweep"
    }

    fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        Ok(())
    }

    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        let step = ctx.thread_count();
        let buffer = ctx.buffer();
        for i in (ctx.ordinal().index()..buffer.len()).step_by(step) {
            let x = buffer.read(i)?;
            buffer.write(i, x + self.rate * (self.target - x))?;
        }
        Ok(())
    }

    fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_engine::Coordinator;
    use skein_module::NativeSource;

    #[test]
    fn seeded_buffer_is_deterministic() {
        assert_eq!(
            seeded_buffer(16, 7).snapshot(),
            seeded_buffer(16, 7).snapshot()
        );
        assert_ne!(
            seeded_buffer(16, 7).snapshot(),
            seeded_buffer(16, 8).snapshot()
        );
    }

    #[test]
    fn sweep_touches_every_cell_once() {
        let buffer = BufferDescriptor::zeroed(10);
        let source = NativeSource::new(StrideSweep {
            target: 1.0,
            rate: 0.5,
        });
        Coordinator::new(sweep_config(), &buffer)
            .unwrap()
            .run(&source, 3)
            .unwrap();
        assert_eq!(buffer.snapshot(), vec![0.5; 10]);
    }
}
