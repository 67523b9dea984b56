//! Skein native host: a complete, minimal embedding from scratch.
//!
//! Demonstrates:
//!   1. Creating a buffer descriptor and an auxiliary namespace
//!   2. Implementing a native module (cooling toward ambient temperature)
//!   3. Passing state from initialize to the workers and finalize
//!   4. Running repeatedly and reading the run report
//!   5. A worker fault that leaves the other workers untouched
//!
//! Run with:
//!   RUST_LOG=skein_engine=debug cargo run --example native_host

use skein::prelude::*;

// ─── Parameters ─────────────────────────────────────────────────

const CELLS: usize = 8;
const THREADS: usize = 8;
const RUNS: usize = 5;

// ─── Module: Newtonian cooling ──────────────────────────────────
//
// initialize reads dt and k from the "physics" namespace and stores the
// per-run decay factor. Each worker cools its own cell; finalize
// prints the mean.

struct Cooling;

struct Decay {
    factor: f64,
    ambient: f64,
}

impl Module for Cooling {
    fn name(&self) -> &str {
        "cooling"
    }

    fn initialize(&self, ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        let dt = ctx.aux().get("physics", "dt")?.as_f64().unwrap_or(0.0);
        let k = ctx.aux().get("physics", "k")?.as_f64().unwrap_or(0.0);
        let ambient = ctx.aux().get("physics", "ambient")?.as_f64().unwrap_or(0.0);
        ctx.set_state(Decay {
            factor: (-k * dt).exp(),
            ambient,
        });
        Ok(())
    }

    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        let (factor, ambient) = match ctx.state::<Decay>() {
            Some(d) => (d.factor, d.ambient),
            None => return Err(ModuleFault::failed("decay state missing")),
        };
        let slot = ctx.slot()?;
        let t = slot.get()?;
        slot.set(ambient + (t - ambient) * factor)?;
        Ok(())
    }

    fn finalize(&self, ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        let values = ctx.buffer().snapshot()?;
        let mean = values.iter().sum::<f64>() / values.len() as f64;
        println!("  mean temperature {mean:.3}");
        Ok(())
    }
}

// ─── Module: refuses on one ordinal ─────────────────────────────

struct Stubborn;

impl Module for Stubborn {
    fn name(&self) -> &str {
        "stubborn"
    }

    fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        Ok(())
    }

    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        if ctx.ordinal().index() == 3 {
            return Err(ModuleFault::failed("cell 3 is pinned"));
        }
        ctx.slot()?.set(0.0)?;
        Ok(())
    }

    fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        Ok(())
    }
}

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let buffer = BufferDescriptor::from_values((0..CELLS).map(|i| 20.0 + 10.0 * i as f64).collect());
    let physics = AuxNamespace::new("physics")
        .value("dt", 0.5)
        .unwrap()
        .value("k", 0.4)
        .unwrap()
        .value("ambient", 15.0)
        .unwrap();
    let aux = AuxRegistry::new().with(physics).unwrap();

    let mut coordinator = Coordinator::new(CoordinatorConfig::default(), &buffer)
        .unwrap()
        .with_aux(aux);

    println!("initial {:?}", buffer.snapshot());
    let cooling = NativeSource::new(Cooling);
    for run in 0..RUNS {
        println!("run {run}");
        let report = coordinator.run(&cooling, THREADS).unwrap();
        assert!(report.barriers_hold());
    }
    println!("after {RUNS} runs {:.2?}", buffer.snapshot());

    match coordinator.run(&NativeSource::new(Stubborn), THREADS) {
        Ok(_) => println!("stubborn run succeeded"),
        Err(e) => {
            println!("stubborn run: {e}");
            if let Some(report) = e.report() {
                println!("{report}");
            }
        }
    }
    println!("final {:.2?}", buffer.snapshot());

    coordinator.shutdown();
}
