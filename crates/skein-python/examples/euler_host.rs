//! Run `pymodules/interp/euler.py` across worker threads.
//!
//! The script imports the `static_data` namespace supplied here and
//! advances each buffer cell by one forward Euler step per run.
//!
//! Run from the workspace root with:
//!   RUST_LOG=skein_python=debug cargo run -p skein-python --example euler_host

use skein_core::{AuxNamespace, AuxRegistry, AuxValue, BufferDescriptor};
use skein_engine::{Coordinator, CoordinatorConfig};
use skein_python::{ScriptConfig, ScriptSource};

const CELLS: usize = 4;
const STEPS: usize = 3;

fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let static_data = AuxNamespace::new("static_data")
        .value("dt", 0.1)
        .unwrap()
        .value("rate", AuxValue::array(vec![1.0, -1.0, 0.5, 2.0]))
        .unwrap()
        .case("method", "forward", |key| AuxValue::from(format!("{key}-euler")))
        .unwrap();
    let aux = AuxRegistry::new().with(static_data).unwrap();

    let buffer = BufferDescriptor::zeroed(CELLS);
    let mut coordinator = Coordinator::new(CoordinatorConfig::default(), &buffer)
        .unwrap()
        .with_aux(aux);

    let source = ScriptSource::import("euler")
        .with_config(ScriptConfig::default().search_path("pymodules/interp"));

    for step in 0..STEPS {
        match coordinator.run(&source, CELLS) {
            Ok(report) => println!("step {step}: {report}"),
            Err(e) => {
                eprintln!("step {step} failed: {e}");
                if let Some(report) = e.report() {
                    eprintln!("{report}");
                }
                std::process::exit(1);
            }
        }
    }
    println!("final {:?}", buffer.snapshot());
}
