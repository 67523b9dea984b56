//! The [`Module`] trait, loaded [`ModuleHandle`]s, and [`ModuleSource`]s.

use std::fmt;
use std::sync::Arc;

use skein_core::{LoadError, ModuleFault};

use crate::bindings::Bindings;
use crate::context::{FinalizeContext, InitContext, WorkerContext};

/// The three-phase lifecycle every loadable module implements.
///
/// # Contract
///
/// - `initialize()` is called exactly once per run, on the coordinator
///   thread, before any `main()`. A fault aborts the run.
/// - `main()` is called once per worker, possibly concurrently with other
///   workers. A fault is reported against that worker only.
/// - `finalize()` is called exactly once per run, on the coordinator
///   thread, after every `main()` returned (successfully or not).
/// - `&self`: per-run state goes through the context's
///   [`ModuleState`](crate::ModuleState), not through `self`.
///
/// A native module cannot omit an entry point; only script adapters can
/// report [`LoadError::EntryPointMissing`].
///
/// # Examples
///
/// A module where each worker writes its ordinal into its own slot:
///
/// ```
/// use skein_core::ModuleFault;
/// use skein_module::{FinalizeContext, InitContext, Module, WorkerContext};
///
/// struct OrdinalFill;
///
/// impl Module for OrdinalFill {
///     fn name(&self) -> &str { "ordinal_fill" }
///
///     fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
///         Ok(())
///     }
///
///     fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
///         let value = ctx.ordinal().index() as f64;
///         ctx.slot()?.set(value)?;
///         Ok(())
///     }
///
///     fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
///         Ok(())
///     }
/// }
///
/// assert_eq!(OrdinalFill.name(), "ordinal_fill");
/// ```
pub trait Module: Send + Sync + 'static {
    /// Module name for reports and logs.
    fn name(&self) -> &str;

    /// Module-local setup. No worker context exists yet.
    fn initialize(&self, ctx: &mut InitContext<'_>) -> Result<(), ModuleFault>;

    /// Per-worker body.
    fn main(&self, ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault>;

    /// Teardown after every worker finished.
    fn finalize(&self, ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault>;
}

/// One loaded module. Immutable after load; unloaded when dropped.
#[derive(Clone)]
pub struct ModuleHandle {
    name: String,
    module: Arc<dyn Module>,
}

impl ModuleHandle {
    /// Wrap a loaded module.
    pub fn new(module: impl Module) -> Self {
        Self::from_arc(Arc::new(module))
    }

    /// Wrap an already shared module.
    pub fn from_arc(module: Arc<dyn Module>) -> Self {
        Self {
            name: module.name().to_string(),
            module,
        }
    }

    /// Module name captured at load time.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// The loaded module.
    pub fn module(&self) -> &Arc<dyn Module> {
        &self.module
    }
}

impl fmt::Debug for ModuleHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ModuleHandle")
            .field("name", &self.name)
            .finish()
    }
}

/// Something the coordinator can load a module from.
///
/// `load()` receives the run's [`Bindings`] so that script adapters can
/// inject them into the script namespace before any entry point runs.
pub trait ModuleSource {
    /// Name used in logs and load errors.
    fn name(&self) -> &str;

    /// Resolve the module and verify its entry points.
    fn load(&self, bindings: &Bindings) -> Result<ModuleHandle, LoadError>;
}

/// A source that always yields the same native module.
#[derive(Clone)]
pub struct NativeSource {
    module: Arc<dyn Module>,
}

impl NativeSource {
    /// Wrap a native module.
    pub fn new(module: impl Module) -> Self {
        Self {
            module: Arc::new(module),
        }
    }

    /// Wrap an already shared native module (to inspect it after a run).
    pub fn from_arc(module: Arc<dyn Module>) -> Self {
        Self { module }
    }
}

impl ModuleSource for NativeSource {
    fn name(&self) -> &str {
        self.module.name()
    }

    fn load(&self, _bindings: &Bindings) -> Result<ModuleHandle, LoadError> {
        Ok(ModuleHandle::from_arc(Arc::clone(&self.module)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use skein_core::{AuxRegistry, BufferDescriptor};

    struct Noop;

    impl Module for Noop {
        fn name(&self) -> &str {
            "noop"
        }
        fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
            Ok(())
        }
        fn main(&self, _ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
            Ok(())
        }
        fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
            Ok(())
        }
    }

    #[test]
    fn native_source_loads_shared_module() {
        let buf = BufferDescriptor::zeroed(1);
        let bindings = Bindings::new(buf.view(), AuxRegistry::new());
        let source = NativeSource::new(Noop);
        let a = source.load(&bindings).unwrap();
        let b = source.load(&bindings).unwrap();
        assert_eq!(a.name(), "noop");
        assert!(Arc::ptr_eq(a.module(), b.module()));
    }
}
