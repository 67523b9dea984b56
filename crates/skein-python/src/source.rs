//! Script module sources and the loaded [`ScriptModule`].

use std::ffi::CString;
use std::fs;
use std::path::{Path, PathBuf};

use pyo3::prelude::*;
use pyo3::types::PyModule;
use tracing::{debug, trace, warn};

use skein_core::{identity, EntryPoint, LoadError, ModuleFault, WorkerOrdinal};
use skein_module::{
    Bindings, FinalizeContext, InitContext, Module, ModuleHandle, ModuleSource, WorkerContext,
};

use crate::buffer::ScriptBuffer;
use crate::config::ScriptConfig;
use crate::error::{classify, describe, identity_error};
use crate::namespace::ScriptNamespace;

/// `ordinal()`: the calling worker's ordinal. Raises
/// `NotInWorkerContextError` outside `main`.
#[pyfunction]
#[pyo3(name = "ordinal")]
pub(crate) fn py_ordinal() -> PyResult<usize> {
    identity::ordinal()
        .map(WorkerOrdinal::index)
        .map_err(identity_error)
}

#[derive(Clone, Debug)]
enum Origin {
    Import,
    Code(String),
    File(PathBuf),
}

/// Where a script module comes from.
///
/// # Examples
///
/// ```no_run
/// use skein_python::{ScriptConfig, ScriptSource};
///
/// let source = ScriptSource::import("euler")
///     .with_config(ScriptConfig::default().search_path("pymodules/interp"));
/// ```
#[derive(Clone, Debug)]
pub struct ScriptSource {
    name: String,
    origin: Origin,
    config: ScriptConfig,
}

impl ScriptSource {
    /// Import `name` through the interpreter's normal module search.
    pub fn import(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: Origin::Import,
            config: ScriptConfig::default(),
        }
    }

    /// Execute `code` as a fresh module called `name`.
    pub fn from_code(name: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            origin: Origin::Code(code.into()),
            config: ScriptConfig::default(),
        }
    }

    /// Load a `.py` file. The module is named after the file stem and the
    /// file's directory is added to the search path.
    pub fn from_file(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let name = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("script")
            .to_string();
        Self {
            name,
            origin: Origin::File(path),
            config: ScriptConfig::default(),
        }
    }

    /// Replace the adapter configuration.
    pub fn with_config(mut self, config: ScriptConfig) -> Self {
        self.config = config;
        self
    }

    /// The adapter configuration.
    pub fn config(&self) -> &ScriptConfig {
        &self.config
    }

    fn load_error(&self, reason: impl Into<String>) -> LoadError {
        LoadError::ModuleLoad {
            module: self.name.clone(),
            reason: reason.into(),
        }
    }

    fn search_paths(&self) -> Vec<&Path> {
        let mut dirs: Vec<&Path> = self.config.search_paths.iter().map(PathBuf::as_path).collect();
        if let Origin::File(path) = &self.origin {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                dirs.push(parent);
            }
        }
        dirs
    }

    fn resolve<'py>(&self, py: Python<'py>, code: Option<&str>) -> PyResult<Bound<'py, PyModule>> {
        let sys = PyModule::import(py, "sys")?;
        let path = sys.getattr("path")?;
        for dir in self.search_paths() {
            let dir = dir.to_string_lossy();
            if !path.contains(&*dir)? {
                path.call_method1("insert", (0, &*dir))?;
                trace!(dir = %dir, "added to sys.path");
            }
        }

        match (&self.origin, code) {
            (Origin::Import, _) | (_, None) => PyModule::import(py, self.name.as_str()),
            (origin, Some(code)) => {
                let file_name = match origin {
                    Origin::File(path) => path.to_string_lossy().into_owned(),
                    _ => format!("<{}>", self.name),
                };
                let code = to_cstring(code)?;
                let file_name = to_cstring(&file_name)?;
                let module_name = to_cstring(&self.name)?;
                PyModule::from_code(py, &code, &file_name, &module_name)
            }
        }
    }

    /// Register the `skein` module and every auxiliary namespace in
    /// `sys.modules`, so module top-level code can import them.
    ///
    /// A namespace whose name is already taken by anything other than a
    /// `skein.Namespace` (a standard library module, say) fails the load
    /// before anything is registered.
    fn register(&self, py: Python<'_>, bindings: &Bindings) -> Result<Vec<String>, LoadError> {
        let modules = PyModule::import(py, "sys")
            .and_then(|sys| sys.getattr("modules"))
            .map_err(|e| self.load_error(describe(py, &e)))?;
        for ns in bindings.aux().iter() {
            if let Ok(existing) = modules.get_item(ns.name()) {
                if !existing.is_instance_of::<ScriptNamespace>() {
                    return Err(self.load_error(format!(
                        "namespace '{}' would shadow an existing module",
                        ns.name()
                    )));
                }
            }
        }
        self.install(py, &modules, bindings)
            .map_err(|e| self.load_error(describe(py, &e)))
    }

    fn install(
        &self,
        py: Python<'_>,
        modules: &Bound<'_, PyAny>,
        bindings: &Bindings,
    ) -> PyResult<Vec<String>> {
        if !modules.contains("skein")? {
            modules.set_item("skein", crate::skein_module(py)?)?;
        }
        let mut registered = Vec::new();
        for ns in bindings.aux().iter() {
            let obj = Bound::new(py, ScriptNamespace::new(ns.clone()))?;
            modules.set_item(ns.name(), obj)?;
            registered.push(ns.name().to_string());
            trace!(module = %self.name, namespace = ns.name(), "namespace registered");
        }
        Ok(registered)
    }

    /// Inject the buffer, identity provider and namespaces into the
    /// module's globals.
    fn bind(
        &self,
        py: Python<'_>,
        module: &Bound<'_, PyModule>,
        bindings: &Bindings,
    ) -> PyResult<()> {
        let modules = PyModule::import(py, "sys")?.getattr("modules")?;
        let buffer = Bound::new(py, ScriptBuffer::new(bindings.buffer().clone()))?;
        module.setattr(self.config.buffer_attr.as_str(), buffer)?;
        module.setattr(
            self.config.ordinal_attr.as_str(),
            wrap_pyfunction!(py_ordinal, py)?,
        )?;
        for ns in bindings.aux().iter() {
            module.setattr(ns.name(), modules.get_item(ns.name())?)?;
        }
        Ok(())
    }
}

fn to_cstring(s: &str) -> PyResult<CString> {
    CString::new(s).map_err(|e| pyo3::exceptions::PyValueError::new_err(e.to_string()))
}

/// Drop `module` and our namespaces from `sys.modules`. A namespace entry
/// replaced since registration by something else is left alone.
fn evict(py: Python<'_>, module: &str, namespaces: &[String]) -> PyResult<()> {
    let modules = PyModule::import(py, "sys")?.getattr("modules")?;
    if modules.contains(module)? {
        modules.del_item(module)?;
    }
    for name in namespaces {
        let ours = modules
            .get_item(name.as_str())
            .map(|m| m.is_instance_of::<ScriptNamespace>())
            .unwrap_or(false);
        if ours {
            modules.del_item(name.as_str())?;
        }
    }
    Ok(())
}

impl ModuleSource for ScriptSource {
    fn name(&self) -> &str {
        &self.name
    }

    fn load(&self, bindings: &Bindings) -> Result<ModuleHandle, LoadError> {
        self.config
            .validate()
            .map_err(|e| self.load_error(e.to_string()))?;
        let code = match &self.origin {
            Origin::Import => None,
            Origin::Code(code) => Some(code.clone()),
            Origin::File(path) => Some(
                fs::read_to_string(path)
                    .map_err(|e| self.load_error(format!("{}: {e}", path.display())))?,
            ),
        };

        Python::attach(|py| {
            let namespaces = self.register(py, bindings)?;
            let unwind = |key: &str| {
                if self.config.evict_on_unload {
                    if let Err(e) = evict(py, key, &namespaces) {
                        warn!(module = %key, error = %e, "failed to evict module");
                    }
                }
            };

            let module = match self.resolve(py, code.as_deref()) {
                Ok(module) => module,
                Err(e) => {
                    unwind(&self.name);
                    return Err(self.load_error(describe(py, &e)));
                }
            };
            let key = module
                .name()
                .map(|n| n.to_string())
                .unwrap_or_else(|_| self.name.clone());

            for entry_point in EntryPoint::ALL {
                let callable = module
                    .getattr(entry_point.name())
                    .map(|f| f.is_callable())
                    .unwrap_or(false);
                if !callable {
                    unwind(&key);
                    return Err(LoadError::EntryPointMissing {
                        module: self.name.clone(),
                        entry_point,
                    });
                }
            }

            if let Err(e) = self.bind(py, &module, bindings) {
                unwind(&key);
                return Err(self.load_error(describe(py, &e)));
            }
            debug!(module = %key, "script module loaded");

            Ok(ModuleHandle::new(ScriptModule {
                name: key,
                module: module.unbind(),
                namespaces,
                evict: self.config.evict_on_unload,
            }))
        })
    }
}

/// A loaded script module. Every entry point call attaches to the
/// interpreter for its duration; the host thread must not hold the
/// interpreter lock while a run is in progress.
pub struct ScriptModule {
    name: String,
    module: Py<PyModule>,
    namespaces: Vec<String>,
    evict: bool,
}

impl ScriptModule {
    fn call(&self, entry_point: EntryPoint) -> Result<(), ModuleFault> {
        Python::attach(|py| {
            self.module
                .bind(py)
                .getattr(entry_point.name())
                .and_then(|f| f.call0())
                .map(drop)
                .map_err(|e| classify(py, &e))
        })
    }
}

impl Module for ScriptModule {
    fn name(&self) -> &str {
        &self.name
    }

    fn initialize(&self, _ctx: &mut InitContext<'_>) -> Result<(), ModuleFault> {
        self.call(EntryPoint::Initialize)
    }

    fn main(&self, _ctx: &mut WorkerContext<'_>) -> Result<(), ModuleFault> {
        self.call(EntryPoint::Main)
    }

    fn finalize(&self, _ctx: &mut FinalizeContext<'_>) -> Result<(), ModuleFault> {
        self.call(EntryPoint::Finalize)
    }
}

impl Drop for ScriptModule {
    fn drop(&mut self) {
        if !self.evict {
            return;
        }
        Python::attach(|py| {
            match evict(py, &self.name, &self.namespaces) {
                Ok(()) => debug!(module = %self.name, "script module unloaded"),
                Err(e) => warn!(module = %self.name, error = %e, "failed to evict module"),
            }
        });
    }
}
