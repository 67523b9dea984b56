//! Embedded CPython adapter for Skein modules.
//!
//! [`ScriptSource`] resolves a Python module (by import, from a file, or
//! from source text), checks that it defines callable `initialize`,
//! `main`, and `finalize`, and binds into its globals:
//!
//! | Name | Object |
//! |------|--------|
//! | `buffer` | `skein.Buffer` aliasing the host buffer (buffer protocol) |
//! | `ordinal` | callable returning the worker ordinal inside `main` |
//! | `<namespace>` | one `skein.Namespace` per auxiliary namespace |
//!
//! Namespaces are also registered in `sys.modules`, and a `skein` module
//! carrying the exception types is registered on first load.
//!
//! The interpreter is initialized on first use. Worker threads attach to
//! it for the duration of each `main` call, so the host thread must not
//! hold the interpreter lock while `Coordinator::run` is in progress.

#![deny(missing_docs)]
#![deny(rustdoc::broken_intra_doc_links)]
#![allow(unsafe_code)]

use pyo3::prelude::*;
use pyo3::types::PyModule;

mod buffer;
pub mod config;
mod error;
mod namespace;
mod source;

pub use buffer::ScriptBuffer;
pub use config::{ScriptConfig, ScriptConfigError};
pub use error::{
    BufferReleasedError, ForeignSlotWriteError, NotInWorkerContextError, NotWritableError,
    OutOfRangeError, SkeinError, UnknownAccessorError,
};
pub use namespace::{ScriptAccessor, ScriptNamespace};
pub use source::{ScriptModule, ScriptSource};

/// Build the `skein` helper module exposed to scripts.
pub fn skein_module(py: Python<'_>) -> PyResult<Bound<'_, PyModule>> {
    let m = PyModule::new(py, "skein")?;
    m.add_class::<ScriptBuffer>()?;
    m.add_class::<ScriptNamespace>()?;
    m.add_class::<ScriptAccessor>()?;
    m.add("SkeinError", py.get_type::<SkeinError>())?;
    m.add("OutOfRangeError", py.get_type::<OutOfRangeError>())?;
    m.add("NotWritableError", py.get_type::<NotWritableError>())?;
    m.add("ForeignSlotWriteError", py.get_type::<ForeignSlotWriteError>())?;
    m.add("BufferReleasedError", py.get_type::<BufferReleasedError>())?;
    m.add(
        "NotInWorkerContextError",
        py.get_type::<NotInWorkerContextError>(),
    )?;
    m.add("UnknownAccessorError", py.get_type::<UnknownAccessorError>())?;
    m.add_function(wrap_pyfunction!(source::py_ordinal, &m)?)?;
    Ok(m)
}
