//! Skein faults ↔ Python exceptions.
//!
//! Every bridge error raised into a script carries its structured fields
//! as exception attributes (`index`, `length`, `ordinal`, ...). When an
//! entry point lets such an exception escape, [`classify`] reads those
//! attributes back and reconstructs the typed [`ModuleFault`]. Any other
//! exception becomes [`ModuleFault::Failed`] with the formatted exception
//! and traceback.

use pyo3::create_exception;
use pyo3::exceptions::{PyAttributeError, PyException};
use pyo3::prelude::*;
use pyo3::exceptions::PyBaseException;

use skein_core::{AuxError, BufferError, IdentityError, ModuleFault, WorkerOrdinal};

create_exception!(skein, SkeinError, PyException, "Base class for Skein bridge errors.");
create_exception!(skein, OutOfRangeError, SkeinError, "Buffer index outside [0, len).");
create_exception!(skein, NotWritableError, SkeinError, "Buffer is read-only.");
create_exception!(
    skein,
    ForeignSlotWriteError,
    SkeinError,
    "Worker wrote a buffer cell other than its own."
);
create_exception!(
    skein,
    BufferReleasedError,
    SkeinError,
    "Host released the buffer."
);
create_exception!(
    skein,
    NotInWorkerContextError,
    SkeinError,
    "ordinal() called outside main()."
);
// An `AttributeError`, so `hasattr` and `getattr(ns, name, default)` work
// on namespaces.
create_exception!(
    skein,
    UnknownAccessorError,
    PyAttributeError,
    "Auxiliary namespace has no such accessor."
);

fn annotate(
    py: Python<'_>,
    err: PyErr,
    set: impl FnOnce(&Bound<'_, PyBaseException>) -> PyResult<()>,
) -> PyErr {
    match set(err.value(py)) {
        Ok(()) => err,
        Err(e) => e,
    }
}

/// Raise a buffer error as its Python exception.
pub(crate) fn buffer_error(py: Python<'_>, e: BufferError) -> PyErr {
    let msg = e.to_string();
    match e {
        BufferError::OutOfRange { index, length } => {
            annotate(py, OutOfRangeError::new_err(msg), |v| {
                v.setattr("index", index)?;
                v.setattr("length", length)
            })
        }
        BufferError::NotWritable { index } => {
            annotate(py, NotWritableError::new_err(msg), |v| v.setattr("index", index))
        }
        BufferError::ForeignSlotWrite { index, ordinal } => {
            annotate(py, ForeignSlotWriteError::new_err(msg), |v| {
                v.setattr("index", index)?;
                v.setattr("ordinal", ordinal.index())
            })
        }
        BufferError::Released => BufferReleasedError::new_err(msg),
        BufferError::ShapeMismatch { .. } | BufferError::DimensionMismatch { .. } => {
            SkeinError::new_err(msg)
        }
    }
}

/// Out-of-range for a negative script index, which has no `usize` form.
pub(crate) fn negative_index(py: Python<'_>, index: isize, length: usize) -> PyErr {
    let msg = format!("index {index} out of range for buffer of length {length}");
    annotate(py, OutOfRangeError::new_err(msg), |v| {
        v.setattr("index", index)?;
        v.setattr("length", length)
    })
}

/// Raise an identity error as its Python exception.
pub(crate) fn identity_error(e: IdentityError) -> PyErr {
    match e {
        IdentityError::NotInWorkerContext => NotInWorkerContextError::new_err(e.to_string()),
    }
}

/// Raise an auxiliary provider error as its Python exception.
pub(crate) fn aux_error(py: Python<'_>, e: AuxError) -> PyErr {
    let msg = e.to_string();
    match e {
        AuxError::UnknownAccessor { namespace, name } => {
            annotate(py, UnknownAccessorError::new_err(msg), |v| {
                v.setattr("namespace", namespace)?;
                v.setattr("name", name)
            })
        }
        _ => SkeinError::new_err(msg),
    }
}

/// Reconstruct the typed fault behind an exception escaping an entry point.
pub(crate) fn classify(py: Python<'_>, err: &PyErr) -> ModuleFault {
    let value = err.value(py);
    let usize_attr = |name: &str| value.getattr(name).and_then(|v| v.extract::<usize>()).ok();
    let str_attr = |name: &str| value.getattr(name).and_then(|v| v.extract::<String>()).ok();

    if err.is_instance_of::<OutOfRangeError>(py) {
        if let (Some(index), Some(length)) = (usize_attr("index"), usize_attr("length")) {
            return BufferError::OutOfRange { index, length }.into();
        }
    } else if err.is_instance_of::<NotWritableError>(py) {
        if let Some(index) = usize_attr("index") {
            return BufferError::NotWritable { index }.into();
        }
    } else if err.is_instance_of::<ForeignSlotWriteError>(py) {
        if let (Some(index), Some(ordinal)) = (usize_attr("index"), usize_attr("ordinal")) {
            return BufferError::ForeignSlotWrite {
                index,
                ordinal: WorkerOrdinal(ordinal),
            }
            .into();
        }
    } else if err.is_instance_of::<BufferReleasedError>(py) {
        return BufferError::Released.into();
    } else if err.is_instance_of::<NotInWorkerContextError>(py) {
        return IdentityError::NotInWorkerContext.into();
    } else if err.is_instance_of::<UnknownAccessorError>(py) {
        if let (Some(namespace), Some(name)) = (str_attr("namespace"), str_attr("name")) {
            return AuxError::UnknownAccessor { namespace, name }.into();
        }
    }
    ModuleFault::failed(describe(py, err))
}

/// `Type: message` followed by the formatted traceback, if any.
pub(crate) fn describe(py: Python<'_>, err: &PyErr) -> String {
    let mut text = err.to_string();
    if let Some(tb) = err.traceback(py) {
        if let Ok(formatted) = tb.format() {
            text.push('\n');
            text.push_str(formatted.trim_end());
        }
    }
    text
}
