//! The `skein.Buffer` object bound into script modules.
//!
//! Wraps a [`BufferView`] without copying. Element access goes through the
//! view's checked `read`/`write`, so scripts see the same range, writable,
//! ownership, and release checks as native modules.
//!
//! The object also implements the Python buffer protocol: format `d`,
//! the buffer's shape, and byte strides for its order and layout.
//! `memoryview(buffer)` and `numpy.asarray(buffer)` therefore alias host
//! memory directly. Access through them bypasses the per-element checks;
//! the exported view is marked read-only when the buffer is not writable.
//!
//! Indexing takes either a flat logical index or a tuple multi-index.
//! `len(buffer)` is the total cell count.

use std::ffi::{c_char, c_int, c_void, CStr};
use std::ptr;

use pyo3::exceptions::PyBufferError;
use pyo3::ffi;
use pyo3::prelude::*;
use pyo3::types::{PyDict, PyList, PyTuple};

use skein_core::{BufferView, Order, SlotOwnership};

use crate::error::{buffer_error, negative_index};

const FORMAT: &CStr = c"d";

/// Shape and strides handed to a buffer-protocol consumer. Boxed into
/// `Py_buffer::internal` and freed in `__releasebuffer__`.
struct ExportShape {
    shape: Vec<ffi::Py_ssize_t>,
    strides: Vec<ffi::Py_ssize_t>,
}

/// Script-side handle to the host buffer.
#[pyclass(frozen, name = "Buffer", module = "skein")]
pub struct ScriptBuffer {
    view: BufferView,
}

impl ScriptBuffer {
    /// Wrap a view.
    pub fn new(view: BufferView) -> Self {
        Self { view }
    }

    /// The wrapped view.
    pub fn view(&self) -> &BufferView {
        &self.view
    }

    fn checked(&self, py: Python<'_>, index: isize) -> PyResult<usize> {
        usize::try_from(index).map_err(|_| negative_index(py, index, self.view.len()))
    }

    /// Resolve a flat index or a tuple multi-index. Negative entries
    /// count from the end of their dimension.
    fn resolve(&self, py: Python<'_>, key: &Bound<'_, PyAny>) -> PyResult<usize> {
        if let Ok(index) = key.extract::<isize>() {
            return wrap(py, index, self.view.len());
        }
        let coords: Vec<isize> = key.extract()?;
        let shape = self.view.shape();
        let coords = coords
            .iter()
            .zip(shape.iter().chain(std::iter::repeat(&usize::MAX)))
            .map(|(&c, &d)| wrap(py, c, d))
            .collect::<PyResult<Vec<_>>>()?;
        self.view.index_of(&coords).map_err(|e| buffer_error(py, e))
    }
}

fn wrap(py: Python<'_>, index: isize, len: usize) -> PyResult<usize> {
    let resolved = if index < 0 {
        index.checked_add_unsigned(len)
    } else {
        Some(index)
    };
    match resolved {
        Some(i) if i >= 0 => Ok(i as usize),
        _ => Err(negative_index(py, index, len)),
    }
}

#[pymethods]
impl ScriptBuffer {
    /// `buffer.write(index, value)`: store one cell in place.
    fn write(&self, py: Python<'_>, index: isize, value: f64) -> PyResult<()> {
        let index = self.checked(py, index)?;
        self.view
            .write(index, value)
            .map_err(|e| buffer_error(py, e))
    }

    /// `buffer.read(index)`: load one cell.
    fn read(&self, py: Python<'_>, index: isize) -> PyResult<f64> {
        let index = self.checked(py, index)?;
        self.view.read(index).map_err(|e| buffer_error(py, e))
    }

    fn __len__(&self) -> usize {
        self.view.len()
    }

    fn __getitem__(&self, py: Python<'_>, key: &Bound<'_, PyAny>) -> PyResult<f64> {
        let index = self.resolve(py, key)?;
        self.view.read(index).map_err(|e| buffer_error(py, e))
    }

    fn __setitem__(&self, py: Python<'_>, key: &Bound<'_, PyAny>, value: f64) -> PyResult<()> {
        let index = self.resolve(py, key)?;
        self.view
            .write(index, value)
            .map_err(|e| buffer_error(py, e))
    }

    fn __iter__<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyAny>> {
        self.tolist(py)?.call_method0("__iter__")
    }

    /// Total number of cells.
    #[getter]
    fn size(&self) -> usize {
        self.view.len()
    }

    /// Number of dimensions.
    #[getter]
    fn ndim(&self) -> usize {
        self.view.shape().len()
    }

    /// Dimension sizes as a tuple.
    #[getter]
    fn shape<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyTuple>> {
        PyTuple::new(py, self.view.shape())
    }

    /// Layout and access flags as a dict.
    #[getter]
    fn flags<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyDict>> {
        let info = self.view.flags();
        let d = PyDict::new(py);
        d.set_item("length", info.length)?;
        d.set_item("stride", info.stride)?;
        d.set_item("contiguous", info.contiguous)?;
        d.set_item("c_contiguous", self.view.is_c_contiguous())?;
        d.set_item("f_contiguous", self.view.is_f_contiguous())?;
        d.set_item("order", match self.view.order() {
            Order::RowMajor => "C",
            Order::ColumnMajor => "F",
        })?;
        d.set_item("writable", info.writable)?;
        d.set_item("itemsize", info.itemsize)?;
        d.set_item("released", self.view.is_released())?;
        d.set_item(
            "ownership",
            match self.view.ownership() {
                SlotOwnership::Enforced => "enforced",
                SlotOwnership::Unchecked => "unchecked",
            },
        )?;
        Ok(d)
    }

    /// Copy of the contents as a list of floats.
    fn tolist<'py>(&self, py: Python<'py>) -> PyResult<Bound<'py, PyList>> {
        let values = self.view.snapshot().map_err(|e| buffer_error(py, e))?;
        PyList::new(py, values)
    }

    fn __repr__(&self) -> String {
        let info = self.view.flags();
        format!(
            "<skein.Buffer shape={:?} stride={} writable={}>",
            self.view.shape(),
            info.stride,
            info.writable
        )
    }

    unsafe fn __getbuffer__(
        slf: Bound<'_, Self>,
        view: *mut ffi::Py_buffer,
        flags: c_int,
    ) -> PyResult<()> {
        if view.is_null() {
            return Err(PyBufferError::new_err("Py_buffer pointer is null"));
        }
        let this = slf.get();
        let info = this.view.flags();
        if this.view.is_released() {
            return Err(buffer_error(slf.py(), skein_core::BufferError::Released));
        }
        if (flags & ffi::PyBUF_WRITABLE) == ffi::PyBUF_WRITABLE && !info.writable {
            return Err(PyBufferError::new_err("buffer is read-only"));
        }
        let requested = |mask: c_int| (flags & mask) == mask;
        let c_contiguous = this.view.is_c_contiguous();
        let f_contiguous = this.view.is_f_contiguous();
        let wants_strides = requested(ffi::PyBUF_STRIDES);
        if !c_contiguous && !wants_strides {
            return Err(PyBufferError::new_err(
                "buffer is not C-contiguous; consumer must accept strides",
            ));
        }
        if (requested(ffi::PyBUF_C_CONTIGUOUS) && !c_contiguous)
            || (requested(ffi::PyBUF_F_CONTIGUOUS) && !f_contiguous)
            || (requested(ffi::PyBUF_ANY_CONTIGUOUS) && !c_contiguous && !f_contiguous)
        {
            return Err(PyBufferError::new_err("buffer does not have the requested contiguity"));
        }
        let wants_shape = requested(ffi::PyBUF_ND);

        let export = Box::into_raw(Box::new(ExportShape {
            shape: this
                .view
                .shape()
                .iter()
                .map(|&d| d as ffi::Py_ssize_t)
                .collect(),
            strides: this
                .view
                .byte_strides()
                .iter()
                .map(|&s| s as ffi::Py_ssize_t)
                .collect(),
        }));

        // SAFETY: `view` is non-null and provided by the interpreter for us
        // to fill. `export` stays alive until `__releasebuffer__`. The data
        // pointer stays valid while `obj` holds a reference to `slf`,
        // which keeps the storage alive.
        unsafe {
            (*view).buf = this.view.as_ptr() as *mut c_void;
            (*view).len = (info.length * info.itemsize) as ffi::Py_ssize_t;
            (*view).readonly = c_int::from(!info.writable);
            (*view).itemsize = info.itemsize as ffi::Py_ssize_t;
            (*view).format = if (flags & ffi::PyBUF_FORMAT) == ffi::PyBUF_FORMAT {
                FORMAT.as_ptr() as *mut c_char
            } else {
                ptr::null_mut()
            };
            (*view).ndim = if wants_shape {
                (*export).shape.len() as c_int
            } else {
                1
            };
            (*view).shape = if wants_shape {
                (*export).shape.as_mut_ptr()
            } else {
                ptr::null_mut()
            };
            (*view).strides = if wants_strides {
                (*export).strides.as_mut_ptr()
            } else {
                ptr::null_mut()
            };
            (*view).suboffsets = ptr::null_mut();
            (*view).internal = export as *mut c_void;
            (*view).obj = slf.into_any().into_ptr();
        }
        Ok(())
    }

    unsafe fn __releasebuffer__(&self, view: *mut ffi::Py_buffer) {
        // SAFETY: `internal` was set from `Box::into_raw` in `__getbuffer__`
        // and is released exactly once per export.
        unsafe {
            let internal = (*view).internal;
            if !internal.is_null() {
                drop(Box::from_raw(internal as *mut ExportShape));
                (*view).internal = ptr::null_mut();
            }
        }
    }
}
