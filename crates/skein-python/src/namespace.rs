//! Auxiliary namespaces as script objects.
//!
//! Each [`AuxNamespace`] becomes a `skein.Namespace` registered in
//! `sys.modules` under its own name, so scripts can `import static_data`
//! and call `static_data.attr()`. Attribute access returns a callable
//! `skein.Accessor`; unknown names raise `UnknownAccessorError`, an
//! `AttributeError`, so `hasattr` works. Buffer-backed accessors return a
//! live `skein.Buffer` over host memory instead of a copy.

use pyo3::exceptions::PyAttributeError;
use pyo3::prelude::*;
use pyo3::types::PyList;
use pyo3::IntoPyObjectExt;

use skein_core::{AuxAccessor, AuxNamespace, AuxValue};

use crate::buffer::ScriptBuffer;
use crate::error::aux_error;

/// Script view of one auxiliary namespace.
#[pyclass(frozen, name = "Namespace", module = "skein")]
pub struct ScriptNamespace {
    inner: AuxNamespace,
}

impl ScriptNamespace {
    /// Wrap a namespace.
    pub fn new(inner: AuxNamespace) -> Self {
        Self { inner }
    }
}

#[pymethods]
impl ScriptNamespace {
    fn __getattr__(&self, py: Python<'_>, name: &str) -> PyResult<ScriptAccessor> {
        if name.starts_with("__") {
            return Err(PyAttributeError::new_err(name.to_string()));
        }
        let accessor = self.inner.accessor(name).map_err(|e| aux_error(py, e))?;
        Ok(ScriptAccessor {
            namespace: self.inner.name().to_string(),
            name: name.to_string(),
            accessor: accessor.clone(),
        })
    }

    fn __dir__(&self) -> Vec<String> {
        self.inner.iter().map(|(name, _)| name.to_string()).collect()
    }

    fn __repr__(&self) -> String {
        format!("<skein.Namespace '{}'>", self.inner.name())
    }
}

/// One named, side-effect-free accessor. Call it to get its value.
#[pyclass(frozen, name = "Accessor", module = "skein")]
pub struct ScriptAccessor {
    namespace: String,
    name: String,
    accessor: AuxAccessor,
}

#[pymethods]
impl ScriptAccessor {
    fn __call__(&self, py: Python<'_>) -> PyResult<Py<PyAny>> {
        if let Some(view) = self.accessor.view() {
            return Ok(Bound::new(py, ScriptBuffer::new(view.clone()))?
                .into_any()
                .unbind());
        }
        aux_to_py(py, &self.accessor.get())
    }

    fn __repr__(&self) -> String {
        format!("<skein.Accessor {}.{}>", self.namespace, self.name)
    }
}

/// Convert an auxiliary value. Arrays become nested lists in their shape.
pub(crate) fn aux_to_py(py: Python<'_>, value: &AuxValue) -> PyResult<Py<PyAny>> {
    match value {
        AuxValue::Bool(v) => v.into_py_any(py),
        AuxValue::Int(v) => v.into_py_any(py),
        AuxValue::Float(v) => v.into_py_any(py),
        AuxValue::Str(v) => v.as_str().into_py_any(py),
        AuxValue::FloatArray { values, shape } => nested(py, values, shape),
    }
}

fn nested(py: Python<'_>, values: &[f64], shape: &[usize]) -> PyResult<Py<PyAny>> {
    match shape {
        [] => values.first().copied().unwrap_or(f64::NAN).into_py_any(py),
        [_] => PyList::new(py, values)?.into_py_any(py),
        [n, rest @ ..] => {
            let chunk: usize = rest.iter().product();
            let rows = (0..*n)
                .map(|i| {
                    let row = values.get(i * chunk..(i + 1) * chunk).unwrap_or(&[]);
                    nested(py, row, rest)
                })
                .collect::<PyResult<Vec<_>>>()?;
            PyList::new(py, rows)?.into_py_any(py)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::UnknownAccessorError;

    #[test]
    fn arrays_convert_in_declared_shape() {
        Python::attach(|py| {
            let v = AuxValue::shaped(vec![1.0, 2.0, 3.0, 4.0, 5.0, 6.0], &[2, 3]).unwrap();
            let obj = aux_to_py(py, &v).unwrap();
            let rows: Vec<Vec<f64>> = obj.bind(py).extract().unwrap();
            assert_eq!(rows, vec![vec![1.0, 2.0, 3.0], vec![4.0, 5.0, 6.0]]);
        });
    }

    #[test]
    fn scalars_convert() {
        Python::attach(|py| {
            let s: String = aux_to_py(py, &AuxValue::from("euler"))
                .unwrap()
                .bind(py)
                .extract()
                .unwrap();
            assert_eq!(s, "euler");
            let i: i64 = aux_to_py(py, &AuxValue::Int(-3))
                .unwrap()
                .bind(py)
                .extract()
                .unwrap();
            assert_eq!(i, -3);
        });
    }

    #[test]
    fn unknown_accessor_raises_typed_error() {
        let ns = AuxNamespace::new("constants").value("g", 9.81).unwrap();
        Python::attach(|py| {
            let obj = Bound::new(py, ScriptNamespace::new(ns)).unwrap();
            let g: f64 = obj.getattr("g").unwrap().call0().unwrap().extract().unwrap();
            assert_eq!(g, 9.81);
            let err = obj.getattr("h").unwrap_err();
            assert!(err.is_instance_of::<UnknownAccessorError>(py));
            assert!(!obj.hasattr("h").unwrap());
            assert!(obj.hasattr("g").unwrap());
        });
    }

    #[test]
    fn buffer_accessor_returns_live_buffer() {
        let host = skein_core::BufferDescriptor::zeroed(3);
        let ns = AuxNamespace::new("grid")
            .buffer("cells", host.view())
            .unwrap();
        Python::attach(|py| {
            let obj = Bound::new(py, ScriptNamespace::new(ns)).unwrap();
            let cells = obj.getattr("cells").unwrap().call0().unwrap();
            assert!(cells.is_instance_of::<ScriptBuffer>());
            host.view().write(1, 4.5).unwrap();
            let v: f64 = cells.get_item(1).unwrap().extract().unwrap();
            assert_eq!(v, 4.5);
        });
    }
}
