//! Auxiliary read-only data providers.
//!
//! Hosts expose static lookup values to modules through named namespaces
//! of side-effect-free accessors. An accessor is one of:
//!
//! - a fixed [`AuxValue`],
//! - a zero-argument function evaluated on every call,
//! - a keyed "case" function called with a fixed string key, for hosts
//!   that serve many values from one lookup routine,
//! - a live [`BufferView`] over host memory. Scripts receive the view
//!   itself, so host writes after binding are visible to the script and
//!   script writes reach the host.
//!
//! Namespaces and accessors keep registration order (`IndexMap`) so the
//! bound script namespace is deterministic.

use std::fmt;
use std::sync::Arc;

use indexmap::IndexMap;
use smallvec::SmallVec;

use crate::buffer::{BufferView, Order, Shape};
use crate::error::AuxError;

/// A primitive or array value returned by an accessor.
#[derive(Clone, Debug, PartialEq)]
pub enum AuxValue {
    /// Boolean.
    Bool(bool),
    /// Signed integer.
    Int(i64),
    /// Floating point.
    Float(f64),
    /// String.
    Str(String),
    /// Row-major array of floats with an explicit shape.
    FloatArray {
        /// Flat values, row-major.
        values: Vec<f64>,
        /// Dimension sizes; product equals `values.len()`.
        shape: SmallVec<[usize; 4]>,
    },
}

impl AuxValue {
    /// A 1-D float array.
    pub fn array(values: Vec<f64>) -> Self {
        let len = values.len();
        Self::FloatArray {
            values,
            shape: SmallVec::from_slice(&[len]),
        }
    }

    /// An n-D float array. Fails if the shape does not cover the values.
    pub fn shaped(values: Vec<f64>, shape: &[usize]) -> Result<Self, AuxError> {
        let expected = shape.iter().product::<usize>();
        if expected != values.len() {
            return Err(AuxError::ShapeMismatch {
                values: values.len(),
                expected,
            });
        }
        Ok(Self::FloatArray {
            values,
            shape: SmallVec::from_slice(shape),
        })
    }

    /// Numeric value as `f64`, if this is a scalar number.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Int(v) => Some(*v as f64),
            Self::Float(v) => Some(*v),
            _ => None,
        }
    }
}

impl From<bool> for AuxValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<i64> for AuxValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<f64> for AuxValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<&str> for AuxValue {
    fn from(v: &str) -> Self {
        Self::Str(v.to_string())
    }
}

impl From<String> for AuxValue {
    fn from(v: String) -> Self {
        Self::Str(v)
    }
}

type ValueFn = Arc<dyn Fn() -> AuxValue + Send + Sync>;
type CaseFn = Arc<dyn Fn(&str) -> AuxValue + Send + Sync>;

/// One named accessor.
#[derive(Clone)]
pub enum AuxAccessor {
    /// Fixed value.
    Value(AuxValue),
    /// Evaluated on every call.
    Func(ValueFn),
    /// Evaluated on every call with a fixed key.
    Case {
        /// Key passed to the lookup function.
        key: String,
        /// Lookup function.
        lookup: CaseFn,
    },
    /// Live host array. [`get`](Self::get) copies it; script adapters
    /// hand out the view.
    Buffer(BufferView),
}

impl AuxAccessor {
    /// Evaluate the accessor.
    pub fn get(&self) -> AuxValue {
        match self {
            Self::Value(v) => v.clone(),
            Self::Func(f) => f(),
            Self::Case { key, lookup } => lookup(key),
            Self::Buffer(view) => copy_of(view),
        }
    }

    /// The backing view, for [`AuxAccessor::Buffer`].
    pub fn view(&self) -> Option<&BufferView> {
        match self {
            Self::Buffer(view) => Some(view),
            _ => None,
        }
    }
}

/// Row-major copy of a view. A released view copies as an empty array.
fn copy_of(view: &BufferView) -> AuxValue {
    let Ok(cells) = view.snapshot() else {
        return AuxValue::array(Vec::new());
    };
    let shape = view.shape();
    let values = match view.order() {
        Order::RowMajor => cells,
        Order::ColumnMajor => (0..cells.len())
            .map(|mut p| {
                let mut coords: Shape = SmallVec::from_elem(0, shape.len());
                for k in (0..shape.len()).rev() {
                    coords[k] = p % shape[k];
                    p /= shape[k];
                }
                view.index_of(&coords)
                    .ok()
                    .and_then(|i| cells.get(i).copied())
                    .unwrap_or(f64::NAN)
            })
            .collect(),
    };
    AuxValue::FloatArray {
        values,
        shape: SmallVec::from_slice(shape),
    }
}

impl fmt::Debug for AuxAccessor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Value(v) => f.debug_tuple("Value").field(v).finish(),
            Self::Func(_) => f.write_str("Func(..)"),
            Self::Case { key, .. } => f.debug_struct("Case").field("key", key).finish(),
            Self::Buffer(view) => f.debug_tuple("Buffer").field(view).finish(),
        }
    }
}

/// A named set of accessors, bound into scripts as one module object.
#[derive(Clone, Debug)]
pub struct AuxNamespace {
    name: String,
    accessors: IndexMap<String, AuxAccessor>,
}

impl AuxNamespace {
    /// Empty namespace.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            accessors: IndexMap::new(),
        }
    }

    /// Namespace name.
    pub fn name(&self) -> &str {
        &self.name
    }

    fn insert(&mut self, name: String, accessor: AuxAccessor) -> Result<(), AuxError> {
        if self.accessors.contains_key(&name) {
            return Err(AuxError::Duplicate { name });
        }
        self.accessors.insert(name, accessor);
        Ok(())
    }

    /// Add a fixed value.
    pub fn value(
        mut self,
        name: impl Into<String>,
        value: impl Into<AuxValue>,
    ) -> Result<Self, AuxError> {
        self.insert(name.into(), AuxAccessor::Value(value.into()))?;
        Ok(self)
    }

    /// Add a zero-argument function accessor.
    pub fn func<F>(mut self, name: impl Into<String>, f: F) -> Result<Self, AuxError>
    where
        F: Fn() -> AuxValue + Send + Sync + 'static,
    {
        self.insert(name.into(), AuxAccessor::Func(Arc::new(f)))?;
        Ok(self)
    }

    /// Add a keyed accessor: calling `name` evaluates `lookup(key)`.
    pub fn case<F>(
        mut self,
        name: impl Into<String>,
        key: impl Into<String>,
        lookup: F,
    ) -> Result<Self, AuxError>
    where
        F: Fn(&str) -> AuxValue + Send + Sync + 'static,
    {
        let accessor = AuxAccessor::Case {
            key: key.into(),
            lookup: Arc::new(lookup),
        };
        self.insert(name.into(), accessor)?;
        Ok(self)
    }

    /// Add a live array accessor over `view`.
    pub fn buffer(mut self, name: impl Into<String>, view: BufferView) -> Result<Self, AuxError> {
        self.insert(name.into(), AuxAccessor::Buffer(view))?;
        Ok(self)
    }

    /// Evaluate accessor `name`.
    pub fn get(&self, name: &str) -> Result<AuxValue, AuxError> {
        self.accessor(name).map(AuxAccessor::get)
    }

    /// Accessor `name`, unevaluated.
    pub fn accessor(&self, name: &str) -> Result<&AuxAccessor, AuxError> {
        self.accessors
            .get(name)
            .ok_or_else(|| AuxError::UnknownAccessor {
                namespace: self.name.clone(),
                name: name.to_string(),
            })
    }

    /// Accessors in registration order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &AuxAccessor)> {
        self.accessors.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Number of accessors.
    pub fn len(&self) -> usize {
        self.accessors.len()
    }

    /// Whether there are no accessors.
    pub fn is_empty(&self) -> bool {
        self.accessors.is_empty()
    }
}

/// All auxiliary namespaces bound for a run. Cheap to clone.
#[derive(Clone, Debug, Default)]
pub struct AuxRegistry {
    namespaces: Arc<IndexMap<String, AuxNamespace>>,
}

impl AuxRegistry {
    /// Empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a namespace. Fails if the name is already taken.
    pub fn with(mut self, namespace: AuxNamespace) -> Result<Self, AuxError> {
        let map = Arc::make_mut(&mut self.namespaces);
        if map.contains_key(namespace.name()) {
            return Err(AuxError::Duplicate {
                name: namespace.name().to_string(),
            });
        }
        map.insert(namespace.name().to_string(), namespace);
        Ok(self)
    }

    /// Look up a namespace.
    pub fn namespace(&self, name: &str) -> Result<&AuxNamespace, AuxError> {
        self.namespaces
            .get(name)
            .ok_or_else(|| AuxError::UnknownNamespace {
                namespace: name.to_string(),
            })
    }

    /// Evaluate `namespace.accessor`.
    pub fn get(&self, namespace: &str, accessor: &str) -> Result<AuxValue, AuxError> {
        self.namespace(namespace)?.get(accessor)
    }

    /// The live view behind `namespace.accessor`, if it is an array
    /// accessor.
    pub fn view(&self, namespace: &str, accessor: &str) -> Result<Option<&BufferView>, AuxError> {
        Ok(self.namespace(namespace)?.accessor(accessor)?.view())
    }

    /// Namespaces in registration order.
    pub fn iter(&self) -> impl Iterator<Item = &AuxNamespace> {
        self.namespaces.values()
    }

    /// Number of namespaces.
    pub fn len(&self) -> usize {
        self.namespaces.len()
    }

    /// Whether there are no namespaces.
    pub fn is_empty(&self) -> bool {
        self.namespaces.is_empty()
    }
}
