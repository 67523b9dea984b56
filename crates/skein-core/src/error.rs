//! Error types for the Skein scripting bridge.
//!
//! Organized by subsystem: buffer access, thread identity, auxiliary
//! providers, module loading, and per-phase module faults.

use std::error::Error;
use std::fmt;

use crate::id::WorkerOrdinal;

/// Errors from shared buffer access.
///
/// Reported to the faulting worker; never aborts sibling workers.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BufferError {
    /// Index outside `[0, length)`.
    OutOfRange {
        /// The rejected index.
        index: usize,
        /// Logical length of the buffer.
        length: usize,
    },
    /// The buffer was exposed read-only.
    NotWritable {
        /// The index the caller tried to write.
        index: usize,
    },
    /// A registered worker wrote an index other than its own ordinal
    /// while slot ownership enforcement was on.
    ForeignSlotWrite {
        /// The index the caller tried to write.
        index: usize,
        /// The writing worker's ordinal.
        ordinal: WorkerOrdinal,
    },
    /// The host released the descriptor; views are dangling.
    Released,
    /// A shape whose cell count differs from the buffer length.
    ShapeMismatch {
        /// Number of values supplied.
        length: usize,
        /// Product of the shape's dimensions.
        cells: usize,
    },
    /// A multi-index with the wrong number of coordinates.
    DimensionMismatch {
        /// Dimensions of the buffer.
        expected: usize,
        /// Coordinates supplied.
        actual: usize,
    },
}

impl fmt::Display for BufferError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::OutOfRange { index, length } => {
                write!(f, "index {index} out of range for buffer of length {length}")
            }
            Self::NotWritable { index } => {
                write!(f, "buffer is read-only (write at index {index})")
            }
            Self::ForeignSlotWrite { index, ordinal } => {
                write!(f, "worker {ordinal} wrote foreign slot {index}")
            }
            Self::Released => write!(f, "buffer released by host"),
            Self::ShapeMismatch { length, cells } => {
                write!(f, "shape covers {cells} cells but {length} values were given")
            }
            Self::DimensionMismatch { expected, actual } => {
                write!(f, "expected {expected} coordinates, got {actual}")
            }
        }
    }
}

impl Error for BufferError {}

/// Errors from the thread identity provider.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum IdentityError {
    /// The calling thread is not a registered worker.
    NotInWorkerContext,
}

impl fmt::Display for IdentityError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::NotInWorkerContext => write!(f, "calling thread is not a registered worker"),
        }
    }
}

impl Error for IdentityError {}

/// Errors from auxiliary data provider lookups.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum AuxError {
    /// No namespace with this name is registered.
    UnknownNamespace {
        /// The requested namespace.
        namespace: String,
    },
    /// The namespace exists but has no accessor with this name.
    UnknownAccessor {
        /// The namespace searched.
        namespace: String,
        /// The requested accessor.
        name: String,
    },
    /// An array value's shape does not match its element count.
    ShapeMismatch {
        /// Number of values supplied.
        values: usize,
        /// Product of the declared shape.
        expected: usize,
    },
    /// An accessor or namespace name was registered twice.
    Duplicate {
        /// The duplicated name.
        name: String,
    },
}

impl fmt::Display for AuxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownNamespace { namespace } => {
                write!(f, "unknown auxiliary namespace '{namespace}'")
            }
            Self::UnknownAccessor { namespace, name } => {
                write!(f, "namespace '{namespace}' has no accessor '{name}'")
            }
            Self::ShapeMismatch { values, expected } => {
                write!(f, "array has {values} values but shape implies {expected}")
            }
            Self::Duplicate { name } => write!(f, "'{name}' registered twice"),
        }
    }
}

impl Error for AuxError {}

/// The three required module entry points.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum EntryPoint {
    /// Called once before any worker runs.
    Initialize,
    /// Called once per worker.
    Main,
    /// Called once after every worker finished.
    Finalize,
}

impl EntryPoint {
    /// All entry points in lifecycle order.
    pub const ALL: [EntryPoint; 3] = [Self::Initialize, Self::Main, Self::Finalize];

    /// The name a script module must export.
    pub fn name(self) -> &'static str {
        match self {
            Self::Initialize => "initialize",
            Self::Main => "main",
            Self::Finalize => "finalize",
        }
    }
}

impl fmt::Display for EntryPoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Errors from resolving and loading a module.
///
/// Both variants are fatal: no lifecycle call is made.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadError {
    /// The module could not be resolved or failed while loading.
    ModuleLoad {
        /// Module name.
        module: String,
        /// Human-readable cause.
        reason: String,
    },
    /// The module does not expose one of the three entry points.
    EntryPointMissing {
        /// Module name.
        module: String,
        /// The first missing entry point in lifecycle order.
        entry_point: EntryPoint,
    },
}

impl fmt::Display for LoadError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ModuleLoad { module, reason } => {
                write!(f, "failed to load module '{module}': {reason}")
            }
            Self::EntryPointMissing {
                module,
                entry_point,
            } => write!(f, "module '{module}' does not define '{entry_point}'"),
        }
    }
}

impl Error for LoadError {}

/// A fault raised by one module entry point invocation.
///
/// Stored in the faulting phase's report slot.
#[derive(Clone, Debug, PartialEq)]
pub enum ModuleFault {
    /// Shared buffer contract violation.
    Buffer(BufferError),
    /// Thread identity misuse.
    Identity(IdentityError),
    /// Auxiliary provider misuse.
    Aux(AuxError),
    /// The entry point reported a failure (script exception or returned error).
    Failed {
        /// Human-readable description.
        reason: String,
    },
    /// The entry point panicked.
    Panicked {
        /// Panic payload, if it was a string.
        message: String,
    },
    /// The worker thread died without reporting an outcome.
    WorkerLost,
}

impl ModuleFault {
    /// Convenience constructor for [`ModuleFault::Failed`].
    pub fn failed(reason: impl Into<String>) -> Self {
        Self::Failed {
            reason: reason.into(),
        }
    }
}

impl fmt::Display for ModuleFault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Buffer(e) => write!(f, "buffer: {e}"),
            Self::Identity(e) => write!(f, "identity: {e}"),
            Self::Aux(e) => write!(f, "aux: {e}"),
            Self::Failed { reason } => write!(f, "failed: {reason}"),
            Self::Panicked { message } => write!(f, "panicked: {message}"),
            Self::WorkerLost => write!(f, "worker thread lost"),
        }
    }
}

impl Error for ModuleFault {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Buffer(e) => Some(e),
            Self::Identity(e) => Some(e),
            Self::Aux(e) => Some(e),
            _ => None,
        }
    }
}

impl From<BufferError> for ModuleFault {
    fn from(e: BufferError) -> Self {
        Self::Buffer(e)
    }
}

impl From<IdentityError> for ModuleFault {
    fn from(e: IdentityError) -> Self {
        Self::Identity(e)
    }
}

impl From<AuxError> for ModuleFault {
    fn from(e: AuxError) -> Self {
        Self::Aux(e)
    }
}
