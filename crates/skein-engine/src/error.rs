//! Errors returned by [`Coordinator::run`](crate::Coordinator::run).

use std::error::Error;
use std::fmt;

use skein_core::{EntryPoint, LoadError};
use skein_module::LifecycleError;

use crate::report::RunReport;

/// Why a run did not complete cleanly.
///
/// The first three variants are detected before any entry point is
/// called. [`RunError::LifecyclePhase`] carries the full report so the
/// host can inspect which phases faulted and which succeeded.
#[derive(Debug)]
pub enum RunError {
    /// `thread_count` was zero or above the configured maximum.
    InvalidThreadCount {
        /// Requested worker count.
        requested: usize,
        /// Configured maximum.
        max: usize,
    },
    /// The module could not be resolved or failed to load.
    ModuleLoad {
        /// Module name.
        module: String,
        /// Underlying reason.
        reason: String,
    },
    /// The module lacks a required entry point. No entry point was called.
    EntryPointMissing {
        /// Module name.
        module: String,
        /// The missing entry point.
        entry_point: EntryPoint,
    },
    /// One or more entry points faulted. The report is complete.
    LifecyclePhase(Box<RunReport>),
    /// A worker thread could not be spawned.
    WorkerSpawnFailed {
        /// OS error description.
        reason: String,
    },
    /// Internal lifecycle bookkeeping was violated.
    Lifecycle(LifecycleError),
}

impl RunError {
    /// The run report, if any entry point ran.
    pub fn report(&self) -> Option<&RunReport> {
        match self {
            Self::LifecyclePhase(report) => Some(report),
            _ => None,
        }
    }
}

impl fmt::Display for RunError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidThreadCount { requested, max } => {
                write!(f, "thread_count {requested} outside [1, {max}]")
            }
            Self::ModuleLoad { module, reason } => {
                write!(f, "failed to load module '{module}': {reason}")
            }
            Self::EntryPointMissing {
                module,
                entry_point,
            } => write!(
                f,
                "module '{module}' does not define entry point '{entry_point}'"
            ),
            Self::LifecyclePhase(report) => write!(f, "{report}"),
            Self::WorkerSpawnFailed { reason } => {
                write!(f, "failed to spawn worker thread: {reason}")
            }
            Self::Lifecycle(e) => write!(f, "lifecycle: {e}"),
        }
    }
}

impl Error for RunError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Lifecycle(e) => Some(e),
            _ => None,
        }
    }
}

impl From<LoadError> for RunError {
    fn from(e: LoadError) -> Self {
        match e {
            LoadError::ModuleLoad { module, reason } => Self::ModuleLoad { module, reason },
            LoadError::EntryPointMissing {
                module,
                entry_point,
            } => Self::EntryPointMissing {
                module,
                entry_point,
            },
        }
    }
}

impl From<LifecycleError> for RunError {
    fn from(e: LifecycleError) -> Self {
        Self::Lifecycle(e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_error_maps_variant_for_variant() {
        let err = RunError::from(LoadError::EntryPointMissing {
            module: "template".into(),
            entry_point: EntryPoint::Finalize,
        });
        assert!(matches!(
            err,
            RunError::EntryPointMissing {
                entry_point: EntryPoint::Finalize,
                ..
            }
        ));
        assert_eq!(
            err.to_string(),
            "module 'template' does not define entry point 'finalize'"
        );
        assert!(err.report().is_none());
    }

    #[test]
    fn invalid_thread_count_message() {
        let err = RunError::InvalidThreadCount {
            requested: 0,
            max: 8,
        };
        assert_eq!(err.to_string(), "thread_count 0 outside [1, 8]");
    }
}
