//! Strongly-typed identifiers for runs and worker ordinals.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

/// Identifies one coordinated run of a module.
///
/// Allocated from a process-wide counter so that two coordinators never
/// hand out the same value. Ordinal registrations are tagged with the run
/// they belong to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct RunId(pub u64);

static NEXT_RUN_ID: AtomicU64 = AtomicU64::new(1);

impl RunId {
    /// Allocate the next run ID.
    pub fn next() -> Self {
        Self(NEXT_RUN_ID.fetch_add(1, Ordering::Relaxed))
    }
}

impl fmt::Display for RunId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "run#{}", self.0)
    }
}

/// A worker thread's small-integer identity within one run, in `[0, N)`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WorkerOrdinal(pub usize);

impl WorkerOrdinal {
    /// The ordinal as a buffer index.
    pub fn index(self) -> usize {
        self.0
    }
}

impl fmt::Display for WorkerOrdinal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<usize> for WorkerOrdinal {
    fn from(v: usize) -> Self {
        Self(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique_and_increasing() {
        let a = RunId::next();
        let b = RunId::next();
        assert!(b > a);
    }

    #[test]
    fn ordinal_display_is_bare_number() {
        assert_eq!(WorkerOrdinal(3).to_string(), "3");
        assert_eq!(RunId(7).to_string(), "run#7");
    }
}
