//! Per-module lifecycle state machine.
//!
//! ```text
//! Unloaded ──initialized()──▶ Initialized ──start(n)──▶ Running{n of n}
//!                                                          │ complete_one() × n
//!                                                          ▼
//!                              Finalized ◀──finalized()── Running{0 of n}
//! ```
//!
//! No transition skips a state. The coordinator drives one [`Lifecycle`]
//! per run and treats an illegal transition as a bug.

use std::error::Error;
use std::fmt;

/// Where a module is in its lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LifecycleState {
    /// Not loaded, or loaded but `initialize` has not completed.
    Unloaded,
    /// `initialize` completed.
    Initialized,
    /// `main` dispatched to `total` workers, `pending` not yet finished.
    Running {
        /// Workers still executing `main`.
        pending: usize,
        /// Workers dispatched.
        total: usize,
    },
    /// `finalize` has begun.
    Finalized,
}

impl fmt::Display for LifecycleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Unloaded => write!(f, "unloaded"),
            Self::Initialized => write!(f, "initialized"),
            Self::Running { pending, total } => write!(f, "running ({pending} of {total} pending)"),
            Self::Finalized => write!(f, "finalized"),
        }
    }
}

/// An illegal lifecycle transition.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LifecycleError {
    /// The requested transition is not allowed from the current state.
    InvalidTransition {
        /// State at the time of the request.
        from: LifecycleState,
        /// Name of the requested transition.
        to: &'static str,
    },
}

impl fmt::Display for LifecycleError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidTransition { from, to } => {
                write!(f, "cannot transition to {to} from {from}")
            }
        }
    }
}

impl Error for LifecycleError {}

/// Lifecycle tracker for one module run.
#[derive(Clone, Debug)]
pub struct Lifecycle {
    state: LifecycleState,
}

impl Default for Lifecycle {
    fn default() -> Self {
        Self::new()
    }
}

impl Lifecycle {
    /// Start in [`LifecycleState::Unloaded`].
    pub fn new() -> Self {
        Self {
            state: LifecycleState::Unloaded,
        }
    }

    /// Current state.
    pub fn state(&self) -> LifecycleState {
        self.state
    }

    fn invalid(&self, to: &'static str) -> LifecycleError {
        LifecycleError::InvalidTransition {
            from: self.state,
            to,
        }
    }

    /// `Unloaded → Initialized`.
    pub fn initialized(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Unloaded => {
                self.state = LifecycleState::Initialized;
                Ok(())
            }
            _ => Err(self.invalid("initialized")),
        }
    }

    /// `Initialized → Running { total, total }`. `total` must be non-zero.
    pub fn start(&mut self, total: usize) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Initialized if total > 0 => {
                self.state = LifecycleState::Running {
                    pending: total,
                    total,
                };
                Ok(())
            }
            _ => Err(self.invalid("running")),
        }
    }

    /// Record one finished `main`. Returns the number still pending.
    pub fn complete_one(&mut self) -> Result<usize, LifecycleError> {
        match self.state {
            LifecycleState::Running { pending, total } if pending > 0 => {
                self.state = LifecycleState::Running {
                    pending: pending - 1,
                    total,
                };
                Ok(pending - 1)
            }
            _ => Err(self.invalid("complete_one")),
        }
    }

    /// `Running { 0, _ } → Finalized`.
    pub fn finalized(&mut self) -> Result<(), LifecycleError> {
        match self.state {
            LifecycleState::Running { pending: 0, .. } => {
                self.state = LifecycleState::Finalized;
                Ok(())
            }
            _ => Err(self.invalid("finalized")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn full_cycle() {
        let mut lc = Lifecycle::new();
        lc.initialized().unwrap();
        lc.start(2).unwrap();
        assert_eq!(lc.complete_one(), Ok(1));
        assert_eq!(lc.complete_one(), Ok(0));
        lc.finalized().unwrap();
        assert_eq!(lc.state(), LifecycleState::Finalized);
    }

    #[test]
    fn cannot_run_before_initialize() {
        let mut lc = Lifecycle::new();
        assert_eq!(
            lc.start(1),
            Err(LifecycleError::InvalidTransition {
                from: LifecycleState::Unloaded,
                to: "running"
            })
        );
    }

    #[test]
    fn cannot_finalize_while_workers_pending() {
        let mut lc = Lifecycle::new();
        lc.initialized().unwrap();
        lc.start(3).unwrap();
        lc.complete_one().unwrap();
        let err = lc.finalized().unwrap_err();
        assert_eq!(
            err.to_string(),
            "cannot transition to finalized from running (2 of 3 pending)"
        );
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut lc = Lifecycle::new();
        lc.initialized().unwrap();
        assert!(lc.start(0).is_err());
    }

    #[test]
    fn cannot_skip_from_unloaded_to_finalized() {
        let mut lc = Lifecycle::new();
        assert!(lc.finalized().is_err());
        assert!(lc.complete_one().is_err());
    }

    proptest! {
        #[test]
        fn finalize_allowed_only_after_exactly_n_completions(n in 1usize..64, k in 0usize..64) {
            let mut lc = Lifecycle::new();
            lc.initialized().unwrap();
            lc.start(n).unwrap();
            let done = k.min(n);
            for _ in 0..done {
                lc.complete_one().unwrap();
            }
            prop_assert_eq!(lc.finalized().is_ok(), done == n);
        }
    }
}
