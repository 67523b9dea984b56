//! Worker thread identity provider.
//!
//! The coordinator registers each worker thread with its ordinal for the
//! duration of one `main` invocation. Module code (native or scripted)
//! asks for [`ordinal()`] and uses it as a partition key into the shared
//! buffer. Registration is thread-local, so the lookup is lock-free and
//! always answers for the *calling* thread.

use std::cell::Cell;
use std::marker::PhantomData;

use crate::error::IdentityError;
use crate::id::{RunId, WorkerOrdinal};

thread_local! {
    static CURRENT: Cell<Option<(RunId, WorkerOrdinal)>> = const { Cell::new(None) };
}

/// The calling thread's ordinal.
///
/// Fails with [`IdentityError::NotInWorkerContext`] on any thread that is
/// not currently executing a worker `main` (the host thread, the thread
/// running `initialize`/`finalize`, or an unrelated thread).
pub fn ordinal() -> Result<WorkerOrdinal, IdentityError> {
    CURRENT
        .with(|c| c.get())
        .map(|(_, o)| o)
        .ok_or(IdentityError::NotInWorkerContext)
}

/// The run the calling thread is registered for, if any.
pub fn current_run() -> Option<RunId> {
    CURRENT.with(|c| c.get()).map(|(r, _)| r)
}

/// Whether the calling thread is a registered worker.
pub fn in_worker_context() -> bool {
    CURRENT.with(|c| c.get()).is_some()
}

/// Register the calling thread as worker `ordinal` of `run`.
///
/// The registration lasts until the returned guard is dropped. Nested
/// registration restores the previous value on drop.
pub fn register(run: RunId, ordinal: WorkerOrdinal) -> OrdinalGuard {
    let previous = CURRENT.with(|c| c.replace(Some((run, ordinal))));
    OrdinalGuard {
        previous,
        _not_send: PhantomData,
    }
}

/// Clears the calling thread's worker registration on drop.
///
/// `!Send`: a guard must be dropped on the thread that created it.
#[must_use = "the registration ends when the guard is dropped"]
pub struct OrdinalGuard {
    previous: Option<(RunId, WorkerOrdinal)>,
    _not_send: PhantomData<*const ()>,
}

impl Drop for OrdinalGuard {
    fn drop(&mut self) {
        CURRENT.with(|c| c.set(self.previous));
    }
}
