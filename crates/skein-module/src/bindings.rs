//! The capability set bound into a module at load time.

use skein_core::{identity, AuxRegistry, BufferView, IdentityError, WorkerOrdinal};

/// Handle on the thread identity provider.
///
/// Zero-sized; the provider itself is thread-local state owned by
/// `skein_core::identity`. Holding this value documents that a module was
/// granted access to it.
#[derive(Clone, Copy, Debug, Default)]
pub struct ThreadIdentity;

impl ThreadIdentity {
    /// The calling thread's ordinal, or `NotInWorkerContext`.
    pub fn ordinal(&self) -> Result<WorkerOrdinal, IdentityError> {
        identity::ordinal()
    }
}

/// Everything the coordinator hands a module source at load time.
///
/// Script adapters inject these into the script's namespace; native
/// modules see the same capabilities through the phase contexts.
#[derive(Clone, Debug)]
pub struct Bindings {
    buffer: BufferView,
    identity: ThreadIdentity,
    aux: AuxRegistry,
}

impl Bindings {
    /// Bind a buffer view and auxiliary providers.
    pub fn new(buffer: BufferView, aux: AuxRegistry) -> Self {
        Self {
            buffer,
            identity: ThreadIdentity,
            aux,
        }
    }

    /// The shared buffer.
    pub fn buffer(&self) -> &BufferView {
        &self.buffer
    }

    /// The thread identity provider.
    pub fn identity(&self) -> ThreadIdentity {
        self.identity
    }

    /// Auxiliary read-only providers.
    pub fn aux(&self) -> &AuxRegistry {
        &self.aux
    }
}
