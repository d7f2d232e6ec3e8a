//! Notification seam between the registry and whoever observes it.

use crate::descriptor::{JitDescriptor, __jit_debug_register_code};

/// Invoked synchronously after every registry mutation, while the registry
/// lock is held and the list is fully linked.
///
/// Implementations must return promptly and must not call back into the
/// registry that invoked them. If one panics, the mutation it was told
/// about still stands and the descriptor returns to `NoAction`.
pub trait Notifier: Send + Sync {
    /// Called with the descriptor in its just-mutated state.
    fn notify(&self, descriptor: &JitDescriptor);
}

/// Traps into an attached debugger through `__jit_debug_register_code`.
///
/// This is the only notifier wired to the process-wide registry.
#[derive(Debug, Default, Clone, Copy)]
pub struct GdbNotifier;

impl Notifier for GdbNotifier {
    #[inline]
    fn notify(&self, _descriptor: &JitDescriptor) {
        __jit_debug_register_code();
    }
}

impl<F> Notifier for F
where
    F: Fn(&JitDescriptor) + Send + Sync,
{
    fn notify(&self, descriptor: &JitDescriptor) {
        self(descriptor)
    }
}
