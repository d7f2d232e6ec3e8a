//! Error types for JIT code registration.

use thiserror::Error;

/// Errors raised by [`Registry`](crate::Registry) operations.
///
/// Allocation failure is the only internal failure mode. The remaining
/// variants report caller misuse that was rejected before the list was
/// touched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum JitDebugError {
    /// The code entry could not be allocated; nothing was linked.
    #[error("failed to allocate a {size}-byte JIT code entry")]
    AllocationFailed {
        /// Requested allocation size in bytes
        size: usize,
    },

    /// The debug-info blob pointer was null.
    #[error("debug-info blob pointer is null")]
    NullBlob,

    /// The handle was issued by another registry.
    #[error("handle belongs to registry {found}, not registry {expected}")]
    ForeignHandle {
        /// Identifier of the registry the operation was invoked on
        expected: u64,
        /// Identifier of the registry that issued the handle
        found: u64,
    },

    /// The entry is not (or no longer) registered.
    #[error("JIT code entry {entry:#x} is not registered")]
    NotRegistered {
        /// Address of the entry
        entry: usize,
    },

    /// The descriptor or its entry list violates a structural invariant.
    #[error("corrupt JIT descriptor: {reason}")]
    CorruptList {
        /// Description of the violated invariant
        reason: String,
    },
}

/// Result type for registry operations
pub type JitDebugResult<T> = Result<T, JitDebugError>;
