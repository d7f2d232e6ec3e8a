//! Error types for the installer

use std::path::PathBuf;

use jit_debug::JitDebugError;
use thiserror::Error;

use crate::handle::HandleState;

/// Installer-specific errors
#[derive(Debug, Error)]
pub enum InstallerError {
    /// Registration with the debugger interface failed
    #[error("JIT registration failed: {0}")]
    Registration(#[from] JitDebugError),

    /// A handle operation was attempted in the wrong state
    #[error("debug-info handle is {found}, expected {expected}")]
    InvalidState {
        /// State the operation requires
        expected: HandleState,
        /// State the handle was in
        found: HandleState,
    },

    /// The debug-info blob was empty
    #[error("debug info for {name} is empty")]
    EmptyDebugInfo {
        /// Compilation name
        name: String,
    },

    /// Configuration could not be parsed
    #[error("invalid installer configuration: {0}")]
    Config(#[from] serde_json::Error),

    /// Writing a dump file failed
    #[error("failed to dump debug info to {path:?}: {source}")]
    Dump {
        /// Target file
        path: PathBuf,
        /// Underlying I/O error
        #[source]
        source: std::io::Error,
    },
}

/// Result type for installer operations
pub type InstallerResult<T> = Result<T, InstallerError>;
