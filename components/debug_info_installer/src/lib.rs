//! Debug-info installation for JIT-compiled code
//!
//! Sits between the compiler and the [`jit_debug`] registry: the compiler
//! hands over the debug-info blob it built for a code object, and the
//! installer keeps it alive, optionally dumps it to disk, and publishes or
//! retracts it as the code object is activated and released.
//!
//! - [`DebugInfoInstaller`]: creates handles, applies configuration
//! - [`DebugInfoHandle`]: owns one blob and its registration
//! - [`InstallerConfig`]: enable flag and dump directory

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod handle;
pub mod installer;

pub use config::InstallerConfig;
pub use error::{InstallerError, InstallerResult};
pub use handle::{DebugInfoHandle, HandleState};
pub use installer::{dump_to, DebugInfoInstaller};
