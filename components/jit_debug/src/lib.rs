//! GDB JIT compilation interface
//!
//! Publishes descriptions of runtime-generated machine code so that an
//! attached debugger can symbolize, unwind and show source for it.
//!
//! This crate provides:
//! - `__jit_debug_descriptor`: the descriptor debuggers locate by name
//! - `__jit_debug_register_code`: the hook debuggers break on
//! - [`Registry`]: serialized `register`/`unregister` over the entry list
//! - C entry points `register_jit_code` / `unregister_jit_code`
//!
//! The debug-info blob (typically an in-memory ELF object) is produced by the
//! caller and treated as opaque bytes.
//!
//! # Example
//!
//! ```
//! use jit_debug::Registry;
//!
//! static SYMFILE: &[u8] = b"\x7fELF...";
//!
//! let registry = Registry::global();
//! let handle = registry.register_static(SYMFILE).unwrap();
//! assert!(registry.snapshot().contains(handle.id()));
//!
//! registry.unregister(handle).unwrap();
//! assert!(!registry.is_registered(&handle));
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod descriptor;
pub mod error;
pub mod ffi;
pub mod notifier;
pub mod registry;

// Re-export main types at crate root
pub use descriptor::{
    DescriptorSnapshot, EntrySnapshot, JitAction, JitCodeEntry, JitDescriptor,
    JIT_DESCRIPTOR_VERSION,
};
pub use error::{JitDebugError, JitDebugResult};
pub use notifier::{GdbNotifier, Notifier};
pub use registry::{EntryHandle, Registry};
