//! C entry points for runtimes that are not written in Rust.
//!
//! ```c
//! struct jit_code_entry *register_jit_code(const char *addr, uint64_t size);
//! void unregister_jit_code(struct jit_code_entry *const entry);
//! ```

use std::os::raw::c_char;
use std::ptr;

use tracing::warn;

use crate::descriptor::JitCodeEntry;
use crate::registry::Registry;

/// Registers `size` bytes at `addr` with the process-wide registry.
///
/// Returns the new entry, or null if `addr` is null or the entry could not
/// be allocated.
///
/// # Safety
///
/// The blob must stay valid until the entry is passed to
/// [`unregister_jit_code`].
#[no_mangle]
pub unsafe extern "C" fn register_jit_code(addr: *const c_char, size: u64) -> *mut JitCodeEntry {
    match Registry::global().register(addr.cast(), size) {
        Ok(handle) => handle.as_ptr(),
        Err(err) => {
            warn!(%err, "register_jit_code failed");
            ptr::null_mut()
        }
    }
}

/// Unregisters an entry returned by [`register_jit_code`].
///
/// Unknown, null and already-unregistered entries are logged and ignored.
#[no_mangle]
pub extern "C" fn unregister_jit_code(entry: *mut JitCodeEntry) {
    if let Err(err) = Registry::global().unregister_raw(entry) {
        warn!(%err, "unregister_jit_code ignored");
    }
}
