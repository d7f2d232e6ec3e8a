//! Integration test suite for the JIT debug interface
//!
//! Verifies that the installer and the registry work together across the
//! component boundary, on both detached registries and the process-wide one.

/// Re-export components for test convenience
pub mod components {
    pub use debug_info_installer;
    pub use jit_debug;
}

/// Stand-in for a compiler backend: a fake code buffer and the debug-info
/// blob describing it.
pub fn compile_stub(name: &str, code_size: usize) -> (Vec<u8>, Vec<u8>) {
    let code = vec![0xc3; code_size];
    let mut debug_info = b"\x7fELF".to_vec();
    debug_info.extend_from_slice(&(code.as_ptr() as u64).to_le_bytes());
    debug_info.extend_from_slice(&(code_size as u64).to_le_bytes());
    debug_info.extend_from_slice(name.as_bytes());
    (code, debug_info)
}
