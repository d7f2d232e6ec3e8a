//! Debugger-visible data structures.
//!
//! The layouts in this module are a binary contract with GDB and LLDB: the
//! debugger locates `__jit_debug_descriptor` by symbol name and decodes it
//! by offset. Field order and width must not change.
//!
//! Reference: <https://sourceware.org/gdb/current/onlinedocs/gdb.html/JIT-Interface.html>

use std::collections::HashSet;
use std::ptr;

use crate::error::{JitDebugError, JitDebugResult};

/// Descriptor version understood by debuggers.
pub const JIT_DESCRIPTOR_VERSION: u32 = 1;

/// Action recorded in the descriptor before the debugger hook fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum JitAction {
    /// No mutation in progress
    NoAction = 0,
    /// `relevant_entry` was just linked into the list
    Register = 1,
    /// `relevant_entry` is about to be unlinked from the list
    Unregister = 2,
}

impl JitAction {
    /// Decodes a raw `action_flag` value.
    pub fn from_raw(raw: u32) -> Option<Self> {
        match raw {
            0 => Some(JitAction::NoAction),
            1 => Some(JitAction::Register),
            2 => Some(JitAction::Unregister),
            _ => None,
        }
    }

    /// Raw value as stored in `action_flag`.
    pub fn as_raw(self) -> u32 {
        self as u32
    }
}

/// One registered code block (`struct jit_code_entry`).
#[derive(Debug)]
#[repr(C)]
pub struct JitCodeEntry {
    pub(crate) next_entry: *mut JitCodeEntry,
    pub(crate) prev_entry: *mut JitCodeEntry,
    pub(crate) symfile_addr: *const u8,
    pub(crate) symfile_size: u64,
}

impl JitCodeEntry {
    /// Address of the debug-info blob.
    pub fn symfile_addr(&self) -> *const u8 {
        self.symfile_addr
    }

    /// Length of the debug-info blob in bytes.
    pub fn symfile_size(&self) -> u64 {
        self.symfile_size
    }
}

/// The process-wide descriptor (`struct jit_descriptor`).
#[derive(Debug)]
#[repr(C)]
pub struct JitDescriptor {
    pub(crate) version: u32,
    // Kept as u32 rather than JitAction to pin the width.
    pub(crate) action_flag: u32,
    pub(crate) relevant_entry: *mut JitCodeEntry,
    pub(crate) first_entry: *mut JitCodeEntry,
}

impl JitDescriptor {
    /// An empty descriptor with the version already set.
    pub const fn new() -> Self {
        Self {
            version: JIT_DESCRIPTOR_VERSION,
            action_flag: JitAction::NoAction as u32,
            relevant_entry: ptr::null_mut(),
            first_entry: ptr::null_mut(),
        }
    }

    /// Descriptor version.
    pub fn version(&self) -> u32 {
        self.version
    }

    /// Decoded action flag, `None` if the raw value is unknown.
    pub fn action(&self) -> Option<JitAction> {
        JitAction::from_raw(self.action_flag)
    }

    /// Address of the entry affected by the current mutation, if any.
    pub fn relevant_entry(&self) -> Option<usize> {
        non_null_addr(self.relevant_entry)
    }

    /// Address of the list head, if any.
    pub fn first_entry(&self) -> Option<usize> {
        non_null_addr(self.first_entry)
    }

    /// Copies the descriptor and its entry list into owned values.
    ///
    /// A `&JitDescriptor` is only handed out while the owning registry's
    /// lock is held, so every entry reachable from `first_entry` is live.
    /// The walk stops at the first revisited node and records the cycle.
    pub fn snapshot(&self) -> DescriptorSnapshot {
        let mut entries = Vec::new();
        let mut visited = HashSet::new();
        let mut cyclic = false;
        let mut cursor = self.first_entry;

        while !cursor.is_null() {
            if !visited.insert(cursor as usize) {
                cyclic = true;
                break;
            }
            // SAFETY: entries reachable from first_entry are live while the
            // registry lock is held (see above).
            let entry = unsafe { &*cursor };
            entries.push(EntrySnapshot {
                id: cursor as usize,
                prev: non_null_addr(entry.prev_entry),
                next: non_null_addr(entry.next_entry),
                symfile_addr: entry.symfile_addr as usize,
                symfile_size: entry.symfile_size,
            });
            cursor = entry.next_entry;
        }

        DescriptorSnapshot {
            version: self.version,
            action_flag: self.action_flag,
            relevant_entry: self.relevant_entry(),
            entries,
            cyclic,
        }
    }
}

impl Default for JitDescriptor {
    fn default() -> Self {
        Self::new()
    }
}

fn non_null_addr<T>(ptr: *mut T) -> Option<usize> {
    if ptr.is_null() {
        None
    } else {
        Some(ptr as usize)
    }
}

/// Owned copy of a single list node.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EntrySnapshot {
    /// Address of the entry
    pub id: usize,
    /// Address of the predecessor
    pub prev: Option<usize>,
    /// Address of the successor
    pub next: Option<usize>,
    /// Address of the debug-info blob
    pub symfile_addr: usize,
    /// Length of the debug-info blob
    pub symfile_size: u64,
}

/// Owned copy of the descriptor, in list order starting at the head.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DescriptorSnapshot {
    /// Descriptor version
    pub version: u32,
    /// Raw action flag
    pub action_flag: u32,
    /// Address of the relevant entry
    pub relevant_entry: Option<usize>,
    /// Entries reachable from the head
    pub entries: Vec<EntrySnapshot>,
    /// Whether the walk hit a node twice
    pub cyclic: bool,
}

impl DescriptorSnapshot {
    /// Decoded action flag.
    pub fn action(&self) -> Option<JitAction> {
        JitAction::from_raw(self.action_flag)
    }

    /// Number of entries in the list.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the list is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Whether an entry with this address is reachable from the head.
    pub fn contains(&self, id: usize) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Entry addresses in list order.
    pub fn ids(&self) -> Vec<usize> {
        self.entries.iter().map(|e| e.id).collect()
    }

    /// Checks the version and the list invariants: acyclic, head without a
    /// predecessor, and every `next`/`prev` pair in agreement.
    pub fn verify(&self) -> JitDebugResult<()> {
        if self.version != JIT_DESCRIPTOR_VERSION {
            return Err(corrupt(format!("unexpected version {}", self.version)));
        }
        if self.action().is_none() {
            return Err(corrupt(format!("unknown action flag {}", self.action_flag)));
        }
        if self.cyclic {
            return Err(corrupt("entry list contains a cycle".to_string()));
        }
        if let Some(head) = self.entries.first() {
            if let Some(prev) = head.prev {
                return Err(corrupt(format!(
                    "head {:#x} has predecessor {:#x}",
                    head.id, prev
                )));
            }
        }
        for pair in self.entries.windows(2) {
            let (left, right) = (&pair[0], &pair[1]);
            if right.prev != Some(left.id) {
                return Err(corrupt(format!(
                    "{:#x}.next is {:#x} but its prev is {:?}",
                    left.id, right.id, right.prev
                )));
            }
        }
        Ok(())
    }
}

fn corrupt(reason: String) -> JitDebugError {
    JitDebugError::CorruptList { reason }
}

/// The descriptor GDB reads. Statically initialised so a debugger that
/// checks the version before the first registration still sees `1`.
#[allow(non_upper_case_globals)]
#[no_mangle]
#[used]
pub static mut __jit_debug_descriptor: JitDescriptor = JitDescriptor::new();

/// GDB puts a breakpoint in this function.
#[no_mangle]
#[inline(never)]
pub extern "C" fn __jit_debug_register_code() {
    // Keeps the body from being folded into its callers.
    // SAFETY: reading a local through a valid reference.
    unsafe { ptr::read_volatile(&0u8) };
}
