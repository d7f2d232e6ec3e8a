//! Registration and removal of JIT code entries.
//!
//! The process controls access to `__jit_debug_descriptor` by itself. The
//! debugger only reads the structure at process startup and while the
//! process is stopped in `__jit_debug_register_code`, so every mutation is
//! completed before the hook fires and all of them are serialized by one
//! lock held across mutate-then-notify.

use std::alloc::{alloc, dealloc, Layout};
use std::collections::HashMap;
use std::fmt;
use std::mem::size_of;
use std::ptr::{self, NonNull};
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use tracing::debug;

use crate::descriptor::{
    DescriptorSnapshot, JitAction, JitCodeEntry, JitDescriptor, __jit_debug_descriptor,
};
use crate::error::{JitDebugError, JitDebugResult};
use crate::notifier::{GdbNotifier, Notifier};

static NEXT_REGISTRY_ID: AtomicU64 = AtomicU64::new(1);

static GLOBAL_REGISTRY: Lazy<Registry> = Lazy::new(|| {
    // SAFETY: the address of a static is never null.
    let descriptor =
        unsafe { NonNull::new_unchecked(ptr::addr_of_mut!(__jit_debug_descriptor)) };
    Registry::from_parts(descriptor, false, GdbNotifier)
});

/// Opaque token for one registered entry.
///
/// Handles are plain values: copying one does not register anything twice.
/// Each handle remembers which registry issued it and which registration it
/// stands for, so stale or foreign handles are rejected instead of touching
/// memory that may have been reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct EntryHandle {
    entry: NonNull<JitCodeEntry>,
    registry_id: u64,
    generation: u64,
    symfile_addr: *const u8,
    symfile_size: u64,
}

// SAFETY: the entry pointer is only dereferenced by the issuing registry
// under its lock; the handle itself is an identifier.
unsafe impl Send for EntryHandle {}
unsafe impl Sync for EntryHandle {}

impl EntryHandle {
    /// Address of the entry, as seen in `relevant_entry` and the list.
    pub fn id(&self) -> usize {
        self.entry.as_ptr() as usize
    }

    /// Raw entry pointer, for callers speaking the C interface.
    pub fn as_ptr(&self) -> *mut JitCodeEntry {
        self.entry.as_ptr()
    }

    /// Identifier of the registry that issued this handle.
    pub fn registry_id(&self) -> u64 {
        self.registry_id
    }

    /// Address of the registered debug-info blob.
    pub fn symfile_addr(&self) -> *const u8 {
        self.symfile_addr
    }

    /// Length of the registered debug-info blob.
    pub fn symfile_size(&self) -> u64 {
        self.symfile_size
    }
}

struct RegistryState {
    descriptor: NonNull<JitDescriptor>,
    /// Live entry address -> generation of the registration that owns it.
    live: HashMap<usize, u64>,
    next_generation: u64,
}

// SAFETY: the descriptor and every entry are only touched with the
// registry mutex held.
unsafe impl Send for RegistryState {}

/// A JIT code registry: a descriptor, its entry list, and the notifier
/// fired after every mutation.
///
/// [`Registry::global`] is the one registry debuggers can see. Detached
/// registries own a private descriptor; they follow the same protocol but
/// are invisible to debuggers.
pub struct Registry<N: Notifier = GdbNotifier> {
    id: u64,
    owns_descriptor: bool,
    notifier: N,
    state: Mutex<RegistryState>,
}

impl Registry<GdbNotifier> {
    /// The process-wide registry backing `__jit_debug_descriptor`.
    ///
    /// Created on first use and never torn down.
    pub fn global() -> &'static Registry {
        &GLOBAL_REGISTRY
    }
}

impl<N: Notifier> Registry<N> {
    /// Creates a registry with its own descriptor, invisible to debuggers.
    pub fn detached(notifier: N) -> Self {
        let descriptor = Box::new(JitDescriptor::new());
        // SAFETY: Box::into_raw never returns null.
        let descriptor = unsafe { NonNull::new_unchecked(Box::into_raw(descriptor)) };
        Self::from_parts(descriptor, true, notifier)
    }

    fn from_parts(descriptor: NonNull<JitDescriptor>, owns_descriptor: bool, notifier: N) -> Self {
        Self {
            id: NEXT_REGISTRY_ID.fetch_add(1, Ordering::Relaxed),
            owns_descriptor,
            notifier,
            state: Mutex::new(RegistryState {
                descriptor,
                live: HashMap::new(),
                next_generation: 0,
            }),
        }
    }

    /// Identifier carried by every handle this registry issues.
    pub fn id(&self) -> u64 {
        self.id
    }

    /// The notifier fired after each mutation.
    pub fn notifier(&self) -> &N {
        &self.notifier
    }

    /// Address of the descriptor this registry maintains.
    pub fn descriptor_addr(&self) -> usize {
        self.state.lock().descriptor.as_ptr() as usize
    }

    /// Publishes a debug-info blob and returns the handle needed to retract
    /// it.
    ///
    /// The new entry becomes the list head. The notifier fires once the
    /// entry is fully linked, with `relevant_entry` pointing at it and
    /// `action_flag` set to [`JitAction::Register`].
    ///
    /// # Errors
    ///
    /// [`JitDebugError::NullBlob`] for a null `symfile_addr`, and
    /// [`JitDebugError::AllocationFailed`] if the entry cannot be allocated.
    /// On error nothing is linked and the notifier does not fire.
    ///
    /// # Safety
    ///
    /// `symfile_addr..symfile_addr + symfile_size` must stay valid and
    /// unmodified until the returned handle is unregistered; a debugger reads
    /// it at arbitrary times.
    pub unsafe fn register(
        &self,
        symfile_addr: *const u8,
        symfile_size: u64,
    ) -> JitDebugResult<EntryHandle> {
        if symfile_addr.is_null() {
            return Err(JitDebugError::NullBlob);
        }

        let mut state = self.state.lock();
        // Reserve bookkeeping first so nothing can fail once linked.
        state
            .live
            .try_reserve(1)
            .map_err(|_| JitDebugError::AllocationFailed {
                size: size_of::<(usize, u64)>(),
            })?;
        let entry = allocate_entry(symfile_addr, symfile_size)?;
        let desc = state.descriptor.as_ptr();

        // SAFETY: the lock is held, `desc` is valid for the registry's
        // lifetime and every linked entry is live.
        unsafe {
            // Add it to the linked list in the JIT descriptor.
            let old_first = (*desc).first_entry;
            (*entry.as_ptr()).next_entry = old_first;
            if !old_first.is_null() {
                (*old_first).prev_entry = entry.as_ptr();
            }
            (*desc).first_entry = entry.as_ptr();
        }

        // Recorded before the hook so a notifier that unwinds leaves the
        // entry both linked and tracked.
        let generation = state.next_generation;
        state.next_generation += 1;
        state.live.insert(entry.as_ptr() as usize, generation);

        self.notify_locked(desc, entry.as_ptr(), JitAction::Register);

        let live = state.live.len();
        drop(state);

        debug!(
            registry = self.id,
            entry = entry.as_ptr() as usize,
            symfile_size,
            live,
            "registered JIT code"
        );

        Ok(EntryHandle {
            entry,
            registry_id: self.id,
            generation,
            symfile_addr,
            symfile_size,
        })
    }

    /// Publishes a blob that lives for the rest of the process.
    pub fn register_static(&self, blob: &'static [u8]) -> JitDebugResult<EntryHandle> {
        // SAFETY: a 'static slice outlives any registration.
        unsafe { self.register(blob.as_ptr(), blob.len() as u64) }
    }

    /// Retracts a previously registered blob.
    ///
    /// The notifier fires while the entry is still linked, with
    /// `relevant_entry` pointing at it and `action_flag` set to
    /// [`JitAction::Unregister`]; only then is the entry unlinked and freed.
    ///
    /// # Errors
    ///
    /// [`JitDebugError::ForeignHandle`] if another registry issued the
    /// handle, [`JitDebugError::NotRegistered`] if it was already
    /// unregistered. The list is left untouched in both cases.
    pub fn unregister(&self, handle: EntryHandle) -> JitDebugResult<()> {
        if handle.registry_id != self.id {
            return Err(JitDebugError::ForeignHandle {
                expected: self.id,
                found: handle.registry_id,
            });
        }

        let addr = handle.id();
        let mut state = self.state.lock();
        match state.live.get(&addr) {
            Some(&generation) if generation == handle.generation => {}
            _ => return Err(JitDebugError::NotRegistered { entry: addr }),
        }
        self.unlink_locked(&mut state, handle.entry);
        drop(state);

        debug!(registry = self.id, entry = addr, "unregistered JIT code");
        Ok(())
    }

    /// Retracts an entry identified only by its address, as the C interface
    /// does.
    ///
    /// # Errors
    ///
    /// [`JitDebugError::NotRegistered`] if no live entry has this address.
    pub fn unregister_raw(&self, entry: *mut JitCodeEntry) -> JitDebugResult<()> {
        let addr = entry as usize;
        let mut state = self.state.lock();
        let Some(entry) = NonNull::new(entry).filter(|_| state.live.contains_key(&addr)) else {
            return Err(JitDebugError::NotRegistered { entry: addr });
        };
        self.unlink_locked(&mut state, entry);
        drop(state);

        debug!(registry = self.id, entry = addr, "unregistered JIT code");
        Ok(())
    }

    fn unlink_locked(&self, state: &mut RegistryState, entry: NonNull<JitCodeEntry>) {
        let desc = state.descriptor.as_ptr();
        let e = entry.as_ptr();

        // The debugger reads relevant_entry at the trap; it must still be
        // linked at that point. If the notifier unwinds the entry stays
        // registered.
        self.notify_locked(desc, e, JitAction::Unregister);

        // SAFETY: the lock is held and `entry` is in the live set, so it is
        // linked into this registry's list and not yet freed.
        unsafe {
            let prev = (*e).prev_entry;
            let next = (*e).next_entry;
            if !prev.is_null() {
                (*prev).next_entry = next;
            } else {
                (*desc).first_entry = next;
            }
            if !next.is_null() {
                (*next).prev_entry = prev;
            }
        }

        state.live.remove(&(e as usize));
        // SAFETY: unlinked above and removed from the live set.
        unsafe { free_entry(entry) };
    }

    /// Sets `relevant_entry` and `action_flag`, fires the notifier, then
    /// clears both again, also when the notifier unwinds.
    fn notify_locked(&self, desc: *mut JitDescriptor, entry: *mut JitCodeEntry, action: JitAction) {
        let _reset = ActionReset(desc);
        // SAFETY: callers hold the lock and `desc` is this registry's
        // descriptor.
        unsafe {
            (*desc).relevant_entry = entry;
            (*desc).action_flag = action.as_raw();
            self.notifier.notify(&*desc);
        }
    }

    /// Whether `handle` is currently registered here.
    pub fn is_registered(&self, handle: &EntryHandle) -> bool {
        handle.registry_id == self.id
            && self.state.lock().live.get(&handle.id()) == Some(&handle.generation)
    }

    /// Number of registered entries.
    pub fn len(&self) -> usize {
        self.state.lock().live.len()
    }

    /// Whether no entries are registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Copies the descriptor and entry list under the lock.
    pub fn snapshot(&self) -> DescriptorSnapshot {
        let state = self.state.lock();
        // SAFETY: the lock is held; the descriptor is valid.
        unsafe { state.descriptor.as_ref() }.snapshot()
    }

    /// Checks the list invariants and that the list holds exactly the live
    /// entries.
    pub fn verify(&self) -> JitDebugResult<()> {
        let state = self.state.lock();
        // SAFETY: the lock is held; the descriptor is valid.
        let snapshot = unsafe { state.descriptor.as_ref() }.snapshot();
        snapshot.verify()?;
        if snapshot.len() != state.live.len()
            || !snapshot.entries.iter().all(|e| state.live.contains_key(&e.id))
        {
            return Err(JitDebugError::CorruptList {
                reason: format!(
                    "list holds {} entries but {} are registered",
                    snapshot.len(),
                    state.live.len()
                ),
            });
        }
        Ok(())
    }
}

impl<N: Notifier> fmt::Debug for Registry<N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("id", &self.id)
            .field("global", &!self.owns_descriptor)
            .field("entries", &self.len())
            .finish()
    }
}

impl<N: Notifier> Drop for Registry<N> {
    fn drop(&mut self) {
        if !self.owns_descriptor {
            return;
        }
        let state = self.state.get_mut();
        let desc = state.descriptor.as_ptr();
        // SAFETY: we own the descriptor and, through it, every linked entry;
        // `&mut self` rules out concurrent access.
        unsafe {
            let mut cursor = (*desc).first_entry;
            while let Some(entry) = NonNull::new(cursor) {
                cursor = (*entry.as_ptr()).next_entry;
                free_entry(entry);
            }
            drop(Box::from_raw(desc));
        }
        state.live.clear();
    }
}

/// Returns the descriptor to `NoAction` when dropped.
struct ActionReset(*mut JitDescriptor);

impl Drop for ActionReset {
    fn drop(&mut self) {
        // SAFETY: only built inside `notify_locked`, which holds the
        // registry lock for the guard's whole life.
        unsafe {
            (*self.0).action_flag = JitAction::NoAction.as_raw();
            (*self.0).relevant_entry = ptr::null_mut();
        }
    }
}

fn allocate_entry(symfile_addr: *const u8, symfile_size: u64) -> JitDebugResult<NonNull<JitCodeEntry>> {
    let layout = Layout::new::<JitCodeEntry>();
    // SAFETY: the layout has non-zero size.
    let raw = unsafe { alloc(layout) }.cast::<JitCodeEntry>();
    let entry = NonNull::new(raw).ok_or(JitDebugError::AllocationFailed {
        size: layout.size(),
    })?;
    // SAFETY: freshly allocated with the layout of JitCodeEntry.
    unsafe {
        entry.as_ptr().write(JitCodeEntry {
            next_entry: ptr::null_mut(),
            prev_entry: ptr::null_mut(),
            symfile_addr,
            symfile_size,
        });
    }
    Ok(entry)
}

/// # Safety
///
/// `entry` must come from `allocate_entry` and be unreachable from any list.
unsafe fn free_entry(entry: NonNull<JitCodeEntry>) {
    dealloc(entry.as_ptr().cast(), Layout::new::<JitCodeEntry>());
}
