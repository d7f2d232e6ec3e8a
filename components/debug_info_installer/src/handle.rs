//! Per-compilation debug-info handles.
//!
//! A handle owns the debug-info blob of one installed code object and walks
//! a fixed lifecycle:
//!
//! ```text
//! Initialized --activate--> Activated --release--> Released
//! ```
//!
//! The blob is boxed once and never moved or reallocated for the handle's
//! whole life, so the address published to the debugger stays valid.
//! Dropping an activated handle unregisters it before the blob is freed.

use std::fmt;

use jit_debug::{EntryHandle, GdbNotifier, Notifier, Registry};
use tracing::{debug, warn};

use crate::error::{InstallerError, InstallerResult};

/// Lifecycle state of a [`DebugInfoHandle`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleState {
    /// Created, not yet visible to the debugger
    Initialized,
    /// Published through the JIT interface
    Activated,
    /// Retracted; the blob has been freed
    Released,
}

impl fmt::Display for HandleState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            HandleState::Initialized => "initialized",
            HandleState::Activated => "activated",
            HandleState::Released => "released",
        };
        f.write_str(name)
    }
}

/// Debug info for one installed code object.
pub struct DebugInfoHandle<'r, N: Notifier = GdbNotifier> {
    registry: &'r Registry<N>,
    name: String,
    /// Heap address is what the registry publishes; never reallocated.
    debug_info: Option<Box<[u8]>>,
    entry: Option<EntryHandle>,
    publish: bool,
    state: HandleState,
}

impl<'r, N: Notifier> DebugInfoHandle<'r, N> {
    pub(crate) fn new(
        registry: &'r Registry<N>,
        name: String,
        debug_info: Vec<u8>,
        publish: bool,
    ) -> Self {
        Self {
            registry,
            name,
            debug_info: Some(debug_info.into_boxed_slice()),
            entry: None,
            publish,
            state: HandleState::Initialized,
        }
    }

    /// Compilation name the debug info was installed under
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Current lifecycle state
    pub fn state(&self) -> HandleState {
        self.state
    }

    /// The owned debug-info bytes, until released
    pub fn debug_info(&self) -> Option<&[u8]> {
        self.debug_info.as_deref()
    }

    /// The registry entry, while published
    pub fn entry(&self) -> Option<EntryHandle> {
        self.entry
    }

    /// Whether the debug info is currently visible to the debugger
    pub fn is_published(&self) -> bool {
        self.entry.is_some()
    }

    /// Publish the debug info.
    ///
    /// With publishing disabled the handle still moves to `Activated` but
    /// nothing is registered.
    ///
    /// # Errors
    /// `InvalidState` unless the handle is `Initialized`; `Registration` if
    /// the registry rejects the entry, in which case the state is unchanged.
    pub fn activate(&mut self) -> InstallerResult<()> {
        self.expect_state(HandleState::Initialized)?;

        if self.publish {
            if let Some(blob) = self.debug_info.as_deref() {
                // SAFETY: the boxed blob is owned by this handle and never moved, and
                // the entry is unregistered before the blob is dropped.
                let entry = unsafe { self.registry.register(blob.as_ptr(), blob.len() as u64) }?;
                self.entry = Some(entry);
            }
        }

        self.state = HandleState::Activated;
        debug!(handle = %self, "activated debug info");
        Ok(())
    }

    /// Retract the debug info and free the blob.
    ///
    /// # Errors
    /// `InvalidState` unless the handle is `Activated`; `Registration` if
    /// the registry no longer knows the entry.
    pub fn release(&mut self) -> InstallerResult<()> {
        self.expect_state(HandleState::Activated)?;

        if let Some(entry) = self.entry {
            self.registry.unregister(entry)?;
            self.entry = None;
        }

        self.state = HandleState::Released;
        self.debug_info = None;
        debug!(name = %self.name, "released debug info");
        Ok(())
    }

    /// Release during runtime shutdown: unregisters if still activated,
    /// frees the blob, and never fails.
    pub fn release_on_teardown(mut self) {
        self.teardown();
    }

    fn teardown(&mut self) {
        if self.state == HandleState::Activated {
            if let Some(entry) = self.entry.take() {
                if let Err(err) = self.registry.unregister(entry) {
                    warn!(%err, name = %self.name, "failed to unregister debug info on teardown");
                }
            }
            self.state = HandleState::Released;
        }
        self.debug_info = None;
    }

    fn expect_state(&self, expected: HandleState) -> InstallerResult<()> {
        if self.state == expected {
            Ok(())
        } else {
            Err(InstallerError::InvalidState {
                expected,
                found: self.state,
            })
        }
    }
}

impl<N: Notifier> Drop for DebugInfoHandle<'_, N> {
    fn drop(&mut self) {
        self.teardown();
    }
}

impl<N: Notifier> fmt::Display for DebugInfoHandle<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let entry = self.entry.map_or(0, |e| e.id());
        let (address, size) = self
            .debug_info
            .as_deref()
            .map_or((0, 0), |blob| (blob.as_ptr() as usize, blob.len()));
        write!(
            f,
            "DebugInfoHandle(entry = {entry:#x}, address = {address:#x}, size = {size}, state = {})",
            self.state
        )
    }
}

impl<N: Notifier> fmt::Debug for DebugInfoHandle<'_, N> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DebugInfoHandle")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("entry", &self.entry.map(|e| e.id()))
            .field("size", &self.debug_info.as_deref().map(<[u8]>::len))
            .finish()
    }
}
