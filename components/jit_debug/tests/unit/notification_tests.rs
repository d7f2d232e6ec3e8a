//! What an observer sees when the hook fires.

use super::leaked_blobs;
use jit_debug::{DescriptorSnapshot, JitAction, JitDescriptor, Registry};
use parking_lot::Mutex;

#[derive(Default)]
struct Recorder {
    events: Mutex<Vec<DescriptorSnapshot>>,
}

impl jit_debug::Notifier for Recorder {
    fn notify(&self, descriptor: &JitDescriptor) {
        self.events.lock().push(descriptor.snapshot());
    }
}

impl Recorder {
    fn take(&self) -> Vec<DescriptorSnapshot> {
        std::mem::take(&mut *self.events.lock())
    }
}

#[test]
fn test_hook_fires_once_per_mutation() {
    let registry = Registry::detached(Recorder::default());
    let blobs = leaked_blobs(3);
    let handles: Vec<_> = blobs
        .iter()
        .map(|blob| registry.register_static(*blob).unwrap())
        .collect();
    for handle in handles {
        registry.unregister(handle).unwrap();
    }

    assert_eq!(registry.notifier().take().len(), 6);
}

#[test]
fn test_register_is_visible_at_hook_time() {
    let registry = Registry::detached(Recorder::default());
    let blobs = leaked_blobs(2);
    let first = registry.register_static(blobs[0]).unwrap();
    let second = registry.register_static(blobs[1]).unwrap();

    let events = registry.notifier().take();
    assert_eq!(events.len(), 2);

    let at_hook = &events[1];
    assert_eq!(at_hook.action(), Some(JitAction::Register));
    assert_eq!(at_hook.relevant_entry, Some(second.id()));
    assert_eq!(at_hook.ids(), vec![second.id(), first.id()]);
    assert!(at_hook.verify().is_ok());
}

#[test]
fn test_unregister_hook_fires_before_unlink() {
    let registry = Registry::detached(Recorder::default());
    let blobs = leaked_blobs(3);
    let a = registry.register_static(blobs[0]).unwrap();
    let b = registry.register_static(blobs[1]).unwrap();
    let c = registry.register_static(blobs[2]).unwrap();
    registry.notifier().take();

    registry.unregister(b).unwrap();

    let events = registry.notifier().take();
    assert_eq!(events.len(), 1);
    let at_hook = &events[0];
    assert_eq!(at_hook.action(), Some(JitAction::Unregister));
    assert_eq!(at_hook.relevant_entry, Some(b.id()));
    assert_eq!(at_hook.ids(), vec![c.id(), b.id(), a.id()]);
    assert!(at_hook.verify().is_ok());

    assert_eq!(registry.snapshot().ids(), vec![c.id(), a.id()]);
}

#[test]
fn test_failed_operations_do_not_notify() {
    let registry = Registry::detached(Recorder::default());
    let blobs = leaked_blobs(1);
    let handle = registry.register_static(blobs[0]).unwrap();
    registry.unregister(handle).unwrap();
    registry.notifier().take();

    assert!(registry.unregister(handle).is_err());
    assert!(unsafe { registry.register(std::ptr::null(), 8) }.is_err());
    assert!(registry.notifier().take().is_empty());
}
