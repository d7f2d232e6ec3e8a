//! Installer and Registry Integration Tests
//!
//! Drives the installer the way a tiered JIT would: compile, install,
//! activate, then release on deoptimization, checking the registry list at
//! every step.

use debug_info_installer::{DebugInfoInstaller, HandleState, InstallerConfig};
use integration_tests::compile_stub;
use jit_debug::{DescriptorSnapshot, JitAction, JitDescriptor, Notifier, Registry};
use parking_lot::Mutex;

#[derive(Default)]
struct TrapLog {
    traps: Mutex<Vec<DescriptorSnapshot>>,
}

impl Notifier for TrapLog {
    fn notify(&self, descriptor: &JitDescriptor) {
        self.traps.lock().push(descriptor.snapshot());
    }
}

/// Test: compile, publish and deoptimize a set of functions
#[test]
fn test_tiered_compile_and_deopt_cycle() {
    let registry = Registry::detached(TrapLog::default());
    let installer = DebugInfoInstaller::new(&registry, InstallerConfig::default());

    let mut live = Vec::new();
    for (i, name) in ["main", "fib", "loop_body", "helper"].iter().enumerate() {
        let (_code, debug_info) = compile_stub(name, 16 * (i + 1));
        live.push(installer.install_and_activate(*name, debug_info).unwrap());
    }

    // Most recently compiled function is the list head.
    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 4);
    assert_eq!(snapshot.entries[0].id, live[3].entry().unwrap().id());
    assert!(snapshot.verify().is_ok());

    // Deoptimize "fib".
    let fib_entry = live[1].entry().unwrap();
    live[1].release().unwrap();
    assert_eq!(live[1].state(), HandleState::Released);

    let traps = registry.notifier().traps.lock().clone();
    let last = traps.last().unwrap();
    assert_eq!(last.action(), Some(JitAction::Unregister));
    assert_eq!(last.relevant_entry, Some(fib_entry.id()));
    assert!(last.contains(fib_entry.id()), "entry must be linked at trap time");

    let snapshot = registry.snapshot();
    assert_eq!(snapshot.len(), 3);
    assert!(!snapshot.contains(fib_entry.id()));
    assert!(snapshot.verify().is_ok());

    // Runtime shutdown.
    for handle in live {
        handle.release_on_teardown();
    }
    assert!(registry.snapshot().is_empty());
    assert_eq!(registry.notifier().traps.lock().len(), 8);
}

/// Test: every trap observes a consistent list
#[test]
fn test_every_trap_sees_consistent_list() {
    let registry = Registry::detached(TrapLog::default());
    let installer = DebugInfoInstaller::new(&registry, InstallerConfig::default());

    let mut handles: Vec<_> = (0..12)
        .map(|i| {
            let (_code, debug_info) = compile_stub(&format!("f{i}"), 32);
            installer.install_and_activate(format!("f{i}"), debug_info).unwrap()
        })
        .collect();
    while !handles.is_empty() {
        let mut handle = handles.remove(handles.len() / 2);
        handle.release().unwrap();
    }

    let traps = registry.notifier().traps.lock();
    assert_eq!(traps.len(), 24);
    for trap in traps.iter() {
        assert!(trap.verify().is_ok());
        let relevant = trap.relevant_entry.expect("relevant entry set at trap");
        assert!(trap.contains(relevant));
    }
}

/// Test: disabled installer leaves the registry untouched
#[test]
fn test_disabled_installer() {
    let registry = Registry::detached(TrapLog::default());
    let installer =
        DebugInfoInstaller::new(&registry, InstallerConfig::default().with_enabled(false));

    let (_code, debug_info) = compile_stub("quiet", 8);
    let handle = installer.install_and_activate("quiet", debug_info).unwrap();
    assert_eq!(handle.state(), HandleState::Activated);
    drop(handle);

    assert!(registry.notifier().traps.lock().is_empty());
}
