//! Process-wide Registry Integration Tests
//!
//! Several compiler threads install and discard code against the
//! debugger-visible registry. Other tests in this binary share it, so the
//! assertions only look at entries this test created.

use std::collections::HashSet;

use debug_info_installer::{DebugInfoInstaller, InstallerConfig};
use integration_tests::compile_stub;
use jit_debug::{EntryHandle, Registry};

const THREADS: usize = 6;
const PER_THREAD: usize = 40;

/// Test: concurrent installs are all published exactly once
#[test]
fn test_concurrent_installs_on_global_registry() {
    let installer = DebugInfoInstaller::global(InstallerConfig::default());

    let ours = crossbeam::thread::scope(|s| {
        let workers: Vec<_> = (0..THREADS)
            .map(|t| {
                let installer = &installer;
                s.spawn(move |_| {
                    (0..PER_THREAD)
                        .map(|i| {
                            let name = format!("t{t}_f{i}");
                            let (_code, debug_info) = compile_stub(&name, 24);
                            installer.install_and_activate(name, debug_info).unwrap()
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let handles: Vec<_> = workers
            .into_iter()
            .flat_map(|w| w.join().unwrap())
            .collect();

        let ours: Vec<EntryHandle> = handles.iter().map(|h| h.entry().unwrap()).collect();
        let snapshot = Registry::global().snapshot();
        assert!(snapshot.verify().is_ok());

        let listed: Vec<usize> = snapshot.ids();
        let unique: HashSet<usize> = listed.iter().copied().collect();
        assert_eq!(unique.len(), listed.len(), "duplicate entries in list");
        for entry in &ours {
            assert!(unique.contains(&entry.id()));
        }

        // Discard concurrently as well.
        let mut chunks: Vec<Vec<_>> = Vec::new();
        let mut handles = handles.into_iter().peekable();
        while handles.peek().is_some() {
            chunks.push(handles.by_ref().take(PER_THREAD).collect());
        }
        for chunk in chunks {
            s.spawn(move |_| {
                for mut handle in chunk {
                    handle.release().unwrap();
                }
            });
        }
        ours
    })
    .unwrap();

    for entry in &ours {
        assert!(!Registry::global().is_registered(entry));
    }
    assert!(Registry::global().verify().is_ok());
}

/// Test: global registry stays consistent after mixed traffic
#[test]
fn test_global_registry_consistent_after_traffic() {
    let registry = Registry::global();
    let installer = DebugInfoInstaller::global(InstallerConfig::default());

    let handles: Vec<_> = (0..20)
        .map(|i| {
            let (_code, debug_info) = compile_stub(&format!("g{i}"), 8);
            installer.install_and_activate(format!("g{i}"), debug_info).unwrap()
        })
        .collect();
    let entries: Vec<EntryHandle> = handles.iter().map(|h| h.entry().unwrap()).collect();
    drop(handles);

    assert!(registry.verify().is_ok());
    for entry in entries {
        assert!(!registry.is_registered(&entry));
    }
}
