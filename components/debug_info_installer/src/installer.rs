//! Installs debug info for freshly compiled code.

use std::fs;
use std::path::{Path, PathBuf};

use jit_debug::{GdbNotifier, Notifier, Registry};
use tracing::{debug, warn};

use crate::config::InstallerConfig;
use crate::error::{InstallerError, InstallerResult};
use crate::handle::DebugInfoHandle;

/// Creates [`DebugInfoHandle`]s bound to one registry.
///
/// # Example
///
/// ```
/// use debug_info_installer::{DebugInfoInstaller, HandleState, InstallerConfig};
///
/// let installer = DebugInfoInstaller::global(InstallerConfig::default());
/// let mut handle = installer.install("fib", b"\x7fELF...".to_vec()).unwrap();
/// handle.activate().unwrap();
/// assert_eq!(handle.state(), HandleState::Activated);
/// handle.release().unwrap();
/// ```
#[derive(Debug)]
pub struct DebugInfoInstaller<'r, N: Notifier = GdbNotifier> {
    registry: &'r Registry<N>,
    config: InstallerConfig,
}

impl DebugInfoInstaller<'static> {
    /// Installer publishing to the debugger-visible registry
    pub fn global(config: InstallerConfig) -> Self {
        Self::new(Registry::global(), config)
    }
}

impl<'r, N: Notifier> DebugInfoInstaller<'r, N> {
    /// Create an installer for `registry`
    pub fn new(registry: &'r Registry<N>, config: InstallerConfig) -> Self {
        Self { registry, config }
    }

    /// Active configuration
    pub fn config(&self) -> &InstallerConfig {
        &self.config
    }

    /// The registry handles publish to
    pub fn registry(&self) -> &'r Registry<N> {
        self.registry
    }

    /// Take ownership of `debug_info` for the compilation `name`.
    ///
    /// The returned handle is `Initialized`; nothing is published until
    /// [`DebugInfoHandle::activate`]. When a dump directory is configured the
    /// blob is also written there; dump failures are logged, not returned.
    ///
    /// # Errors
    /// `EmptyDebugInfo` if `debug_info` is empty.
    pub fn install(
        &self,
        name: impl Into<String>,
        debug_info: Vec<u8>,
    ) -> InstallerResult<DebugInfoHandle<'r, N>> {
        let name = name.into();
        if debug_info.is_empty() {
            return Err(InstallerError::EmptyDebugInfo { name });
        }

        if let Some(dir) = &self.config.dump_dir {
            if let Err(err) = dump_to(dir, &name, &debug_info) {
                warn!(%err, "skipping debug-info dump");
            }
        }

        let handle = DebugInfoHandle::new(self.registry, name, debug_info, self.config.enabled);
        debug!(%handle, name = handle.name(), "installed debug info");
        Ok(handle)
    }

    /// [`install`](Self::install) followed by
    /// [`activate`](DebugInfoHandle::activate).
    pub fn install_and_activate(
        &self,
        name: impl Into<String>,
        debug_info: Vec<u8>,
    ) -> InstallerResult<DebugInfoHandle<'r, N>> {
        let mut handle = self.install(name, debug_info)?;
        handle.activate()?;
        Ok(handle)
    }
}

/// Write `bytes` to `<dir>/<name>.debug`, creating `dir` if needed.
///
/// Path separators in `name` are replaced so the dump stays inside `dir`.
pub fn dump_to(dir: &Path, name: &str, bytes: &[u8]) -> InstallerResult<PathBuf> {
    let path = dir.join(dump_file_name(name));
    fs::create_dir_all(dir)
        .and_then(|()| fs::write(&path, bytes))
        .map_err(|source| InstallerError::Dump {
            path: path.clone(),
            source,
        })?;
    debug!(path = %path.display(), size = bytes.len(), "dumped debug info");
    Ok(path)
}

fn dump_file_name(name: &str) -> String {
    let stem: String = name
        .chars()
        .map(|c| match c {
            '/' | '\\' | '\0' => '_',
            c => c,
        })
        .collect();
    let stem = match stem.as_str() {
        "" | "." | ".." => "unnamed".to_string(),
        _ => stem,
    };
    format!("{stem}.debug")
}
