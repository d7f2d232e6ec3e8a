//! Installer configuration

use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use crate::error::InstallerResult;

/// Set to any value to keep debug info away from the debugger.
pub const DISABLE_ENV: &str = "JIT_DEBUG_DISABLE";

/// Directory that receives a `<name>.debug` copy of every installed blob.
pub const DUMP_DIR_ENV: &str = "JIT_DEBUG_DUMP_DIR";

/// Configuration for a [`DebugInfoInstaller`](crate::DebugInfoInstaller).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct InstallerConfig {
    /// Whether activated handles are published to the debugger
    pub enabled: bool,
    /// Where to write `<name>.debug` dumps, if anywhere
    pub dump_dir: Option<PathBuf>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            dump_dir: None,
        }
    }
}

impl InstallerConfig {
    /// Enable or disable publishing
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Dump every installed blob into `dir`
    pub fn with_dump_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dump_dir = Some(dir.into());
        self
    }

    /// Parse a JSON configuration; missing fields take their defaults.
    ///
    /// # Errors
    /// Returns `InstallerError::Config` if the JSON is malformed.
    ///
    /// # Example
    /// ```
    /// use debug_info_installer::InstallerConfig;
    ///
    /// let config = InstallerConfig::from_json(r#"{"enabled": false}"#).unwrap();
    /// assert!(!config.enabled);
    /// assert_eq!(config.dump_dir, None);
    /// ```
    pub fn from_json(json: &str) -> InstallerResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Defaults overridden by `JIT_DEBUG_DISABLE` and `JIT_DEBUG_DUMP_DIR`.
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var_os(key).map(PathBuf::from))
    }

    fn from_vars(lookup: impl Fn(&str) -> Option<PathBuf>) -> Self {
        let mut config = Self::default();
        if lookup(DISABLE_ENV).is_some() {
            config.enabled = false;
        }
        config.dump_dir = lookup(DUMP_DIR_ENV).filter(|dir| !dir.as_os_str().is_empty());
        config
    }
}
