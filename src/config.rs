//! Application configuration.
//!
//! The configuration is loaded from a JSON file, by default
//! `<config dir>/wingrab/config.json` (`%APPDATA%\wingrab\config.json` on
//! Windows).  Every key is optional and unknown keys are ignored, so an
//! empty `{}` file is valid.
//!
//! # Example
//!
//! ```json
//! {
//!   "debug": false,
//!   "lock_path": "D:\\locks\\WINGRAB.LOCKFILE",
//!   "cursor_path": "C:\\cursors\\target.cur",
//!   "restore": "snapshot"
//! }
//! ```

use crate::cursor::RestoreMode;
use crate::lock::DEFAULT_LOCK_FILE_NAME;
use log::info;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Top-level configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Log every mouse event seen during a grab.
    pub debug: bool,

    /// Where the single-instance lock file lives.  Defaults to
    /// `WINGRAB.LOCKFILE` in the temp directory.
    pub lock_path: Option<PathBuf>,

    /// Cursor file shown while waiting for the click.  Defaults to the
    /// targeting cursor bundled with wingrab.
    pub cursor_path: Option<PathBuf>,

    /// How cursors are put back after the grab.
    pub restore: RestoreMode,
}

impl Config {
    /// Load configuration from a JSON file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError(format!("failed to read {}: {}", path.display(), e)))?;
        let config: Self = serde_json::from_str(&contents)
            .map_err(|e| ConfigError(format!("failed to parse {}: {}", path.display(), e)))?;
        Ok(config)
    }

    /// Load the default config file, falling back to compiled-in defaults.
    pub fn load_default() -> Self {
        let Some(path) = default_path() else {
            return Self::default();
        };
        match Self::load(&path) {
            Ok(cfg) => {
                info!("loaded config from {}", path.display());
                cfg
            }
            Err(e) => {
                info!("no config file ({}), using defaults", e);
                Self::default()
            }
        }
    }

    /// Builder-style override of [`debug`](Config::debug).
    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    /// The lock file path, with the default filled in.
    pub fn lock_path(&self) -> PathBuf {
        self.lock_path
            .clone()
            .unwrap_or_else(|| std::env::temp_dir().join(DEFAULT_LOCK_FILE_NAME))
    }
}

/// `<config dir>/wingrab/config.json`, if the platform has a config dir.
pub fn default_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("wingrab").join("config.json"))
}

/// Error from loading or parsing a configuration file.
#[derive(Debug, thiserror::Error)]
#[error("config error: {0}")]
pub struct ConfigError(String);
