//! Application directories.
//!
//! By default the config file lives under the platform config directory and
//! logs under the platform data directory, each in a `cyberintel-x`
//! subdirectory. Setting `CIX_HOME` puts both under one root instead.

use std::path::PathBuf;

use crate::constants::{APP_DIR_NAME, HOME_ENV_VAR};
use crate::error::{CixError, CixResult};

/// Resolved config and data directories.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppDirs {
    pub config: PathBuf,
    pub data: PathBuf,
}

impl AppDirs {
    /// Resolve from `CIX_HOME` if set, otherwise from the platform directories.
    ///
    /// - Linux: `~/.config/cyberintel-x`, `~/.local/share/cyberintel-x`
    /// - macOS: `~/Library/Application Support/cyberintel-x` for both
    /// - Windows: `%APPDATA%/cyberintel-x` for both
    pub fn resolve() -> CixResult<Self> {
        if let Some(home) = std::env::var_os(HOME_ENV_VAR).filter(|v| !v.is_empty()) {
            return Ok(Self::under(home));
        }

        let config = dirs::config_dir()
            .ok_or_else(|| CixError::Config("could not determine config directory".into()))?;
        let data = dirs::data_dir()
            .ok_or_else(|| CixError::Config("could not determine data directory".into()))?;
        Ok(Self {
            config: config.join(APP_DIR_NAME),
            data: data.join(APP_DIR_NAME),
        })
    }

    /// Lay both directories out under a single root.
    pub fn under(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        Self {
            config: root.join("config"),
            data: root.join("data"),
        }
    }

    pub fn config_file(&self) -> PathBuf {
        self.config.join("config.toml")
    }

    pub fn log_dir(&self) -> PathBuf {
        self.data.join("logs")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_under_single_root() {
        let dirs = AppDirs::under("/tmp/cix-home");
        assert_eq!(dirs.config_file(), PathBuf::from("/tmp/cix-home/config/config.toml"));
        assert_eq!(dirs.log_dir(), PathBuf::from("/tmp/cix-home/data/logs"));
    }

    #[test]
    fn test_platform_dirs_end_with_app_dir() {
        if std::env::var_os(HOME_ENV_VAR).is_some() {
            return;
        }
        if let Ok(dirs) = AppDirs::resolve() {
            assert!(dirs.config.ends_with(APP_DIR_NAME));
            assert!(dirs.data.ends_with(APP_DIR_NAME));
        }
    }
}
