use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

use crate::resolve::FALLBACK_BRANCH;

/// Directory name under the user config dir
pub const APP_DIR: &str = "ghdir";
pub const CONFIG_FILE: &str = "config.toml";

/// 2 GiB
pub const DEFAULT_LARGE_DOWNLOAD_THRESHOLD: u64 = 2 * 1024 * 1024 * 1024;

/// User configuration, read from `<config dir>/ghdir/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct GhdirConfig {
    /// Scheme and host serving `/{owner}/{repo}/archive/refs/heads/{branch}.tar.gz`
    pub archive_host: String,
    pub default_branch: String,
    /// Declared download size (bytes) above which the user is asked to confirm
    pub large_download_threshold: u64,
    pub user_agent: String,
    pub cache: bool,
}

impl Default for GhdirConfig {
    fn default() -> Self {
        Self {
            archive_host: "https://github.com".into(),
            default_branch: FALLBACK_BRANCH.into(),
            large_download_threshold: DEFAULT_LARGE_DOWNLOAD_THRESHOLD,
            user_agent: concat!("ghdir/", env!("CARGO_PKG_VERSION")).into(),
            cache: true,
        }
    }
}

/// `<config dir>/ghdir`
pub fn config_dir() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join(APP_DIR))
}

impl GhdirConfig {
    /// Load from an explicit file, which must exist, or from the default
    /// location, falling back to defaults when nothing is there.
    pub fn load(explicit: Option<&Path>) -> Result<Self> {
        match explicit {
            Some(path) => Self::from_file(path),
            None => match config_dir().map(|dir| dir.join(CONFIG_FILE)) {
                Some(path) if path.is_file() => Self::from_file(&path),
                _ => {
                    log::debug!("No config file found, using defaults");
                    Ok(Self::default())
                }
            },
        }
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let cfg: GhdirConfig = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse config {}", path.display()))?;
        log::info!("Using config from: {}", path.display());
        Ok(cfg)
    }
}
