//! Persistent ETag cache
//!
//! Maps `owner/repo/branch/folder` to the validator the server returned for
//! the last successful download. Caching is an optimisation only: every
//! failure here degrades to "nothing cached" or "not persisted".

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use log::{debug, warn};

pub const CACHE_FILE: &str = "cache.json";

#[derive(Debug, Clone)]
pub struct FreshnessCache {
    path: PathBuf,
    entries: BTreeMap<String, String>,
}

impl FreshnessCache {
    /// `<config dir>/ghdir/cache.json`, if the platform has a config dir
    pub fn default_path() -> Option<PathBuf> {
        crate::config::config_dir().map(|dir| dir.join(CACHE_FILE))
    }

    /// Read the cache at `path`. Absent, unreadable or malformed files give an empty cache.
    pub fn load(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        let entries = match std::fs::read(&path) {
            Ok(data) => match serde_json::from_slice::<BTreeMap<String, String>>(&data) {
                Ok(entries) => entries,
                Err(e) => {
                    warn!("Ignoring malformed cache {}: {}", path.display(), e);
                    BTreeMap::new()
                }
            },
            Err(e) => {
                debug!("No cache at {}: {}", path.display(), e);
                BTreeMap::new()
            }
        };
        Self { path, entries }
    }

    /// Cache that lives only in memory and is never written
    pub fn disabled() -> Self {
        Self {
            path: PathBuf::new(),
            entries: BTreeMap::new(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.entries.get(key).map(String::as_str)
    }

    pub fn insert(&mut self, key: impl Into<String>, validator: impl Into<String>) {
        self.entries.insert(key.into(), validator.into());
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Write the cache back, creating parent directories. Failures are logged and dropped.
    pub fn save(&self) {
        if self.path.as_os_str().is_empty() {
            return;
        }
        if let Err(e) = self.try_save() {
            warn!("Could not persist cache to {}: {}", self.path.display(), e);
        }
    }

    fn try_save(&self) -> std::io::Result<()> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let data = serde_json::to_vec_pretty(&self.entries).map_err(std::io::Error::other)?;
        std::fs::write(&self.path, data)?;
        debug!("Saved {} cache entries to {}", self.entries.len(), self.path.display());
        Ok(())
    }
}
