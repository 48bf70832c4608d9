//! Process-wide configuration, published by pointer-swap for lock-free hot reload.

use arc_swap::ArcSwap;
use serde::Deserialize;
use std::path::Path;
use std::sync::Arc;

/// How the operation engine reacts to `chmod`/`chown`/`chtimes` requests.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SetstatMode {
    /// Perform the backend call and translate any error normally.
    Honor,
    /// Silently succeed without consulting the backend at all.
    Ignore,
    /// Perform the backend call; a backend `unsupported` response is treated as
    /// success, any other error is translated normally.
    HonorIgnoreUnsupported,
}

impl Default for SetstatMode {
    fn default() -> Self {
        SetstatMode::Honor
    }
}

/// Process-wide configuration, deserialized from TOML.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Policy for setstat-family operations (chmod/chown/chtimes).
    pub setstat_mode: SetstatMode,
    /// Short-TTL cache size for resolved virtual-path lookups, in entries.
    pub path_cache_capacity: u64,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            setstat_mode: SetstatMode::default(),
            path_cache_capacity: 10_000,
        }
    }
}

impl Config {
    /// Parses a `Config` from a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, toml::de::Error> {
        toml::from_str(s)
    }

    /// Reads and parses a `Config` from a file on disk.
    pub fn from_file(path: impl AsRef<Path>) -> std::io::Result<Self> {
        let raw = std::fs::read_to_string(path)?;
        Self::from_toml_str(&raw).map_err(std::io::Error::other)
    }
}

/// A hot-reloadable handle to the process-wide [`Config`], published by atomic
/// pointer-swap so operation-engine code never blocks behind a lock to read it.
#[derive(Debug)]
pub struct ConfigHandle {
    inner: ArcSwap<Config>,
}

impl ConfigHandle {
    /// Wraps `config` in a fresh handle.
    pub fn new(config: Config) -> Self {
        ConfigHandle {
            inner: ArcSwap::from_pointee(config),
        }
    }

    /// Loads the current configuration snapshot. Operation-engine code should call
    /// this once per operation rather than holding the result across an await point
    /// that might observe a stale value after a reload.
    pub fn load(&self) -> Arc<Config> {
        self.inner.load_full()
    }

    /// Atomically publishes a new configuration, visible to subsequent `load` calls.
    pub fn reload(&self, config: Config) {
        self.inner.store(Arc::new(config));
    }
}

impl Default for ConfigHandle {
    fn default() -> Self {
        ConfigHandle::new(Config::default())
    }
}
