// SPDX-License-Identifier: MIT

//! Daemon configuration (spec.md §6 "a configured path", §4.4/§4.8/§4.9
//! "a configuration"): a TOML file on disk, overridable by a small set
//! of environment variables, following the same precedence (file, then
//! env override) the teacher's `env.rs` uses for its own state-dir
//! resolution.

use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("reading config file {path:?}: {source}")]
    Read { path: PathBuf, #[source] source: std::io::Error },
    #[error("parsing config file {path:?}: {source}")]
    Parse { path: PathBuf, #[source] source: toml::de::Error },
    #[error("invalid socket address {0:?}: {1}")]
    InvalidAddr(String, std::net::AddrParseError),
}

/// On-disk/TOML shape, every field optional so a partial file is valid;
/// missing fields fall back to [`Config::default`]'s values before env
/// overrides are applied.
#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    data_dir: Option<PathBuf>,
    rpc_addr: Option<String>,
    internal_addr: Option<String>,
    start_stop_timeout_ms: Option<u64>,
    autofwd_debounce_ms: Option<u64>,
    autofwd_gc_interval_ms: Option<u64>,
    autofwd_gc_threshold_ms: Option<u64>,
    freezer_debounce_ms: Option<u64>,
    watchdog_interval_ms: Option<u64>,
}

/// Resolved daemon configuration. Every timeout/interval spec.md leaves
/// as "a configuration" or "a configured path" resolves to a field
/// here (SPEC_FULL.md §3.1).
#[derive(Debug, Clone)]
pub struct Config {
    pub data_dir: PathBuf,
    pub rpc_addr: std::net::SocketAddr,
    pub internal_addr: std::net::SocketAddr,
    pub start_stop_timeout: Duration,
    pub autofwd_debounce: Duration,
    pub autofwd_gc_interval: Duration,
    pub autofwd_gc_threshold: Duration,
    pub freezer_debounce: Duration,
    pub watchdog_interval: Duration,
}

impl Config {
    /// `<data_dir>/conman.db` — the single key-value file spec.md §6
    /// names as the persisted state layout.
    pub fn db_path(&self) -> PathBuf {
        self.data_dir.join("conman.db")
    }

    /// `<data_dir>/containers/<id>/` — a machine's data directory root.
    pub fn container_dir(&self, id: conman_core::MachineId) -> PathBuf {
        self.data_dir.join("containers").join(id.as_str())
    }

    /// `<data_dir>/logs/<name>.log` (and `.log-console`, appended by the
    /// caller) — spec.md §6.
    pub fn log_path(&self, name: &str) -> PathBuf {
        self.data_dir.join("logs").join(format!("{name}.log"))
    }

    fn defaults() -> RawConfig {
        RawConfig {
            data_dir: Some(default_data_dir()),
            rpc_addr: Some("0.0.0.0:9090".to_string()),
            internal_addr: Some("127.0.0.1:9091".to_string()),
            start_stop_timeout_ms: Some(30_000),
            autofwd_debounce_ms: Some(250),
            autofwd_gc_interval_ms: Some(128_000),
            autofwd_gc_threshold_ms: Some(60_000),
            freezer_debounce_ms: Some(5_000),
            watchdog_interval_ms: Some(10_000),
        }
    }

    /// Load from `path` if it exists (a missing file is not an error —
    /// defaults plus environment overrides apply), then layer
    /// `CONMAN_STATE_DIR`/`CONMAN_RPC_ADDR`/`CONMAN_INTERNAL_ADDR` on
    /// top, matching spec's env-override language in SPEC_FULL.md §3.1.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut raw = Self::defaults();
        if path.exists() {
            let text = std::fs::read_to_string(path)
                .map_err(|e| ConfigError::Read { path: path.to_path_buf(), source: e })?;
            let file_raw: RawConfig =
                toml::from_str(&text).map_err(|e| ConfigError::Parse { path: path.to_path_buf(), source: e })?;
            merge(&mut raw, file_raw);
        }

        if let Ok(dir) = std::env::var("CONMAN_STATE_DIR") {
            raw.data_dir = Some(PathBuf::from(dir));
        }
        if let Ok(addr) = std::env::var("CONMAN_RPC_ADDR") {
            raw.rpc_addr = Some(addr);
        }
        if let Ok(addr) = std::env::var("CONMAN_INTERNAL_ADDR") {
            raw.internal_addr = Some(addr);
        }

        Self::finish(raw)
    }

    /// Defaults with no file and no environment, for tests/fixtures.
    pub fn for_tests(data_dir: PathBuf) -> Self {
        let mut raw = Self::defaults();
        raw.data_dir = Some(data_dir);
        // Tests want short timers so debounce/GC/watchdog scenarios
        // don't have to sleep for the production-sized intervals.
        raw.autofwd_debounce_ms = Some(20);
        raw.autofwd_gc_interval_ms = Some(50);
        raw.autofwd_gc_threshold_ms = Some(40);
        raw.freezer_debounce_ms = Some(20);
        raw.watchdog_interval_ms = Some(20);
        #[allow(clippy::unwrap_used)]
        Self::finish(raw).unwrap()
    }

    fn finish(raw: RawConfig) -> Result<Self, ConfigError> {
        let rpc_addr_str = raw.rpc_addr.unwrap_or_else(|| "0.0.0.0:9090".to_string());
        let internal_addr_str = raw.internal_addr.unwrap_or_else(|| "127.0.0.1:9091".to_string());
        Ok(Self {
            data_dir: raw.data_dir.unwrap_or_else(default_data_dir),
            rpc_addr: rpc_addr_str
                .parse()
                .map_err(|e| ConfigError::InvalidAddr(rpc_addr_str.clone(), e))?,
            internal_addr: internal_addr_str
                .parse()
                .map_err(|e| ConfigError::InvalidAddr(internal_addr_str.clone(), e))?,
            start_stop_timeout: Duration::from_millis(raw.start_stop_timeout_ms.unwrap_or(30_000)),
            autofwd_debounce: Duration::from_millis(raw.autofwd_debounce_ms.unwrap_or(250)),
            autofwd_gc_interval: Duration::from_millis(raw.autofwd_gc_interval_ms.unwrap_or(128_000)),
            autofwd_gc_threshold: Duration::from_millis(raw.autofwd_gc_threshold_ms.unwrap_or(60_000)),
            freezer_debounce: Duration::from_millis(raw.freezer_debounce_ms.unwrap_or(5_000)),
            watchdog_interval: Duration::from_millis(raw.watchdog_interval_ms.unwrap_or(10_000)),
        })
    }
}

fn merge(base: &mut RawConfig, over: RawConfig) {
    if over.data_dir.is_some() {
        base.data_dir = over.data_dir;
    }
    if over.rpc_addr.is_some() {
        base.rpc_addr = over.rpc_addr;
    }
    if over.internal_addr.is_some() {
        base.internal_addr = over.internal_addr;
    }
    if over.start_stop_timeout_ms.is_some() {
        base.start_stop_timeout_ms = over.start_stop_timeout_ms;
    }
    if over.autofwd_debounce_ms.is_some() {
        base.autofwd_debounce_ms = over.autofwd_debounce_ms;
    }
    if over.autofwd_gc_interval_ms.is_some() {
        base.autofwd_gc_interval_ms = over.autofwd_gc_interval_ms;
    }
    if over.autofwd_gc_threshold_ms.is_some() {
        base.autofwd_gc_threshold_ms = over.autofwd_gc_threshold_ms;
    }
    if over.freezer_debounce_ms.is_some() {
        base.freezer_debounce_ms = over.freezer_debounce_ms;
    }
    if over.watchdog_interval_ms.is_some() {
        base.watchdog_interval_ms = over.watchdog_interval_ms;
    }
}

fn default_data_dir() -> PathBuf {
    std::env::var("CONMAN_STATE_DIR").map(PathBuf::from).unwrap_or_else(|_| PathBuf::from("/var/lib/conman"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load(&dir.path().join("nonexistent.toml")).unwrap();
        assert_eq!(config.watchdog_interval, Duration::from_millis(10_000));
    }

    #[test]
    fn file_values_override_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("conman.toml");
        std::fs::write(&path, "watchdog_interval_ms = 5000\n").unwrap();
        let config = Config::load(&path).unwrap();
        assert_eq!(config.watchdog_interval, Duration::from_millis(5000));
        assert_eq!(config.autofwd_debounce, Duration::from_millis(250));
    }
}
