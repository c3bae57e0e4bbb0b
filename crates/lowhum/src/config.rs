//! Optional user configuration.
//!
//! Read from `~/.lowhum/config.toml` (or `--config`). Every field is optional;
//! generation constants are not configurable here.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::Deserialize;

use noise_gen::config::{ASSET_FILE_NAME, default_data_dir};
use noise_player::watcher::DEFAULT_POLL_INTERVAL;

pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const DEFAULT_LOG_FILTER: &str = "info,lowhum=info,noise_gen=info,noise_player=info";

#[derive(Debug, Default, Deserialize, PartialEq, Eq)]
pub struct AppConfig {
    /// Directory holding the noise asset (defaults to ~/.lowhum).
    pub data_dir: Option<String>,
    /// Preferred output device id or name substring.
    pub device: Option<String>,
    /// Ignore `device` and play on the system default, stopping when it changes.
    pub follow_default: Option<bool>,
    /// Device watcher interval in milliseconds (default: 2000).
    pub poll_interval_ms: Option<u64>,
    /// Log filter used when `RUST_LOG` is unset.
    pub log: Option<String>,
}

impl AppConfig {
    /// Load configuration from disk.
    pub fn load(path: &Path) -> Result<Self> {
        let raw =
            std::fs::read_to_string(path).with_context(|| format!("read config {:?}", path))?;
        Self::parse(&raw).with_context(|| format!("parse config {:?}", path))
    }

    pub fn parse(raw: &str) -> Result<Self> {
        Ok(toml::from_str::<AppConfig>(raw)?)
    }

    /// Load `explicit`, or the default location if it exists.
    ///
    /// A missing default file yields the empty config; an explicit path must exist.
    pub fn load_or_default(explicit: Option<&Path>) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        match default_config_path() {
            Some(path) if path.exists() => Self::load(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Full path of the noise asset.
    pub fn asset_path(&self) -> Result<PathBuf> {
        let dir = match self.data_dir.as_deref().map(str::trim) {
            Some(dir) if !dir.is_empty() => PathBuf::from(dir),
            _ => default_data_dir()
                .ok_or_else(|| anyhow!("cannot resolve home directory; set data_dir in config"))?,
        };
        Ok(dir.join(ASSET_FILE_NAME))
    }

    pub fn poll_interval(&self) -> Duration {
        match self.poll_interval_ms {
            Some(ms) if ms > 0 => Duration::from_millis(ms),
            _ => DEFAULT_POLL_INTERVAL,
        }
    }

    /// Device to start on: the CLI flag wins, then the config unless it follows the default.
    pub fn device_for_start(&self, cli_device: Option<String>) -> Option<String> {
        normalize_device_name(cli_device).or_else(|| {
            if self.follow_default.unwrap_or(false) {
                None
            } else {
                normalize_device_name(self.device.clone())
            }
        })
    }

    pub fn log_filter(&self) -> &str {
        match self.log.as_deref().map(str::trim) {
            Some(filter) if !filter.is_empty() => filter,
            _ => DEFAULT_LOG_FILTER,
        }
    }
}

/// `~/.lowhum/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    default_data_dir().map(|dir| dir.join(CONFIG_FILE_NAME))
}

fn normalize_device_name(device: Option<String>) -> Option<String> {
    device.and_then(|name| {
        let trimmed = name.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    })
}
