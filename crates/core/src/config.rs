//! Locating and parsing `collector.toml`.
//!
//! The collector resolves each setting from its `--flag`, then the matching
//! `CLIMA_COLLECTOR_*` variable, then `collector.toml`, then the built-in
//! default (data dir `data`, timezone `America/Sao_Paulo`).

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::APP_NAME;

/// Where `collector.toml` was found, logged at startup.
#[derive(Debug, Clone, PartialEq)]
pub enum ConfigSource {
    /// `--config` or `$CLIMA_COLLECTOR_CONFIG`
    Explicit(PathBuf),
    /// `./collector.toml`
    CurrentDir(PathBuf),
    /// `$XDG_CONFIG_HOME/clima-ingest/collector.toml`
    XdgConfig(PathBuf),
    /// `/etc/clima-ingest/collector.toml`
    System(PathBuf),
    Defaults,
}

impl ConfigSource {
    pub fn path(&self) -> Option<&Path> {
        match self {
            ConfigSource::Explicit(p)
            | ConfigSource::CurrentDir(p)
            | ConfigSource::XdgConfig(p)
            | ConfigSource::System(p) => Some(p),
            ConfigSource::Defaults => None,
        }
    }
}

impl std::fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self.path() {
            Some(p) => write!(f, "{}", p.display()),
            None => write!(f, "(defaults)"),
        }
    }
}

/// First existing file among `$<env_var>`, `./<filename>`,
/// `$XDG_CONFIG_HOME/clima-ingest/<filename>` (falling back to
/// `~/.config/clima-ingest/`) and `/etc/clima-ingest/<filename>`. The
/// collector passes `CLIMA_COLLECTOR_CONFIG` and `collector.toml`.
pub fn find_config_file(env_var: &str, filename: &str) -> ConfigSource {
    if let Ok(path) = env::var(env_var) {
        let p = PathBuf::from(&path);
        if p.exists() {
            return ConfigSource::Explicit(p);
        }
    }

    let local = PathBuf::from(filename);
    if local.exists() {
        return ConfigSource::CurrentDir(local);
    }

    let xdg_path = get_xdg_config_path(filename);
    if xdg_path.exists() {
        return ConfigSource::XdgConfig(xdg_path);
    }

    let system = PathBuf::from(format!("/etc/{}/{}", APP_NAME, filename));
    if system.exists() {
        return ConfigSource::System(system);
    }

    ConfigSource::Defaults
}

fn get_xdg_config_path(filename: &str) -> PathBuf {
    if let Ok(xdg_config) = env::var("XDG_CONFIG_HOME") {
        PathBuf::from(xdg_config).join(APP_NAME).join(filename)
    } else if let Ok(home) = env::var("HOME") {
        PathBuf::from(home)
            .join(".config")
            .join(APP_NAME)
            .join(filename)
    } else {
        PathBuf::from(format!(".config/{}/{}", APP_NAME, filename))
    }
}

/// Parses the TOML at `source`. With no file every setting is left unset so
/// flag and env defaults apply; an unreadable or malformed file is an error.
pub fn load_config<T: DeserializeOwned + Default>(source: &ConfigSource) -> anyhow::Result<T> {
    match source.path() {
        Some(path) => {
            let content = fs::read_to_string(path)?;
            let config: T = toml::from_str(&content)?;
            Ok(config)
        }
        None => Ok(T::default()),
    }
}
