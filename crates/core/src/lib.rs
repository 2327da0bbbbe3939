//! Clima Core Library
//!
//! Shared utilities for the collector:
//! - Configuration loading (XDG-compliant)
//! - File system utilities
//! - Application defaults

mod config;
pub mod fs;

pub use config::{find_config_file, load_config, ConfigSource};
pub use fs::{create_dir_all, ensure_parent_dir, path_exists};

/// Application name used for XDG paths
pub const APP_NAME: &str = "clima-ingest";

/// Civil timezone that defines "today" for the collection window
pub const DEFAULT_TIMEZONE: &str = "America/Sao_Paulo";

/// Root for the catalog, raw partitions and run state
pub const DEFAULT_DATA_DIR: &str = "./data";
