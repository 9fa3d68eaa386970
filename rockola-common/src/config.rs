//! Configuration loading and setting resolution

use crate::{Error, Result};
use serde::Deserialize;
use std::path::PathBuf;

/// Optional settings from the `[rockola]` table of the config file
#[derive(Debug, Clone, Default, Deserialize)]
pub struct FileConfig {
    pub venue_id: Option<String>,
    pub database: Option<String>,
    pub credentials_endpoint: Option<String>,
}

/// Resolve one setting following the priority order:
/// 1. Command-line argument (highest priority)
/// 2. Environment variable
/// 3. TOML config file
/// 4. None (caller applies its compiled default)
pub fn resolve_setting(
    cli_arg: Option<&str>,
    env_var_name: &str,
    file_value: Option<&str>,
) -> Option<String> {
    if let Some(value) = cli_arg {
        return Some(value.to_string());
    }
    if let Ok(value) = std::env::var(env_var_name) {
        return Some(value);
    }
    file_value.map(|v| v.to_string())
}

/// Load the `[rockola]` config table from the platform config file, if any.
///
/// Looks for `~/.config/rockola/config.toml` (or the platform equivalent),
/// then `/etc/rockola/config.toml` on Linux. Missing files are not an error;
/// unparseable files are.
pub fn load_file_config() -> Result<FileConfig> {
    let Some(path) = find_config_file() else {
        return Ok(FileConfig::default());
    };
    let content = std::fs::read_to_string(&path)?;
    let parsed: toml::Value = toml::from_str(&content)
        .map_err(|e| Error::Config(format!("invalid config file {}: {}", path.display(), e)))?;
    match parsed.get("rockola") {
        Some(table) => table
            .clone()
            .try_into()
            .map_err(|e| Error::Config(format!("invalid [rockola] table: {}", e))),
        None => Ok(FileConfig::default()),
    }
}

/// Default database path under the platform data directory
pub fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("rockola").join("rockola.db"))
        .unwrap_or_else(|| PathBuf::from("./rockola.db"))
}

fn find_config_file() -> Option<PathBuf> {
    if let Some(path) = dirs::config_dir().map(|d| d.join("rockola").join("config.toml")) {
        if path.exists() {
            return Some(path);
        }
    }
    if cfg!(target_os = "linux") {
        let system = PathBuf::from("/etc/rockola/config.toml");
        if system.exists() {
            return Some(system);
        }
    }
    None
}
