//! Configuration loading
//!
//! Reads `LspLmConfig` from an explicit path or from
//! `$XDG_CONFIG_HOME/lsp-lm/config.toml` (falling back to
//! `~/.config/lsp-lm/config.toml`).

use std::path::{Path, PathBuf};

use crate::error::ConfigError;
use crate::models::config::LspLmConfig;

/// XDG standard: ~/.config/lsp-lm/config.toml
pub fn global_config_path() -> PathBuf {
    std::env::var("XDG_CONFIG_HOME")
        .map(PathBuf::from)
        .ok()
        .or_else(|| dirs::home_dir().map(|h| h.join(".config")))
        .unwrap_or_else(|| PathBuf::from("."))
        .join("lsp-lm")
        .join("config.toml")
}

/// Load configuration. An explicit path must exist; a missing default file
/// yields the defaults.
pub fn load(explicit: Option<&Path>) -> Result<LspLmConfig, ConfigError> {
    match explicit {
        Some(path) => {
            if !path.exists() {
                return Err(ConfigError::NotFound(format!(
                    "Config not found: {}",
                    path.display()
                )));
            }
            load_from_path(path)
        }
        None => {
            let path = global_config_path();
            if !path.exists() {
                tracing::debug!("No config at {}; using defaults", path.display());
                return Ok(LspLmConfig::default());
            }
            load_from_path(&path)
        }
    }
}

fn load_from_path(path: &Path) -> Result<LspLmConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config: LspLmConfig = toml::from_str(&content)
        .map_err(|e| ConfigError::Parse(format!("{}: {}", path.display(), e)))?;

    if config.server.max_connections == 0 {
        return Err(ConfigError::InvalidValue {
            key: "server.max_connections".to_string(),
            message: "must be at least 1".to_string(),
        });
    }

    tracing::debug!("Loaded config from {}", path.display());
    Ok(config)
}
