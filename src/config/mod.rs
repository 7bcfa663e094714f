mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file.
pub fn load_config(path: &Path) -> Result<Config> {
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse config file: {:?}", path))?;
    Ok(config)
}

/// Load configuration from an optional path, falling back to defaults.
///
/// A missing path (or a path that does not exist yet) yields the default
/// configuration; a present but malformed file is an error.
pub fn load_config_or_default(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(p) if p.exists() => load_config(p),
        Some(p) => {
            tracing::warn!("Config file {:?} not found, using defaults", p);
            Ok(Config::default())
        }
        None => Ok(Config::default()),
    }
}
