//! TOML configuration file parsing

use super::PoolConfig;
use anyhow::{Context, Result};
use std::fs;
use std::path::Path;

/// Parse a TOML configuration file.
pub fn parse_toml_file(path: &Path) -> Result<PoolConfig> {
    let contents = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {}", path.display()))?;

    parse_toml_string(&contents)
        .with_context(|| format!("Failed to parse config file: {}", path.display()))
}

/// Parse a TOML configuration from a string.
pub fn parse_toml_string(contents: &str) -> Result<PoolConfig> {
    let config: PoolConfig =
        ::toml::from_str(contents).context("Failed to parse TOML configuration")?;

    Ok(config)
}
