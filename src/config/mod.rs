mod types;

pub use types::*;

use anyhow::{Context, Result};
use std::path::Path;

/// Load configuration from a TOML file
pub fn load_config(path: &Path) -> Result<Config> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file: {:?}", path))?;

    parse_config(&content).with_context(|| format!("Invalid config file: {:?}", path))
}

/// Parse and validate configuration from TOML text
pub fn parse_config(content: &str) -> Result<Config> {
    let config: Config = toml::from_str(content).context("Failed to parse config")?;

    validate_config(&config)?;

    Ok(config)
}

/// Load config from default locations or return default config
pub fn load_config_or_default(custom_path: Option<&Path>) -> Result<Config> {
    if let Some(path) = custom_path {
        return load_config(path);
    }

    let default_paths = [
        "./mediaweave.toml",
        "~/.config/mediaweave/config.toml",
        "/etc/mediaweave/config.toml",
    ];

    for path_str in default_paths {
        let path = shellexpand::tilde(path_str);
        let path = Path::new(path.as_ref());
        if path.exists() {
            return load_config(path);
        }
    }

    Ok(Config::default())
}

/// Validate configuration
pub fn validate_config(config: &Config) -> Result<()> {
    if config.logging.filter.trim().is_empty() {
        anyhow::bail!("Logging filter cannot be empty");
    }

    for (id, source) in &config.sources {
        if id.trim().is_empty() {
            anyhow::bail!("Source ids in [sources] cannot be empty");
        }
        if !source.enabled && (source.rank.is_some() || source.auto_split_threshold.is_some()) {
            tracing::warn!(source = %id, "Overrides set for disabled source are ignored");
        }
    }

    Ok(())
}
