// Configuration loader
// Loads API key from ~/.opencern/config.toml or environment variable

use anyhow::{bail, Context, Result};
use std::fs;
use std::path::PathBuf;

use super::settings::Config;

/// Load configuration from the OpenCERN config file or environment
pub fn load_config() -> Result<Config> {
    if let Some(config) = try_load_from_file()? {
        return Ok(config);
    }

    // Fall back to environment variable
    if let Ok(api_key) = std::env::var("ANTHROPIC_API_KEY") {
        if !api_key.is_empty() {
            return Ok(Config::with_api_key(api_key));
        }
    }

    bail!(
        "No configuration found. Create ~/.opencern/config.toml containing:\n\n\
         \tapi_key = \"sk-ant-...\"\n\n\
         or set the environment variable:\n\n\
         \texport ANTHROPIC_API_KEY=\"sk-ant-...\""
    );
}

fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".opencern/config.toml"))
}

fn try_load_from_file() -> Result<Option<Config>> {
    let path = config_path()?;
    if !path.exists() {
        return Ok(None);
    }

    let contents = fs::read_to_string(&path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    let config: Config = toml::from_str(&contents)
        .with_context(|| format!("Failed to parse {}", path.display()))?;

    if config.api_key.is_empty() {
        bail!("api_key missing in {}", path.display());
    }

    Ok(Some(config))
}
