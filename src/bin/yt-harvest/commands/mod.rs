pub mod reset;
pub mod run;
pub mod status;

use std::path::Path;

use anyhow::{Context, Result};
use yt_harvest::Config;

/// Read the configuration file, or fall back to defaults.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => Config::from_file(path)
            .with_context(|| format!("Failed to load config: {}", path.display())),
        None => {
            tracing::debug!("No config file given, using defaults");
            Ok(Config::default())
        }
    }
}
