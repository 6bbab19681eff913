use anyhow::{Context, Result};
use std::path::Path;
use tracing::{debug, info};

use super::runtime::ForecastConfig;

/// Prefix for environment overrides, e.g. `FORECAST__LSTM__EPOCHS=100`
pub const ENV_PREFIX: &str = "FORECAST";

/// Loads the forecast configuration from an optional TOML file layered
/// under `FORECAST__*` environment variables. Missing keys take defaults.
pub fn load_config(path: &str) -> Result<ForecastConfig> {
    if Path::new(path).exists() {
        info!("Loading configuration from {}", path);
    } else {
        debug!("No configuration file at {}, using defaults", path);
    }

    let settings = config::Config::builder()
        .add_source(config::File::with_name(path).required(false))
        .add_source(
            config::Environment::with_prefix(ENV_PREFIX)
                .prefix_separator("__")
                .separator("__")
                .try_parsing(true),
        )
        .build()
        .with_context(|| format!("failed to read configuration from {}", path))?;

    let config: ForecastConfig = settings
        .try_deserialize()
        .context("invalid configuration values")?;

    if let Err(errors) = config.validate() {
        anyhow::bail!("invalid configuration: {}", errors.join(", "));
    }

    Ok(config)
}
