use crate::config::StrategyConfig;
use anyhow::Result;
use figment::{
    providers::{Env, Format, Toml},
    Figment,
};
use std::path::Path;
use tracing::debug;

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads strategy configuration by merging a TOML file with
    /// `SURGE_`-prefixed environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed, or if the
    /// merged configuration fails validation.
    pub fn load(path: impl AsRef<Path>) -> Result<StrategyConfig> {
        let config: StrategyConfig = Figment::new()
            .merge(Toml::file(path.as_ref()))
            .merge(Env::prefixed("SURGE_"))
            .extract()?;
        config.validate()?;
        debug!(
            "loaded {} profiles from {}",
            config.profiles.len(),
            path.as_ref().display()
        );
        Ok(config)
    }
}
