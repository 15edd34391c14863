use config::{Config, Environment, File};
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::error::{ConfigError, Result};

/// Checks a loaded configuration for values serde cannot reject on its own
pub trait ValidateConfig {
    fn validate(&self) -> Result<()>;
}

/// Layers struct defaults, an optional file and prefixed environment variables.
///
/// Later layers win. Environment keys use `__` as the nesting separator, so
/// `HEARTH__DATABASE__URL` overrides `database.url`.
#[derive(Debug, Clone)]
pub struct ConfigLoader {
    file: Option<PathBuf>,
    file_required: bool,
    env_prefix: Option<String>,
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            file: None,
            file_required: false,
            env_prefix: None,
        }
    }

    /// Read a TOML, YAML or JSON file, picked by extension
    pub fn with_file(mut self, path: impl AsRef<Path>, required: bool) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self.file_required = required;
        self
    }

    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = Some(prefix.into());
        self
    }

    pub fn load<T: DeserializeOwned>(&self) -> Result<T> {
        let mut builder = Config::builder();

        if let Some(path) = &self.file {
            if !self.file_required && !path.exists() {
                debug!(path = %path.display(), "Optional configuration file not present");
            } else {
                info!(path = %path.display(), "Loading configuration file");
                builder = builder.add_source(File::from(path.as_path()).required(self.file_required));
            }
        }

        if let Some(prefix) = &self.env_prefix {
            builder = builder.add_source(
                Environment::with_prefix(prefix)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            );
        }

        let config = builder.build()?;
        config.try_deserialize::<T>().map_err(ConfigError::from)
    }

    pub fn load_validated<T: DeserializeOwned + ValidateConfig>(&self) -> Result<T> {
        let config: T = self.load()?;
        config.validate()?;
        Ok(config)
    }
}
