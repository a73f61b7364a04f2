//! Configuration loader with multi-source merging

use crate::{DaemonConfig, Paths};
use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

/// Configuration loader with builder pattern
pub struct ConfigLoader {
    file: Option<PathBuf>,
    env_prefix: String,
    user_config: bool,
    env_source: Option<config::Map<String, String>>,
}

impl ConfigLoader {
    /// Create a new config loader reading the user config file and the
    /// process environment
    pub fn new() -> Self {
        Self {
            file: None,
            env_prefix: "INSERTBUFFER".to_string(),
            user_config: true,
            env_source: None,
        }
    }

    /// Layer an explicit config file above the user config. The file must exist.
    pub fn with_file(mut self, path: impl AsRef<Path>) -> Self {
        self.file = Some(path.as_ref().to_path_buf());
        self
    }

    /// Set the environment variable prefix (default: "INSERTBUFFER")
    pub fn with_env_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.env_prefix = prefix.into();
        self
    }

    /// Skip ~/.config/insertbuffer/config.toml
    pub fn without_user_config(mut self) -> Self {
        self.user_config = false;
        self
    }

    /// Read environment variables from `vars` instead of the process environment
    pub fn with_env_source(mut self, vars: config::Map<String, String>) -> Self {
        self.env_source = Some(vars);
        self
    }

    /// Load configuration from all sources with proper precedence
    pub fn load(self) -> Result<DaemonConfig> {
        let mut builder = config::Config::builder();

        // 1. Start with built-in defaults
        let defaults = DaemonConfig::default();
        builder = builder.add_source(config::Config::try_from(&defaults)?);

        // 2. User config (~/.config/insertbuffer/config.toml)
        if self.user_config {
            let paths = Paths::new();
            if let Ok(user_config_file) = paths.user_config_file() {
                if user_config_file.exists() {
                    builder = builder.add_source(
                        config::File::from(user_config_file)
                            .required(false)
                            .format(config::FileFormat::Toml),
                    );
                }
            }
        }

        // 3. Explicit config file (--config)
        if let Some(file) = &self.file {
            builder = builder.add_source(
                config::File::from(file.as_path())
                    .required(true)
                    .format(config::FileFormat::Toml),
            );
        }

        // 4. Environment variables (INSERTBUFFER_*; `__` separates sections)
        builder = builder.add_source(
            config::Environment::with_prefix(&self.env_prefix)
                .prefix_separator("_")
                .separator("__")
                .try_parsing(true)
                .source(self.env_source),
        );

        // Build and deserialize
        let config = builder.build().context("Failed to build configuration")?;

        config
            .try_deserialize()
            .context("Failed to deserialize configuration")
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}
