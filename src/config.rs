//! Application configuration management.
//!
//! Settings are layered with `figment`, lowest priority first:
//!
//! 1. built-in defaults
//! 2. `config.toml` in the platform config directory (or `--config <PATH>`)
//! 3. `SCANSHOT_*` environment variables (`__` separates nested keys)
//!
//! Command-line flags are applied on top by the caller.
//!
//! ```toml
//! policy = "memory"
//! memory_budget = 67108864
//! ```

use anyhow::{Context, Result};
use directories::ProjectDirs;
use figment::providers::{Env, Format, Serialized, Toml};
use figment::Figment;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::cache::storage::DEFAULT_MEMORY_DIVISOR;
use crate::cache::{default_image_dir, StoragePolicy};
use crate::cli::PolicyArg;

/// Prefix of environment variables read into the configuration.
pub const ENV_PREFIX: &str = "SCANSHOT_";

fn default_memory_divisor() -> u64 {
    DEFAULT_MEMORY_DIVISOR
}

/// Application configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    /// Where captured images are kept.
    #[serde(default)]
    pub policy: PolicyArg,

    /// Image directory for the disk policy.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,

    /// Fixed memory budget in bytes. Derived from system memory when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub memory_budget: Option<u64>,

    /// Share of available memory the memory policy may use (1/N).
    #[serde(default = "default_memory_divisor")]
    pub memory_divisor: u64,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            policy: PolicyArg::default(),
            directory: None,
            memory_budget: None,
            memory_divisor: DEFAULT_MEMORY_DIVISOR,
        }
    }
}

impl Config {
    /// Load from the default platform path, falling back to defaults on any error.
    pub fn load() -> Self {
        let path = match Self::config_path() {
            Ok(path) => path,
            Err(e) => {
                log::debug!("No config directory, using defaults: {}", e);
                return Self::default();
            }
        };
        match Self::load_from_path(&path) {
            Ok(config) => config,
            Err(e) => {
                log::debug!("Failed to load config, using defaults: {:#}", e);
                Self::default()
            }
        }
    }

    /// Load with `path` as the file layer. A missing file only contributes nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but is not valid TOML, if a value
    /// (from the file or a `SCANSHOT_*` variable) has the wrong type, or if
    /// `memory_budget` or `memory_divisor` is zero.
    ///
    /// # Example
    ///
    /// ```no_run
    /// use scanshot::config::Config;
    /// use std::path::Path;
    ///
    /// let config = Config::load_from_path(Path::new("scanshot.toml")).unwrap();
    /// println!("{:?}", config.storage_policy());
    /// ```
    pub fn load_from_path(path: &Path) -> Result<Self> {
        log::debug!("Loading configuration from {}", path.display());
        let config: Self = Figment::from(Serialized::defaults(Self::default()))
            .merge(Toml::file(path))
            .merge(Env::prefixed(ENV_PREFIX).split("__"))
            .extract()
            .with_context(|| format!("Invalid configuration: {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.memory_divisor == 0 {
            anyhow::bail!("memory_divisor must be at least 1");
        }
        if self.memory_budget == Some(0) {
            anyhow::bail!("memory_budget must be greater than zero");
        }
        Ok(())
    }

    /// Render the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns an error if a field cannot be represented in TOML, such as a
    /// directory path that is not valid UTF-8.
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize config")
    }

    /// Write the configuration as TOML, creating parent directories.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails or the parent directory or
    /// file cannot be written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {}", parent.display()))?;
        }
        let content = self.to_toml()?;
        fs::write(path, content)
            .with_context(|| format!("Failed to write config: {}", path.display()))?;
        Ok(())
    }

    /// Default platform-specific configuration path.
    ///
    /// # Errors
    ///
    /// Returns an error if no home directory can be determined.
    pub fn config_path() -> Result<PathBuf> {
        let project_dirs = ProjectDirs::from("dev", "scanshot", "scanshot")
            .ok_or_else(|| anyhow::anyhow!("Failed to determine project directories"))?;
        Ok(project_dirs.config_dir().join("config.toml"))
    }

    /// Image directory for the disk policy.
    #[must_use]
    pub fn image_dir(&self) -> PathBuf {
        self.directory.clone().unwrap_or_else(default_image_dir)
    }

    /// Storage policy described by this configuration.
    #[must_use]
    pub fn storage_policy(&self) -> StoragePolicy {
        match self.policy {
            PolicyArg::Disk => StoragePolicy::disk(self.image_dir()),
            PolicyArg::Memory => match self.memory_budget {
                Some(budget) => StoragePolicy::memory(budget),
                None => StoragePolicy::memory_from_system(self.memory_divisor),
            },
        }
    }
}
