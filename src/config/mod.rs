//! Configuration for bookdump

mod ingest;
mod logging;
mod store;

pub use ingest::IngestConfig;
pub use logging::{LogFormat, LogLevel, LoggingConfig};
pub use store::StoreConfig;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// File name looked up in the working directory when `--config` is not given
pub const DEFAULT_CONFIG_FILE: &str = "bookdump.toml";

/// Upper bound on `batch_size`; a batch is one sled transaction
const MAX_BATCH_SIZE: usize = 100_000;

/// Main configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Document store configuration
    #[serde(default)]
    pub store: StoreConfig,
    /// Ingestion defaults
    #[serde(default)]
    pub ingest: IngestConfig,
    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Config {
    /// Load configuration from a TOML file and validate it
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("Failed to read config file '{}': {}", path.display(), e))?;
        let config: Config = toml::from_str(&content)
            .map_err(|e| anyhow::anyhow!("Failed to parse config file '{}': {}", path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    /// Load an explicit path, or `bookdump.toml` if present, or defaults.
    ///
    /// An explicit path that does not exist is an error; a missing default
    /// file is not.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::load(path),
            None => {
                let default_path = Path::new(DEFAULT_CONFIG_FILE);
                if default_path.exists() {
                    Self::load(default_path)
                } else {
                    Ok(Self::default())
                }
            }
        }
    }

    /// Render as TOML (used by `bookdump init`)
    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).context("Failed to serialize configuration")
    }

    /// Validate all configuration fields.
    ///
    /// Collects all validation errors and reports them together.
    pub fn validate(&self) -> Result<()> {
        let mut errors: Vec<String> = Vec::new();

        // Store validation
        if self.store.data_dir.as_os_str().is_empty() {
            errors.push("data_dir must not be empty".to_string());
        }
        for (field, value) in [
            ("database", &self.store.database),
            ("collection", &self.store.collection),
        ] {
            if value.trim().is_empty() {
                errors.push(format!("{} must not be empty", field));
            } else if value.contains(['/', '\\']) || value == "." || value == ".." {
                errors.push(format!("{} must be a plain name, got '{}'", field, value));
            }
        }

        // Ingest validation
        if self.ingest.batch_size == 0 {
            errors.push("batch_size must be positive".to_string());
        }
        if self.ingest.batch_size > MAX_BATCH_SIZE {
            errors.push(format!("batch_size must be <= {}", MAX_BATCH_SIZE));
        }
        if self.ingest.authors_scan_limit == Some(0) {
            errors.push("authors_scan_limit must be positive when set".to_string());
        }
        if self.ingest.works_limit == Some(0) {
            errors.push("works_limit must be positive when set".to_string());
        }
        if !(0.0..=1.0).contains(&self.ingest.max_decode_error_rate) {
            errors.push("max_decode_error_rate must be between 0.0 and 1.0".to_string());
        }

        if errors.is_empty() {
            Ok(())
        } else {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }
    }
}
