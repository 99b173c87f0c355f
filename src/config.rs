//! Configuration types for keystash.
//!
//! Loads store settings from a TOML file (`keystash.toml` by default):
//!
//! - [`Config`] - Root configuration struct
//! - [`StoreConfig`] - Versioning, periodic sync and adapter timeout
//! - [`AdapterConfig`] - Which persistence adapter to use
//!
//! Everything is optional: an empty file yields a memory-only store with
//! versioning off and no periodic sync.
//!
//! ```toml
//! [store]
//! enable_versioning = true
//! sync_interval_ms = 5000
//!
//! [adapter]
//! kind = "sqlite"
//! path = "data/app.db"
//! table = "key_value_store"
//! ```

use anyhow::{Context, Result};
use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::store::{DEFAULT_TABLE, FileAdapter, MemoryAdapter, SqliteAdapter, Store, StoreBuilder};

/// Default configuration file name, looked up in the current directory.
pub const DEFAULT_CONFIG_FILE: &str = "keystash.toml";

/// Result of configuration validation.
#[derive(Debug, Default)]
pub struct ValidationResult {
    /// Non-fatal warnings that should be logged but don't prevent operation.
    pub warnings: Vec<String>,
}

impl ValidationResult {
    /// Returns true if there are any warnings.
    #[must_use]
    pub fn has_warnings(&self) -> bool {
        !self.warnings.is_empty()
    }
}

/// keystash.toml configuration structure.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub store: StoreConfig,
    #[serde(default)]
    pub adapter: Option<AdapterConfig>,
}

/// Store engine options.
#[derive(Debug, Default, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct StoreConfig {
    #[serde(default)]
    pub enable_versioning: bool,
    #[serde(default)]
    pub sync_interval_ms: Option<u64>,
    #[serde(default)]
    pub adapter_timeout_ms: Option<u64>,
}

/// Persistence adapter selection.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum AdapterConfig {
    /// JSON document on disk.
    File { path: PathBuf },
    /// SQLite database file.
    Sqlite {
        path: PathBuf,
        #[serde(default = "default_table")]
        table: String,
    },
    /// Process-local memory, lost on exit.
    Memory,
}

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

/// Default directory for store data (`<data dir>/keystash`).
pub fn default_data_dir() -> Option<PathBuf> {
    dirs::data_dir().map(|d| d.join("keystash"))
}

impl Config {
    /// Load configuration from keystash.toml in the current directory.
    ///
    /// A missing file yields the default configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed.
    pub fn load() -> Result<Self> {
        let path = Path::new(DEFAULT_CONFIG_FILE);
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(path)
    }

    /// Load configuration from the specified path.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The file cannot be read (IO error)
    /// - The file contains invalid TOML syntax
    /// - Fields are unknown or have invalid types
    pub fn load_from<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Validate configuration.
    ///
    /// Returns a `ValidationResult` containing any non-fatal warnings.
    ///
    /// # Errors
    ///
    /// Returns an error if validation fails with one or more errors:
    /// - Zero sync interval or adapter timeout
    /// - Empty adapter path
    /// - Invalid SQLite table name
    pub fn validate(&self) -> Result<ValidationResult> {
        let mut errors = Vec::new();
        let mut warnings = Vec::new();

        // 1. Store options
        match self.store.sync_interval_ms {
            Some(0) => errors.push("store.sync_interval_ms cannot be 0".to_string()),
            Some(ms) if ms < 100 => warnings.push(format!(
                "store.sync_interval_ms = {ms} is very short\n  \
                 Every tick rewrites the full dataset; consider 1000 or more"
            )),
            _ => {},
        }
        if self.store.adapter_timeout_ms == Some(0) {
            errors.push("store.adapter_timeout_ms cannot be 0".to_string());
        }

        // 2. Adapter
        match &self.adapter {
            Some(AdapterConfig::File { path }) if path.as_os_str().is_empty() => {
                errors.push("adapter.path cannot be empty".to_string());
            },
            Some(AdapterConfig::Sqlite { path, table }) => {
                if path.as_os_str().is_empty() {
                    errors.push("adapter.path cannot be empty".to_string());
                }
                if let Err(e) = SqliteAdapter::memory().with_table(table.as_str()) {
                    errors.push(e.to_string());
                }
            },
            Some(AdapterConfig::Memory) => warnings.push(
                "adapter.kind = \"memory\" keeps data only for the life of the process".to_string(),
            ),
            None if self.store.sync_interval_ms.is_some() => warnings.push(
                "store.sync_interval_ms is set but no adapter is configured".to_string(),
            ),
            _ => {},
        }

        if !errors.is_empty() {
            anyhow::bail!(
                "Configuration validation failed:\n  - {}",
                errors.join("\n  - ")
            );
        }

        Ok(ValidationResult { warnings })
    }

    /// Builds a [`StoreBuilder`] from this configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the SQLite table name is invalid.
    pub fn store_builder(&self) -> Result<StoreBuilder> {
        let mut builder = Store::builder().versioning(self.store.enable_versioning);

        if let Some(ms) = self.store.sync_interval_ms {
            builder = builder.sync_interval(Duration::from_millis(ms));
        }
        if let Some(ms) = self.store.adapter_timeout_ms {
            builder = builder.adapter_timeout(Duration::from_millis(ms));
        }

        builder = match &self.adapter {
            Some(AdapterConfig::File { path }) => builder.adapter(FileAdapter::new(path)),
            Some(AdapterConfig::Sqlite { path, table }) => {
                builder.adapter(SqliteAdapter::new(path).with_table(table.as_str())?)
            },
            Some(AdapterConfig::Memory) => builder.adapter(MemoryAdapter::new()),
            None => builder,
        };

        Ok(builder)
    }
}
