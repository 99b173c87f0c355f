//! CLI command implementations for keystash.
//!
//! Each submodule implements a group of commands:
//!
//! - [`kv`] - Read and write entries (get/set/delete/keys)
//! - [`admin`] - Store maintenance (backup/version)
//!
//! Every command opens the store described by the configuration, runs
//! `init`, performs its work and disposes the store.

pub mod admin;
pub mod kv;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::warn;

use crate::config::{Config, default_data_dir};
use crate::store::{FileAdapter, Store};

/// File used when no adapter is configured.
const DEFAULT_STORE_FILE: &str = "store.json";

/// Initialize stderr logging.
///
/// Stdout is reserved for command output. `RUST_LOG` overrides the default
/// `warn` level.
pub fn init_logging() {
    use tracing_subscriber::{EnvFilter, fmt, prelude::*};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr))
        .init();
}

/// Load configuration from `path`, or from `keystash.toml` when `None`.
///
/// Validation warnings are logged; validation errors are returned.
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    let config = match path {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    let validation = config.validate()?;
    for warning in &validation.warnings {
        warn!("{warning}");
    }

    Ok(config)
}

/// Path of the JSON file used when the configuration names no adapter.
pub fn default_store_path() -> PathBuf {
    default_data_dir()
        .unwrap_or_else(|| PathBuf::from(".keystash"))
        .join(DEFAULT_STORE_FILE)
}

/// Build and initialize the store described by `config`.
///
/// The CLI always persists: without an `[adapter]` section the store uses a
/// JSON file under the user data directory.
pub async fn open_store(config: &Config) -> Result<Store> {
    let mut builder = config.store_builder()?;
    if config.adapter.is_none() {
        builder = builder.adapter(FileAdapter::new(default_store_path()));
    }

    let store = builder.build().context("Failed to build store")?;
    store.init().await.context("Failed to initialize store")?;
    Ok(store)
}

/// Interpret a command-line value as JSON, falling back to a plain string.
///
/// `42`, `true`, `null`, `[1,2]` and `{"a":1}` parse as JSON; anything that
/// is not valid JSON (e.g. `hello`) is stored as a string.
pub fn parse_value(raw: &str) -> serde_json::Value {
    serde_json::from_str(raw).unwrap_or_else(|_| serde_json::Value::String(raw.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_parse_value_json() {
        assert_eq!(parse_value("42"), json!(42));
        assert_eq!(parse_value("true"), json!(true));
        assert_eq!(parse_value("null"), json!(null));
        assert_eq!(parse_value(r#"{"a": [1, 2]}"#), json!({"a": [1, 2]}));
        assert_eq!(parse_value(r#""quoted""#), json!("quoted"));
    }

    #[test]
    fn test_parse_value_falls_back_to_string() {
        assert_eq!(parse_value("hello"), json!("hello"));
        assert_eq!(parse_value("{not json"), json!("{not json"));
        assert_eq!(parse_value(""), json!(""));
    }

    #[test]
    fn test_default_store_path_file_name() {
        assert!(default_store_path().ends_with("store.json"));
    }

    #[test]
    fn test_load_config_rejects_invalid() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("keystash.toml");
        fs::write(&path, "[store]\nsync_interval_ms = 0\n").unwrap();

        let err = load_config(Some(&path)).unwrap_err();
        assert!(format!("{err:#}").contains("sync_interval_ms cannot be 0"));
    }

    #[tokio::test]
    async fn test_open_store_uses_configured_adapter() {
        let tmp = TempDir::new().unwrap();
        let store_path = tmp.path().join("data.json");
        let config_path = tmp.path().join("keystash.toml");
        fs::write(
            &config_path,
            format!(
                "[store]\nenable_versioning = true\n\n[adapter]\nkind = \"file\"\npath = {:?}\n",
                store_path.display().to_string()
            ),
        )
        .unwrap();

        let config = load_config(Some(&config_path)).unwrap();
        let store = open_store(&config).await.unwrap();
        store.set("k", "v").unwrap();
        store.sync().await.unwrap();
        store.dispose();

        assert!(store_path.exists());
        let reopened = open_store(&config).await.unwrap();
        assert_eq!(reopened.get("k").unwrap(), Some(json!("v")));
        assert_eq!(reopened.version(), 1);
    }
}
