//! JSON-file storage adapter.
//!
//! Keeps an in-memory cache mirroring a single JSON object on disk. Every
//! mutation rewrites the whole document before returning, replacing the file
//! atomically through a temporary sibling.

use super::adapter::{Adapter, BackupCapable, BackupInfo, write_backup};
use crate::error::{Error, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info, warn};

const NAME: &str = "file";

/// JSON-file storage adapter.
///
/// The document lives at the configured path; backups are written next to
/// it as `<path>.<unix_ms>.backup`.
///
/// # Thread Safety
///
/// `FileAdapter` is `Clone`; clones share the same cache. Writes are
/// serialized by the cache lock, so the file always reflects the cache.
#[derive(Clone)]
pub struct FileAdapter {
    path: PathBuf,
    cache: Arc<RwLock<Option<Map<String, Value>>>>,
}

impl FileAdapter {
    /// Creates an adapter for the document at `path`.
    ///
    /// Nothing touches the filesystem until [`Adapter::init`].
    pub fn new<P: AsRef<Path>>(path: P) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            cache: Arc::new(RwLock::new(None)),
        }
    }

    /// Path of the backing document.
    pub fn path(&self) -> &Path {
        &self.path
    }

    fn init_sync(&self) -> Result<()> {
        if let Some(parent) = self.path.parent()
            && !parent.as_os_str().is_empty()
        {
            fs::create_dir_all(parent).map_err(|e| {
                Error::adapter_io(
                    format!("failed to create store directory {}", parent.display()),
                    e,
                )
            })?;
        }

        let (document, needs_write) = match fs::read(&self.path) {
            Ok(bytes) => match serde_json::from_slice::<Value>(&bytes) {
                Ok(Value::Object(map)) => (map, false),
                Ok(_) => {
                    warn!(path = %self.path.display(), "Store document root is not an object, starting empty");
                    (Map::new(), true)
                },
                Err(e) => {
                    warn!(path = %self.path.display(), error = %e, "Store document is not valid JSON, starting empty");
                    (Map::new(), true)
                },
            },
            Err(e) if e.kind() == ErrorKind::NotFound => (Map::new(), true),
            Err(e) => {
                return Err(Error::adapter_io(
                    format!("failed to read store document {}", self.path.display()),
                    e,
                ));
            },
        };

        if needs_write {
            write_document(&self.path, &document)?;
        }

        info!(path = %self.path.display(), entries = document.len(), "File adapter initialized");
        *self.cache.write() = Some(document);
        Ok(())
    }

    fn set_sync(&self, key: &str, value: Value) -> Result<()> {
        let mut cache = self.cache.write();
        let document = cache.as_mut().ok_or_else(|| Error::not_initialized(NAME))?;

        let previous = document.insert(key.to_string(), value);
        if let Err(e) = write_document(&self.path, document) {
            match previous {
                Some(old) => document.insert(key.to_string(), old),
                None => document.remove(key),
            };
            return Err(e);
        }
        debug!(key = %key, "File adapter wrote key");
        Ok(())
    }

    fn delete_sync(&self, key: &str) -> Result<bool> {
        let mut cache = self.cache.write();
        let document = cache.as_mut().ok_or_else(|| Error::not_initialized(NAME))?;

        let Some(previous) = document.remove(key) else {
            return Ok(false);
        };
        if let Err(e) = write_document(&self.path, document) {
            document.insert(key.to_string(), previous);
            return Err(e);
        }
        debug!(key = %key, "File adapter removed key");
        Ok(true)
    }

    fn backup_sync(&self) -> Result<BackupInfo> {
        let cache = self.cache.read();
        let document = cache.as_ref().ok_or_else(|| Error::not_initialized(NAME))?;

        // Flush first so the copy reflects the latest cache state.
        write_document(&self.path, document)?;

        let info = write_backup(&self.path)?;

        info!(backup = %info.path.display(), "File adapter backup created");
        Ok(info)
    }
}

/// Serializes `document` and atomically replaces the file at `path`.
fn write_document(path: &Path, document: &Map<String, Value>) -> Result<()> {
    let bytes = serde_json::to_vec_pretty(document)
        .map_err(|e| Error::adapter_io("failed to serialize store document", e))?;

    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    let write_err = |e: std::io::Error| {
        Error::adapter_io(format!("failed to write store document {}", path.display()), e)
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(write_err)?;
    tmp.write_all(&bytes).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;
    Ok(())
}

/// Runs a blocking adapter call off the async runtime.
async fn blocking<T, F>(f: F) -> Result<T>
where
    T: Send + 'static,
    F: FnOnce() -> Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::adapter_io("file adapter task failed", e))?
}

#[async_trait]
impl Adapter for FileAdapter {
    fn name(&self) -> &'static str {
        NAME
    }

    async fn init(&self) -> Result<()> {
        let adapter = self.clone();
        blocking(move || adapter.init_sync()).await
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        let cache = self.cache.read();
        let document = cache.as_ref().ok_or_else(|| Error::not_initialized(NAME))?;
        Ok(document.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        let adapter = self.clone();
        let key = key.to_string();
        let value = value.clone();
        blocking(move || adapter.set_sync(&key, value)).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let adapter = self.clone();
        let key = key.to_string();
        blocking(move || adapter.delete_sync(&key)).await
    }

    async fn all(&self) -> Result<Option<HashMap<String, Value>>> {
        let cache = self.cache.read();
        let document = cache.as_ref().ok_or_else(|| Error::not_initialized(NAME))?;
        Ok(Some(
            document
                .iter()
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect(),
        ))
    }

    fn as_backup(&self) -> Option<&dyn BackupCapable> {
        Some(self)
    }
}

#[async_trait]
impl BackupCapable for FileAdapter {
    async fn backup(&self) -> Result<BackupInfo> {
        let adapter = self.clone();
        blocking(move || adapter.backup_sync()).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::TempDir;

    fn create_adapter() -> (FileAdapter, TempDir) {
        let tmp = TempDir::new().unwrap();
        let adapter = FileAdapter::new(tmp.path().join("store.json"));
        (adapter, tmp)
    }

    #[tokio::test]
    async fn test_init_creates_empty_document() {
        let (adapter, _tmp) = create_adapter();
        adapter.init().await.unwrap();

        let content = fs::read_to_string(adapter.path()).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&content).unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_init_creates_parent_directories() {
        let tmp = TempDir::new().unwrap();
        let adapter = FileAdapter::new(tmp.path().join("nested/dir/store.json"));
        adapter.init().await.unwrap();
        assert!(adapter.path().exists());
    }

    #[tokio::test]
    async fn test_set_rewrites_document() {
        let (adapter, _tmp) = create_adapter();
        adapter.init().await.unwrap();

        adapter.set("user", &json!({"name": "ada"})).await.unwrap();

        let content = fs::read_to_string(adapter.path()).unwrap();
        let doc: Value = serde_json::from_str(&content).unwrap();
        assert_eq!(doc, json!({"user": {"name": "ada"}}));
    }

    #[tokio::test]
    async fn test_delete() {
        let (adapter, _tmp) = create_adapter();
        adapter.init().await.unwrap();

        adapter.set("key", &json!(1)).await.unwrap();
        assert!(adapter.delete("key").await.unwrap());
        assert!(!adapter.delete("key").await.unwrap());
        assert_eq!(adapter.get("key").await.unwrap(), None);

        let content = fs::read_to_string(adapter.path()).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&content).unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_corrupt_document_starts_empty() {
        let (adapter, _tmp) = create_adapter();
        fs::write(adapter.path(), b"{ not json").unwrap();

        adapter.init().await.unwrap();

        assert!(adapter.all().await.unwrap().unwrap().is_empty());
        let content = fs::read_to_string(adapter.path()).unwrap();
        assert_eq!(serde_json::from_str::<Value>(&content).unwrap(), json!({}));
    }

    #[tokio::test]
    async fn test_non_object_root_starts_empty() {
        let (adapter, _tmp) = create_adapter();
        fs::write(adapter.path(), b"[1, 2, 3]").unwrap();

        adapter.init().await.unwrap();

        assert!(adapter.all().await.unwrap().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_existing_document_is_loaded() {
        let (adapter, _tmp) = create_adapter();
        fs::write(adapter.path(), br#"{"a": 1, "b": [true, null]}"#).unwrap();

        adapter.init().await.unwrap();

        assert_eq!(adapter.get("a").await.unwrap(), Some(json!(1)));
        assert_eq!(adapter.get("b").await.unwrap(), Some(json!([true, null])));
    }

    #[tokio::test]
    async fn test_operations_before_init_fail() {
        let (adapter, _tmp) = create_adapter();

        assert!(matches!(
            adapter.get("key").await,
            Err(Error::NotInitialized { adapter: "file" })
        ));
        assert!(matches!(
            adapter.set("key", &json!(1)).await,
            Err(Error::NotInitialized { .. })
        ));
        assert!(matches!(
            adapter.all().await,
            Err(Error::NotInitialized { .. })
        ));
    }

    #[tokio::test]
    async fn test_backup_copies_document() {
        let (adapter, tmp) = create_adapter();
        adapter.init().await.unwrap();
        adapter.set("key", &json!("value")).await.unwrap();

        let info = adapter.as_backup().unwrap().backup().await.unwrap();

        assert!(info.path.starts_with(tmp.path()));
        let name = info.path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("store.json."));
        assert!(name.ends_with(".backup"));

        let backup: Value = serde_json::from_slice(&fs::read(&info.path).unwrap()).unwrap();
        assert_eq!(backup, json!({"key": "value"}));
    }

    #[tokio::test]
    async fn test_back_to_back_backups_are_distinct() {
        let (adapter, _tmp) = create_adapter();
        adapter.init().await.unwrap();

        let mut backups = Vec::new();
        for i in 0..50 {
            adapter.set("n", &json!(i)).await.unwrap();
            backups.push(adapter.as_backup().unwrap().backup().await.unwrap());
        }

        for (i, info) in backups.iter().enumerate() {
            let backup: Value = serde_json::from_slice(&fs::read(&info.path).unwrap()).unwrap();
            assert_eq!(backup, json!({"n": i}), "backup {i} was overwritten");
        }
    }
}
