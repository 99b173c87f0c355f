//! Adapter traits for durable storage.
//!
//! Defines the capability interface every persistence backend implements,
//! plus the optional backup extension. Callers probe for the extension with
//! [`Adapter::as_backup`] before invoking it.

use crate::error::{Error, Result};
use async_trait::async_trait;
use chrono::{DateTime, TimeDelta, Utc};
use serde_json::Value;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{self, ErrorKind};
use std::path::{Path, PathBuf};

/// Attempts at finding a free backup name before giving up.
const MAX_BACKUP_ATTEMPTS: u32 = 1000;

/// Key under which the store persists its version counter.
pub const RESERVED_VERSION_KEY: &str = "__version__";

/// Durable storage backend for a [`Store`](super::Store).
///
/// All adapters must be thread-safe (`Send + Sync`) for use with tokio.
/// Values are stored fully serialized as JSON, so types without a JSON
/// equivalent come back in their serialized form.
///
/// # Example
///
/// ```ignore
/// use keystash::store::{Adapter, FileAdapter};
///
/// let adapter = FileAdapter::new("data/store.json");
/// adapter.init().await?;
/// adapter.set("greeting", &serde_json::json!("hello")).await?;
/// ```
#[async_trait]
pub trait Adapter: Send + Sync + 'static {
    /// Short adapter name used in logs and errors.
    fn name(&self) -> &'static str;

    /// Opens or creates the durable medium.
    ///
    /// # Errors
    ///
    /// Returns [`Error::AdapterIo`](crate::Error::AdapterIo) if the medium
    /// cannot be opened or created.
    async fn init(&self) -> Result<()>;

    /// Retrieves a value by key.
    ///
    /// Returns `Ok(None)` if the key doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter is not initialized or the read fails.
    async fn get(&self, key: &str) -> Result<Option<Value>>;

    /// Stores a value, overwriting any existing one.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter is not initialized or the write fails.
    async fn set(&self, key: &str, value: &Value) -> Result<()>;

    /// Deletes a key.
    ///
    /// Returns `Ok(true)` if the key existed and was removed,
    /// `Ok(false)` if it didn't exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter is not initialized or the write fails.
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Enumerates every persisted entry.
    ///
    /// Returns `Ok(None)` when the adapter cannot enumerate its contents,
    /// which is the default.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter is not initialized or the read fails.
    async fn all(&self) -> Result<Option<HashMap<String, Value>>> {
        Ok(None)
    }

    /// Returns the backup capability if this adapter supports snapshots.
    fn as_backup(&self) -> Option<&dyn BackupCapable> {
        None
    }
}

/// Optional snapshot capability of an [`Adapter`].
#[async_trait]
pub trait BackupCapable: Send + Sync {
    /// Writes a timestamped copy of the durable medium.
    ///
    /// # Errors
    ///
    /// Returns an error if the adapter is not initialized or the copy fails.
    async fn backup(&self) -> Result<BackupInfo>;
}

/// Description of a created backup artifact.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupInfo {
    /// Path of the backup file.
    pub path: PathBuf,
    /// Time the backup was taken.
    pub timestamp: DateTime<Utc>,
}

impl BackupInfo {
    /// Builds the backup path `<source>.<unix_ms>.backup` for the given time.
    pub(crate) fn for_source(source: &Path, timestamp: DateTime<Utc>) -> Self {
        let mut name = source.as_os_str().to_os_string();
        name.push(format!(".{}.backup", timestamp.timestamp_millis()));
        Self {
            path: PathBuf::from(name),
            timestamp,
        }
    }
}

/// Copies `source` to a new `<source>.<unix_ms>.backup` file.
///
/// Backups are create-only. When the name for the current millisecond is
/// taken, the timestamp moves forward one millisecond until a free name is
/// found.
pub(crate) fn write_backup(source: &Path) -> Result<BackupInfo> {
    let mut timestamp = Utc::now();

    for _ in 0..MAX_BACKUP_ATTEMPTS {
        let info = BackupInfo::for_source(source, timestamp);
        let mut dest = match OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&info.path)
        {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                timestamp += TimeDelta::milliseconds(1);
                continue;
            },
            Err(e) => return Err(backup_error(&info.path, e)),
        };

        let copied = File::open(source)
            .and_then(|mut src| io::copy(&mut src, &mut dest))
            .and_then(|_| dest.sync_all());
        if let Err(e) = copied {
            // Do not leave a truncated artifact behind.
            drop(dest);
            let _ = fs::remove_file(&info.path);
            return Err(backup_error(&info.path, e));
        }
        return Ok(info);
    }

    Err(Error::adapter_io(
        format!("failed to find a free backup name for {}", source.display()),
        io::Error::from(ErrorKind::AlreadyExists),
    ))
}

fn backup_error(path: &Path, e: io::Error) -> Error {
    Error::adapter_io(format!("failed to write backup {}", path.display()), e)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use std::collections::HashSet;
    use tempfile::TempDir;

    #[test]
    fn test_backup_path_uses_millisecond_suffix() {
        let ts = Utc.timestamp_millis_opt(1_700_000_000_123).unwrap();
        let info = BackupInfo::for_source(Path::new("/data/store.json"), ts);
        assert_eq!(
            info.path,
            PathBuf::from("/data/store.json.1700000000123.backup")
        );
        assert_eq!(info.timestamp, ts);
    }

    #[test]
    fn test_write_backup_never_overwrites() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("store.json");
        fs::write(&source, b"{}").unwrap();

        let mut paths = HashSet::new();
        for i in 0..50 {
            fs::write(&source, format!("{{\"n\": {i}}}")).unwrap();
            let info = write_backup(&source).unwrap();
            assert!(paths.insert(info.path.clone()), "backup reused {:?}", info.path);
            assert_eq!(
                fs::read_to_string(&info.path).unwrap(),
                format!("{{\"n\": {i}}}")
            );
        }

        // Earlier backups keep their original contents
        let mut contents: Vec<String> = paths
            .iter()
            .map(|p| fs::read_to_string(p).unwrap())
            .collect();
        contents.sort();
        contents.dedup();
        assert_eq!(contents.len(), 50);
    }

    #[test]
    fn test_write_backup_skips_taken_name() {
        let tmp = TempDir::new().unwrap();
        let source = tmp.path().join("store.json");
        fs::write(&source, b"new").unwrap();

        // Occupy the next few milliseconds worth of names
        let now = Utc::now();
        for offset in 0..5 {
            let taken = BackupInfo::for_source(&source, now + TimeDelta::milliseconds(offset));
            fs::write(&taken.path, b"old").unwrap();
        }

        let info = write_backup(&source).unwrap();
        assert_eq!(fs::read(&info.path).unwrap(), b"new");
        for offset in 0..5 {
            let taken = BackupInfo::for_source(&source, now + TimeDelta::milliseconds(offset));
            assert_ne!(taken.path, info.path);
            assert_eq!(fs::read(&taken.path).unwrap(), b"old");
        }
    }
}
