//! Store maintenance commands.
//!
//! - `keystash backup` - Snapshot the persisted store next to its source
//! - `keystash version` - Print the store version (-1 when disabled)

use anyhow::{Context, Result};
use std::io::Write;

use crate::store::Store;

/// Sync, then ask the adapter for a backup.
pub async fn backup(store: &Store, out: &mut dyn Write) -> Result<()> {
    store.sync().await.context("Failed to sync before backup")?;

    match store
        .create_backup()
        .await
        .context("Failed to create backup")?
    {
        Some(info) => {
            writeln!(out, "Backup created: {}", info.path.display())?;
            writeln!(out, "  Timestamp: {}", info.timestamp.to_rfc3339())?;
            writeln!(out, "  Version:   {}", store.version().max(0))?;
        },
        None => writeln!(out, "The configured adapter does not support backups")?,
    }
    Ok(())
}

/// Print the current version.
pub fn version(store: &Store, out: &mut dyn Write) -> Result<()> {
    writeln!(out, "{}", store.version())?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{FileAdapter, MemoryAdapter};
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_backup_file_store() {
        let tmp = TempDir::new().unwrap();
        let store = Store::builder()
            .adapter(FileAdapter::new(tmp.path().join("store.json")))
            .versioning(true)
            .build()
            .unwrap();
        store.init().await.unwrap();
        store.set("k", 1).unwrap();

        let mut out = Vec::new();
        backup(&store, &mut out).await.unwrap();

        let text = String::from_utf8(out).unwrap();
        assert!(text.starts_with("Backup created: "));
        assert!(text.contains("Version:   1"));
    }

    #[tokio::test]
    async fn test_backup_unsupported() {
        let store = Store::builder()
            .adapter(MemoryAdapter::new())
            .build()
            .unwrap();

        let mut out = Vec::new();
        backup(&store, &mut out).await.unwrap();
        assert!(String::from_utf8(out).unwrap().contains("does not support backups"));
    }

    #[test]
    fn test_version_disabled() {
        let mut out = Vec::new();
        version(&Store::new(), &mut out).unwrap();
        assert_eq!(String::from_utf8(out).unwrap(), "-1\n");
    }
}
