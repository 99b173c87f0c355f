//! Entry commands.
//!
//! - `keystash get <KEY>` - Print a value as JSON
//! - `keystash set <KEY> <VALUE>` - Store a value and sync
//! - `keystash delete <KEY>` - Remove a value and sync
//! - `keystash keys` - List keys in sorted order

use anyhow::{Context, Result};
use std::io::Write;

use super::parse_value;
use crate::store::Store;

/// Print the value stored under `key`.
pub fn get(store: &Store, key: &str, pretty: bool, out: &mut dyn Write) -> Result<()> {
    let Some(value) = store.get(key)? else {
        anyhow::bail!("Key not found: {key}");
    };

    let rendered = if pretty {
        serde_json::to_string_pretty(&value)?
    } else {
        serde_json::to_string(&value)?
    };
    writeln!(out, "{rendered}")?;
    Ok(())
}

/// Store `raw` under `key` and persist it.
pub async fn set(store: &Store, key: &str, raw: &str, out: &mut dyn Write) -> Result<()> {
    let stored = store.set(key, parse_value(raw))?;
    store
        .sync()
        .await
        .with_context(|| format!("Failed to persist '{key}'"))?;

    writeln!(out, "{key} = {stored}")?;
    Ok(())
}

/// Remove `key` and persist the removal.
pub async fn delete(store: &Store, key: &str, out: &mut dyn Write) -> Result<()> {
    if !store.delete(key)? {
        writeln!(out, "{key} not found")?;
        return Ok(());
    }

    store
        .sync()
        .await
        .with_context(|| format!("Failed to persist removal of '{key}'"))?;
    writeln!(out, "Deleted {key}")?;
    Ok(())
}

/// List every key, one per line.
pub fn keys(store: &Store, out: &mut dyn Write) -> Result<()> {
    for key in store.keys() {
        writeln!(out, "{key}")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::{Adapter, MemoryAdapter};
    use serde_json::json;

    fn output(buf: Vec<u8>) -> String {
        String::from_utf8(buf).unwrap()
    }

    fn store_with(adapter: &MemoryAdapter) -> Store {
        Store::builder()
            .adapter(adapter.clone())
            .versioning(true)
            .build()
            .unwrap()
    }

    #[tokio::test]
    async fn test_set_parses_and_syncs() {
        let adapter = MemoryAdapter::new();
        let store = store_with(&adapter);
        let mut out = Vec::new();

        set(&store, "count", "5", &mut out).await.unwrap();
        set(&store, "name", "alice", &mut out).await.unwrap();

        assert_eq!(store.get("count").unwrap(), Some(json!(5)));
        assert_eq!(store.get("name").unwrap(), Some(json!("alice")));
        assert_eq!(output(out), "count = 5\nname = \"alice\"\n");

        assert_eq!(adapter.get("count").await.unwrap(), Some(json!(5)));
    }

    #[test]
    fn test_get_prints_json() {
        let store = Store::new();
        store.set("cfg", json!({"a": 1})).unwrap();

        let mut out = Vec::new();
        get(&store, "cfg", false, &mut out).unwrap();
        assert_eq!(output(out), "{\"a\":1}\n");
    }

    #[test]
    fn test_get_missing_key_fails() {
        let store = Store::new();
        let mut out = Vec::new();
        let err = get(&store, "nope", false, &mut out).unwrap_err();
        assert!(err.to_string().contains("Key not found"));
    }

    #[tokio::test]
    async fn test_delete_persists_removal() {
        let adapter = MemoryAdapter::new();
        let store = store_with(&adapter);
        let mut out = Vec::new();

        set(&store, "k", "1", &mut out).await.unwrap();
        delete(&store, "k", &mut out).await.unwrap();
        delete(&store, "k", &mut out).await.unwrap();

        assert_eq!(adapter.get("k").await.unwrap(), None);
        assert!(output(out).ends_with("Deleted k\nk not found\n"));
    }

    #[test]
    fn test_keys_sorted() {
        let store = Store::new();
        store.set("b", 1).unwrap();
        store.set("a", 2).unwrap();

        let mut out = Vec::new();
        keys(&store, &mut out).unwrap();
        assert_eq!(output(out), "a\nb\n");
    }

    #[test]
    fn test_reserved_key_is_an_error() {
        let store = Store::new();
        let mut out = Vec::new();
        assert!(get(&store, "__version__", false, &mut out).is_err());
    }
}
