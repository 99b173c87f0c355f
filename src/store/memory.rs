//! In-memory storage adapter.
//!
//! Provides a fast, non-persistent adapter using DashMap for concurrent
//! access. Ideal for testing and for embedding a store whose "durable" side
//! only needs to outlive individual `Store` instances within one process.

use super::adapter::Adapter;
use crate::error::Result;
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

/// In-memory storage adapter using DashMap.
///
/// Supports enumeration but not backups. Clones share the same underlying
/// map, so a clone handed to a second store sees everything the first one
/// synced.
///
/// # Example
///
/// ```ignore
/// use keystash::store::{MemoryAdapter, Store};
///
/// let adapter = MemoryAdapter::new();
/// let store = Store::builder().adapter(adapter.clone()).build()?;
/// ```
#[derive(Clone, Default)]
pub struct MemoryAdapter {
    data: Arc<DashMap<String, Value>>,
}

impl MemoryAdapter {
    /// Creates a new empty in-memory adapter.
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of persisted entries.
    pub fn len(&self) -> usize {
        self.data.len()
    }

    /// Returns true if nothing has been persisted.
    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }
}

#[async_trait]
impl Adapter for MemoryAdapter {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<Value>> {
        Ok(self.data.get(key).map(|entry| entry.value().clone()))
    }

    async fn set(&self, key: &str, value: &Value) -> Result<()> {
        self.data.insert(key.to_string(), value.clone());
        Ok(())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.data.remove(key).is_some())
    }

    async fn all(&self) -> Result<Option<HashMap<String, Value>>> {
        Ok(Some(
            self.data
                .iter()
                .map(|entry| (entry.key().clone(), entry.value().clone()))
                .collect(),
        ))
    }
}
