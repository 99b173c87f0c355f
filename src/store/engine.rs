//! The store engine: in-memory map, version counter and adapter sync.
//!
//! Mutations only touch memory. Persistence is push-only through
//! [`Store::sync`], called explicitly or by the periodic sync task.

use super::adapter::{Adapter, BackupInfo, RESERVED_VERSION_KEY};
use super::hooks::Hooks;
use super::validator::{Typed, Validator, rejection_message};
use crate::error::{Error, Result};
use parking_lot::{Mutex, RwLock};
use serde::Serialize;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::collections::{HashMap, HashSet};
use std::future::Future;
use std::sync::{Arc, Weak};
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Version reported when versioning is disabled.
pub const VERSIONING_DISABLED: i64 = -1;

/// Map and version counter, guarded together so every mutation and its
/// version bump are observed atomically.
struct State {
    entries: HashMap<String, Value>,
    /// Keys deleted since the last successful sync.
    removed: HashSet<String>,
    version: i64,
}

impl State {
    fn new(enable_versioning: bool) -> Self {
        Self {
            entries: HashMap::new(),
            removed: HashSet::new(),
            version: if enable_versioning {
                0
            } else {
                VERSIONING_DISABLED
            },
        }
    }
}

struct Inner {
    state: RwLock<State>,
    adapter: Option<Arc<dyn Adapter>>,
    hooks: Hooks,
    adapter_timeout: Option<Duration>,
    sync_task: Mutex<Option<JoinHandle<()>>>,
}

impl Drop for Inner {
    fn drop(&mut self) {
        if let Some(task) = self.sync_task.get_mut().take() {
            task.abort();
        }
    }
}

/// Embedded key-value store.
///
/// `Store` is `Clone`; clones share the same map, version and adapter.
///
/// # Example
///
/// ```ignore
/// use keystash::store::{FileAdapter, Store};
///
/// let store = Store::builder()
///     .adapter(FileAdapter::new("data/store.json"))
///     .versioning(true)
///     .build()?;
/// store.init().await?;
///
/// store.set("count", 1)?;
/// assert_eq!(store.version(), 1);
/// store.sync().await?;
/// ```
#[derive(Clone)]
pub struct Store {
    inner: Arc<Inner>,
}

/// Builder for [`Store`].
#[derive(Default)]
pub struct StoreBuilder {
    adapter: Option<Arc<dyn Adapter>>,
    hooks: Hooks,
    sync_interval: Option<Duration>,
    enable_versioning: bool,
    adapter_timeout: Option<Duration>,
}

impl StoreBuilder {
    /// Persists through `adapter`.
    #[must_use]
    pub fn adapter<A: Adapter>(self, adapter: A) -> Self {
        self.shared_adapter(Arc::new(adapter))
    }

    /// Persists through an adapter shared with other owners.
    #[must_use]
    pub fn shared_adapter(mut self, adapter: Arc<dyn Adapter>) -> Self {
        self.adapter = Some(adapter);
        self
    }

    /// Sets the lifecycle hooks.
    #[must_use]
    pub fn hooks(mut self, hooks: Hooks) -> Self {
        self.hooks = hooks;
        self
    }

    /// Syncs to the adapter every `interval` until the store is disposed.
    #[must_use]
    pub fn sync_interval(mut self, interval: Duration) -> Self {
        self.sync_interval = Some(interval);
        self
    }

    /// Enables the version counter.
    #[must_use]
    pub fn versioning(mut self, enabled: bool) -> Self {
        self.enable_versioning = enabled;
        self
    }

    /// Fails adapter calls that take longer than `timeout`.
    #[must_use]
    pub fn adapter_timeout(mut self, timeout: Duration) -> Self {
        self.adapter_timeout = Some(timeout);
        self
    }

    /// Builds the store, starting the periodic sync task if configured.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if a sync interval is set but no tokio
    /// runtime is running, or if the interval is zero.
    pub fn build(self) -> Result<Store> {
        let store = Store {
            inner: Arc::new(Inner {
                state: RwLock::new(State::new(self.enable_versioning)),
                adapter: self.adapter,
                hooks: self.hooks,
                adapter_timeout: self.adapter_timeout,
                sync_task: Mutex::new(None),
            }),
        };

        if let Some(interval) = self.sync_interval {
            if interval.is_zero() {
                return Err(Error::Config("sync interval must be non-zero".to_string()));
            }
            let handle = tokio::runtime::Handle::try_current().map_err(|_| {
                Error::Config("periodic sync requires a running tokio runtime".to_string())
            })?;
            let task = handle.spawn(run_periodic_sync(Arc::downgrade(&store.inner), interval));
            *store.inner.sync_task.lock() = Some(task);
        }

        Ok(store)
    }
}

/// Syncs the store on a fixed interval until it is dropped.
async fn run_periodic_sync(store: Weak<Inner>, interval: Duration) {
    let mut ticker = tokio::time::interval(interval);
    // The first tick completes immediately; skip it so syncing starts one interval in.
    ticker.tick().await;

    info!(interval = ?interval, "Starting periodic sync");

    loop {
        ticker.tick().await;
        let Some(inner) = store.upgrade() else {
            break;
        };
        let store = Store { inner };
        if let Err(e) = store.sync().await {
            warn!(error = %e, "Periodic sync failed");
        }
    }
}

impl Store {
    /// Returns a builder with no adapter, no hooks and versioning off.
    pub fn builder() -> StoreBuilder {
        StoreBuilder::default()
    }

    /// Creates a memory-only store with versioning off.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Inner {
                state: RwLock::new(State::new(false)),
                adapter: None,
                hooks: Hooks::default(),
                adapter_timeout: None,
                sync_task: Mutex::new(None),
            }),
        }
    }

    /// Returns the current value for `key`, or `None` if absent.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for the reserved version key.
    pub fn get(&self, key: &str) -> Result<Option<Value>> {
        check_key(key)?;
        Ok(self.inner.state.read().entries.get(key).cloned())
    }

    /// Returns the value for `key` passed through `validator`.
    ///
    /// The stored value is left untouched; only the returned value is
    /// transformed.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for the reserved key and
    /// [`Error::ValidationFailed`] if the validator rejects the value.
    pub fn get_with<T>(&self, key: &str, validator: &impl Validator<T>) -> Result<Option<T>> {
        let Some(raw) = self.get(key)? else {
            return Ok(None);
        };
        validator
            .validate(&raw)
            .map(Some)
            .map_err(|e| Error::validation_failed(key, rejection_message(&e)))
    }

    /// Returns the value for `key` deserialized into `T`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::ValidationFailed`] if the value does not match `T`.
    pub fn get_as<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        self.get_with(key, &Typed::<T>::new())
    }

    /// Stores `value` under `key` and returns the stored JSON value.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for the reserved key and
    /// [`Error::NotSerializable`] if `value` cannot be represented as JSON.
    pub fn set<V: Serialize>(&self, key: &str, value: V) -> Result<Value> {
        check_key(key)?;
        let value = probe(key, &value)?;
        Ok(self.store(key, value))
    }

    /// Validates `value` and stores the validator's output.
    ///
    /// On rejection the map is left unmodified for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`], [`Error::NotSerializable`] (for the
    /// input or the validator's output) or [`Error::ValidationFailed`].
    pub fn set_with<V, T>(&self, key: &str, value: V, validator: &impl Validator<T>) -> Result<T>
    where
        V: Serialize,
        T: Serialize,
    {
        check_key(key)?;
        let raw = probe(key, &value)?;
        let typed = validator
            .validate(&raw)
            .map_err(|e| Error::validation_failed(key, rejection_message(&e)))?;
        let stored = probe(key, &typed)?;
        self.store(key, stored);
        Ok(typed)
    }

    /// Stores `Some(value)` or deletes `key` on `None`.
    ///
    /// Returns the stored value, or `None` when the key was deleted.
    ///
    /// # Errors
    ///
    /// Same as [`Store::set`].
    pub fn set_opt<V: Serialize>(&self, key: &str, value: Option<V>) -> Result<Option<Value>> {
        match value {
            Some(value) => self.set(key, value).map(Some),
            None => self.delete(key).map(|_| None),
        }
    }

    fn store(&self, key: &str, value: Value) -> Value {
        {
            let mut state = self.inner.state.write();
            state.entries.insert(key.to_string(), value.clone());
            state.removed.remove(key);
            if state.version != VERSIONING_DISABLED {
                state.version += 1;
            }
        }
        debug!(key = %key, "Stored key");
        self.inner.hooks.fire_update(key, &value);
        value
    }

    /// Removes `key`.
    ///
    /// Returns `Ok(true)` if the key existed. Deleting an absent key changes
    /// nothing: no version bump and no hook.
    ///
    /// # Errors
    ///
    /// Returns [`Error::InvalidKey`] for the reserved key.
    pub fn delete(&self, key: &str) -> Result<bool> {
        check_key(key)?;
        {
            let mut state = self.inner.state.write();
            if state.entries.remove(key).is_none() {
                return Ok(false);
            }
            state.removed.insert(key.to_string());
            if state.version != VERSIONING_DISABLED {
                state.version += 1;
            }
        }
        debug!(key = %key, "Deleted key");
        self.inner.hooks.fire_delete(key);
        Ok(true)
    }

    /// Returns true if `key` is present.
    ///
    /// The reserved version key is never stored as an entry, so
    /// `contains_key(RESERVED_VERSION_KEY)` is always false.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner.state.read().entries.contains_key(key)
    }

    /// Returns all keys, sorted.
    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.state.read().entries.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Number of entries in memory.
    pub fn len(&self) -> usize {
        self.inner.state.read().entries.len()
    }

    /// Returns true if the store holds no entries.
    pub fn is_empty(&self) -> bool {
        self.inner.state.read().entries.is_empty()
    }

    /// Current version, or [`VERSIONING_DISABLED`].
    pub fn version(&self) -> i64 {
        self.inner.state.read().version
    }

    /// Initializes the adapter and loads every persisted entry.
    ///
    /// With versioning enabled, the counter is restored from the reserved
    /// key. Loading neither bumps the version nor fires hooks.
    ///
    /// # Errors
    ///
    /// Propagates adapter initialization and read failures.
    pub async fn init(&self) -> Result<()> {
        let Some(adapter) = &self.inner.adapter else {
            return Ok(());
        };

        self.timed(adapter.name(), "init", adapter.init()).await?;

        let Some(persisted) = self.timed(adapter.name(), "load", adapter.all()).await? else {
            info!(adapter = adapter.name(), "Adapter does not enumerate, nothing loaded");
            return Ok(());
        };

        let mut state = self.inner.state.write();
        let mut loaded = 0usize;
        for (key, value) in persisted {
            if key == RESERVED_VERSION_KEY {
                if state.version != VERSIONING_DISABLED {
                    match value.as_i64() {
                        Some(version) if version >= 0 => state.version = version,
                        _ => warn!(value = %value, "Ignoring invalid persisted version"),
                    }
                }
                continue;
            }
            state.entries.insert(key, value);
            loaded += 1;
        }
        info!(adapter = adapter.name(), count = loaded, version = state.version, "Store loaded");
        Ok(())
    }

    /// Pushes the version and every entry to the adapter.
    ///
    /// This is a full snapshot, written one key at a time, followed by the
    /// removal of keys deleted since the last successful sync. A failure part
    /// way through leaves the adapter partially updated; the sync can simply
    /// be repeated.
    ///
    /// # Errors
    ///
    /// Returns the first adapter failure.
    pub async fn sync(&self) -> Result<()> {
        let Some(adapter) = &self.inner.adapter else {
            return Ok(());
        };

        let (version, entries, removed) = {
            let state = self.inner.state.read();
            let entries: Vec<(String, Value)> = state
                .entries
                .iter()
                .filter(|(key, _)| key.as_str() != RESERVED_VERSION_KEY)
                .map(|(k, v)| (k.clone(), v.clone()))
                .collect();
            let removed: Vec<String> = state.removed.iter().cloned().collect();
            (state.version, entries, removed)
        };

        if version != VERSIONING_DISABLED {
            self.timed(
                adapter.name(),
                "sync version",
                adapter.set(RESERVED_VERSION_KEY, &Value::from(version)),
            )
            .await?;
        }

        for (key, value) in &entries {
            self.timed(adapter.name(), "sync", adapter.set(key, value))
                .await?;
        }

        for key in &removed {
            self.timed(adapter.name(), "sync delete", adapter.delete(key))
                .await?;
            let mut state = self.inner.state.write();
            if !state.entries.contains_key(key) {
                state.removed.remove(key);
            }
            drop(state);
        }

        debug!(
            adapter = adapter.name(),
            count = entries.len(),
            removed = removed.len(),
            version,
            "Store synced"
        );
        Ok(())
    }

    /// Creates a backup if the adapter supports it.
    ///
    /// Returns `Ok(None)` when there is no adapter or it has no backup
    /// capability. The backup hook receives the timestamp and the version
    /// (0 when versioning is disabled).
    ///
    /// # Errors
    ///
    /// Propagates adapter backup failures. Hook failures are only logged.
    pub async fn create_backup(&self) -> Result<Option<BackupInfo>> {
        let Some(adapter) = &self.inner.adapter else {
            return Ok(None);
        };
        let Some(backup) = adapter.as_backup() else {
            debug!(adapter = adapter.name(), "Adapter has no backup capability");
            return Ok(None);
        };

        let info = self.timed(adapter.name(), "backup", backup.backup()).await?;
        self.inner
            .hooks
            .fire_backup(info.timestamp, self.version().max(0));
        Ok(Some(info))
    }

    /// Stops the periodic sync task.
    ///
    /// Safe to call more than once. The map and the adapter are left as they
    /// are.
    pub fn dispose(&self) {
        if let Some(task) = self.inner.sync_task.lock().take() {
            task.abort();
            debug!("Periodic sync stopped");
        }
    }

    /// Applies the configured adapter timeout to `fut`.
    async fn timed<T>(
        &self,
        adapter: &str,
        op: &str,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        match self.inner.adapter_timeout {
            Some(limit) => tokio::time::timeout(limit, fut).await.map_err(|e| {
                Error::adapter_io(format!("{adapter} adapter {op} timed out after {limit:?}"), e)
            })?,
            None => fut.await,
        }
    }
}

impl Default for Store {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.inner.state.read();
        f.debug_struct("Store")
            .field("entries", &state.entries.len())
            .field("version", &state.version)
            .field("adapter", &self.inner.adapter.as_ref().map(|a| a.name()))
            .field("hooks", &self.inner.hooks)
            .finish()
    }
}

fn check_key(key: &str) -> Result<()> {
    if key == RESERVED_VERSION_KEY {
        return Err(Error::InvalidKey {
            key: key.to_string(),
            reason: "reserved for the store version counter",
        });
    }
    Ok(())
}

/// Serialization probe: converts `value` to JSON or rejects it.
fn probe<V: Serialize + ?Sized>(key: &str, value: &V) -> Result<Value> {
    serde_json::to_value(value).map_err(|source| Error::NotSerializable {
        key: key.to_string(),
        source,
    })
}
