//! Store lifecycle hooks and their isolated dispatcher.
//!
//! Hooks are fire-and-forget: the triggering store operation never waits for
//! them, and neither an error nor a panic inside a hook reaches the caller.
//! Failures are reported through `tracing` instead.

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::BoxFuture;
use serde_json::Value;
use std::future::Future;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use tracing::warn;

/// Future returned by a hook callback.
pub type HookFuture = BoxFuture<'static, anyhow::Result<()>>;

type UpdateFn = dyn Fn(String, Value) -> HookFuture + Send + Sync;
type DeleteFn = dyn Fn(String) -> HookFuture + Send + Sync;
type BackupFn = dyn Fn(DateTime<Utc>, i64) -> HookFuture + Send + Sync;

/// Optional callbacks fired on store mutations and backups.
///
/// # Example
///
/// ```ignore
/// use keystash::store::Hooks;
///
/// let hooks = Hooks::new()
///     .on_update_sync(|key, _value| {
///         tracing::info!(key = %key, "updated");
///         Ok(())
///     })
///     .on_backup(|timestamp, version| async move {
///         notify_ops(timestamp, version).await
///     });
/// ```
#[derive(Clone, Default)]
pub struct Hooks {
    update: Option<Arc<UpdateFn>>,
    delete: Option<Arc<DeleteFn>>,
    backup: Option<Arc<BackupFn>>,
}

impl Hooks {
    /// Creates an empty hook set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers an async callback fired after a successful `set`.
    #[must_use]
    pub fn on_update<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String, Value) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.update = Some(Arc::new(move |key, value| f(key, value).boxed()));
        self
    }

    /// Registers a synchronous callback fired after a successful `set`.
    #[must_use]
    pub fn on_update_sync<F>(self, f: F) -> Self
    where
        F: Fn(&str, &Value) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_update(move |key, value| futures::future::ready(f(&key, &value)))
    }

    /// Registers an async callback fired after a `delete` that removed a key.
    #[must_use]
    pub fn on_delete<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.delete = Some(Arc::new(move |key| f(key).boxed()));
        self
    }

    /// Registers a synchronous callback fired after a `delete` that removed a key.
    #[must_use]
    pub fn on_delete_sync<F>(self, f: F) -> Self
    where
        F: Fn(&str) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_delete(move |key| futures::future::ready(f(&key)))
    }

    /// Registers an async callback fired after a backup is created.
    ///
    /// Receives the backup timestamp and the store version (0 when
    /// versioning is disabled).
    #[must_use]
    pub fn on_backup<F, Fut>(mut self, f: F) -> Self
    where
        F: Fn(DateTime<Utc>, i64) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<()>> + Send + 'static,
    {
        self.backup = Some(Arc::new(move |ts, version| f(ts, version).boxed()));
        self
    }

    /// Registers a synchronous callback fired after a backup is created.
    #[must_use]
    pub fn on_backup_sync<F>(self, f: F) -> Self
    where
        F: Fn(DateTime<Utc>, i64) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.on_backup(move |ts, version| futures::future::ready(f(ts, version)))
    }

    pub(crate) fn fire_update(&self, key: &str, value: &Value) {
        if let Some(hook) = &self.update {
            dispatch("update", key, || hook(key.to_string(), value.clone()));
        }
    }

    pub(crate) fn fire_delete(&self, key: &str) {
        if let Some(hook) = &self.delete {
            dispatch("delete", key, || hook(key.to_string()));
        }
    }

    pub(crate) fn fire_backup(&self, timestamp: DateTime<Utc>, version: i64) {
        if let Some(hook) = &self.backup {
            dispatch("backup", "", || hook(timestamp, version));
        }
    }
}

impl std::fmt::Debug for Hooks {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Hooks")
            .field("update", &self.update.is_some())
            .field("delete", &self.delete.is_some())
            .field("backup", &self.backup.is_some())
            .finish()
    }
}

/// Invokes a hook inside a failure boundary.
///
/// The callback itself runs inline (synchronous hooks do their work here).
/// The future it returns is spawned on the current tokio runtime, or on a
/// detached thread when no runtime is running. It is never driven on the
/// caller's thread, so a hook that never resolves cannot block the store.
fn dispatch(event: &'static str, key: &str, invoke: impl FnOnce() -> HookFuture) {
    let future = match catch_unwind(AssertUnwindSafe(invoke)) {
        Ok(future) => future,
        Err(panic) => {
            warn!(hook = event, key = %key, panic = %panic_message(&*panic), "Hook panicked");
            return;
        },
    };

    let key = key.to_string();
    let guarded = async move {
        match AssertUnwindSafe(future).catch_unwind().await {
            Ok(Ok(())) => {},
            Ok(Err(e)) => warn!(hook = event, key = %key, error = %format!("{e:#}"), "Hook failed"),
            Err(panic) => {
                warn!(hook = event, key = %key, panic = %panic_message(&*panic), "Hook panicked");
            },
        }
    };

    match tokio::runtime::Handle::try_current() {
        Ok(handle) => {
            handle.spawn(guarded);
        },
        Err(_) => {
            let spawned = std::thread::Builder::new()
                .name(format!("keystash-hook-{event}"))
                .spawn(move || futures::executor::block_on(guarded));
            if let Err(e) = spawned {
                warn!(hook = event, error = %e, "Failed to start hook thread");
            }
        },
    }
}

fn panic_message(panic: &(dyn std::any::Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}
