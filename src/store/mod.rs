//! Embedded key-value store with pluggable persistence adapters.
//!
//! The [`Store`] keeps every entry in memory. An optional [`Adapter`]
//! provides durability; data moves to it only through [`Store::sync`]
//! (explicitly or on a timer) and back through [`Store::init`].
//!
//! Adapters:
//!
//! - **FileAdapter**: one JSON object per file, rewritten on every write
//! - **SqliteAdapter**: two-column SQLite table with upserts
//! - **MemoryAdapter**: DashMap-backed, for testing and embedding
//!
//! # Example
//!
//! ```ignore
//! use keystash::store::{Hooks, SqliteAdapter, Store};
//!
//! let store = Store::builder()
//!     .adapter(SqliteAdapter::new("data/app.db"))
//!     .versioning(true)
//!     .hooks(Hooks::new().on_update_sync(|key, _| {
//!         tracing::info!(key = %key, "changed");
//!         Ok(())
//!     }))
//!     .build()?;
//!
//! store.init().await?;
//! store.set("settings", serde_json::json!({"theme": "dark"}))?;
//! store.sync().await?;
//! ```
//!
//! # Custom Adapters
//!
//! Implement the `Adapter` trait (and optionally `BackupCapable`) to persist
//! elsewhere:
//!
//! ```ignore
//! use keystash::store::{Adapter, Store};
//!
//! struct RedisAdapter { /* ... */ }
//! impl Adapter for RedisAdapter { /* ... */ }
//!
//! let store = Store::builder().adapter(RedisAdapter::new()).build()?;
//! ```

mod adapter;
mod engine;
mod file;
mod hooks;
mod memory;
mod sqlite;
mod validator;

#[cfg(test)]
mod property_tests;

// Re-export the public API
pub use adapter::{Adapter, BackupCapable, BackupInfo, RESERVED_VERSION_KEY};
pub use engine::{Store, StoreBuilder, VERSIONING_DISABLED};
pub use file::FileAdapter;
pub use hooks::{HookFuture, Hooks};
pub use memory::MemoryAdapter;
pub use sqlite::{DEFAULT_TABLE, SqliteAdapter};
pub use validator::{Typed, Validator};
