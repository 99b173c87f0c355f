//! keystash - an embedded key-value store with pluggable persistence.
//!
//! The [`store::Store`] keeps every entry in memory and pushes snapshots to
//! an [`store::Adapter`] on demand or on a timer. Adapters for a JSON file,
//! SQLite and process memory are included.
//!
//! ```ignore
//! use keystash::store::{SqliteAdapter, Store};
//!
//! let store = Store::builder()
//!     .adapter(SqliteAdapter::new("data/app.db"))
//!     .versioning(true)
//!     .build()?;
//! store.init().await?;
//!
//! store.set("greeting", "hello")?;
//! store.sync().await?;
//! ```

pub mod commands;
pub mod config;
pub mod error;
pub mod store;

pub use error::{Error, Result};
pub use store::{Store, StoreBuilder};
