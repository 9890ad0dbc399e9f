//! Durable stores.
//!
//! - `StorageArea` / `LocalStorage`: the small synchronous key-value store the
//!   foreground reads and writes directly
//! - `CacheStorage`: named partitions of URL → response snapshots, owned by
//!   the background agent

mod atomic;
pub mod cache;
pub mod error;
pub mod kv;

pub use cache::{CacheStorage, CachedResponse};
pub use error::{StoreError, StoreResult};
pub use kv::{LocalStorage, StorageArea, StorageEvent};
