//! Store adapters: the three atomic key operations a lease needs.

mod memory;
#[cfg(feature = "redis")]
mod redis_store;

pub use memory::MemoryStore;
#[cfg(feature = "redis")]
pub use redis_store::RedisStore;

use crate::error::StoreError;
use async_trait::async_trait;
use std::time::Duration;

/// Value written into every lock key. Only the key's presence matters.
pub const SENTINEL: &str = "1";

/// Atomic key operations against a key-value store with per-key TTLs.
///
/// `database` selects the logical database or partition inside the store;
/// keys in different databases never collide.
#[async_trait]
pub trait LockStore: Send + Sync {
    /// Writes `value` under `key` with the given TTL if and only if the key
    /// does not exist. Returns `true` when this call created the key.
    async fn set_if_absent(
        &self,
        database: u32,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Resets the TTL of an existing key. Returns `false` if the key is gone.
    async fn refresh_ttl(&self, database: u32, key: &str, ttl: Duration)
        -> Result<bool, StoreError>;

    /// Removes the key. Returns `false` if there was nothing to remove.
    async fn delete(&self, database: u32, key: &str) -> Result<bool, StoreError>;
}
