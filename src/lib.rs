//! Lease-based mutual exclusion over a shared key-value store.
//!
//! A lock is a single store key, `distributed-redislock:<resource>`, written with
//! set-if-absent and a TTL. While a handle holds it, a background task
//! refreshes the TTL every half expiry, up to a renewal budget. Releasing the
//! handle (or dropping it) stops renewal and deletes the key; a crashed holder
//! simply lets the key lapse.
//!
//! ```no_run
//! use lease_lock::{LockFactory, MemoryStore};
//! use std::{sync::Arc, time::Duration};
//! use tokio_util::sync::CancellationToken;
//!
//! # async fn run() -> lease_lock::Result<()> {
//! let factory = LockFactory::new(Arc::new(MemoryStore::new()), 0);
//! let mut handle = factory
//!     .create_lock(
//!         "invoices",
//!         Duration::from_secs(30),
//!         Duration::from_secs(5),
//!         10,
//!         Duration::from_millis(250),
//!         &CancellationToken::new(),
//!     )
//!     .await?;
//!
//! if handle.is_acquired() {
//!     // critical section
//! }
//! handle.release().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod factory;
pub mod lease;
pub mod metrics;
pub mod policy;
pub mod store;

pub use error::{LockError, Result, StoreError};
pub use factory::{lock_key, LockFactory, KEY_PREFIX};
pub use lease::{LeaseEngine, LockHandle};
pub use metrics::LockMetrics;
pub use policy::{LockPolicy, PolicyConfig};
pub use store::{LockStore, MemoryStore, SENTINEL};
#[cfg(feature = "redis")]
pub use store::RedisStore;
