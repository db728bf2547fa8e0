use crate::{
    error::Result,
    lease::{LeaseEngine, LockHandle},
    metrics::LockMetrics,
    policy::{validate_resource_name, LockPolicy},
    store::LockStore,
};
use std::{future::Future, sync::Arc, time::Duration};
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Namespace shared by every lock key in the store.
pub const KEY_PREFIX: &str = "distributed-redislock";

/// Store key guarding `resource`.
pub fn lock_key(resource: &str) -> String {
    format!("{}:{}", KEY_PREFIX, resource)
}

/// Entry point for taking locks.
///
/// Holds only the store and the database selector, so one instance can be
/// cloned or shared across any number of tasks; every call produces an
/// independent [`LockHandle`].
#[derive(Clone)]
pub struct LockFactory {
    store: Arc<dyn LockStore>,
    database: u32,
    metrics: Option<Arc<LockMetrics>>,
}

impl LockFactory {
    pub fn new(store: Arc<dyn LockStore>, database: u32) -> Self {
        Self {
            store,
            database,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<LockMetrics>) -> Self {
        self.metrics = Some(metrics);
        self
    }

    pub fn database(&self) -> u32 {
        self.database
    }

    pub fn metrics(&self) -> Option<&Arc<LockMetrics>> {
        self.metrics.as_ref()
    }

    /// Validates the parameters and runs acquisition for `resource`.
    ///
    /// # Arguments
    ///
    /// * `resource` - Resource name; the store key is `distributed-redislock:<resource>`
    /// * `expiry` - TTL applied on acquisition and on every renewal
    /// * `max_wait` - How long to keep retrying while the key is held elsewhere
    /// * `renewal_budget` - Automatic refreshes performed while the handle is held
    /// * `retry_interval` - Delay between attempts
    /// * `cancel` - Aborts acquisition before it starts or while it waits
    ///
    /// # Errors
    ///
    /// Invalid arguments fail before the store is touched. Store failures during
    /// acquisition and cancellation are returned as errors. Running out of wait
    /// time is not an error: the handle reports `is_acquired() == false`.
    pub async fn create_lock(
        &self,
        resource: &str,
        expiry: Duration,
        max_wait: Duration,
        renewal_budget: u32,
        retry_interval: Duration,
        cancel: &CancellationToken,
    ) -> Result<LockHandle> {
        let policy = LockPolicy::new(expiry, max_wait, renewal_budget, retry_interval)?;
        self.acquire(resource, policy, cancel).await
    }

    /// Same as [`LockFactory::create_lock`] with a prebuilt policy.
    pub async fn acquire(
        &self,
        resource: &str,
        policy: LockPolicy,
        cancel: &CancellationToken,
    ) -> Result<LockHandle> {
        validate_resource_name(resource)?;

        let key = lock_key(resource);
        debug!(key = %key, database = self.database, ?policy, "Requesting lock");

        LeaseEngine::new(self.store.clone(), self.database, key, policy)
            .with_metrics(self.metrics.clone())
            .acquire(cancel)
            .await
    }

    /// Runs `work` while holding the lock on `resource`, then releases it.
    ///
    /// Returns `Ok(None)` without running `work` when the lock could not be
    /// obtained within the policy's wait time. If `work` panics the handle is
    /// dropped and the key is deleted in the background.
    pub async fn with_lock<F, Fut, T>(
        &self,
        resource: &str,
        policy: LockPolicy,
        cancel: &CancellationToken,
        work: F,
    ) -> Result<Option<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let mut handle = self.acquire(resource, policy, cancel).await?;
        if !handle.is_acquired() {
            return Ok(None);
        }

        let output = work().await;
        handle.release().await;
        Ok(Some(output))
    }
}
