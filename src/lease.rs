//! Lease lifecycle: acquisition with bounded retry, background renewal and
//! release.
//!
//! A [`LockHandle`] and its renewal task share one `Lease`. The renewal task
//! and the release path both go through `tick_gate`, so a refresh that is
//! already talking to the store finishes before the key is deleted, and a tick
//! that arrives after disposal sees the `disposed` flag and does nothing.

use crate::{
    error::{LockError, Result, StoreError},
    metrics::{AcquireOutcome, LockMetrics},
    policy::LockPolicy,
    store::{LockStore, SENTINEL},
};
use std::{
    fmt,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::Mutex,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// One lock request bound to a store, a database and a namespaced key.
///
/// Built by [`LockFactory`](crate::factory::LockFactory); consumed by
/// [`LeaseEngine::acquire`].
pub struct LeaseEngine {
    store: Arc<dyn LockStore>,
    database: u32,
    key: String,
    policy: LockPolicy,
    metrics: Option<Arc<LockMetrics>>,
}

impl LeaseEngine {
    pub fn new(
        store: Arc<dyn LockStore>,
        database: u32,
        key: impl Into<String>,
        policy: LockPolicy,
    ) -> Self {
        Self {
            store,
            database,
            key: key.into(),
            policy,
            metrics: None,
        }
    }

    pub fn with_metrics(mut self, metrics: Option<Arc<LockMetrics>>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Runs the acquisition procedure.
    ///
    /// Returns a handle whether or not the lock was obtained; check
    /// [`LockHandle::is_acquired`]. Errors are reserved for cancellation and
    /// store failures.
    ///
    /// Only the retry sleep observes `cancel`. A store call that has started
    /// always runs to completion, so a cancelled acquisition never leaves a
    /// key it cannot account for.
    pub async fn acquire(self, cancel: &CancellationToken) -> Result<LockHandle> {
        let lease = Arc::new(Lease {
            id: Uuid::new_v4(),
            store: self.store,
            database: self.database,
            key: self.key,
            policy: self.policy,
            metrics: self.metrics,
            disposed: AtomicBool::new(false),
            renewals: AtomicU32::new(0),
            tick_gate: Mutex::new(()),
        });

        let started = Instant::now();
        let result = if cancel.is_cancelled() {
            Err(LockError::Cancelled)
        } else {
            lease.acquire_with_retry(cancel).await
        };

        if let Some(metrics) = &lease.metrics {
            let outcome = match &result {
                Ok(true) => AcquireOutcome::Acquired,
                Ok(false) => AcquireOutcome::NotAcquired,
                Err(LockError::Cancelled) => AcquireOutcome::Cancelled,
                Err(_) => AcquireOutcome::Failed,
            };
            metrics.record_acquire(outcome, started.elapsed());
        }

        let acquired = result?;
        let renewal = if acquired && lease.policy.renewal_budget() > 0 {
            Some(spawn_renewal(lease.clone()))
        } else {
            None
        };

        Ok(LockHandle {
            lease,
            acquired,
            renewal,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum RenewalTick {
    Continue,
    Exhausted,
    Disposed,
}

struct Lease {
    id: Uuid,
    store: Arc<dyn LockStore>,
    database: u32,
    key: String,
    policy: LockPolicy,
    metrics: Option<Arc<LockMetrics>>,
    disposed: AtomicBool,
    renewals: AtomicU32,
    tick_gate: Mutex<()>,
}

impl Lease {
    async fn try_set(&self) -> std::result::Result<bool, StoreError> {
        self.store
            .set_if_absent(self.database, &self.key, SENTINEL, self.policy.expiry())
            .await
    }

    async fn acquire_with_retry(&self, cancel: &CancellationToken) -> Result<bool> {
        let mut attempts: u32 = 1;
        if self.try_set().await? {
            info!(key = %self.key, handle = %self.id, attempts, "Lock acquired");
            return Ok(true);
        }

        if self.policy.max_wait().is_zero() {
            info!(key = %self.key, handle = %self.id, attempts, "Lock not acquired, no wait allowed");
            return Ok(false);
        }

        // Best effort: attempts happen every retry interval while the next one
        // would still fall inside the wait window. A window too long for the
        // clock has no deadline.
        let deadline = Instant::now().checked_add(self.policy.max_wait());
        let retry_interval = self.policy.retry_interval();

        loop {
            if past_deadline(deadline, retry_interval) {
                info!(key = %self.key, handle = %self.id, attempts, "Lock not acquired within wait time");
                return Ok(false);
            }

            tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    debug!(key = %self.key, handle = %self.id, attempts, "Lock wait cancelled");
                    return Err(LockError::Cancelled);
                }
                _ = pause(retry_interval) => {}
            }

            attempts += 1;
            if self.try_set().await? {
                info!(key = %self.key, handle = %self.id, attempts, "Lock acquired");
                return Ok(true);
            }
            debug!(key = %self.key, handle = %self.id, attempts, "Lock held elsewhere, retrying");
        }
    }

    async fn renew(&self) -> RenewalTick {
        let _gate = self.tick_gate.lock().await;
        if self.disposed.load(Ordering::Acquire) {
            return RenewalTick::Disposed;
        }

        let budget = self.policy.renewal_budget();
        if self.renewals.load(Ordering::Acquire) >= budget {
            return RenewalTick::Exhausted;
        }

        // Failures are counted as a spent renewal and otherwise dropped: the
        // worst outcome is the key expiring under us.
        let refreshed = match self
            .store
            .refresh_ttl(self.database, &self.key, self.policy.expiry())
            .await
        {
            Ok(true) => true,
            Ok(false) => {
                warn!(key = %self.key, handle = %self.id, "Lease key missing on renewal, lock may be lost");
                false
            }
            Err(e) => {
                warn!(key = %self.key, handle = %self.id, error = %e, "Lease renewal failed");
                false
            }
        };

        let renewals = self.renewals.fetch_add(1, Ordering::AcqRel) + 1;
        if let Some(metrics) = &self.metrics {
            metrics.record_renewal(refreshed);
        }
        debug!(key = %self.key, handle = %self.id, renewals, budget, refreshed, "Lease renewal tick");

        if renewals >= budget {
            debug!(key = %self.key, handle = %self.id, "Renewal budget spent");
            RenewalTick::Exhausted
        } else {
            RenewalTick::Continue
        }
    }

    async fn delete_key(&self) {
        // Waits out a refresh that is already in flight.
        let _gate = self.tick_gate.lock().await;

        let succeeded = match self.store.delete(self.database, &self.key).await {
            Ok(existed) => {
                info!(key = %self.key, handle = %self.id, existed, "Lock released");
                true
            }
            Err(e) => {
                warn!(key = %self.key, handle = %self.id, error = %e, "Lock release failed, key will lapse at its TTL");
                false
            }
        };

        if let Some(metrics) = &self.metrics {
            metrics.record_release(succeeded);
        }
    }
}

fn past_deadline(deadline: Option<Instant>, retry_interval: Duration) -> bool {
    match (deadline, Instant::now().checked_add(retry_interval)) {
        (None, _) => false,
        (Some(_), None) => true,
        (Some(deadline), Some(next)) => next > deadline,
    }
}

async fn pause(interval: Duration) {
    if interval.is_zero() {
        tokio::task::yield_now().await;
    } else {
        time::sleep(interval).await;
    }
}

fn spawn_renewal(lease: Arc<Lease>) -> CancellationToken {
    let cancel = CancellationToken::new();
    let token = cancel.clone();
    let period = lease.policy.renewal_period();

    tokio::spawn(async move {
        let Some(start) = Instant::now().checked_add(period) else {
            debug!(key = %lease.key, handle = %lease.id, "Renewal period beyond the clock, no renewal scheduled");
            return;
        };
        let mut ticker = time::interval_at(start, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                biased;
                _ = token.cancelled() => break,
                _ = ticker.tick() => {
                    if lease.renew().await != RenewalTick::Continue {
                        break;
                    }
                }
            }
        }
        debug!(key = %lease.key, handle = %lease.id, "Renewal task stopped");
    });

    cancel
}

/// Result of one lock request.
///
/// Holding an acquired handle means owning the resource until the handle is
/// released or dropped. Dropping an unreleased handle stops renewal and
/// deletes the key from a background task on the current runtime.
pub struct LockHandle {
    lease: Arc<Lease>,
    acquired: bool,
    renewal: Option<CancellationToken>,
}

impl LockHandle {
    pub fn is_acquired(&self) -> bool {
        self.acquired
    }

    pub fn key(&self) -> &str {
        &self.lease.key
    }

    pub fn id(&self) -> Uuid {
        self.lease.id
    }

    pub fn database(&self) -> u32 {
        self.lease.database
    }

    pub fn policy(&self) -> &LockPolicy {
        &self.lease.policy
    }

    /// Renewal ticks that have acted so far, successful or not.
    pub fn renewals(&self) -> u32 {
        self.lease.renewals.load(Ordering::Acquire)
    }

    pub fn is_released(&self) -> bool {
        self.lease.disposed.load(Ordering::Acquire)
    }

    /// Stops renewal and deletes the key.
    ///
    /// Never fails: a store error only means the key lingers until its TTL.
    /// Calling it again is a no-op, and a handle that never acquired the lock
    /// leaves the key alone since it belongs to someone else.
    pub async fn release(&mut self) {
        if !self.dispose() {
            return;
        }
        if self.acquired {
            self.lease.delete_key().await;
        }
    }

    /// Marks the lease disposed and stops the timer. Returns `false` if that
    /// already happened.
    fn dispose(&mut self) -> bool {
        if self.lease.disposed.swap(true, Ordering::AcqRel) {
            return false;
        }
        if let Some(renewal) = self.renewal.take() {
            renewal.cancel();
        }
        true
    }
}

impl Drop for LockHandle {
    fn drop(&mut self) {
        if !self.dispose() || !self.acquired {
            return;
        }

        match tokio::runtime::Handle::try_current() {
            Ok(runtime) => {
                let lease = self.lease.clone();
                runtime.spawn(async move {
                    lease.delete_key().await;
                });
            }
            Err(_) => {
                warn!(key = %self.lease.key, handle = %self.lease.id, "Lock handle dropped outside a runtime, key will lapse at its TTL");
            }
        }
    }
}

impl fmt::Debug for LockHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockHandle")
            .field("id", &self.lease.id)
            .field("key", &self.lease.key)
            .field("database", &self.lease.database)
            .field("acquired", &self.acquired)
            .field("renewals", &self.renewals())
            .field("released", &self.is_released())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::MemoryStore;
    use async_trait::async_trait;
    use std::sync::Mutex as StdMutex;

    fn policy(expiry_s: u64, wait_s: u64, budget: u32, retry_s: u64) -> LockPolicy {
        LockPolicy::new(
            Duration::from_secs(expiry_s),
            Duration::from_secs(wait_s),
            budget,
            Duration::from_secs(retry_s),
        )
        .unwrap()
    }

    fn engine(store: &MemoryStore, key: &str, policy: LockPolicy) -> LeaseEngine {
        LeaseEngine::new(Arc::new(store.clone()), 0, key, policy)
    }

    /// Memory store that records operations and can slow down refreshes.
    #[derive(Clone)]
    struct RecordingStore {
        inner: MemoryStore,
        refresh_delay: Duration,
        events: Arc<StdMutex<Vec<&'static str>>>,
    }

    impl RecordingStore {
        fn new(refresh_delay: Duration) -> Self {
            Self {
                inner: MemoryStore::new(),
                refresh_delay,
                events: Arc::new(StdMutex::new(Vec::new())),
            }
        }

        fn events(&self) -> Vec<&'static str> {
            self.events.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl LockStore for RecordingStore {
        async fn set_if_absent(
            &self,
            database: u32,
            key: &str,
            value: &str,
            ttl: Duration,
        ) -> std::result::Result<bool, StoreError> {
            self.events.lock().unwrap().push("set");
            self.inner.set_if_absent(database, key, value, ttl).await
        }

        async fn refresh_ttl(
            &self,
            database: u32,
            key: &str,
            ttl: Duration,
        ) -> std::result::Result<bool, StoreError> {
            self.events.lock().unwrap().push("refresh_start");
            time::sleep(self.refresh_delay).await;
            let refreshed = self.inner.refresh_ttl(database, key, ttl).await;
            self.events.lock().unwrap().push("refresh_end");
            refreshed
        }

        async fn delete(&self, database: u32, key: &str) -> std::result::Result<bool, StoreError> {
            self.events.lock().unwrap().push("delete");
            self.inner.delete(database, key).await
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_acquire_free_key_first_attempt() {
        let store = MemoryStore::new();
        let mut handle = engine(&store, "lock:a", policy(3, 4, 0, 1))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();

        assert!(handle.is_acquired());
        assert_eq!(store.set_calls(), 1);
        assert_eq!(store.value(0, "lock:a"), Some(SENTINEL.to_string()));
        assert!(handle.renewal.is_none());

        handle.release().await;
        assert!(!store.contains(0, "lock:a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_shorter_than_retry_makes_one_attempt() {
        let store = MemoryStore::new();
        store.set_if_absent(0, "lock:a", "1", Duration::from_secs(30)).await.unwrap();

        let started = Instant::now();
        let handle = engine(&store, "lock:a", policy(30, 3, 0, 5))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();

        assert!(!handle.is_acquired());
        assert_eq!(store.set_calls(), 2);
        assert_eq!(started.elapsed(), Duration::ZERO);
    }

    #[tokio::test(start_paused = true)]
    async fn test_zero_wait_and_zero_retry_makes_one_attempt() {
        let store = MemoryStore::new();
        store.set_if_absent(0, "lock:a", "1", Duration::from_secs(30)).await.unwrap();

        let policy = LockPolicy::new(Duration::from_secs(3), Duration::ZERO, 0, Duration::ZERO).unwrap();
        let handle = time::timeout(
            Duration::from_secs(1),
            engine(&store, "lock:a", policy).acquire(&CancellationToken::new()),
        )
        .await
        .expect("acquire should return without waiting")
        .unwrap();

        assert!(!handle.is_acquired());
        assert_eq!(store.set_calls(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_wait_retries_until_key_frees() {
        let store = MemoryStore::new();
        store.set_if_absent(0, "lock:a", "1", Duration::from_secs(5)).await.unwrap();

        let policy = LockPolicy::new(Duration::from_secs(3), Duration::MAX, 0, Duration::from_secs(1)).unwrap();
        let started = Instant::now();
        let handle = engine(&store, "lock:a", policy)
            .acquire(&CancellationToken::new())
            .await
            .unwrap();

        assert!(handle.is_acquired());
        assert_eq!(started.elapsed(), Duration::from_secs(5));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_wait_ends_on_cancel() {
        let store = MemoryStore::new();
        store.set_if_absent(0, "lock:a", "1", Duration::from_secs(600)).await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_secs(60)).await;
            trigger.cancel();
        });

        let policy = LockPolicy::new(Duration::from_secs(3), Duration::MAX, 0, Duration::from_secs(1)).unwrap();
        let err = engine(&store, "lock:a", policy).acquire(&cancel).await.unwrap_err();
        assert!(matches!(err, LockError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_unbounded_expiry_acquires_and_releases() {
        let store = MemoryStore::new();
        let policy = LockPolicy::new(Duration::MAX, Duration::ZERO, 3, Duration::ZERO).unwrap();

        let mut handle = engine(&store, "lock:a", policy)
            .acquire(&CancellationToken::new())
            .await
            .unwrap();
        assert!(handle.is_acquired());

        time::sleep(Duration::from_secs(3600)).await;
        assert!(store.contains(0, "lock:a"));
        assert_eq!(store.refresh_calls(), 0);

        handle.release().await;
        assert!(!store.contains(0, "lock:a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_retries_until_key_frees() {
        let store = MemoryStore::new();
        store.set_if_absent(0, "lock:a", "1", Duration::from_secs(2)).await.unwrap();

        let started = Instant::now();
        let handle = engine(&store, "lock:a", policy(3, 5, 0, 1))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();

        assert!(handle.is_acquired());
        // Attempts at 0s, 1s and 2s; the holder's key lapses at 2s.
        assert_eq!(started.elapsed(), Duration::from_secs(2));
        assert_eq!(store.set_calls(), 4);
    }

    #[tokio::test(start_paused = true)]
    async fn test_wait_exhausted_returns_not_acquired() {
        let store = MemoryStore::new();
        store.set_if_absent(0, "lock:a", "1", Duration::from_secs(60)).await.unwrap();

        let started = Instant::now();
        let handle = engine(&store, "lock:a", policy(3, 3, 0, 1))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();

        assert!(!handle.is_acquired());
        assert!(started.elapsed() <= Duration::from_secs(3));
        // The holder's set, then attempts at 0s, 1s, 2s and 3s.
        assert_eq!(store.set_calls(), 1 + 4);
    }

    #[tokio::test]
    async fn test_zero_retry_interval_polls_until_deadline() {
        let store = MemoryStore::new();
        store.set_if_absent(0, "lock:a", "1", Duration::from_secs(60)).await.unwrap();

        let policy = LockPolicy::new(
            Duration::from_secs(3),
            Duration::from_millis(20),
            0,
            Duration::ZERO,
        )
        .unwrap();
        let handle = engine(&store, "lock:a", policy)
            .acquire(&CancellationToken::new())
            .await
            .unwrap();

        assert!(!handle.is_acquired());
        assert!(store.set_calls() > 2);
    }

    #[tokio::test]
    async fn test_cancelled_before_start_skips_store() {
        let store = MemoryStore::new();
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = engine(&store, "lock:a", policy(3, 3, 0, 1))
            .acquire(&cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::Cancelled));
        assert_eq!(store.set_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_during_wait_aborts_promptly() {
        let store = MemoryStore::new();
        store.set_if_absent(0, "lock:a", "1", Duration::from_secs(60)).await.unwrap();

        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            time::sleep(Duration::from_millis(1500)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = engine(&store, "lock:a", policy(3, 30, 0, 10))
            .acquire(&cancel)
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::Cancelled));
        assert_eq!(started.elapsed(), Duration::from_millis(1500));
        assert_eq!(store.set_calls(), 2);
    }

    #[tokio::test]
    async fn test_store_error_during_acquire_propagates() {
        let store = MemoryStore::new();
        store.set_available(false);

        let err = engine(&store, "lock:a", policy(3, 3, 0, 1))
            .acquire(&CancellationToken::new())
            .await
            .unwrap_err();

        assert!(matches!(err, LockError::Store(StoreError::Unavailable(_))));
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_stops_at_budget() {
        let store = MemoryStore::new();
        let mut handle = engine(&store, "lock:a", policy(3, 0, 2, 1))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();
        assert!(handle.is_acquired());

        // Ticks at 1.5s and 3s refresh; the key then lives until 6s.
        time::sleep(Duration::from_secs(5)).await;
        assert_eq!(store.refresh_calls(), 2);
        assert_eq!(handle.renewals(), 2);
        assert!(store.contains(0, "lock:a"));

        time::sleep(Duration::from_secs(2)).await;
        assert_eq!(store.refresh_calls(), 2);
        assert!(!store.contains(0, "lock:a"));

        handle.release().await;
        assert!(handle.is_released());
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_keeps_key_alive_past_expiry() {
        let store = MemoryStore::new();
        let handle = engine(&store, "lock:a", policy(2, 0, 10, 1))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();

        time::sleep(Duration::from_millis(5500)).await;
        assert!(store.contains(0, "lock:a"));
        assert_eq!(handle.renewals(), 5);
    }

    #[tokio::test(start_paused = true)]
    async fn test_renewal_failures_are_swallowed() {
        let store = MemoryStore::new();
        let metrics = LockMetrics::new();
        let mut handle = engine(&store, "lock:a", policy(2, 0, 3, 1))
            .with_metrics(Some(metrics.clone()))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();

        store.set_available(false);
        time::sleep(Duration::from_secs(10)).await;

        assert_eq!(handle.renewals(), 3);
        assert_eq!(metrics.renewal_failures.load(Ordering::Relaxed), 3);

        handle.release().await;
        assert!(handle.is_released());
        assert_eq!(metrics.release_failures.load(Ordering::Relaxed), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_is_idempotent_and_stops_renewal() {
        let store = MemoryStore::new();
        let mut handle = engine(&store, "lock:a", policy(2, 0, 10, 1))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();

        handle.release().await;
        handle.release().await;
        assert_eq!(store.delete_calls(), 1);

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(store.refresh_calls(), 0);
        assert_eq!(handle.renewals(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_of_unacquired_handle_keeps_owner_key() {
        let store = MemoryStore::new();
        store.set_if_absent(0, "lock:a", "1", Duration::from_secs(60)).await.unwrap();

        let mut handle = engine(&store, "lock:a", policy(3, 0, 1, 1))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();
        assert!(!handle.is_acquired());

        handle.release().await;
        handle.release().await;
        assert_eq!(store.delete_calls(), 0);
        assert!(store.contains(0, "lock:a"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_release_waits_for_in_flight_renewal() {
        let store = RecordingStore::new(Duration::from_millis(500));
        let started = Instant::now();
        let mut handle = LeaseEngine::new(Arc::new(store.clone()), 0, "lock:a", policy(2, 0, 5, 1))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();

        // First tick starts at 1s and holds the store until 1.5s.
        time::sleep(Duration::from_millis(1200)).await;
        handle.release().await;
        assert_eq!(started.elapsed(), Duration::from_millis(1500));

        time::sleep(Duration::from_secs(10)).await;
        assert_eq!(
            store.events(),
            vec!["set", "refresh_start", "refresh_end", "delete"]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn test_drop_releases_in_background() {
        let store = MemoryStore::new();
        let handle = engine(&store, "lock:a", policy(30, 0, 5, 1))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();
        assert!(store.contains(0, "lock:a"));

        drop(handle);
        time::sleep(Duration::from_millis(1)).await;
        assert!(!store.contains(0, "lock:a"));
        assert_eq!(store.delete_calls(), 1);

        time::sleep(Duration::from_secs(60)).await;
        assert_eq!(store.refresh_calls(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_metrics_record_outcomes() {
        let store = MemoryStore::new();
        let metrics = LockMetrics::new();

        let mut first = engine(&store, "lock:a", policy(3, 0, 0, 1))
            .with_metrics(Some(metrics.clone()))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();
        let second = engine(&store, "lock:a", policy(3, 0, 0, 1))
            .with_metrics(Some(metrics.clone()))
            .acquire(&CancellationToken::new())
            .await
            .unwrap();
        assert!(first.is_acquired());
        assert!(!second.is_acquired());

        first.release().await;
        assert_eq!(metrics.acquired.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.not_acquired.load(Ordering::Relaxed), 1);
        assert_eq!(metrics.releases.load(Ordering::Relaxed), 1);
    }

    #[test]
    fn test_debug_output() {
        let runtime = tokio::runtime::Builder::new_current_thread()
            .enable_time()
            .build()
            .unwrap();
        let store = MemoryStore::new();
        let handle = runtime
            .block_on(engine(&store, "lock:a", policy(3, 0, 0, 1)).acquire(&CancellationToken::new()))
            .unwrap();

        let debug = format!("{:?}", handle);
        assert!(debug.contains("lock:a"));
        assert!(debug.contains("acquired: true"));
    }
}
