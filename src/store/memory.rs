use super::LockStore;
use crate::error::StoreError;
use async_trait::async_trait;
use dashmap::{mapref::entry::Entry, DashMap};
use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::time::{self, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

#[derive(Debug, Clone)]
struct StoredKey {
    value: String,
    // None when the TTL runs past what the clock can represent.
    expires_at: Option<Instant>,
}

impl StoredKey {
    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| at <= now)
    }

    fn remaining(&self, now: Instant) -> Duration {
        self.expires_at
            .map(|at| at.saturating_duration_since(now))
            .unwrap_or(Duration::MAX)
    }
}

#[derive(Default)]
struct OpCounters {
    set_calls: AtomicU64,
    refresh_calls: AtomicU64,
    delete_calls: AtomicU64,
}

/// In-process [`LockStore`] backed by a concurrent map.
///
/// Deadlines follow the tokio clock, so tests running with paused time see
/// keys expire as the clock advances. Expired keys are dropped lazily by the
/// next operation that touches them, and in bulk by the optional sweeper from
/// [`MemoryStore::start_expiry_task`].
///
/// Clones share the same map. [`MemoryStore::set_available`] simulates an
/// outage: every call fails with [`StoreError::Unavailable`] until it is
/// switched back on.
#[derive(Clone, Default)]
pub struct MemoryStore {
    entries: Arc<DashMap<(u32, String), StoredKey>>,
    unavailable: Arc<AtomicBool>,
    counters: Arc<OpCounters>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
    }

    fn check_available(&self, operation: &str) -> Result<(), StoreError> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Unavailable(format!(
                "memory store is offline ({})",
                operation
            )));
        }
        Ok(())
    }

    /// Whether `key` is currently live in `database`.
    pub fn contains(&self, database: u32, key: &str) -> bool {
        let now = Instant::now();
        self.entries
            .get(&(database, key.to_string()))
            .map(|entry| !entry.is_expired(now))
            .unwrap_or(false)
    }

    /// Remaining lifetime of a live key.
    pub fn ttl(&self, database: u32, key: &str) -> Option<Duration> {
        let now = Instant::now();
        self.entries
            .get(&(database, key.to_string()))
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.remaining(now))
    }

    pub fn value(&self, database: u32, key: &str) -> Option<String> {
        let now = Instant::now();
        self.entries
            .get(&(database, key.to_string()))
            .filter(|entry| !entry.is_expired(now))
            .map(|entry| entry.value.clone())
    }

    /// Number of live keys across all databases.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.entries
            .iter()
            .filter(|entry| !entry.value().is_expired(now))
            .count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn set_calls(&self) -> u64 {
        self.counters.set_calls.load(Ordering::SeqCst)
    }

    pub fn refresh_calls(&self) -> u64 {
        self.counters.refresh_calls.load(Ordering::SeqCst)
    }

    pub fn delete_calls(&self) -> u64 {
        self.counters.delete_calls.load(Ordering::SeqCst)
    }

    /// Spawns a task that drops expired keys every `period` (at least 1ms).
    /// Cancel the returned token to stop it.
    pub fn start_expiry_task(&self, period: Duration) -> CancellationToken {
        let period = period.max(Duration::from_millis(1));
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let store = self.clone();

        tokio::spawn(async move {
            let mut ticker = time::interval(period);
            ticker.set_missed_tick_behavior(time::MissedTickBehavior::Skip);
            info!(period_ms = period.as_millis() as u64, "Started memory store expiry task");

            loop {
                tokio::select! {
                    _ = token.cancelled() => {
                        debug!("Memory store expiry task stopped");
                        break;
                    }
                    _ = ticker.tick() => {
                        store.cleanup_expired();
                    }
                }
            }
        });

        cancel
    }

    /// Drops every expired key and returns how many were removed.
    pub fn cleanup_expired(&self) -> usize {
        let now = Instant::now();
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired(now));
        let removed = before.saturating_sub(self.entries.len());

        if removed > 0 {
            debug!(removed, "Dropped expired keys");
        }
        removed
    }
}

#[async_trait]
impl LockStore for MemoryStore {
    async fn set_if_absent(
        &self,
        database: u32,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.counters.set_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available("set_if_absent")?;

        let now = Instant::now();
        let stored = StoredKey {
            value: value.to_string(),
            expires_at: now.checked_add(ttl),
        };

        match self.entries.entry((database, key.to_string())) {
            Entry::Vacant(entry) => {
                entry.insert(stored);
                Ok(true)
            }
            Entry::Occupied(mut entry) => {
                if entry.get().is_expired(now) {
                    entry.insert(stored);
                    Ok(true)
                } else {
                    Ok(false)
                }
            }
        }
    }

    async fn refresh_ttl(
        &self,
        database: u32,
        key: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.counters.refresh_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available("refresh_ttl")?;

        let now = Instant::now();
        let map_key = (database, key.to_string());
        match self.entries.get_mut(&map_key) {
            Some(mut entry) if !entry.is_expired(now) => {
                entry.expires_at = now.checked_add(ttl);
                Ok(true)
            }
            Some(entry) => {
                drop(entry);
                self.entries.remove_if(&map_key, |_, stored| stored.is_expired(now));
                Ok(false)
            }
            None => Ok(false),
        }
    }

    async fn delete(&self, database: u32, key: &str) -> Result<bool, StoreError> {
        self.counters.delete_calls.fetch_add(1, Ordering::SeqCst);
        self.check_available("delete")?;

        let now = Instant::now();
        Ok(self
            .entries
            .remove(&(database, key.to_string()))
            .map(|(_, stored)| !stored.is_expired(now))
            .unwrap_or(false))
    }
}
