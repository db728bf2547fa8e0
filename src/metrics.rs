use serde_json::{json, Value};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// How an acquisition call ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AcquireOutcome {
    Acquired,
    NotAcquired,
    Cancelled,
    Failed,
}

const WAIT_BUCKET_BOUNDS_MS: [f64; 7] = [1.0, 10.0, 100.0, 500.0, 1000.0, 10000.0, f64::INFINITY];

/// Fixed-bucket histogram of time spent inside acquisition.
pub struct WaitHistogram {
    count: AtomicU64,
    total_ms: AtomicU64,
    max_ms: AtomicU64,
    buckets: [AtomicU64; 7],
}

impl Default for WaitHistogram {
    fn default() -> Self {
        Self {
            count: AtomicU64::new(0),
            total_ms: AtomicU64::new(0),
            max_ms: AtomicU64::new(0),
            buckets: Default::default(),
        }
    }
}

impl WaitHistogram {
    pub fn record(&self, waited: Duration) {
        let waited_ms = waited.as_secs_f64() * 1000.0;
        let waited_ms_u64 = u64::try_from(waited.as_millis()).unwrap_or(u64::MAX);

        self.count.fetch_add(1, Ordering::Relaxed);
        self.total_ms.fetch_add(waited_ms_u64, Ordering::Relaxed);
        self.max_ms.fetch_max(waited_ms_u64, Ordering::Relaxed);

        let bucket = WAIT_BUCKET_BOUNDS_MS
            .iter()
            .position(|bound| waited_ms <= *bound)
            .unwrap_or(WAIT_BUCKET_BOUNDS_MS.len() - 1);
        self.buckets[bucket].fetch_add(1, Ordering::Relaxed);
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }

    fn to_json(&self) -> Value {
        let count = self.count();
        let total_ms = self.total_ms.load(Ordering::Relaxed);
        let bucket_counts: Vec<u64> = self
            .buckets
            .iter()
            .map(|bucket| bucket.load(Ordering::Relaxed))
            .collect();
        let max_ms = self.max_ms.load(Ordering::Relaxed);
        let (p50_ms, p99_ms) = calculate_percentiles(&bucket_counts, count, max_ms as f64);

        json!({
            "count": count,
            "avg_ms": format!("{:.1}", if count > 0 { total_ms as f64 / count as f64 } else { 0.0 }),
            "p50_ms": p50_ms,
            "p99_ms": p99_ms,
            "max_ms": max_ms,
        })
    }
}

/// Process-wide lock counters. Share one instance between factories with
/// [`LockFactory::with_metrics`](crate::factory::LockFactory::with_metrics).
pub struct LockMetrics {
    pub start_time: Instant,
    pub acquire_calls: AtomicU64,
    pub acquired: AtomicU64,
    pub not_acquired: AtomicU64,
    pub cancelled: AtomicU64,
    pub acquire_errors: AtomicU64,
    pub renewals: AtomicU64,
    pub renewal_failures: AtomicU64,
    pub releases: AtomicU64,
    pub release_failures: AtomicU64,
    pub wait: WaitHistogram,
}

impl Default for LockMetrics {
    fn default() -> Self {
        Self {
            start_time: Instant::now(),
            acquire_calls: AtomicU64::new(0),
            acquired: AtomicU64::new(0),
            not_acquired: AtomicU64::new(0),
            cancelled: AtomicU64::new(0),
            acquire_errors: AtomicU64::new(0),
            renewals: AtomicU64::new(0),
            renewal_failures: AtomicU64::new(0),
            releases: AtomicU64::new(0),
            release_failures: AtomicU64::new(0),
            wait: WaitHistogram::default(),
        }
    }
}

impl LockMetrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_acquire(&self, outcome: AcquireOutcome, waited: Duration) {
        self.acquire_calls.fetch_add(1, Ordering::Relaxed);
        let counter = match outcome {
            AcquireOutcome::Acquired => &self.acquired,
            AcquireOutcome::NotAcquired => &self.not_acquired,
            AcquireOutcome::Cancelled => &self.cancelled,
            AcquireOutcome::Failed => &self.acquire_errors,
        };
        counter.fetch_add(1, Ordering::Relaxed);
        self.wait.record(waited);
    }

    pub fn record_renewal(&self, succeeded: bool) {
        self.renewals.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.renewal_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn record_release(&self, succeeded: bool) {
        self.releases.fetch_add(1, Ordering::Relaxed);
        if !succeeded {
            self.release_failures.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn snapshot(&self) -> Value {
        json!({
            "uptime_seconds": self.start_time.elapsed().as_secs(),
            "acquire": {
                "calls": self.acquire_calls.load(Ordering::Relaxed),
                "acquired": self.acquired.load(Ordering::Relaxed),
                "not_acquired": self.not_acquired.load(Ordering::Relaxed),
                "cancelled": self.cancelled.load(Ordering::Relaxed),
                "errors": self.acquire_errors.load(Ordering::Relaxed),
                "wait": self.wait.to_json(),
            },
            "renewals": {
                "total": self.renewals.load(Ordering::Relaxed),
                "failures": self.renewal_failures.load(Ordering::Relaxed),
            },
            "releases": {
                "total": self.releases.load(Ordering::Relaxed),
                "failures": self.release_failures.load(Ordering::Relaxed),
            },
        })
    }
}

// The overflow bucket has no upper bound, so it reports the slowest wait seen.
fn calculate_percentiles(bucket_counts: &[u64], total: u64, max_ms: f64) -> (f64, f64) {
    if total == 0 {
        return (0.0, 0.0);
    }

    let p50_target = ((total as f64 * 0.50).ceil() as u64).max(1);
    let p99_target = ((total as f64 * 0.99).ceil() as u64).max(1);

    let mut cumulative = 0;
    let mut p50_ms = None;
    let mut p99_ms = None;

    for (i, &count) in bucket_counts.iter().enumerate() {
        cumulative += count;
        let bound = if WAIT_BUCKET_BOUNDS_MS[i].is_finite() {
            WAIT_BUCKET_BOUNDS_MS[i]
        } else {
            max_ms
        };
        if p50_ms.is_none() && cumulative >= p50_target {
            p50_ms = Some(bound);
        }
        if p99_ms.is_none() && cumulative >= p99_target {
            p99_ms = Some(bound);
        }
    }

    (p50_ms.unwrap_or(0.0), p99_ms.unwrap_or(0.0))
}
