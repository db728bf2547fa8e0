use crate::error::{LockError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

const MIN_RENEWAL_PERIOD: Duration = Duration::from_millis(1);

/// Timing parameters for one lock request.
///
/// Construct through [`LockPolicy::new`] or by converting a [`PolicyConfig`];
/// both paths validate.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LockPolicy {
    expiry: Duration,
    max_wait: Duration,
    renewal_budget: u32,
    retry_interval: Duration,
}

impl LockPolicy {
    /// Builds a policy.
    ///
    /// * `expiry` - TTL applied on every set and refresh; must be greater than zero
    /// * `max_wait` - how long acquisition keeps retrying; zero means one attempt
    /// * `renewal_budget` - number of automatic refreshes while held
    /// * `retry_interval` - delay between failed attempts; zero polls
    pub fn new(
        expiry: Duration,
        max_wait: Duration,
        renewal_budget: u32,
        retry_interval: Duration,
    ) -> Result<Self> {
        validate_expiry(expiry)?;
        Ok(Self {
            expiry,
            max_wait,
            renewal_budget,
            retry_interval,
        })
    }

    pub fn expiry(&self) -> Duration {
        self.expiry
    }

    pub fn max_wait(&self) -> Duration {
        self.max_wait
    }

    pub fn renewal_budget(&self) -> u32 {
        self.renewal_budget
    }

    pub fn retry_interval(&self) -> Duration {
        self.retry_interval
    }

    /// Interval between renewal ticks: half the expiry, so one missed tick
    /// still leaves the key alive.
    pub fn renewal_period(&self) -> Duration {
        (self.expiry / 2).max(MIN_RENEWAL_PERIOD)
    }
}

/// Signed, serializable form of a [`LockPolicy`] as it arrives from
/// configuration or the command line.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PolicyConfig {
    pub expiry_ms: i64,
    pub max_wait_ms: i64,
    pub renewal_budget: i64,
    pub retry_interval_ms: i64,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            expiry_ms: 30_000,
            max_wait_ms: 10_000,
            renewal_budget: 10,
            retry_interval_ms: 500,
        }
    }
}

impl TryFrom<PolicyConfig> for LockPolicy {
    type Error = LockError;

    fn try_from(config: PolicyConfig) -> Result<Self> {
        let expiry = millis("expiry", config.expiry_ms)?;
        let max_wait = millis("max_wait", config.max_wait_ms)?;
        let retry_interval = millis("retry_interval", config.retry_interval_ms)?;
        let renewal_budget = u32::try_from(config.renewal_budget)
            .map_err(|_| LockError::InvalidRenewalBudget(config.renewal_budget))?;

        LockPolicy::new(expiry, max_wait, renewal_budget, retry_interval)
    }
}

impl From<LockPolicy> for PolicyConfig {
    fn from(policy: LockPolicy) -> Self {
        Self {
            expiry_ms: policy.expiry.as_millis() as i64,
            max_wait_ms: policy.max_wait.as_millis() as i64,
            renewal_budget: policy.renewal_budget as i64,
            retry_interval_ms: policy.retry_interval.as_millis() as i64,
        }
    }
}

fn millis(field: &'static str, value: i64) -> Result<Duration> {
    if value < 0 {
        return Err(LockError::invalid_duration(
            field,
            format!("{} ms is negative", value),
        ));
    }
    Ok(Duration::from_millis(value as u64))
}

fn validate_expiry(expiry: Duration) -> Result<()> {
    if expiry.is_zero() {
        return Err(LockError::invalid_duration(
            "expiry",
            "must be greater than 0",
        ));
    }
    Ok(())
}

pub fn validate_resource_name(name: &str) -> Result<()> {
    if name.trim().is_empty() {
        return Err(LockError::EmptyResourceName);
    }
    Ok(())
}
