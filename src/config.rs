use crate::error::{LockError, Result};
use crate::policy::{LockPolicy, PolicyConfig};
use std::env;
use std::str::FromStr;

pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// Store connection settings and the default lock policy.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    pub redis_url: String,
    pub database: u32,
    pub policy: PolicyConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            redis_url: DEFAULT_REDIS_URL.to_string(),
            database: 0,
            policy: PolicyConfig::default(),
        }
    }
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let defaults = Config::default();

        Ok(Config {
            redis_url: env::var("LEASE_LOCK_REDIS_URL").unwrap_or(defaults.redis_url),
            database: parse_var("LEASE_LOCK_DATABASE", defaults.database)?,
            policy: PolicyConfig {
                expiry_ms: parse_var("LEASE_LOCK_EXPIRY_MS", defaults.policy.expiry_ms)?,
                max_wait_ms: parse_var("LEASE_LOCK_WAIT_MS", defaults.policy.max_wait_ms)?,
                renewal_budget: parse_var("LEASE_LOCK_RENEWALS", defaults.policy.renewal_budget)?,
                retry_interval_ms: parse_var(
                    "LEASE_LOCK_RETRY_MS",
                    defaults.policy.retry_interval_ms,
                )?,
            },
        })
    }

    pub fn lock_policy(&self) -> Result<LockPolicy> {
        LockPolicy::try_from(self.policy)
    }
}

fn parse_var<T: FromStr>(name: &str, default: T) -> Result<T> {
    match env::var(name) {
        Ok(raw) => raw
            .trim()
            .parse()
            .map_err(|_| LockError::Config(format!("{} must be a number, got {:?}", name, raw))),
        Err(_) => Ok(default),
    }
}
