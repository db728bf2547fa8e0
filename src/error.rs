use thiserror::Error;

/// Failure reported by a [`LockStore`](crate::store::LockStore) backend.
///
/// The lease engine treats every variant the same way: fatal while acquiring,
/// logged and discarded while renewing or releasing.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    #[cfg(feature = "redis")]
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),
}

/// Unified error type for lock creation.
///
/// Failing to obtain the lock within the wait budget is not an error; it is
/// reported through [`LockHandle::is_acquired`](crate::lease::LockHandle::is_acquired).
#[derive(Error, Debug)]
pub enum LockError {
    #[error("Resource name cannot be empty")]
    EmptyResourceName,

    #[error("Invalid {field}: {reason}")]
    InvalidDuration { field: &'static str, reason: String },

    #[error("Invalid renewal budget: {0}")]
    InvalidRenewalBudget(i64),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Lock acquisition cancelled")]
    Cancelled,

    #[error("Configuration error: {0}")]
    Config(String),
}

impl LockError {
    pub fn invalid_duration(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidDuration {
            field,
            reason: reason.into(),
        }
    }

    /// True for errors raised before any store call was made.
    pub fn is_invalid_argument(&self) -> bool {
        matches!(
            self,
            LockError::EmptyResourceName
                | LockError::InvalidDuration { .. }
                | LockError::InvalidRenewalBudget(_)
        )
    }
}

pub type Result<T> = std::result::Result<T, LockError>;
