//! Retry bookkeeping for user-triggered retries.
//!
//! Booking calls are never retried automatically: a failed allocation or price
//! check is surfaced to the user, who decides whether to try again. This
//! module keeps count of those manual attempts and enforces an optional cap.
//!
//! # Example
//!
//! ```rust
//! use tripflow_runtime::retry::{RetryLedger, RetryPolicy};
//!
//! let mut ledger = RetryLedger::new(RetryPolicy::manual_only().with_max_manual_attempts(2));
//!
//! assert_eq!(ledger.record_manual_retry("flights"), Ok(1));
//! assert_eq!(ledger.record_manual_retry("flights"), Ok(2));
//! assert!(ledger.record_manual_retry("flights").is_err());
//!
//! // Keys are tracked independently.
//! assert_eq!(ledger.record_manual_retry("hotels"), Ok(1));
//! ```

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use thiserror::Error;

/// Retry policy for booking operations.
///
/// # Default Values
///
/// - automatic retries: never
/// - `max_manual_attempts`: unlimited
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Cap on user-triggered retries per key, `None` for no cap
    pub max_manual_attempts: Option<u32>,
}

impl RetryPolicy {
    /// A policy that only retries when the user asks, without a cap
    #[must_use]
    pub const fn manual_only() -> Self {
        Self {
            max_manual_attempts: None,
        }
    }

    /// Limit the number of manual retries per key
    #[must_use]
    pub const fn with_max_manual_attempts(mut self, max: u32) -> Self {
        self.max_manual_attempts = Some(max);
        self
    }

    /// Whether failures may be retried without user involvement
    ///
    /// Always `false`: booking calls have side effects on the provider.
    #[must_use]
    pub const fn allows_automatic_retry(&self) -> bool {
        false
    }

    /// Check whether another manual retry is allowed after `attempts` retries
    #[must_use]
    pub const fn authorize(&self, attempts: u32) -> bool {
        match self.max_manual_attempts {
            Some(max) => attempts < max,
            None => true,
        }
    }
}

/// Rejection of a manual retry
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RetryRejected {
    /// The key already used up its manual retries
    #[error("retry limit of {limit} reached for {key}")]
    LimitReached {
        /// Rendered key that hit the limit
        key: String,
        /// Configured limit
        limit: u32,
    },
}

/// Per-key count of manual retries under a [`RetryPolicy`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryLedger<K: Eq + Hash> {
    policy: RetryPolicy,
    attempts: HashMap<K, u32>,
}

impl<K: Eq + Hash> Default for RetryLedger<K> {
    fn default() -> Self {
        Self::new(RetryPolicy::default())
    }
}

impl<K: Eq + Hash> RetryLedger<K> {
    /// Create an empty ledger
    #[must_use]
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            attempts: HashMap::new(),
        }
    }

    /// The policy this ledger enforces
    #[must_use]
    pub const fn policy(&self) -> RetryPolicy {
        self.policy
    }

    /// Number of manual retries recorded for `key`
    #[must_use]
    pub fn attempts(&self, key: &K) -> u32 {
        self.attempts.get(key).copied().unwrap_or(0)
    }

    /// Record a manual retry for `key`
    ///
    /// Returns the new attempt count.
    ///
    /// # Errors
    ///
    /// Returns [`RetryRejected::LimitReached`] when the policy's cap is used
    /// up; nothing is recorded in that case.
    pub fn record_manual_retry(&mut self, key: K) -> Result<u32, RetryRejected>
    where
        K: fmt::Display,
    {
        let current = self.attempts(&key);
        if !self.policy.authorize(current) {
            tracing::warn!(%key, attempts = current, "Manual retry rejected");
            metrics::counter!("retry.manual.rejected").increment(1);
            return Err(RetryRejected::LimitReached {
                key: key.to_string(),
                limit: self.policy.max_manual_attempts.unwrap_or(current),
            });
        }

        let next = current + 1;
        tracing::info!(%key, attempt = next, "Manual retry");
        metrics::counter!("retry.manual.accepted").increment(1);
        self.attempts.insert(key, next);
        Ok(next)
    }

    /// Forget all recorded attempts
    pub fn reset(&mut self) {
        self.attempts.clear();
    }
}
