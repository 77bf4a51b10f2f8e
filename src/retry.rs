//! Retry primitives
//!
//! [`ConflictRetry`] re-runs a read-modify-write against a single object until
//! it lands without an optimistic-concurrency conflict. [`ProvisionBackoff`]
//! spaces out provisioning attempts for records that keep failing.

use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, warn};

use crate::config::{BackoffConfig, ConflictRetryConfig};
use crate::Error;

/// Retry-on-conflict updater for a single object
#[derive(Clone, Debug)]
pub struct ConflictRetry {
    interval: Duration,
}

impl ConflictRetry {
    /// Create an updater that waits `interval` between attempts
    pub fn new(interval: Duration) -> Self {
        Self { interval }
    }

    /// Run `attempt` until it succeeds
    ///
    /// `attempt` must perform the full get, mutate and write cycle so that
    /// each retry works from a fresh copy. Conflicts and other transient
    /// errors are retried indefinitely. Not-found and permanent errors are
    /// returned straight away.
    pub async fn update<T, F, Fut>(&self, what: &str, mut attempt: F) -> Result<T, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, Error>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match attempt().await {
                Ok(value) => return Ok(value),
                Err(e) if e.is_not_found() => return Err(e),
                Err(e) if e.is_conflict() => {
                    debug!(object = %what, attempts, "update conflicted, retrying");
                }
                Err(e) if e.is_transient() => {
                    warn!(object = %what, attempts, error = %e, "update failed, retrying");
                }
                Err(e) => return Err(e),
            }
            tokio::time::sleep(self.interval).await;
        }
    }
}

impl From<&ConflictRetryConfig> for ConflictRetry {
    fn from(config: &ConflictRetryConfig) -> Self {
        Self::new(Duration::from_millis(config.interval_millis))
    }
}

#[derive(Clone, Copy, Debug)]
struct FailureRecord {
    failures: u32,
    retry_at: Instant,
}

/// Per-record exponential backoff for failed provisioning passes
///
/// Owned by the reconcile loop, which is single-task, so no locking.
#[derive(Debug)]
pub struct ProvisionBackoff {
    initial: Duration,
    max: Duration,
    records: HashMap<String, FailureRecord>,
}

impl ProvisionBackoff {
    /// Create a tracker with the given bounds
    pub fn new(initial: Duration, max: Duration) -> Self {
        Self {
            initial,
            max,
            records: HashMap::new(),
        }
    }

    /// Delay applied after `failures` consecutive failures
    pub fn delay_for(&self, failures: u32) -> Duration {
        let exponent = failures.saturating_sub(1).min(31);
        self.initial
            .checked_mul(1u32 << exponent)
            .unwrap_or(self.max)
            .min(self.max)
    }

    /// Record a failure and return the delay before the next attempt
    pub fn record_failure(&mut self, key: &str) -> Duration {
        let failures = self
            .records
            .get(key)
            .map(|r| r.failures.saturating_add(1))
            .unwrap_or(1);
        let delay = self.delay_for(failures);
        self.records.insert(
            key.to_string(),
            FailureRecord {
                failures,
                retry_at: Instant::now() + delay,
            },
        );
        delay
    }

    /// Forget a record's failures
    pub fn clear(&mut self, key: &str) {
        self.records.remove(key);
    }

    /// True when the record is still waiting out its backoff
    pub fn is_backing_off(&self, key: &str) -> bool {
        self.records
            .get(key)
            .is_some_and(|r| Instant::now() < r.retry_at)
    }

    /// Consecutive failures recorded for a key
    pub fn failures(&self, key: &str) -> u32 {
        self.records.get(key).map(|r| r.failures).unwrap_or(0)
    }

    /// Drop records for keys no longer present
    pub fn retain_keys<'a>(&mut self, live: impl IntoIterator<Item = &'a str>) {
        let live: std::collections::HashSet<&str> = live.into_iter().collect();
        self.records.retain(|k, _| live.contains(k.as_str()));
    }
}

impl From<&BackoffConfig> for ProvisionBackoff {
    fn from(config: &BackoffConfig) -> Self {
        Self::new(
            Duration::from_secs(config.initial_seconds),
            Duration::from_secs(config.max_seconds),
        )
    }
}
