//! Readiness gates
//!
//! A gate polls a predicate at a fixed interval for a bounded number of
//! attempts. What happens when the attempts run out is an explicit policy:
//! carry on with a warning, or fail with [`Error::ConvergenceTimeout`].

use std::future::Future;
use std::time::Duration;

use tracing::{debug, trace, warn};

use crate::config::{ExhaustionPolicy, GateConfig};
use crate::Error;

/// How a gate finished
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GateOutcome {
    /// The predicate held after this many polls
    Ready {
        /// Polls performed, including the successful one
        attempts: u32,
    },
    /// Attempts ran out and the policy allowed proceeding
    Exhausted,
}

/// Bounded polling primitive
#[derive(Clone, Debug)]
pub struct ReadinessGate {
    interval: Duration,
    max_attempts: u32,
    on_exhausted: ExhaustionPolicy,
}

impl ReadinessGate {
    /// Create a gate
    ///
    /// `max_attempts == 0` polls until the predicate holds.
    pub fn new(interval: Duration, max_attempts: u32, on_exhausted: ExhaustionPolicy) -> Self {
        Self {
            interval,
            max_attempts,
            on_exhausted,
        }
    }

    /// Poll `check` until it returns `Ok(true)`
    ///
    /// Errors from `check` count as "not yet" and are logged at trace level.
    pub async fn wait<F, Fut>(&self, what: &str, mut check: F) -> Result<GateOutcome, Error>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<bool, Error>>,
    {
        let mut attempts = 0u32;
        loop {
            attempts += 1;
            match check().await {
                Ok(true) => {
                    debug!(gate = %what, attempts, "gate passed");
                    return Ok(GateOutcome::Ready { attempts });
                }
                Ok(false) => trace!(gate = %what, attempts, "gate not yet satisfied"),
                Err(e) => {
                    trace!(gate = %what, attempts, error = %e, "gate check failed, polling again")
                }
            }

            if self.max_attempts > 0 && attempts >= self.max_attempts {
                return match self.on_exhausted {
                    ExhaustionPolicy::Proceed => {
                        warn!(gate = %what, attempts, "gate exhausted, proceeding anyway");
                        Ok(GateOutcome::Exhausted)
                    }
                    ExhaustionPolicy::Fail => Err(Error::ConvergenceTimeout {
                        what: what.to_string(),
                        attempts,
                    }),
                };
            }

            tokio::time::sleep(self.interval).await;
        }
    }
}

impl From<&GateConfig> for ReadinessGate {
    fn from(config: &GateConfig) -> Self {
        Self::new(config.interval(), config.max_attempts, config.on_exhausted)
    }
}
