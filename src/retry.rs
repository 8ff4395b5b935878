//! Exponential backoff around a whole pipeline run.

use std::future::Future;
use std::time::Duration;

use anyhow::Result;
use tracing::{error, info, warn};

/// Backoff parameters of the [`Retrier`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub initial_delay: Duration,
    pub max_delay: Duration,
    /// Failed attempts tolerated before the final unprotected attempt.
    pub max_retries: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: Duration::from_millis(100),
            max_delay: Duration::from_secs(10),
            max_retries: 10,
        }
    }
}

impl RetryPolicy {
    /// Sleep after the `failure`-th consecutive failure (1-based):
    /// `min(initial * 2^(failure - 1), max_delay)`.
    pub fn delay(&self, failure: u32) -> Duration {
        let factor = 2u32.saturating_pow(failure.saturating_sub(1));
        self.initial().saturating_mul(factor).min(self.max_delay)
    }

    /// First delay of a backoff sequence. A zero initial delay would never
    /// grow, so it counts as one second.
    fn initial(&self) -> Duration {
        let initial = if self.initial_delay.is_zero() {
            Duration::from_secs(1)
        } else {
            self.initial_delay
        };
        initial.min(self.max_delay)
    }

    /// Delay that follows `delay` after one more consecutive failure.
    fn next(&self, delay: Duration) -> Duration {
        delay.saturating_mul(2).min(self.max_delay)
    }
}

/// Lifecycle of the wrapped run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Running,
    Success,
    Failed,
}

/// Re-runs an operation with exponential backoff until it succeeds.
///
/// After `max_retries` failures one last attempt is made whose error is
/// returned to the caller. The failure counter starts from zero on every
/// call to [`Retrier::run`], whatever the previous outcome was. The backoff
/// delay only goes back to the initial value after a success, so a run that
/// follows a failed one keeps backing off where the failed one stopped.
#[derive(Debug)]
pub struct Retrier {
    policy: RetryPolicy,
    state: RunState,
    failures: u32,
    delay: Duration,
}

impl Retrier {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            delay: policy.initial(),
            policy,
            state: RunState::Idle,
            failures: 0,
        }
    }

    pub fn state(&self) -> RunState {
        self.state
    }

    /// Consecutive failures of the run in progress; zero between runs.
    pub fn failures(&self) -> u32 {
        self.failures
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Sleep that follows the next failure.
    pub fn next_delay(&self) -> Duration {
        self.delay
    }

    pub async fn run<T, F, Fut>(&mut self, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        self.state = RunState::Running;
        self.failures = 0;

        let result = loop {
            if self.failures >= self.policy.max_retries {
                warn!(
                    "Retry limit exceeded after {} failed attempts, making a final attempt",
                    self.failures
                );
                break operation().await;
            }
            match operation().await {
                Ok(value) => break Ok(value),
                Err(e) => {
                    self.failures += 1;
                    let delay = self.delay;
                    error!(
                        "Attempt {} failed: {:#}. Retrying in {:?}",
                        self.failures, e, delay
                    );
                    tokio::time::sleep(delay).await;
                    self.delay = self.policy.next(delay);
                }
            }
        };

        self.state = match result {
            Ok(_) => {
                if self.failures > 0 {
                    info!("Succeeded after {} failed attempts", self.failures);
                }
                self.delay = self.policy.initial();
                RunState::Success
            }
            Err(_) => {
                self.delay = self.policy.next(self.delay);
                RunState::Failed
            }
        };
        self.failures = 0;
        result
    }
}
