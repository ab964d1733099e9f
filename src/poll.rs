//! Bounded polling for eventually-consistent platform state.
//!
//! Every wait in the harness goes through [`eventually`]: a predicate is
//! re-evaluated at a fixed interval until it yields a value or the deadline
//! passes. The platform action itself is never retried here.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep, Instant};

use crate::error::{Error, Result};

/// Interval and deadline for a polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollConfig {
    /// Time between predicate evaluations.
    pub interval: Duration,
    /// Total time allowed before giving up.
    pub timeout: Duration,
}

impl PollConfig {
    /// Creates a poll configuration.
    pub fn new(interval: Duration, timeout: Duration) -> Self {
        Self { interval, timeout }
    }

    /// Returns a copy with a different timeout.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_millis(500),
            timeout: Duration::from_secs(30),
        }
    }
}

/// Tagged result of a polling loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome<T> {
    /// The predicate produced a value.
    Ready(T),
    /// The deadline passed first.
    TimedOut {
        /// Number of predicate evaluations.
        attempts: u32,
        /// Time spent polling.
        elapsed: Duration,
    },
}

impl<T> PollOutcome<T> {
    /// Returns true if the predicate succeeded.
    pub fn is_ready(&self) -> bool {
        matches!(self, PollOutcome::Ready(_))
    }

    /// Converts a timeout into [`Error::Timeout`] labelled with `operation`.
    pub fn into_result(self, operation: impl Into<String>) -> Result<T> {
        match self {
            PollOutcome::Ready(value) => Ok(value),
            PollOutcome::TimedOut { elapsed, .. } => Err(Error::Timeout {
                operation: operation.into(),
                elapsed,
            }),
        }
    }
}

/// Evaluates `check` every `config.interval` until it returns `Some`.
///
/// The final evaluation happens at the deadline, so a predicate that never
/// holds times out exactly when `config.timeout` has elapsed. Errors from
/// `check` abort the loop immediately.
pub async fn eventually<T, F, Fut>(config: PollConfig, mut check: F) -> Result<PollOutcome<T>>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    let start = Instant::now();
    let deadline = start + config.timeout;
    let mut attempts = 0u32;

    loop {
        attempts = attempts.saturating_add(1);
        if let Some(value) = check().await? {
            tracing::debug!(attempts, elapsed = ?start.elapsed(), "poll condition met");
            return Ok(PollOutcome::Ready(value));
        }

        let now = Instant::now();
        if now >= deadline {
            return Ok(PollOutcome::TimedOut {
                attempts,
                elapsed: now - start,
            });
        }

        sleep(config.interval.min(deadline - now)).await;
    }
}

/// Like [`eventually`], but fails with [`Error::Timeout`] on deadline.
pub async fn wait_until<T, F, Fut>(
    config: PollConfig,
    operation: &str,
    check: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<Option<T>>>,
{
    eventually(config, check).await?.into_result(operation)
}
