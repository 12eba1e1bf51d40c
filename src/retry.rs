//! Exponential-backoff retry policy.
//!
//! A [`RetryPolicy`] is a plain value: attempt budget, initial delay,
//! multiplier and cap. It wraps any async fallible operation and decides
//! per error whether another attempt is worthwhile, either through the
//! [`Retryable`] trait ([`RetryPolicy::run`]) or an explicit predicate
//! ([`RetryPolicy::run_if`]).
//!
//! With the defaults (3 retries, 1s initial, ×2, 10s cap) a failing call is
//! attempted 4 times with waits of 1s, 2s and 4s in between. Waits are
//! `tokio::time::sleep`, never busy loops.

use std::fmt::Display;
use std::future::Future;
use std::time::Duration;

/// Classifies an error as worth retrying.
pub trait Retryable {
    fn is_retryable(&self) -> bool;
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RetryPolicy {
    /// Retries after the first attempt. `0` disables retrying.
    pub max_retries: u32,
    pub initial_delay: Duration,
    pub multiplier: f64,
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: Duration::from_millis(1000),
            multiplier: 2.0,
            max_delay: Duration::from_millis(10_000),
        }
    }
}

impl RetryPolicy {
    /// A policy that never retries.
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Total attempts including the first.
    pub fn max_attempts(&self) -> u32 {
        self.max_retries.saturating_add(1)
    }

    /// Wait before retry number `retry` (1-based).
    pub fn delay_for(&self, retry: u32) -> Duration {
        if retry == 0 {
            return Duration::ZERO;
        }
        let factor = self.multiplier.powi(retry.saturating_sub(1) as i32);
        let millis = self.initial_delay.as_millis() as f64 * factor;
        let capped = millis.min(self.max_delay.as_millis() as f64);
        Duration::from_millis(capped as u64)
    }

    /// Run `op`, retrying while the error reports itself as [`Retryable`].
    pub async fn run<T, E, F, Fut>(&self, op: F) -> Result<T, E>
    where
        E: Retryable + Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.run_if(op, |e: &E| e.is_retryable()).await
    }

    /// Run `op`, retrying while `is_retryable` accepts the error and attempts remain.
    ///
    /// The error from the final attempt is returned unchanged.
    pub async fn run_if<T, E, F, Fut, P>(&self, mut op: F, is_retryable: P) -> Result<T, E>
    where
        E: Display,
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        P: Fn(&E) -> bool,
    {
        let mut retry = 0u32;
        loop {
            match op().await {
                Ok(value) => return Ok(value),
                Err(err) => {
                    if retry >= self.max_retries || !is_retryable(&err) {
                        return Err(err);
                    }
                    retry += 1;
                    let delay = self.delay_for(retry);
                    tracing::warn!(
                        attempt = retry,
                        max_attempts = self.max_attempts(),
                        delay_ms = delay.as_millis() as u64,
                        error = %err,
                        "retrying after transient failure"
                    );
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
