//! Retry policy for throttled external calls
//!
//! Only errors the classifier marks as throttled are retried. The sleep before
//! retry `n` is `d_n = d_{n-1} * base * (1 + jitter * U(0,1))` with
//! `d_0 = initial_delay`, so with `base = 2` and no jitter the sleeps are
//! `2, 4, 8, ...` times the initial delay. Every other error is returned
//! untouched on the first occurrence.

use crate::error::{NormalizeError, Result};
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Exponential backoff with jitter, bounded by a retry ceiling
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Starting delay `d_0`; the first sleep is already multiplied by `base`
    #[serde(default = "default_initial_delay", with = "humantime_serde")]
    pub initial_delay: Duration,

    /// Multiplier applied on every retry
    #[serde(default = "default_base")]
    pub base: f64,

    /// Jitter factor; `0.0` disables jitter
    #[serde(default = "default_jitter")]
    pub jitter: f64,

    /// Retries allowed after the first attempt
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Optional cap on a single sleep
    #[serde(default, with = "humantime_serde")]
    pub max_delay: Option<Duration>,
}

fn default_initial_delay() -> Duration {
    Duration::from_secs(1)
}

fn default_base() -> f64 {
    2.0
}

fn default_jitter() -> f64 {
    1.0
}

fn default_max_retries() -> u32 {
    5
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            initial_delay: default_initial_delay(),
            base: default_base(),
            jitter: default_jitter(),
            max_retries: default_max_retries(),
            max_delay: None,
        }
    }
}

impl RetryPolicy {
    pub fn with_initial_delay(mut self, delay: Duration) -> Self {
        self.initial_delay = delay;
        self
    }

    pub fn with_base(mut self, base: f64) -> Self {
        self.base = base;
        self
    }

    pub fn with_jitter(mut self, jitter: f64) -> Self {
        self.jitter = jitter;
        self
    }

    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    pub fn with_max_delay(mut self, max_delay: Option<Duration>) -> Self {
        self.max_delay = max_delay;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.base >= 1.0) {
            return Err(NormalizeError::config(format!(
                "retry.base must be >= 1, got {}",
                self.base
            )));
        }
        if !(self.jitter >= 0.0) {
            return Err(NormalizeError::config(format!(
                "retry.jitter must be >= 0, got {}",
                self.jitter
            )));
        }
        Ok(())
    }

    /// Delay following `current`, given a uniform draw in `[0, 1)`
    pub fn next_delay(&self, current: Duration, draw: f64) -> Duration {
        let factor = self.base * (1.0 + self.jitter * draw);
        let next = Duration::from_secs_f64(current.as_secs_f64() * factor);
        match self.max_delay {
            Some(cap) => next.min(cap),
            None => next,
        }
    }

    /// Sleeps taken before each retry when no jitter is drawn
    pub fn base_schedule(&self) -> Vec<Duration> {
        let mut delay = self.initial_delay;
        (0..self.max_retries)
            .map(|_| {
                delay = self.next_delay(delay, 0.0);
                delay
            })
            .collect()
    }

    /// Run `operation` until it succeeds, fails with a non-throttled error,
    /// or exhausts the retry ceiling.
    ///
    /// `is_throttled` decides which errors are worth waiting out. Exhaustion
    /// yields [`NormalizeError::RetriesExhausted`] wrapping the last cause.
    pub async fn run<T, F, Fut, C>(&self, is_throttled: C, mut operation: F) -> Result<T>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T>>,
        C: Fn(&NormalizeError) -> bool,
    {
        let mut retries = 0u32;
        let mut delay = self.initial_delay;

        loop {
            match operation().await {
                Ok(value) => {
                    if retries > 0 {
                        debug!("Call succeeded after {} retries", retries);
                    }
                    return Ok(value);
                }
                Err(err) if is_throttled(&err) => {
                    retries += 1;
                    if retries > self.max_retries {
                        warn!(
                            "Max retries ({}) exceeded. Last error: {}",
                            self.max_retries, err
                        );
                        return Err(NormalizeError::RetriesExhausted {
                            retries: self.max_retries,
                            source: Box::new(err),
                        });
                    }

                    let draw: f64 = if self.jitter > 0.0 {
                        rand::rng().random()
                    } else {
                        0.0
                    };
                    delay = self.next_delay(delay, draw);
                    warn!(
                        "Rate limit exceeded (retry {}/{}). Retrying in {:.2?}...",
                        retries, self.max_retries, delay
                    );
                    tokio::time::sleep(delay).await;
                }
                Err(err) => return Err(err),
            }
        }
    }
}
