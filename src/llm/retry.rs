//! Retry with exponential backoff for LLM provider calls
//!
//! Transient provider failures (connection resets, timeouts, 5xx, 429) are
//! retried with capped exponential backoff plus jitter. Everything else is
//! returned on the first failure.

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::{debug, warn};

/// Backoff policy for provider calls
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Retries after the first attempt
    pub max_retries: u32,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
    pub multiplier: f64,
    /// Stretch each delay by up to 25% so concurrent cycles do not retry in lockstep
    pub jitter: bool,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(500),
            max_backoff: Duration::from_secs(30),
            multiplier: 2.0,
            jitter: true,
        }
    }
}

impl RetryConfig {
    /// No retries at all; the first failure is final
    pub fn none() -> Self {
        Self {
            max_retries: 0,
            ..Self::default()
        }
    }

    /// Short delays, for tests and local providers
    pub fn quick() -> Self {
        Self {
            max_retries: 3,
            initial_backoff: Duration::from_millis(10),
            max_backoff: Duration::from_millis(200),
            multiplier: 2.0,
            jitter: false,
        }
    }

    /// Delay before retry number `attempt` (zero-based)
    pub fn backoff_duration(&self, attempt: u32) -> Duration {
        let base = self.initial_backoff.as_secs_f64() * self.multiplier.powi(attempt as i32);
        let mut secs = base.min(self.max_backoff.as_secs_f64());
        if self.jitter {
            secs *= 1.0 + jitter_fraction() * 0.25;
        }
        Duration::from_secs_f64(secs)
    }

    fn delay_for(&self, decision: RetryDecision, attempt: u32) -> Option<Duration> {
        if attempt >= self.max_retries {
            return None;
        }
        match decision {
            RetryDecision::NoRetry => None,
            RetryDecision::Retry => Some(self.backoff_duration(attempt)),
            RetryDecision::RetryAfter(wait) => Some(wait.min(self.max_backoff)),
        }
    }
}

/// Pseudo-random value in `[0, 1)` taken from the clock's sub-second nanos
fn jitter_fraction() -> f64 {
    use std::time::SystemTime;
    let nanos = SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .map(|d| d.subsec_nanos())
        .unwrap_or(0);
    f64::from(nanos % 1000) / 1000.0
}

/// How a failed call should be treated
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Retry,
    /// Retry, but not before the given delay (e.g. from a 429)
    RetryAfter(Duration),
    NoRetry,
}

/// Errors that know whether the failed call is worth repeating
pub trait RetryableError {
    fn retry_decision(&self) -> RetryDecision;
}

/// Run `operation` until it succeeds, fails permanently, or retries run out
///
/// `label` names the call in log events.
pub async fn with_retry<F, Fut, T, E>(config: &RetryConfig, label: &str, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: RetryableError + std::fmt::Display,
{
    let mut attempt = 0;
    loop {
        let error = match operation().await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        let decision = error.retry_decision();
        let Some(delay) = config.delay_for(decision, attempt) else {
            if decision == RetryDecision::NoRetry {
                debug!(call = label, attempt, error = %error, "Provider call failed permanently");
            } else {
                warn!(call = label, attempts = attempt + 1, error = %error, "Provider call failed, retries exhausted");
            }
            return Err(error);
        };

        warn!(
            call = label,
            attempt = attempt + 1,
            max_attempts = config.max_retries + 1,
            backoff_ms = delay.as_millis() as u64,
            error = %error,
            "Retrying provider call"
        );
        sleep(delay).await;
        attempt += 1;
    }
}
