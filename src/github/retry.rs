use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;
use tracing::warn;

use super::GithubError;
use crate::config::ApiConfig;

/// Exponential-backoff retry around one transport call.
///
/// Errors for which [`GithubError::is_retryable`] is false (401/403/404,
/// undecodable bodies) are returned on the first occurrence.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,
    /// Stop retrying once the next sleep would cross this budget
    pub max_elapsed: Duration,
    pub initial_backoff: Duration,
    pub max_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_elapsed: Duration::from_secs(30),
            initial_backoff: Duration::from_secs(1),
            max_backoff: Duration::from_secs(16),
        }
    }
}

impl RetryPolicy {
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            max_attempts: api.max_retries.max(1),
            max_elapsed: Duration::from_secs(api.max_retry_time),
            ..Self::default()
        }
    }

    /// A policy that tries exactly once.
    #[cfg(test)]
    pub fn no_retry() -> Self {
        Self {
            max_attempts: 1,
            ..Self::default()
        }
    }

    /// Sleep before retry number `attempt` (1-based): initial * 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
        self.initial_backoff
            .saturating_mul(factor)
            .min(self.max_backoff)
    }

    pub async fn run<T, F, Fut>(&self, mut op: F) -> Result<T, GithubError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, GithubError>>,
    {
        let started = Instant::now();
        let mut attempt = 1;
        loop {
            let err = match op().await {
                Ok(value) => return Ok(value),
                Err(err) => err,
            };
            if !err.is_retryable() || attempt >= self.max_attempts {
                return Err(err);
            }
            let delay = self.backoff(attempt);
            if started.elapsed() + delay > self.max_elapsed {
                return Err(err);
            }
            warn!(attempt, delay_ms = delay.as_millis() as u64, error = %err, "request failed, retrying");
            tokio::time::sleep(delay).await;
            attempt += 1;
        }
    }
}
