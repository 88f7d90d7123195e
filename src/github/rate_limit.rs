use chrono::{DateTime, Utc};
use serde::Deserialize;
use std::time::Duration;
use tracing::{info, warn};

use super::{ApiClient, GithubError};
use crate::config::ApiConfig;

/// Seconds added on top of the reset time before resuming.
const RESET_BUFFER: Duration = Duration::from_secs(5);

/// Core quota as reported by `GET /rate_limit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitStatus {
    pub remaining: u64,
    pub reset_at: DateTime<Utc>,
}

#[derive(Deserialize)]
struct RateLimitResponse {
    resources: Resources,
}

#[derive(Deserialize)]
struct Resources {
    core: CoreQuota,
}

#[derive(Deserialize)]
struct CoreQuota {
    remaining: u64,
    /// Unix seconds
    reset: i64,
}

impl RateLimitStatus {
    pub fn from_response(value: serde_json::Value) -> Result<Self, GithubError> {
        let response: RateLimitResponse =
            serde_json::from_value(value).map_err(|source| GithubError::Decode {
                url: "/rate_limit".to_string(),
                source,
            })?;
        let reset_at = DateTime::from_timestamp(response.resources.core.reset, 0).ok_or_else(|| {
            GithubError::Unexpected(format!(
                "rate limit reset {} is out of range",
                response.resources.core.reset
            ))
        })?;
        Ok(Self {
            remaining: response.resources.core.remaining,
            reset_at,
        })
    }

    /// Time to sleep until the quota resets plus `buffer`, or None when the
    /// reset already lies that far in the past.
    pub fn wait_duration(&self, now: DateTime<Utc>, buffer: Duration) -> Option<Duration> {
        let until_reset = self.reset_at - now;
        let buffer = chrono::Duration::from_std(buffer).unwrap_or(chrono::Duration::zero());
        (until_reset + buffer).to_std().ok().filter(|d| !d.is_zero())
    }
}

pub async fn fetch_rate_limit(client: &dyn ApiClient) -> Result<RateLimitStatus, GithubError> {
    let value = client.get_json("/rate_limit", &[]).await?;
    RateLimitStatus::from_response(value)
}

/// Blocks a sync pass while the remaining quota is below the low-water mark.
#[derive(Debug, Clone, Copy)]
pub struct RateLimitGuard {
    pub threshold: u64,
    pub wait_enabled: bool,
    pub buffer: Duration,
}

impl RateLimitGuard {
    pub fn from_config(api: &ApiConfig) -> Self {
        Self {
            threshold: api.rate_limit_threshold,
            wait_enabled: api.rate_limit_wait,
            buffer: RESET_BUFFER,
        }
    }

    /// Check the quota and sleep until it resets if needed.
    /// Returns true when a wait happened. A failed quota check is logged and ignored.
    pub async fn check(&self, client: &dyn ApiClient) -> bool {
        let status = match fetch_rate_limit(client).await {
            Ok(status) => status,
            Err(e) => {
                warn!(error = %e, "could not read rate limit status, continuing");
                return false;
            }
        };
        info!(remaining = status.remaining, reset_at = %status.reset_at, "API rate limit");

        if status.remaining >= self.threshold || !self.wait_enabled {
            return false;
        }
        match status.wait_duration(Utc::now(), self.buffer) {
            Some(wait) => {
                info!(
                    remaining = status.remaining,
                    wait_secs = wait.as_secs_f64(),
                    "rate limit nearly exhausted, waiting for reset"
                );
                tokio::time::sleep(wait).await;
                true
            }
            None => false,
        }
    }
}
