pub mod rate_limit;
pub mod retry;

pub use rate_limit::RateLimitGuard;
pub use retry::RetryPolicy;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, AUTHORIZATION, USER_AGENT};
use serde_json::Value;
use thiserror::Error;
use tracing::{debug, instrument};

use crate::config::Config;

/// Longest error body excerpt kept in a [`GithubError::Status`] message.
const MAX_ERROR_MESSAGE: usize = 200;

#[derive(Debug, Error)]
pub enum GithubError {
    #[error("GitHub API request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("GitHub API returned {status} for {url}: {message}")]
    Status {
        status: u16,
        url: String,
        message: String,
    },

    #[error("Unexpected response body from {url}: {source}")]
    Decode {
        url: String,
        #[source]
        source: serde_json::Error,
    },

    #[error("Unexpected GitHub API response: {0}")]
    Unexpected(String),
}

impl GithubError {
    pub fn status(&self) -> Option<u16> {
        match self {
            GithubError::Status { status, .. } => Some(*status),
            GithubError::Request(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.status() == Some(404)
    }

    /// Authentication failures and missing resources are final; so is a
    /// body that cannot be decoded. Everything else may be transient.
    pub fn is_retryable(&self) -> bool {
        match self {
            GithubError::Request(_) | GithubError::Status { .. } => {
                !matches!(self.status(), Some(401 | 403 | 404))
            }
            GithubError::Decode { .. } | GithubError::Unexpected(_) => false,
        }
    }
}

/// The one capability the collector needs from the GitHub API:
/// `GET {path}?{params}` returning a JSON document.
#[async_trait]
pub trait ApiClient: Send + Sync {
    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value, GithubError>;
}

/// reqwest-backed [`ApiClient`] with a retry policy around every call.
pub struct GithubClient {
    http: reqwest::Client,
    base_url: String,
    retry: RetryPolicy,
}

impl GithubClient {
    pub fn new(
        base_url: &str,
        token: Option<&str>,
        retry: RetryPolicy,
    ) -> Result<Self, GithubError> {
        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/vnd.github.v3+json"));
        headers.insert(USER_AGENT, HeaderValue::from_static("pr-collector"));
        if let Some(token) = token {
            let mut value = HeaderValue::from_str(&format!("token {token}"))
                .map_err(|_| GithubError::Unexpected("token contains invalid characters".to_string()))?;
            value.set_sensitive(true);
            headers.insert(AUTHORIZATION, value);
        }

        let http = reqwest::Client::builder().default_headers(headers).build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            retry,
        })
    }

    pub fn from_config(config: &Config) -> Result<Self, GithubError> {
        let token = config.github_token();
        if token.is_none() {
            debug!("no GitHub token found, using unauthenticated requests");
        }
        Self::new(
            &config.github.api_base_url,
            token.as_deref(),
            RetryPolicy::from_config(&config.api),
        )
    }

    async fn get_once(&self, url: &str, params: &[(&str, String)]) -> Result<Value, GithubError> {
        let response = self.http.get(url).query(params).send().await?;
        let status = response.status();
        let body = response.text().await?;

        if !status.is_success() {
            let message = extract_github_message(&body)
                .unwrap_or_else(|| body.chars().take(MAX_ERROR_MESSAGE).collect());
            return Err(GithubError::Status {
                status: status.as_u16(),
                url: url.to_string(),
                message,
            });
        }

        serde_json::from_str(&body).map_err(|source| GithubError::Decode {
            url: url.to_string(),
            source,
        })
    }
}

#[async_trait]
impl ApiClient for GithubClient {
    #[instrument(skip(self, params), level = "debug")]
    async fn get_json(&self, path: &str, params: &[(&str, String)]) -> Result<Value, GithubError> {
        let url = format!("{}{}", self.base_url, path);
        self.retry.run(|| self.get_once(&url, params)).await
    }
}

fn extract_github_message(body: &str) -> Option<String> {
    let value = serde_json::from_str::<Value>(body).ok()?;
    value
        .get("message")
        .and_then(Value::as_str)
        .map(ToOwned::to_owned)
}
