use serde::Deserialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use std::time::Duration;
use thiserror::Error;
use tracing::{debug, warn};

const DEFAULT_CONFIG_FILE: &str = ".pr-collector.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),
}

/// Top-level configuration loaded from .pr-collector.toml.
///
/// All fields are optional and the tool works with zero config, although
/// `github.repo_owner` and `github.repo_name` are needed to collect anything.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// GitHub-specific settings
    #[serde(default)]
    pub github: GitHubConfig,

    /// Where the PR corpus, indexes and reports live
    #[serde(default)]
    pub data: DataConfig,

    /// Request pacing, rate-limit and retry settings
    #[serde(default)]
    pub api: ApiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct GitHubConfig {
    pub api_base_url: String,
    pub repo_owner: String,
    pub repo_name: String,
    /// Name of the environment variable holding the API token.
    pub token_env_var: String,
    /// GitHub API token. If None, falls back to `token_env_var`, then `gh auth token`.
    pub token: Option<String>,
}

impl Default for GitHubConfig {
    fn default() -> Self {
        Self {
            api_base_url: "https://api.github.com".to_string(),
            repo_owner: String::new(),
            repo_name: String::new(),
            token_env_var: "GITHUB_TOKEN".to_string(),
            token: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    /// Directory holding one `<number>.json` per pull request
    pub base_dir: PathBuf,
    /// Root directory for generated markdown reports
    pub reports_dir: PathBuf,
    /// Index root; defaults to `<base_dir>/indexes`
    pub indexes_dir: Option<PathBuf>,
}

impl Default for DataConfig {
    fn default() -> Self {
        Self {
            base_dir: PathBuf::from("prs"),
            reports_dir: PathBuf::from("reports"),
            indexes_dir: None,
        }
    }
}

impl DataConfig {
    pub fn indexes_dir(&self) -> PathBuf {
        self.indexes_dir
            .clone()
            .unwrap_or_else(|| self.base_dir.join("indexes"))
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ApiConfig {
    /// Seconds to sleep between consecutive page/item requests
    pub request_delay: f64,
    /// Block until the quota resets when it runs low
    pub rate_limit_wait: bool,
    /// Remaining-request low-water mark
    pub rate_limit_threshold: u64,
    /// Maximum attempts per request, including the first one
    pub max_retries: u32,
    /// Upper bound in seconds on the time spent retrying one request
    pub max_retry_time: u64,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            request_delay: 0.5,
            rate_limit_wait: true,
            rate_limit_threshold: 100,
            max_retries: 5,
            max_retry_time: 30,
        }
    }
}

impl ApiConfig {
    pub fn request_delay(&self) -> Duration {
        if self.request_delay.is_finite() && self.request_delay > 0.0 {
            Duration::from_secs_f64(self.request_delay)
        } else {
            Duration::ZERO
        }
    }
}

impl Config {
    /// Load configuration from `path`, or from .pr-collector.toml in the
    /// current directory when no path is given.
    /// Returns default config if the default file doesn't exist.
    pub fn load(path: Option<&Path>) -> Result<Config, ConfigError> {
        match path {
            Some(path) => Self::load_from(path),
            None => {
                let path = Path::new(DEFAULT_CONFIG_FILE);
                if path.exists() {
                    Self::load_from(path)
                } else {
                    debug!("no {} found, using defaults", DEFAULT_CONFIG_FILE);
                    Ok(Config::default())
                }
            }
        }
    }

    /// Load from a specific path (useful for testing).
    pub fn load_from(path: &Path) -> Result<Config, ConfigError> {
        let contents = fs::read_to_string(path)?;
        let config = toml::from_str(&contents)?;
        Ok(config)
    }

    /// Resolve the GitHub token: config file value takes precedence,
    /// then the configured env var, then the `gh` CLI.
    pub fn github_token(&self) -> Option<String> {
        self.github
            .token
            .clone()
            .or_else(|| std::env::var(&self.github.token_env_var).ok())
            .filter(|token| !token.trim().is_empty())
            .or_else(gh_cli_token)
    }
}

fn gh_cli_token() -> Option<String> {
    match Command::new("gh").args(["auth", "token"]).output() {
        Ok(output) if output.status.success() => {
            let token = String::from_utf8_lossy(&output.stdout).trim().to_string();
            (!token.is_empty()).then_some(token)
        }
        Ok(_) => None,
        Err(e) => {
            warn!(error = %e, "could not obtain a token from the gh CLI");
            None
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.github.token.is_none());
        assert_eq!(config.github.api_base_url, "https://api.github.com");
        assert_eq!(config.github.token_env_var, "GITHUB_TOKEN");
        assert_eq!(config.data.base_dir, PathBuf::from("prs"));
        assert_eq!(config.data.indexes_dir(), PathBuf::from("prs").join("indexes"));
        assert!(config.api.rate_limit_wait);
        assert_eq!(config.api.rate_limit_threshold, 100);
    }

    #[test]
    fn test_parse_config_toml() {
        let toml_str = r#"
[github]
repo_owner = "test-owner"
repo_name = "test-repo"

[data]
base_dir = "data/prs"
indexes_dir = "data/indexes"

[api]
request_delay = 0.1
rate_limit_wait = false
"#;
        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.github.repo_owner, "test-owner");
        assert_eq!(config.github.repo_name, "test-repo");
        assert_eq!(config.github.api_base_url, "https://api.github.com");
        assert_eq!(config.data.indexes_dir(), PathBuf::from("data/indexes"));
        assert_eq!(config.data.reports_dir, PathBuf::from("reports"));
        assert!(!config.api.rate_limit_wait);
        assert_eq!(config.api.request_delay(), Duration::from_millis(100));
        assert_eq!(config.api.max_retries, 5);
    }

    #[test]
    fn test_negative_delay_is_zero() {
        let api = ApiConfig {
            request_delay: -1.0,
            ..ApiConfig::default()
        };
        assert_eq!(api.request_delay(), Duration::ZERO);
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("custom.toml");
        fs::write(&path, "[github]\ntoken = \"abc\"\n").unwrap();
        let config = Config::load(Some(&path)).unwrap();
        assert_eq!(config.github_token().as_deref(), Some("abc"));
    }

    #[test]
    fn test_load_missing_explicit_file_fails() {
        let dir = tempfile::tempdir().unwrap();
        let result = Config::load(Some(&dir.path().join("missing.toml")));
        assert!(matches!(result, Err(ConfigError::FileRead(_))));
    }
}
