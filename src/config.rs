//! Configuration types for the Linnworks source
//!
//! Credentials, the sync start date, endpoint URLs, and HTTP tuning, loaded
//! from a JSON or YAML file with serde defaults for everything optional.

use crate::auth::Credentials;
use crate::error::{Error, Result};
use crate::http::{FailureClassifier, HttpClientConfig, RateLimiterConfig};
use crate::types::{parse_datetime, BackoffType};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Default Linnworks API base for EU-hosted accounts
pub const DEFAULT_API_URL: &str = "https://eu-ext.linnworks.net/api";

/// Default authorization exchange endpoint
pub const DEFAULT_AUTH_URL: &str = "https://api.linnworks.net/api/Auth/AuthorizeByApplication";

/// Complete source configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TapConfig {
    /// The earliest record date to sync
    pub start_date: String,

    /// Application ID issued for the integration
    pub application_id: String,

    /// Application secret issued for the integration
    pub application_secret: String,

    /// Per-installation token authorizing this account
    pub installation_token: String,

    /// Optional user agent for outbound requests
    #[serde(default)]
    pub user_agent: Option<String>,

    /// API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,

    /// Authorization exchange URL
    #[serde(default = "default_auth_url")]
    pub auth_url: String,

    /// Records requested per page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// HTTP client tuning
    #[serde(default)]
    pub http: HttpSettings,
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_auth_url() -> String {
    DEFAULT_AUTH_URL.to_string()
}

fn default_page_size() -> usize {
    500
}

/// HTTP client tuning knobs
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HttpSettings {
    /// Request timeout in seconds
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Maximum retry attempts for retriable failures
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Initial backoff delay in milliseconds
    #[serde(default = "default_backoff_initial_ms")]
    pub backoff_initial_ms: u64,

    /// Maximum backoff delay in seconds
    #[serde(default = "default_backoff_max_secs")]
    pub backoff_max_secs: u64,

    /// Statuses retried in addition to the defaults
    #[serde(default)]
    pub extra_retry_statuses: Vec<u16>,

    /// Rate limiting; None disables it
    #[serde(default = "default_rate_limit")]
    pub rate_limit: Option<RateLimiterConfig>,
}

fn default_timeout_secs() -> u64 {
    30
}

fn default_max_retries() -> u32 {
    5
}

fn default_backoff_initial_ms() -> u64 {
    500
}

fn default_backoff_max_secs() -> u64 {
    60
}

fn default_rate_limit() -> Option<RateLimiterConfig> {
    Some(RateLimiterConfig::default())
}

impl Default for HttpSettings {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_initial_ms: default_backoff_initial_ms(),
            backoff_max_secs: default_backoff_max_secs(),
            extra_retry_statuses: Vec::new(),
            rate_limit: default_rate_limit(),
        }
    }
}

impl TapConfig {
    /// Load configuration from a JSON or YAML file, chosen by extension
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| Error::Config {
            message: format!("Failed to read config file {}: {e}", path.display()),
        })?;

        let config: Self = match path.extension().and_then(|e| e.to_str()) {
            Some("yaml" | "yml") => serde_yaml::from_str(&contents)?,
            _ => serde_json::from_str(&contents)?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from an inline JSON string
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Validate field contents beyond what serde enforces
    pub fn validate(&self) -> Result<()> {
        if self.application_id.is_empty() {
            return Err(Error::missing_field("application_id"));
        }
        if self.application_secret.is_empty() {
            return Err(Error::missing_field("application_secret"));
        }
        if self.installation_token.is_empty() {
            return Err(Error::missing_field("installation_token"));
        }

        url::Url::parse(&self.api_url)?;
        url::Url::parse(&self.auth_url)?;

        if parse_datetime(&self.start_date).is_none() {
            return Err(Error::InvalidConfigValue {
                field: "start_date".to_string(),
                message: format!("'{}' is not a recognized datetime", self.start_date),
            });
        }

        Ok(())
    }

    /// The configured start date as a UTC datetime
    pub fn start_datetime(&self) -> Result<DateTime<Utc>> {
        parse_datetime(&self.start_date).ok_or_else(|| Error::InvalidConfigValue {
            field: "start_date".to_string(),
            message: format!("'{}' is not a recognized datetime", self.start_date),
        })
    }

    /// The exchange credentials
    pub fn credentials(&self) -> Credentials {
        Credentials {
            application_id: self.application_id.clone(),
            application_secret: self.application_secret.clone(),
            installation_token: self.installation_token.clone(),
        }
    }

    /// Build the HTTP client configuration for list requests
    pub fn http_client_config(&self) -> HttpClientConfig {
        let mut builder = HttpClientConfig::builder()
            .base_url(self.api_url.clone())
            .timeout(Duration::from_secs(self.http.timeout_secs))
            .max_retries(self.http.max_retries)
            .backoff(
                BackoffType::Exponential,
                Duration::from_millis(self.http.backoff_initial_ms),
                Duration::from_secs(self.http.backoff_max_secs),
            )
            .header("Accept", "application/json");

        if let Some(agent) = &self.user_agent {
            builder = builder.user_agent(agent.clone());
        }

        match &self.http.rate_limit {
            Some(limit) => builder.rate_limit(limit.clone()).build(),
            None => builder.no_rate_limit().build(),
        }
    }

    /// Build the response classifier for list requests
    pub fn classifier(&self) -> FailureClassifier {
        FailureClassifier::with_extra_statuses(self.http.extra_retry_statuses.iter().copied())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const MINIMAL: &str = r#"{
        "start_date": "2023-01-01T00:00:00Z",
        "application_id": "app",
        "application_secret": "secret",
        "installation_token": "install"
    }"#;

    #[test]
    fn test_minimal_config_applies_defaults() {
        let config = TapConfig::from_json_str(MINIMAL).unwrap();

        assert_eq!(config.api_url, DEFAULT_API_URL);
        assert_eq!(config.auth_url, DEFAULT_AUTH_URL);
        assert_eq!(config.page_size, 500);
        assert_eq!(config.http.timeout_secs, 30);
        assert_eq!(config.http.max_retries, 5);
        assert!(config.http.rate_limit.is_some());
        assert!(config.user_agent.is_none());
    }

    #[test]
    fn test_start_datetime_accepts_date_only() {
        let config = TapConfig::from_json_str(
            r#"{
                "start_date": "2023-01-01",
                "application_id": "app",
                "application_secret": "secret",
                "installation_token": "install"
            }"#,
        )
        .unwrap();

        let start = config.start_datetime().unwrap();
        assert_eq!(start.to_rfc3339(), "2023-01-01T00:00:00+00:00");
    }

    #[test]
    fn test_invalid_start_date_rejected() {
        let result = TapConfig::from_json_str(
            r#"{
                "start_date": "whenever",
                "application_id": "app",
                "application_secret": "secret",
                "installation_token": "install"
            }"#,
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_empty_credentials_rejected() {
        let result = TapConfig::from_json_str(
            r#"{
                "start_date": "2023-01-01",
                "application_id": "",
                "application_secret": "secret",
                "installation_token": "install"
            }"#,
        );
        assert!(matches!(
            result,
            Err(Error::MissingConfigField { .. })
        ));
    }

    #[test]
    fn test_invalid_api_url_rejected() {
        let result = TapConfig::from_json_str(
            r#"{
                "start_date": "2023-01-01",
                "application_id": "app",
                "application_secret": "secret",
                "installation_token": "install",
                "api_url": "not a url"
            }"#,
        );
        assert!(matches!(result, Err(Error::InvalidUrl(_))));
    }

    #[test]
    fn test_yaml_config_loading() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(
            &path,
            r"
start_date: 2023-01-01T00:00:00Z
application_id: app
application_secret: secret
installation_token: install
page_size: 100
http:
  max_retries: 2
  extra_retry_statuses:
    - 408
",
        )
        .unwrap();

        let config = TapConfig::from_file(&path).unwrap();
        assert_eq!(config.page_size, 100);
        assert_eq!(config.http.max_retries, 2);
        assert_eq!(config.http.extra_retry_statuses, vec![408]);
    }

    #[test]
    fn test_http_client_config_carries_settings() {
        let config = TapConfig::from_json_str(MINIMAL).unwrap();
        let http = config.http_client_config();

        assert_eq!(http.base_url.as_deref(), Some(DEFAULT_API_URL));
        assert_eq!(http.timeout, Duration::from_secs(30));
        assert_eq!(http.max_retries, 5);
        assert_eq!(
            http.default_headers.get("Accept").map(String::as_str),
            Some("application/json")
        );
    }
}
