//! Token cache implementation
//!
//! Holds the single bearer credential for the process. The first caller
//! performs the authorization exchange; everyone after that gets the cached
//! value. A bad credential will not become valid by retrying, so a failed
//! exchange is fatal and propagates immediately.

use crate::error::{Error, Result};
use crate::types::JsonValue;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::debug;

/// Credentials for the authorization exchange
#[derive(Clone, Deserialize)]
pub struct Credentials {
    /// Application ID issued for the integration
    pub application_id: String,
    /// Application secret issued for the integration
    pub application_secret: String,
    /// Per-installation token authorizing this account
    pub installation_token: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("application_id", &self.application_id)
            .field("application_secret", &"***")
            .field("installation_token", &"***")
            .finish()
    }
}

/// Process-wide cache for the bearer token
///
/// Clones share the underlying cache, so every component holding a
/// `TokenCache` sees the same credential and the exchange runs at most once.
pub struct TokenCache {
    auth_url: String,
    credentials: Credentials,
    client: Client,
    cached: Arc<RwLock<Option<String>>>,
}

impl TokenCache {
    /// Create a new token cache
    pub fn new(auth_url: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            auth_url: auth_url.into(),
            credentials,
            client: Client::new(),
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Create a token cache with a custom HTTP client
    pub fn with_client(auth_url: impl Into<String>, credentials: Credentials, client: Client) -> Self {
        Self {
            auth_url: auth_url.into(),
            credentials,
            client,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Get the bearer token, performing the exchange on first use
    pub async fn bearer(&self) -> Result<String> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                return Ok(token.clone());
            }
        }

        let mut cached = self.cached.write().await;

        // Double-check after acquiring the write lock (another task might
        // have completed the exchange while we waited)
        if let Some(token) = cached.as_ref() {
            return Ok(token.clone());
        }

        let token = self.exchange().await?;
        *cached = Some(token.clone());
        Ok(token)
    }

    /// Whether a token has already been obtained
    pub async fn is_cached(&self) -> bool {
        self.cached.read().await.is_some()
    }

    /// Perform the authorization exchange
    async fn exchange(&self) -> Result<String> {
        debug!("Performing authorization exchange against {}", self.auth_url);

        let body = json!({
            "Token": self.credentials.installation_token,
            "ApplicationId": self.credentials.application_id,
            "ApplicationSecret": self.credentials.application_secret,
        });

        let response = self
            .client
            .post(&self.auth_url)
            .json(&body)
            .send()
            .await
            .map_err(Error::Http)?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(Error::auth(format!(
                "authorization exchange failed with status {status}: {body}"
            )));
        }

        let payload: JsonValue = response.json().await.map_err(Error::Http)?;
        payload
            .get("Token")
            .and_then(JsonValue::as_str)
            .map(ToString::to_string)
            .ok_or_else(|| Error::auth("authorization exchange response missing 'Token' field"))
    }
}

impl Clone for TokenCache {
    fn clone(&self) -> Self {
        Self {
            auth_url: self.auth_url.clone(),
            credentials: self.credentials.clone(),
            client: self.client.clone(),
            cached: Arc::clone(&self.cached),
        }
    }
}

impl std::fmt::Debug for TokenCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenCache")
            .field("auth_url", &self.auth_url)
            .field("credentials", &self.credentials)
            .finish_non_exhaustive()
    }
}
