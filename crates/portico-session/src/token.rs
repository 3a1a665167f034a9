//! OAuth2 client-credentials token lifecycle.

use chrono::{DateTime, Duration, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tokio::sync::RwLock;
use tracing::{debug, instrument};

use crate::error::{SessionError, SessionResult};

/// Refresh this long before the reported expiry.
const EXPIRY_SKEW_SECS: i64 = 30;
/// Assumed lifetime when the endpoint omits `expires_in` or reports a
/// non-positive value.
const DEFAULT_EXPIRES_IN_SECS: i64 = 300;
/// Longest error body carried into a [`SessionError::TokenRequestFailed`].
const MAX_ERROR_BODY_LEN: usize = 512;

/// Client-credentials grant configuration.
#[derive(Debug, Clone)]
pub struct OAuthConfig {
    /// Token endpoint URL.
    pub token_url: String,
    /// OAuth client id.
    pub client_id: String,
    /// OAuth client secret.
    pub client_secret: SecretString,
    /// Optional scope parameter.
    pub scope: Option<String>,
    /// Optional audience parameter.
    pub audience: Option<String>,
    /// Optional resource parameter.
    pub resource: Option<String>,
}

/// OAuth2 token response from the token endpoint.
#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<i64>,
}

/// Cached OAuth2 access token.
#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: DateTime<Utc>,
}

impl CachedToken {
    /// True when the token is expired or inside the refresh skew.
    fn is_expired(&self) -> bool {
        Utc::now() + Duration::seconds(EXPIRY_SKEW_SECS) >= self.expires_at
    }
}

/// Token provider caching one access token per session.
///
/// Refresh is single-flight: concurrent callers needing a fresh token
/// serialize on the write lock and re-check before fetching, so exactly
/// one request is in flight at a time.
#[derive(Debug)]
pub struct TokenProvider {
    config: OAuthConfig,
    http_client: reqwest::Client,
    cached: RwLock<Option<CachedToken>>,
}

impl TokenProvider {
    /// Create a provider with a fresh HTTP client.
    #[must_use]
    pub fn new(config: OAuthConfig) -> Self {
        Self::with_client(config, reqwest::Client::new())
    }

    /// Create a provider with a custom HTTP client.
    #[must_use]
    pub fn with_client(config: OAuthConfig, http_client: reqwest::Client) -> Self {
        Self {
            config,
            http_client,
            cached: RwLock::new(None),
        }
    }

    /// Get a valid access token, refreshing if necessary.
    #[instrument(skip(self), fields(client_id = %self.config.client_id))]
    pub async fn get_token(&self) -> SessionResult<String> {
        {
            let cached = self.cached.read().await;
            if let Some(token) = cached.as_ref() {
                if !token.is_expired() {
                    debug!("using cached access token");
                    return Ok(token.access_token.clone());
                }
            }
        }

        let mut cached = self.cached.write().await;

        // Another task may have refreshed while we waited for the lock.
        if let Some(token) = cached.as_ref() {
            if !token.is_expired() {
                return Ok(token.access_token.clone());
            }
        }

        debug!("refreshing access token");
        let token = self.fetch_token().await?;
        let access_token = token.access_token.clone();
        *cached = Some(token);

        Ok(access_token)
    }

    /// Drop the cached token, forcing a refresh on next use.
    pub async fn invalidate(&self) {
        let mut cached = self.cached.write().await;
        *cached = None;
    }

    #[instrument(skip(self))]
    async fn fetch_token(&self) -> SessionResult<CachedToken> {
        let mut params: Vec<(&str, &str)> = vec![
            ("grant_type", "client_credentials"),
            ("client_id", self.config.client_id.as_str()),
            ("client_secret", self.config.client_secret.expose_secret().as_str()),
        ];
        if let Some(scope) = &self.config.scope {
            params.push(("scope", scope.as_str()));
        }
        if let Some(audience) = &self.config.audience {
            params.push(("audience", audience.as_str()));
        }
        if let Some(resource) = &self.config.resource {
            params.push(("resource", resource.as_str()));
        }

        let response = self
            .http_client
            .post(&self.config.token_url)
            .form(&params)
            .send()
            .await
            .map_err(|e| SessionError::TokenRequestFailed {
                status: 0,
                body: e.to_string(),
            })?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(SessionError::TokenRequestFailed {
                status: status.as_u16(),
                body: truncate_body(&body),
            });
        }

        let token: TokenResponse =
            response
                .json()
                .await
                .map_err(|e| SessionError::TokenRequestFailed {
                    status: status.as_u16(),
                    body: format!("unparseable token response: {e}"),
                })?;

        let expires_in = match token.expires_in {
            Some(secs) if secs > 0 => secs,
            _ => DEFAULT_EXPIRES_IN_SECS,
        };
        let expires_at = Utc::now() + Duration::seconds(expires_in);

        debug!(expires_at = %expires_at, "acquired new access token");

        Ok(CachedToken {
            access_token: token.access_token,
            expires_at,
        })
    }
}

fn truncate_body(body: &str) -> String {
    if body.len() <= MAX_ERROR_BODY_LEN {
        return body.to_string();
    }
    let mut end = MAX_ERROR_BODY_LEN;
    while !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}…", &body[..end])
}
