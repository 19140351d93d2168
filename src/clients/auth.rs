//! OAuth2 token acquisition for the remote clients
//!
//! The identity service is reached with client credentials, the platform with
//! a password grant. Tokens are cached until shortly before they expire. When
//! no token endpoint is configured for the platform it is read from the
//! platform's `/v2/info` document on first use.

use super::ClientError;
use crate::http::RateLimitedHttpClient;
use reqwest::Method;
use serde::Deserialize;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{OnceCell, RwLock};
use tracing::debug;

/// Refresh this long before the server-reported expiry.
const EXPIRY_MARGIN: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub enum TokenGrant {
    ClientCredentials {
        client_id: String,
        client_secret: String,
    },
    Password {
        client_id: String,
        client_secret: String,
        username: String,
        password: String,
    },
}

impl std::fmt::Debug for TokenGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::ClientCredentials { client_id, .. } => f
                .debug_struct("ClientCredentials")
                .field("client_id", client_id)
                .field("client_secret", &"[REDACTED]")
                .finish(),
            Self::Password {
                client_id, username, ..
            } => f
                .debug_struct("Password")
                .field("client_id", client_id)
                .field("username", username)
                .field("password", &"[REDACTED]")
                .finish(),
        }
    }
}

/// Where to request tokens from.
#[derive(Debug, Clone)]
pub enum TokenEndpoint {
    Fixed(String),
    /// Read `token_endpoint` from `/v2/info` on the client's base URL.
    Discover,
}

#[derive(Debug, Deserialize)]
struct InfoResponse {
    token_endpoint: String,
}

#[derive(Debug, Deserialize)]
struct TokenResponse {
    access_token: String,
    #[serde(default)]
    expires_in: Option<u64>,
}

#[derive(Debug, Clone)]
struct CachedToken {
    access_token: String,
    expires_at: Option<Instant>,
}

impl CachedToken {
    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|exp| Instant::now() + EXPIRY_MARGIN >= exp)
            .unwrap_or(false)
    }
}

#[derive(Debug, Clone)]
pub struct TokenProvider {
    http: RateLimitedHttpClient,
    endpoint: TokenEndpoint,
    discovered: Arc<OnceCell<String>>,
    grant: TokenGrant,
    cached: Arc<RwLock<Option<CachedToken>>>,
}

impl TokenProvider {
    pub fn new(http: RateLimitedHttpClient, endpoint: TokenEndpoint, grant: TokenGrant) -> Self {
        Self {
            http,
            endpoint,
            discovered: Arc::new(OnceCell::new()),
            grant,
            cached: Arc::new(RwLock::new(None)),
        }
    }

    /// Current bearer token, fetching a new one when the cache is empty or stale.
    pub async fn bearer_token(&self) -> Result<String, ClientError> {
        {
            let cache = self.cached.read().await;
            if let Some(token) = cache.as_ref().filter(|t| !t.is_expired()) {
                return Ok(token.access_token.clone());
            }
        }

        let mut cache = self.cached.write().await;
        // Another task may have refreshed while we waited for the write lock.
        if let Some(token) = cache.as_ref().filter(|t| !t.is_expired()) {
            return Ok(token.access_token.clone());
        }

        let fresh = self.fetch().await?;
        let access_token = fresh.access_token.clone();
        *cache = Some(fresh);
        Ok(access_token)
    }

    /// Drop the cached token so the next call re-authenticates.
    async fn invalidate(&self) {
        *self.cached.write().await = None;
    }

    /// Pass a call's result through, dropping the cached token if it was rejected.
    pub async fn guard<T>(&self, result: Result<T, ClientError>) -> Result<T, ClientError> {
        if let Err(ClientError::AuthenticationFailed { .. }) = &result {
            self.invalidate().await;
        }
        result
    }

    /// Token URL, discovering it once when not configured.
    pub async fn token_url(&self) -> Result<String, ClientError> {
        match &self.endpoint {
            TokenEndpoint::Fixed(url) => Ok(url.clone()),
            TokenEndpoint::Discover => self
                .discovered
                .get_or_try_init(|| self.discover())
                .await
                .cloned(),
        }
    }

    async fn discover(&self) -> Result<String, ClientError> {
        let request = self.http.request(Method::GET, "/v2/info");
        let info: InfoResponse = self.http.execute(request, "platform info").await?;
        if info.token_endpoint.trim().is_empty() {
            return Err(ClientError::InvalidResponse {
                message: "platform info: empty token_endpoint".to_string(),
            });
        }
        let url = format!("{}/oauth/token", info.token_endpoint.trim_end_matches('/'));
        debug!(endpoint = %url, "Discovered token endpoint");
        Ok(url)
    }

    async fn fetch(&self) -> Result<CachedToken, ClientError> {
        let token_url = self.token_url().await?;
        debug!(endpoint = %token_url, "Requesting access token");

        let request = self.http.request(Method::POST, &token_url);
        let request = match &self.grant {
            TokenGrant::ClientCredentials {
                client_id,
                client_secret,
            } => request
                .basic_auth(client_id, Some(client_secret))
                .form(&[("grant_type", "client_credentials")]),
            TokenGrant::Password {
                client_id,
                client_secret,
                username,
                password,
            } => request.basic_auth(client_id, Some(client_secret)).form(&[
                ("grant_type", "password"),
                ("username", username.as_str()),
                ("password", password.as_str()),
            ]),
        };

        let response: TokenResponse = self
            .http
            .execute(request, "access token")
            .await
            .map_err(|e| match e {
                ClientError::Http { status, message } => ClientError::AuthenticationFailed {
                    message: format!("token endpoint returned {status}: {message}"),
                },
                other => other,
            })?;

        Ok(CachedToken {
            access_token: response.access_token,
            expires_at: response
                .expires_in
                .map(|secs| Instant::now() + Duration::from_secs(secs)),
        })
    }
}
