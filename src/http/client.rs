use crate::clients::ClientError;
use crate::config::HttpConfig;
use governor::{DefaultDirectRateLimiter, Jitter, Quota, RateLimiter};
use reqwest::{Method, RequestBuilder, Response, StatusCode};
use serde::de::DeserializeOwned;
use std::num::NonZeroU32;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// HTTP client shared by the remote system clients.
///
/// Every request waits on a token-bucket rate limiter before it is sent, and
/// non-success statuses are folded into [`ClientError`] variants so callers can
/// tell "already exists" and "not found" apart from genuine failures.
#[derive(Debug, Clone)]
pub struct RateLimitedHttpClient {
    http: reqwest::Client,
    rate_limiter: Arc<DefaultDirectRateLimiter>,
    base_url: String,
}

impl RateLimitedHttpClient {
    pub fn new(base_url: &str, config: &HttpConfig, skip_tls_verify: bool) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .danger_accept_invalid_certs(skip_tls_verify)
            .user_agent(concat!("boulder/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| ClientError::Network {
                message: format!("Failed to build HTTP client: {e}"),
            })?;

        let per_second = NonZeroU32::new(config.requests_per_second).unwrap_or(NonZeroU32::MIN);
        let burst = NonZeroU32::new(config.burst).unwrap_or(per_second);
        let quota = Quota::per_second(per_second).allow_burst(burst);

        Ok(Self {
            http,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a path against the base URL; absolute URLs pass through.
    pub fn url(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else if path.starts_with('/') {
            format!("{}{}", self.base_url, path)
        } else {
            format!("{}/{}", self.base_url, path)
        }
    }

    pub fn request(&self, method: Method, path: &str) -> RequestBuilder {
        self.http.request(method, self.url(path))
    }

    /// Send and decode a JSON body; `resource` names the target in error messages.
    pub async fn execute<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        resource: &str,
    ) -> Result<T, ClientError> {
        let response = self.send(request, resource).await?;
        response.json::<T>().await.map_err(|e| ClientError::InvalidResponse {
            message: format!("{resource}: {e}"),
        })
    }

    /// Send and discard the body.
    pub async fn execute_empty(&self, request: RequestBuilder, resource: &str) -> Result<(), ClientError> {
        self.send(request, resource).await?;
        Ok(())
    }

    async fn send(&self, request: RequestBuilder, resource: &str) -> Result<Response, ClientError> {
        self.rate_limiter
            .until_ready_with_jitter(Jitter::up_to(Duration::from_millis(50)))
            .await;

        let response = request.send().await?;
        let status = response.status();
        debug!(resource, status = status.as_u16(), "Remote call completed");

        if status.is_success() {
            return Ok(response);
        }

        let body = response.text().await.unwrap_or_default();
        Err(classify_status(status, &body, resource))
    }
}

/// Human-readable part of an error body: the JSON `description` or
/// `error_description` field when present, else the trimmed body.
fn error_message(body: &str) -> String {
    serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| {
            value
                .get("description")
                .or_else(|| value.get("error_description"))
                .and_then(|d| d.as_str())
                .map(str::to_string)
        })
        .unwrap_or_else(|| body.trim().to_string())
}

/// Map a failed HTTP status onto the error taxonomy the lifecycle code understands.
pub fn classify_status(status: StatusCode, body: &str, resource: &str) -> ClientError {
    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => ClientError::AuthenticationFailed {
            message: format!("{resource}: {}", error_message(body)),
        },
        StatusCode::NOT_FOUND => ClientError::NotFound {
            resource: resource.to_string(),
        },
        StatusCode::CONFLICT => ClientError::AlreadyExists {
            resource: resource.to_string(),
        },
        StatusCode::TOO_MANY_REQUESTS => ClientError::RateLimited,
        // The platform reports duplicate names as 400 with a *NameTaken error code.
        StatusCode::BAD_REQUEST if body.contains("NameTaken") => ClientError::AlreadyExists {
            resource: resource.to_string(),
        },
        _ => ClientError::Http {
            status: status.as_u16(),
            message: error_message(body),
        },
    }
}
