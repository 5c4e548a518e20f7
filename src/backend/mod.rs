//! Client for the hosted backend's serverless functions.

pub mod http_client;
pub mod scrub;

pub use http_client::{build_backend_client, build_backend_client_with_timeout, build_streaming_client};
pub use scrub::{api_error, sanitize_api_error, scrub_secret_patterns};

use crate::config::Config;
use crate::error::ApiError;
use crate::rate_limit::{RateLimitDecision, RateLimiter};
use crate::retry::{Retrier, RetryPolicy};
use reqwest::{Client, RequestBuilder};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::sync::Arc;
use std::time::Duration;

/// Invokes `POST {base_url}/functions/v1/{name}`.
///
/// Every call is gated by the shared [`RateLimiter`] under the key
/// `function_<name>`, then run under the retry policy. Only transient
/// failures are retried; 429 and 402 come back on the first attempt.
#[derive(Clone)]
pub struct FunctionsClient {
    http: Client,
    streaming_http: Client,
    base_url: String,
    anon_key: Option<String>,
    /// Pre-computed `"Bearer <token>"` header value.
    cached_auth_header: Option<String>,
    limiter: Arc<RateLimiter>,
    retry: RetryPolicy,
}

impl FunctionsClient {
    pub fn new(base_url: &str, anon_key: Option<&str>, access_token: Option<&str>) -> Self {
        let bearer = access_token.or(anon_key);
        Self {
            http: build_backend_client(),
            streaming_http: build_streaming_client(),
            base_url: base_url.trim_end_matches('/').to_string(),
            anon_key: anon_key.map(ToString::to_string),
            cached_auth_header: bearer.map(|token| format!("Bearer {token}")),
            limiter: Arc::new(RateLimiter::new(10, Duration::from_secs(60))),
            retry: RetryPolicy::default(),
        }
    }

    pub fn from_config(config: &Config) -> Self {
        let backend = &config.backend;
        let limiter = RateLimiter::new(
            config.rate_limit.max_requests,
            Duration::from_millis(config.rate_limit.window_ms),
        )
        .with_sweep_interval(Duration::from_millis(config.rate_limit.sweep_interval_ms));

        let mut client = Self::new(
            &backend.url,
            backend.anon_key.as_deref(),
            backend.access_token.as_deref(),
        )
        .with_rate_limiter(Arc::new(limiter))
        .with_retry_policy(config.reliability.retry_policy());
        client.http = build_backend_client_with_timeout(backend.request_timeout_secs);
        client
    }

    pub fn with_rate_limiter(mut self, limiter: Arc<RateLimiter>) -> Self {
        self.limiter = limiter;
        self
    }

    pub fn with_retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry = policy;
        self
    }

    pub fn rate_limiter(&self) -> &Arc<RateLimiter> {
        &self.limiter
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn function_url(&self, name: &str) -> String {
        format!("{}/functions/v1/{name}", self.base_url)
    }

    /// Attach the project key and bearer token headers.
    pub(crate) fn authorize(&self, request: RequestBuilder) -> RequestBuilder {
        let request = match &self.anon_key {
            Some(key) => request.header("apikey", key),
            None => request,
        };
        match &self.cached_auth_header {
            Some(auth) => request.header("Authorization", auth),
            None => request,
        }
    }

    pub(crate) fn http(&self) -> &Client {
        &self.http
    }

    /// Consume one slot of the `function_<name>` window.
    pub fn gate(&self, name: &str) -> Result<(), ApiError> {
        match self.limiter.check(&format!("function_{name}")) {
            RateLimitDecision::Allowed { .. } => Ok(()),
            RateLimitDecision::Limited { retry_after } => {
                tracing::warn!(function = name, ?retry_after, "Local rate limit hit");
                Err(ApiError::Throttled { retry_after })
            }
        }
    }

    pub async fn invoke<B, R>(&self, name: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.invoke_with_policy(name, body, self.retry).await
    }

    pub async fn invoke_with_policy<B, R>(
        &self,
        name: &str,
        body: &B,
        policy: RetryPolicy,
    ) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        self.gate(name)?;
        Retrier::new(policy)
            .run(name, ApiError::is_retryable, |_| self.invoke_once(name, body))
            .await
    }

    async fn invoke_once<B, R>(&self, name: &str, body: &B) -> Result<R, ApiError>
    where
        B: Serialize + ?Sized,
        R: DeserializeOwned,
    {
        let response = self
            .authorize(self.http.post(self.function_url(name)))
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            let err = api_error(response).await;
            tracing::debug!(function = name, "Function call failed: {err}");
            return Err(err);
        }

        response.json::<R>().await.map_err(|e| ApiError::Decode(e.to_string()))
    }

    /// Open a streaming function response. Not retried: a stream that fails
    /// after the first byte cannot be replayed without duplicating deltas.
    pub async fn open_stream<B>(&self, name: &str, body: &B) -> Result<reqwest::Response, ApiError>
    where
        B: Serialize + ?Sized,
    {
        self.gate(name)?;
        let response = self
            .authorize(self.streaming_http.post(self.function_url(name)))
            .header("Accept", "text/event-stream")
            .json(body)
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(api_error(response).await);
        }
        Ok(response)
    }
}

impl std::fmt::Debug for FunctionsClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FunctionsClient")
            .field("base_url", &self.base_url)
            .field("has_anon_key", &self.anon_key.is_some())
            .field("retry", &self.retry)
            .finish_non_exhaustive()
    }
}
