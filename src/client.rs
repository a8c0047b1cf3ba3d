use std::fmt;
use std::sync::Arc;

use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::{
    classify::{classify, Envelope},
    executor::send_once,
    retry::{self, CallScope, RetryPolicy, Sleeper, TokioSleeper},
    ClientOptions, Endpoint, Result,
};

#[derive(Clone)]
/// Resilient JSON client for one REST API base URL.
///
/// Every call runs through a bounded retry loop: 429 responses wait for
/// `Retry-After`, 5xx and transport failures back off exponentially, other
/// 4xx responses fail immediately.
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    authorization: Option<String>,
    envelope: Envelope,
    options: ClientOptions,
    sleeper: Arc<dyn Sleeper>,
}

impl fmt::Debug for ApiClient {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiClient")
            .field("base_url", &self.base_url)
            .field(
                "authorization",
                &self.authorization.as_ref().map(|_| "<redacted>"),
            )
            .field("envelope", &self.envelope)
            .field("options", &self.options)
            .finish()
    }
}

impl ApiClient {
    /// Creates an unauthenticated client with default options.
    pub fn new(base_url: impl Into<String>, envelope: Envelope) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: base_url.into(),
            authorization: None,
            envelope,
            options: ClientOptions::default(),
            sleeper: Arc::new(TokioSleeper),
        }
    }

    /// Sends `Authorization: Bearer <token>` on every attempt.
    ///
    /// If the token is missing the `Bearer ` prefix, it is added automatically.
    pub fn with_bearer(mut self, token: impl AsRef<str>) -> Self {
        self.authorization = Some(normalize_bearer_authorization(token.as_ref()));
        self
    }

    /// Applies client options such as timeout and retry behavior.
    pub fn with_options(mut self, opts: ClientOptions) -> Self {
        self.options = opts;
        self
    }

    /// Switches the payload/error convention, e.g. for plain-text endpoints.
    pub fn with_envelope(mut self, envelope: Envelope) -> Self {
        self.envelope = envelope;
        self
    }

    /// Replaces the timer used between retry attempts.
    pub fn with_sleeper(mut self, sleeper: impl Sleeper + 'static) -> Self {
        self.sleeper = Arc::new(sleeper);
        self
    }

    /// Reuses an existing `reqwest` client and its connection pool.
    pub fn with_http_client(mut self, http: reqwest::Client) -> Self {
        self.http = http;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn options(&self) -> &ClientOptions {
        &self.options
    }

    pub async fn get<I, K, V>(&self, path: &str, query: I) -> Result<Value>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.call(&Endpoint::get(path).query_pairs(query)).await
    }

    pub async fn post(&self, path: &str, body: Value) -> Result<Value> {
        self.call(&Endpoint::post(path, body)).await
    }

    pub async fn put(&self, path: &str, body: Value) -> Result<Value> {
        self.call(&Endpoint::put(path, body)).await
    }

    pub async fn patch(&self, path: &str, body: Value) -> Result<Value> {
        self.call(&Endpoint::patch(path, body)).await
    }

    pub async fn delete(&self, path: &str) -> Result<Value> {
        self.call(&Endpoint::delete(path)).await
    }

    /// Runs one logical call with retries.
    pub async fn call(&self, endpoint: &Endpoint) -> Result<Value> {
        self.call_with_cancel(endpoint, &CancellationToken::new()).await
    }

    /// Runs one logical call that stops as soon as `cancel` fires.
    ///
    /// Cancellation drops the in-flight request and skips any pending wait,
    /// returning [`crate::ApiError::Cancelled`].
    pub async fn call_with_cancel(
        &self,
        endpoint: &Endpoint,
        cancel: &CancellationToken,
    ) -> Result<Value> {
        let scope = CallScope {
            method: endpoint.method,
            path: &endpoint.path,
            policy: RetryPolicy::from_options(&self.options),
            sleeper: self.sleeper.as_ref(),
            cancel,
            budget: self
                .options
                .call_timeout_ms
                .map(std::time::Duration::from_millis),
        };

        retry::run(scope, move || async move {
            let attempt = send_once(
                &self.http,
                &self.base_url,
                self.authorization.as_deref(),
                endpoint,
                self.options.attempt_timeout(),
            )
            .await;
            classify(attempt, self.envelope, self.options.retry_delay())
        })
        .await
    }
}

fn normalize_bearer_authorization(token: &str) -> String {
    let trimmed = token.trim();
    let prefix = trimmed.get(..7);
    if prefix.is_some_and(|value| value.eq_ignore_ascii_case("bearer ")) {
        trimmed.to_owned()
    } else {
        format!("Bearer {trimmed}")
    }
}
