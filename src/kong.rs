//! Kong Admin API: services, routes, plugins, health and metrics.
//!
//! Kong responses carry no envelope. Error messages are the raw response body.
//! Dashboard metrics come from a separate Prometheus server's query API.

use std::time::Duration;

use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    options::non_empty, ApiClient, ApiError, ClientOptions, Endpoint, Envelope, ErrorKind, Result,
};

/// Default Kong Admin API address.
pub const KONG_ADMIN_URL: &str = "http://kong:8001";
/// Default Kong proxy address.
pub const KONG_PROXY_URL: &str = "http://kong:8000";
/// Default Prometheus server scraping Kong.
pub const PROMETHEUS_URL: &str = "http://prometheus:9090";

const DEFAULT_RATE_LIMIT: u64 = 1000;
const DEFAULT_RATE_LIMIT_WINDOW_SECS: u64 = 3600;

const HEALTH_TIMEOUT: Duration = Duration::from_secs(5);
const METRICS_TIMEOUT: Duration = Duration::from_secs(10);

/// Connection settings for [`KongClient`].
#[derive(Clone, PartialEq, Eq)]
pub struct KongConfig {
    pub admin_url: String,
    pub proxy_url: String,
    /// Sent as a bearer token when the admin API sits behind auth.
    pub admin_token: Option<String>,
    pub prometheus_url: String,
    /// Requests allowed per [`rate_limit_window`](Self::rate_limit_window).
    pub default_rate_limit: u64,
    /// Window in seconds.
    pub rate_limit_window: u64,
    pub options: ClientOptions,
}

impl std::fmt::Debug for KongConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KongConfig")
            .field("admin_url", &self.admin_url)
            .field("proxy_url", &self.proxy_url)
            .field("admin_token", &self.admin_token.as_ref().map(|_| "<redacted>"))
            .field("prometheus_url", &self.prometheus_url)
            .field("default_rate_limit", &self.default_rate_limit)
            .field("rate_limit_window", &self.rate_limit_window)
            .field("options", &self.options)
            .finish()
    }
}

impl Default for KongConfig {
    fn default() -> Self {
        Self {
            admin_url: KONG_ADMIN_URL.to_owned(),
            proxy_url: KONG_PROXY_URL.to_owned(),
            admin_token: None,
            prometheus_url: PROMETHEUS_URL.to_owned(),
            default_rate_limit: DEFAULT_RATE_LIMIT,
            rate_limit_window: DEFAULT_RATE_LIMIT_WINDOW_SECS,
            options: ClientOptions::default(),
        }
    }
}

impl KongConfig {
    /// Reads:
    /// - `KONG_ADMIN_URL` (default `http://kong:8001`)
    /// - `KONG_PROXY_URL` (default `http://kong:8000`)
    /// - `KONG_ADMIN_TOKEN`
    /// - `PROMETHEUS_URL` (default `http://prometheus:9090`)
    /// - `KONG_DEFAULT_RATE_LIMIT` (default 1000), `KONG_RATE_LIMIT_WINDOW` (seconds, default 3600)
    /// - `KONG_TIMEOUT`, `KONG_RETRY_ATTEMPTS`, `KONG_RETRY_DELAY`, `KONG_CALL_TIMEOUT`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let url = |key: &str, default: &str| {
            non_empty(&lookup, key).unwrap_or_else(|| default.to_owned())
        };

        Ok(Self {
            admin_url: url("KONG_ADMIN_URL", KONG_ADMIN_URL),
            proxy_url: url("KONG_PROXY_URL", KONG_PROXY_URL),
            admin_token: non_empty(&lookup, "KONG_ADMIN_TOKEN"),
            prometheus_url: url("PROMETHEUS_URL", PROMETHEUS_URL),
            default_rate_limit: parse_count(&lookup, "KONG_DEFAULT_RATE_LIMIT")?
                .unwrap_or(DEFAULT_RATE_LIMIT),
            rate_limit_window: parse_count(&lookup, "KONG_RATE_LIMIT_WINDOW")?
                .unwrap_or(DEFAULT_RATE_LIMIT_WINDOW_SECS),
            options: ClientOptions::from_lookup("KONG", &lookup)?,
        })
    }
}

fn parse_count<F>(lookup: &F, key: &str) -> Result<Option<u64>>
where
    F: Fn(&str) -> Option<String>,
{
    non_empty(lookup, key)
        .map(|raw| {
            raw.trim()
                .parse::<u64>()
                .map_err(|err| ApiError::Config(format!("{key}={raw:?}: {err}")))
        })
        .transpose()
}

/// Maps a window length onto the largest Kong `rate-limiting` period that fits in it.
fn rate_limit_period(window_secs: u64) -> &'static str {
    const PERIODS: [(u64, &str); 6] = [
        (31_536_000, "year"),
        (2_592_000, "month"),
        (86_400, "day"),
        (3_600, "hour"),
        (60, "minute"),
        (1, "second"),
    ];
    PERIODS
        .iter()
        .find(|(secs, _)| window_secs >= *secs)
        .map_or("second", |(_, period)| *period)
}

/// Result of [`KongClient::health_check`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum HealthStatus {
    /// `/status` answered with 2xx.
    Healthy { data: Value },
    /// Kong answered, but with an error status.
    Unhealthy { error: String },
    /// No response at all.
    Unreachable { error: String },
}

impl HealthStatus {
    pub fn is_healthy(&self) -> bool {
        matches!(self, HealthStatus::Healthy { .. })
    }
}

/// Summary folded out of Kong's Prometheus exposition.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct KongMetrics {
    /// Sum of every `kong_http_requests_total` sample.
    pub requests_total: Option<f64>,
    /// Last `kong_http_request_latency*` sample seen.
    pub request_latency: Option<f64>,
}

/// Traffic summary computed by Prometheus over the last five minutes.
///
/// Every query that fails or returns no sample reads as `0`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct PrometheusMetrics {
    /// Requests per second.
    pub requests_total: f64,
    pub request_latency_p50: f64,
    pub request_latency_p95: f64,
    pub request_latency_p99: f64,
    pub status_2xx: f64,
    pub status_4xx: f64,
    pub status_5xx: f64,
    /// Percentage of 4xx and 5xx responses, `0` without traffic.
    pub error_rate: f64,
}

impl PrometheusMetrics {
    fn derive_error_rate(&mut self) {
        self.error_rate = if self.requests_total > 0.0 {
            (self.status_4xx + self.status_5xx) / self.requests_total * 100.0
        } else {
            0.0
        };
    }
}

/// Look-back window for [`KongClient::service_metrics`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize)]
pub enum TimeRange {
    #[serde(rename = "1h")]
    Hour,
    #[default]
    #[serde(rename = "24h")]
    Day,
    #[serde(rename = "7d")]
    Week,
}

impl TimeRange {
    /// Accepts `1h`, `24h` and `7d`; anything else is treated as `24h`.
    pub fn parse(raw: &str) -> Self {
        match raw.trim() {
            "1h" => TimeRange::Hour,
            "7d" => TimeRange::Week,
            _ => TimeRange::Day,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TimeRange::Hour => "1h",
            TimeRange::Day => "24h",
            TimeRange::Week => "7d",
        }
    }
}

/// Per-service summary plus the request count over a chosen window.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServiceMetrics {
    #[serde(flatten)]
    pub metrics: PrometheusMetrics,
    pub time_range: TimeRange,
    /// Requests in `time_range`; `None` when Prometheus could not answer.
    pub requests_in_range: Option<u64>,
}

/// Result of [`KongClient::kong_metrics`].
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(untagged)]
pub enum MetricsReport {
    /// Parsed from Kong's own `/metrics` endpoint. Empty when Kong answered with an error.
    Exposition(KongMetrics),
    /// Kong was unreachable, so Prometheus was asked instead.
    Prometheus(PrometheusMetrics),
}

/// Kong Admin API operations.
#[derive(Clone, Debug)]
pub struct KongClient {
    api: ApiClient,
    prometheus: ApiClient,
    proxy_url: String,
    default_rate_limit: u64,
    rate_limit_window: u64,
}

impl KongClient {
    pub fn new(config: KongConfig) -> Self {
        let prometheus = prometheus_client(&config.prometheus_url, &config.options);
        let mut api = ApiClient::new(config.admin_url, Envelope::Raw).with_options(config.options);
        if let Some(token) = &config.admin_token {
            api = api.with_bearer(token);
        }
        Self {
            api,
            prometheus,
            proxy_url: config.proxy_url,
            default_rate_limit: config.default_rate_limit,
            rate_limit_window: config.rate_limit_window,
        }
    }

    /// Creates a client from `KONG_*` environment variables.
    pub fn from_env() -> Result<Self> {
        KongConfig::from_env().map(Self::new)
    }

    /// Wraps an admin API client; every other setting keeps its default.
    pub fn from_api(api: ApiClient) -> Self {
        let defaults = KongConfig::default();
        Self {
            prometheus: prometheus_client(&defaults.prometheus_url, api.options()),
            api,
            proxy_url: defaults.proxy_url,
            default_rate_limit: defaults.default_rate_limit,
            rate_limit_window: defaults.rate_limit_window,
        }
    }

    /// Replaces the client used for Prometheus queries.
    pub fn with_prometheus(mut self, prometheus: ApiClient) -> Self {
        self.prometheus = prometheus;
        self
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn prometheus(&self) -> &ApiClient {
        &self.prometheus
    }

    pub fn proxy_url(&self) -> &str {
        &self.proxy_url
    }

    pub async fn create_service(&self, name: &str, url: &str) -> Result<Value> {
        self.api
            .post("services", json!({ "name": name, "url": url }))
            .await
            .map_err(|err| {
                tracing::error!(service = name, url, error = %err, "kong service creation failed");
                err
            })
    }

    pub async fn get_service(&self, service_id: &str) -> Result<Value> {
        self.api
            .call(&Endpoint::get(format!("services/{service_id}")))
            .await
    }

    pub async fn update_service(&self, service_id: &str, changes: Value) -> Result<Value> {
        self.api
            .patch(&format!("services/{service_id}"), changes)
            .await
            .map_err(|err| {
                tracing::error!(service_id, error = %err, "kong service update failed");
                err
            })
    }

    /// Returns `false` instead of an error when the service could not be deleted.
    pub async fn delete_service(&self, service_id: &str) -> bool {
        match self.api.delete(&format!("services/{service_id}")).await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(service_id, error = %err, "kong service deletion failed");
                false
            }
        }
    }

    /// Lists services; a failed call degrades to an empty `{"data": []}` page.
    pub async fn list_services(&self) -> Value {
        match self.api.call(&Endpoint::get("services")).await {
            Ok(page) => page,
            Err(err) => {
                tracing::error!(error = %err, "kong services listing failed");
                json!({ "data": [] })
            }
        }
    }

    /// Adds a route with `strip_path = true`.
    pub async fn create_route<I, S>(&self, service_id: &str, paths: I) -> Result<Value>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let paths: Vec<String> = paths.into_iter().map(Into::into).collect();
        self.api
            .post(
                &format!("services/{service_id}/routes"),
                json!({ "paths": paths, "strip_path": true }),
            )
            .await
            .map_err(|err| {
                tracing::error!(service_id, error = %err, "kong route creation failed");
                err
            })
    }

    pub async fn add_plugin(&self, service_id: &str, plugin: &str, config: Value) -> Result<Value> {
        self.api
            .post(
                &format!("services/{service_id}/plugins"),
                json!({ "name": plugin, "config": config }),
            )
            .await
            .map_err(|err| {
                tracing::error!(service_id, plugin, error = %err, "kong plugin addition failed");
                err
            })
    }

    /// Enables the `rate-limiting` plugin with a local per-minute policy.
    pub async fn manage_rate_limiting(&self, service_id: &str, per_minute: u64) -> Result<Value> {
        self.add_plugin(
            service_id,
            "rate-limiting",
            json!({ "minute": per_minute, "policy": "local" }),
        )
        .await
    }

    /// Enables the `rate-limiting` plugin with the configured default limit.
    ///
    /// The window is mapped onto Kong's fixed periods, so 3600 s becomes `hour`.
    pub async fn apply_default_rate_limiting(&self, service_id: &str) -> Result<Value> {
        let period = rate_limit_period(self.rate_limit_window);
        self.add_plugin(
            service_id,
            "rate-limiting",
            json!({ period: self.default_rate_limit, "policy": "local" }),
        )
        .await
    }

    /// Probes `/status` once with a 5 s timeout.
    pub async fn health_check(&self) -> HealthStatus {
        let probe = self.single_attempt();
        match probe
            .call(&Endpoint::get("status").timeout(HEALTH_TIMEOUT))
            .await
        {
            Ok(data) => HealthStatus::Healthy { data },
            Err(err) if err.kind() == Some(ErrorKind::Transport) || err.kind().is_none() => {
                HealthStatus::Unreachable {
                    error: err.message(),
                }
            }
            Err(err) => HealthStatus::Unhealthy {
                error: err.message(),
            },
        }
    }

    /// Reads Kong's Prometheus plugin output, globally or for one service.
    ///
    /// An error status yields an empty summary. When Kong cannot be reached at
    /// all, the same figures are taken from Prometheus.
    pub async fn kong_metrics(&self, service_id: Option<&str>) -> MetricsReport {
        let path = match service_id {
            Some(id) => format!("services/{id}/metrics"),
            None => "metrics".to_owned(),
        };
        let endpoint = Endpoint::get(path).timeout(METRICS_TIMEOUT);
        let outcome = self
            .single_attempt()
            .with_envelope(Envelope::Text)
            .call(&endpoint)
            .await;

        match outcome {
            Ok(body) => MetricsReport::Exposition(parse_prometheus_metrics(
                body.as_str().unwrap_or_default(),
            )),
            Err(err) if err.kind() == Some(ErrorKind::Transport) => {
                tracing::warn!(error = %err, "kong metrics unreachable, querying prometheus");
                MetricsReport::Prometheus(self.prometheus_metrics(service_id).await)
            }
            Err(err) => {
                tracing::warn!(error = %err, "kong metrics request failed");
                MetricsReport::Exposition(KongMetrics::default())
            }
        }
    }

    /// Asks Prometheus for request rate, latency percentiles and status
    /// classes, globally or for one service.
    pub async fn prometheus_metrics(&self, service_id: Option<&str>) -> PrometheusMetrics {
        let service = service_id.map(|id| format!("service=\"{id}\""));
        let selector = |extra: Option<&str>| {
            let labels: Vec<&str> = service.iter().map(String::as_str).chain(extra).collect();
            if labels.is_empty() {
                String::new()
            } else {
                format!("{{{}}}", labels.join(","))
            }
        };
        let requests = selector(None);
        let latency = |quantile: &str| {
            format!(
                "histogram_quantile({quantile}, \
                 sum(rate(kong_http_request_latency_ms_bucket{requests}[5m])) by (le))"
            )
        };
        let status = |class: char| {
            let code = format!("code=~\"{class}..\"");
            let labels = selector(Some(code.as_str()));
            format!("sum(rate(kong_http_requests_total{labels}[5m]))")
        };

        let mut metrics = PrometheusMetrics {
            requests_total: self
                .query_prometheus(&format!("sum(rate(kong_http_requests_total{requests}[5m]))"))
                .await,
            request_latency_p50: self.query_prometheus(&latency("0.50")).await,
            request_latency_p95: self.query_prometheus(&latency("0.95")).await,
            request_latency_p99: self.query_prometheus(&latency("0.99")).await,
            status_2xx: self.query_prometheus(&status('2')).await,
            status_4xx: self.query_prometheus(&status('4')).await,
            status_5xx: self.query_prometheus(&status('5')).await,
            error_rate: 0.0,
        };
        metrics.derive_error_rate();
        metrics
    }

    /// [`prometheus_metrics`](Self::prometheus_metrics) for one service, plus
    /// its request count over `range`.
    pub async fn service_metrics(&self, service_id: &str, range: TimeRange) -> ServiceMetrics {
        let metrics = self.prometheus_metrics(Some(service_id)).await;
        let query = format!(
            "sum(increase(kong_http_requests_total{{service=\"{service_id}\"}}[{}]))",
            range.as_str()
        );
        let requests_in_range = self
            .prometheus_sample(&query)
            .await
            .ok()
            .map(|count| count.max(0.0) as u64);

        ServiceMetrics {
            metrics,
            time_range: range,
            requests_in_range,
        }
    }

    /// Runs one instant query; any failure reads as `0`.
    async fn query_prometheus(&self, query: &str) -> f64 {
        match self.prometheus_sample(query).await {
            Ok(value) => value,
            Err(err) => {
                tracing::warn!(query, error = %err, "prometheus query failed");
                0.0
            }
        }
    }

    async fn prometheus_sample(&self, query: &str) -> Result<f64> {
        let endpoint = Endpoint::get("api/v1/query")
            .query("query", query)
            .timeout(METRICS_TIMEOUT);
        let body = self.prometheus.call(&endpoint).await?;
        Ok(first_sample(&body).unwrap_or(0.0))
    }

    fn single_attempt(&self) -> ApiClient {
        let options = ClientOptions {
            max_attempts: 1,
            ..self.api.options().clone()
        };
        self.api.clone().with_options(options)
    }
}

/// Folds `metric_name{labels} value` lines into a [`KongMetrics`] summary.
///
/// Comment (`#`) and blank lines are skipped.
pub fn parse_prometheus_metrics(text: &str) -> KongMetrics {
    let mut metrics = KongMetrics::default();

    for line in text.lines().map(str::trim) {
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let Some((name, value)) = split_sample(line) else {
            continue;
        };

        if name.contains("kong_http_requests_total") {
            *metrics.requests_total.get_or_insert(0.0) += value;
        } else if name.contains("kong_http_request_latency") {
            metrics.request_latency = Some(value);
        }
    }

    metrics
}

/// First instant-vector sample of a `/api/v1/query` response:
/// `data.result[0].value[1]`, which Prometheus encodes as a string.
fn first_sample(body: &Value) -> Option<f64> {
    let value = match body.pointer("/data/result/0/value/1")? {
        Value::String(raw) => raw.parse::<f64>().ok()?,
        Value::Number(number) => number.as_f64()?,
        _ => return None,
    };
    value.is_finite().then_some(value)
}

fn prometheus_client(base_url: &str, options: &ClientOptions) -> ApiClient {
    let options = ClientOptions {
        max_attempts: 1,
        ..options.clone()
    };
    ApiClient::new(base_url, Envelope::Raw).with_options(options)
}

fn split_sample(line: &str) -> Option<(&str, f64)> {
    let (name, rest) = match line.find('{') {
        Some(open) => {
            let close = open + line[open..].find('}')?;
            (&line[..open], &line[close + 1..])
        }
        None => line.split_once(char::is_whitespace)?,
    };
    let value = rest.split_whitespace().next()?.parse::<f64>().ok()?;
    Some((name.trim(), value))
}
