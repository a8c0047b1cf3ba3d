//! `zpanel-http` is a resilient async HTTP client for the REST APIs behind
//! Zpanel: Cloudflare (DNS, Tunnels) and the Kong Admin API.
//!
//! Every call goes through the same pipeline:
//! - a single attempt is issued by the executor,
//! - the response is classified ([`AttemptOutcome`]),
//! - the retry loop waits and repeats on 429, 5xx and transport failures.
//!
//! Vendor wrappers:
//! - [`CloudflareClient`]
//! - [`KongClient`]

mod classify;
mod client;
mod endpoint;
mod error;
mod executor;
mod options;
mod retry;

pub mod cloudflare;
pub mod kong;

pub use classify::{classify, AttemptOutcome, Envelope};
pub use client::ApiClient;
pub use cloudflare::{CloudflareClient, CloudflareConfig};
pub use endpoint::{join_url, Endpoint, Method};
pub use error::{ApiError, ErrorKind};
pub use executor::{RawResponse, TransportFailure};
pub use kong::{
    HealthStatus, KongClient, KongConfig, KongMetrics, MetricsReport, PrometheusMetrics,
    ServiceMetrics, TimeRange,
};
pub use options::ClientOptions;
pub use retry::{Sleeper, TokioSleeper};
pub use tokio_util::sync::CancellationToken;

pub type Result<T> = std::result::Result<T, ApiError>;
