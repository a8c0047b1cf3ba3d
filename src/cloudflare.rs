//! Cloudflare v4 API: DNS records and Cloudflare Tunnels.
//!
//! Payloads come back unwrapped from the `{"success": .., "result": ..}`
//! envelope; error messages are taken from `errors[0].message`.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde_json::{json, Value};

use crate::{
    options::non_empty, ApiClient, ApiError, ClientOptions, Endpoint, Envelope, Result,
};

/// Default Cloudflare API base URL.
pub const CLOUDFLARE_API_ENDPOINT: &str = "https://api.cloudflare.com/client/v4";

/// Connection settings for [`CloudflareClient`].
#[derive(Clone, PartialEq, Eq)]
pub struct CloudflareConfig {
    pub api_token: String,
    /// Default account for tunnel calls.
    pub account_id: Option<String>,
    pub api_endpoint: String,
    pub options: ClientOptions,
}

impl std::fmt::Debug for CloudflareConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CloudflareConfig")
            .field("api_token", &"<redacted>")
            .field("account_id", &self.account_id)
            .field("api_endpoint", &self.api_endpoint)
            .field("options", &self.options)
            .finish()
    }
}

impl CloudflareConfig {
    pub fn new(api_token: impl Into<String>) -> Self {
        Self {
            api_token: api_token.into(),
            account_id: None,
            api_endpoint: CLOUDFLARE_API_ENDPOINT.to_owned(),
            options: ClientOptions::default(),
        }
    }

    /// Reads:
    /// - `CLOUDFLARE_API_TOKEN` (required)
    /// - `CLOUDFLARE_ACCOUNT_ID`
    /// - `CLOUDFLARE_API_ENDPOINT`
    /// - `CLOUDFLARE_TIMEOUT`, `CLOUDFLARE_RETRY_ATTEMPTS`, `CLOUDFLARE_RETRY_DELAY`,
    ///   `CLOUDFLARE_CALL_TIMEOUT`
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let api_token = non_empty(&lookup, "CLOUDFLARE_API_TOKEN").ok_or_else(|| {
            ApiError::Config("missing CLOUDFLARE_API_TOKEN environment variable".to_owned())
        })?;

        Ok(Self {
            api_token,
            account_id: non_empty(&lookup, "CLOUDFLARE_ACCOUNT_ID"),
            api_endpoint: non_empty(&lookup, "CLOUDFLARE_API_ENDPOINT")
                .unwrap_or_else(|| CLOUDFLARE_API_ENDPOINT.to_owned()),
            options: ClientOptions::from_lookup("CLOUDFLARE", &lookup)?,
        })
    }
}

/// Cloudflare DNS and Tunnel operations.
#[derive(Clone, Debug)]
pub struct CloudflareClient {
    api: ApiClient,
    account_id: Option<String>,
}

impl CloudflareClient {
    pub fn new(config: CloudflareConfig) -> Self {
        let api = ApiClient::new(config.api_endpoint, Envelope::Result)
            .with_bearer(&config.api_token)
            .with_options(config.options);
        Self {
            api,
            account_id: config.account_id,
        }
    }

    /// Creates a client from `CLOUDFLARE_*` environment variables.
    ///
    /// See [`CloudflareConfig::from_env`].
    pub fn from_env() -> Result<Self> {
        CloudflareConfig::from_env().map(Self::new)
    }

    /// Wraps an already configured [`ApiClient`].
    pub fn from_api(api: ApiClient, account_id: Option<String>) -> Self {
        Self { api, account_id }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    /// Account configured through `CLOUDFLARE_ACCOUNT_ID`, if any.
    pub fn account_id(&self) -> Option<&str> {
        self.account_id.as_deref()
    }

    // ── DNS ──────────────────────────────────────────────────────────────────

    pub async fn list_dns_records<I, K, V>(&self, zone_id: &str, filters: I) -> Result<Value>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.api
            .get(&format!("zones/{zone_id}/dns_records"), filters)
            .await
    }

    pub async fn get_dns_record(&self, zone_id: &str, record_id: &str) -> Result<Value> {
        self.api
            .call(&Endpoint::get(format!("zones/{zone_id}/dns_records/{record_id}")))
            .await
    }

    pub async fn create_dns_record(&self, zone_id: &str, record: Value) -> Result<Value> {
        self.api
            .post(&format!("zones/{zone_id}/dns_records"), record)
            .await
    }

    pub async fn update_dns_record(
        &self,
        zone_id: &str,
        record_id: &str,
        record: Value,
    ) -> Result<Value> {
        self.api
            .put(&format!("zones/{zone_id}/dns_records/{record_id}"), record)
            .await
    }

    /// Returns `false` instead of an error when the record could not be deleted.
    pub async fn delete_dns_record(&self, zone_id: &str, record_id: &str) -> bool {
        self.delete_quietly(&format!("zones/{zone_id}/dns_records/{record_id}"))
            .await
    }

    // ── Tunnels ──────────────────────────────────────────────────────────────

    pub async fn list_tunnels(&self, account_id: &str) -> Result<Value> {
        self.api
            .call(&Endpoint::get(format!("accounts/{account_id}/cfd_tunnel")))
            .await
    }

    pub async fn get_tunnel(&self, account_id: &str, tunnel_id: &str) -> Result<Value> {
        self.api
            .call(&Endpoint::get(format!(
                "accounts/{account_id}/cfd_tunnel/{tunnel_id}"
            )))
            .await
    }

    /// Creates a remotely managed tunnel. `secret` is sent base64-encoded.
    pub async fn create_tunnel(
        &self,
        account_id: &str,
        name: &str,
        secret: impl AsRef<[u8]>,
    ) -> Result<Value> {
        let body = json!({
            "name": name,
            "tunnel_secret": STANDARD.encode(secret),
            "config_src": "cloudflare",
        });
        self.api
            .post(&format!("accounts/{account_id}/cfd_tunnel"), body)
            .await
    }

    /// Returns `false` instead of an error when the tunnel could not be deleted.
    pub async fn delete_tunnel(&self, account_id: &str, tunnel_id: &str) -> bool {
        self.delete_quietly(&format!("accounts/{account_id}/cfd_tunnel/{tunnel_id}"))
            .await
    }

    /// Connector token for a tunnel; empty when the API returns none.
    pub async fn tunnel_token(&self, account_id: &str, tunnel_id: &str) -> Result<String> {
        let result = self
            .api
            .call(&Endpoint::get(format!(
                "accounts/{account_id}/cfd_tunnel/{tunnel_id}/token"
            )))
            .await?;

        Ok(match result {
            Value::String(token) => token,
            other => other
                .get("token")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_owned(),
        })
    }

    async fn delete_quietly(&self, path: &str) -> bool {
        match self.api.delete(path).await {
            Ok(_) => true,
            Err(err) => {
                tracing::debug!(endpoint = path, error = %err, "cloudflare delete failed");
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::{CloudflareConfig, CLOUDFLARE_API_ENDPOINT};
    use crate::ApiError;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn config_requires_api_token() {
        let err = CloudflareConfig::from_lookup(lookup(&[])).expect_err("must fail");
        assert!(matches!(err, ApiError::Config(_)));
    }

    #[test]
    fn config_defaults_endpoint_and_reads_retry_settings() {
        let config = CloudflareConfig::from_lookup(lookup(&[
            ("CLOUDFLARE_API_TOKEN", "tok"),
            ("CLOUDFLARE_ACCOUNT_ID", "acc"),
            ("CLOUDFLARE_RETRY_ATTEMPTS", "5"),
        ]))
        .expect("config must load");

        assert_eq!(config.api_endpoint, CLOUDFLARE_API_ENDPOINT);
        assert_eq!(config.account_id.as_deref(), Some("acc"));
        assert_eq!(config.options.max_attempts, 5);
    }

    #[test]
    fn config_debug_redacts_token() {
        let debug = format!("{:?}", CloudflareConfig::new("very-secret"));
        assert!(!debug.contains("very-secret"));
    }
}
