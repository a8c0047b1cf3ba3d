use std::fs;

use serde::Deserialize;
use zpanel_http::{CloudflareClient, CloudflareConfig, KongClient, KongConfig};

#[derive(Debug, Default, Deserialize)]
struct SecretsFile {
    #[serde(rename = "CLOUDFLARE_API_TOKEN")]
    cloudflare_api_token: Option<String>,
    #[serde(rename = "CLOUDFLARE_ACCOUNT_ID")]
    cloudflare_account_id: Option<String>,
    #[serde(rename = "CLOUDFLARE_ZONE_ID")]
    cloudflare_zone_id: Option<String>,
    #[serde(rename = "KONG_ADMIN_URL")]
    kong_admin_url: Option<String>,
}

/// Environment first, then `secrets.json` in the crate root.
fn load_secrets() -> SecretsFile {
    let from_file = fs::read_to_string("secrets.json")
        .ok()
        .and_then(|content| serde_json::from_str::<SecretsFile>(&content).ok())
        .unwrap_or_default();
    let env = |key: &str| std::env::var(key).ok().filter(|v| !v.trim().is_empty());

    SecretsFile {
        cloudflare_api_token: env("CLOUDFLARE_API_TOKEN").or(from_file.cloudflare_api_token),
        cloudflare_account_id: env("CLOUDFLARE_ACCOUNT_ID").or(from_file.cloudflare_account_id),
        cloudflare_zone_id: env("CLOUDFLARE_ZONE_ID").or(from_file.cloudflare_zone_id),
        kong_admin_url: env("KONG_ADMIN_URL").or(from_file.kong_admin_url),
    }
}

#[tokio::test]
async fn live_cloudflare_reads_tunnels_and_dns() {
    let secrets = load_secrets();
    let (Some(token), Some(account_id)) = (
        secrets.cloudflare_api_token,
        secrets.cloudflare_account_id.clone(),
    ) else {
        eprintln!("skipping live test: Cloudflare credentials not found in env or secrets.json");
        return;
    };

    let cf = CloudflareClient::new(CloudflareConfig {
        account_id: Some(account_id.clone()),
        ..CloudflareConfig::new(token)
    });

    let tunnels = cf
        .list_tunnels(&account_id)
        .await
        .expect("tunnel listing must succeed");
    assert!(tunnels.is_array());

    if let Some(zone_id) = secrets.cloudflare_zone_id {
        let records = cf
            .list_dns_records(&zone_id, [("per_page", "5")])
            .await
            .expect("dns listing must succeed");
        assert!(records.is_array());

        let err = cf
            .get_dns_record(&zone_id, "does-not-exist")
            .await
            .expect_err("unknown record must fail");
        assert_eq!(err.attempts(), 1);
    }
}

#[tokio::test]
async fn live_kong_health_and_listing() {
    let Some(admin_url) = load_secrets().kong_admin_url else {
        eprintln!("skipping live test: KONG_ADMIN_URL not found in env or secrets.json");
        return;
    };

    let kong = KongClient::new(KongConfig {
        admin_url,
        ..KongConfig::default()
    });

    let health = kong.health_check().await;
    assert!(health.is_healthy(), "kong must be healthy: {health:?}");

    let page = kong.list_services().await;
    assert!(page["data"].is_array());
}
