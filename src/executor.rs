use std::time::Duration;

use reqwest::header::{self, HeaderMap};

use crate::endpoint::{join_url, Endpoint};

/// Status, headers and body text of one received response.
#[derive(Clone, Debug)]
pub struct RawResponse {
    pub status: u16,
    pub headers: HeaderMap,
    pub body: String,
}

impl RawResponse {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }

    pub fn with_header(mut self, name: header::HeaderName, value: &str) -> Self {
        if let Ok(value) = header::HeaderValue::from_str(value) {
            self.headers.insert(name, value);
        }
        self
    }
}

/// No response was obtained: connect, DNS, timeout or body read failure.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct TransportFailure {
    pub message: String,
    /// The attempt hit its timeout rather than failing to connect or read.
    pub timeout: bool,
}

impl From<reqwest::Error> for TransportFailure {
    fn from(err: reqwest::Error) -> Self {
        let timeout = err.is_timeout();
        let message = if timeout {
            format!("request timed out: {err}")
        } else {
            err.to_string()
        };
        Self { message, timeout }
    }
}

/// Performs exactly one attempt. Never retries and never logs.
pub(crate) async fn send_once(
    http: &reqwest::Client,
    base_url: &str,
    authorization: Option<&str>,
    endpoint: &Endpoint,
    timeout: Duration,
) -> Result<RawResponse, TransportFailure> {
    let url = join_url(base_url, &endpoint.path);
    let mut request = http
        .request(endpoint.method.to_reqwest(), url)
        .timeout(endpoint.timeout.unwrap_or(timeout));

    if let Some(authorization) = authorization {
        request = request.header(header::AUTHORIZATION, authorization);
    }
    if !endpoint.query.is_empty() {
        request = request.query(&endpoint.query);
    }
    if let Some(body) = &endpoint.body {
        // `.json()` also sets `Content-Type: application/json`.
        request = request.json(body);
    }

    let response = request.send().await?;
    let status = response.status().as_u16();
    let headers = response.headers().clone();
    let body = response.text().await?;

    Ok(RawResponse {
        status,
        headers,
        body,
    })
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use tokio::net::TcpListener;

    use super::send_once;
    use crate::Endpoint;

    /// Accepts connections and holds them open without ever answering.
    async fn silent_listener() -> String {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .expect("listener must bind");
        let addr = listener.local_addr().expect("listener must have an address");
        tokio::spawn(async move {
            let mut held = Vec::new();
            while let Ok((stream, _)) = listener.accept().await {
                held.push(stream);
            }
        });
        format!("http://{addr}")
    }

    #[tokio::test]
    async fn timed_out_attempt_is_flagged_as_timeout() {
        let base_url = silent_listener().await;
        let http = reqwest::Client::new();

        let failure = send_once(
            &http,
            &base_url,
            None,
            &Endpoint::get("status"),
            Duration::from_millis(50),
        )
        .await
        .expect_err("silent server must time out");

        assert!(failure.timeout);
        assert!(failure.message.contains("timed out"), "{}", failure.message);
    }

    #[tokio::test]
    async fn refused_connection_is_not_a_timeout() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").expect("listener must bind");
        let addr = listener.local_addr().expect("listener must have an address");
        drop(listener);
        let http = reqwest::Client::new();

        let failure = send_once(
            &http,
            &format!("http://{addr}"),
            None,
            &Endpoint::get("status"),
            Duration::from_secs(5),
        )
        .await
        .expect_err("closed port must fail");

        assert!(!failure.timeout);
    }
}
