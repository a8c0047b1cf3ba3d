use std::fmt;
use std::time::Duration;

use serde_json::Value;

/// HTTP verbs understood by the executor.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }

    pub(crate) fn to_reqwest(self) -> reqwest::Method {
        match self {
            Method::Get => reqwest::Method::GET,
            Method::Post => reqwest::Method::POST,
            Method::Put => reqwest::Method::PUT,
            Method::Patch => reqwest::Method::PATCH,
            Method::Delete => reqwest::Method::DELETE,
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Destination and payload of one logical call.
///
/// The base URL comes from the client; an endpoint only carries the resource
/// path relative to it.
#[derive(Clone, Debug, PartialEq)]
pub struct Endpoint {
    /// HTTP verb.
    pub method: Method,
    /// Resource path relative to the client base URL.
    pub path: String,
    /// Query string pairs, sent in order.
    pub query: Vec<(String, String)>,
    /// JSON body. `Content-Type` is only set when present.
    pub body: Option<Value>,
    /// Per-attempt timeout overriding [`crate::ClientOptions::timeout_ms`].
    pub timeout: Option<Duration>,
}

impl Endpoint {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            query: Vec::new(),
            body: None,
            timeout: None,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path)
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Post, path).body(body)
    }

    pub fn put(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Put, path).body(body)
    }

    pub fn patch(path: impl Into<String>, body: Value) -> Self {
        Self::new(Method::Patch, path).body(body)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::Delete, path)
    }

    pub fn body(mut self, body: Value) -> Self {
        self.body = Some(body);
        self
    }

    pub fn query(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.query.push((key.into(), value.into()));
        self
    }

    pub fn query_pairs<I, K, V>(mut self, pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        self.query
            .extend(pairs.into_iter().map(|(k, v)| (k.into(), v.into())));
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Joins a base URL and a resource path with exactly one `/` between them.
///
/// Example: `("https://api.example.com/v4/", "/zones")` →
/// `"https://api.example.com/v4/zones"`
pub fn join_url(base_url: &str, path: &str) -> String {
    let base = base_url.trim_end_matches('/');
    let path = path.trim_start_matches('/');
    if path.is_empty() {
        base.to_owned()
    } else {
        format!("{base}/{path}")
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::{join_url, Endpoint, Method};

    #[test]
    fn join_url_collapses_slashes() {
        assert_eq!(join_url("http://kong:8001/", "/services"), "http://kong:8001/services");
        assert_eq!(join_url("http://kong:8001", "services"), "http://kong:8001/services");
        assert_eq!(join_url("http://kong:8001/", ""), "http://kong:8001");
    }

    #[test]
    fn verb_constructors_set_method_and_body() {
        let post = Endpoint::post("services", json!({"name": "a"}));
        assert_eq!(post.method, Method::Post);
        assert!(post.body.is_some());

        let delete = Endpoint::delete("services/a");
        assert_eq!(delete.method, Method::Delete);
        assert!(delete.body.is_none());
    }

    #[test]
    fn query_builders_preserve_order() {
        let endpoint = Endpoint::get("zones/z/dns_records")
            .query("type", "A")
            .query_pairs([("name", "www"), ("page", "2")]);
        let keys: Vec<&str> = endpoint.query.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, ["type", "name", "page"]);
    }

    #[test]
    fn method_display_is_uppercase() {
        assert_eq!(Method::Patch.to_string(), "PATCH");
    }
}
