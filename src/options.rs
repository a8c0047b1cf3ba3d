use std::str::FromStr;
use std::time::Duration;

use crate::{ApiError, Result};

/// Configures HTTP timeout and retry behavior.
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct ClientOptions {
    /// Per-attempt timeout in milliseconds.
    pub timeout_ms: u64,
    /// Total number of attempts, the first one included. `0` behaves as `1`.
    pub max_attempts: usize,
    /// Base retry delay in milliseconds (exponential strategy).
    pub retry_delay_ms: u64,
    /// Optional wall-clock budget for a whole call, waits included.
    pub call_timeout_ms: Option<u64>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            timeout_ms: 30_000,
            max_attempts: 3,
            retry_delay_ms: 1_000,
            call_timeout_ms: None,
        }
    }
}

impl ClientOptions {
    /// Reads options from `<PREFIX>_*` environment variables.
    ///
    /// - `<PREFIX>_TIMEOUT` — per-attempt timeout in seconds
    /// - `<PREFIX>_RETRY_ATTEMPTS` — total attempts
    /// - `<PREFIX>_RETRY_DELAY` — base retry delay in milliseconds
    /// - `<PREFIX>_CALL_TIMEOUT` — whole-call budget in milliseconds
    ///
    /// Unset variables keep their defaults.
    pub fn from_env(prefix: &str) -> Result<Self> {
        Self::from_lookup(prefix, |key| std::env::var(key).ok())
    }

    /// Same as [`ClientOptions::from_env`] with a caller-supplied lookup.
    pub fn from_lookup<F>(prefix: &str, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut options = Self::default();
        if let Some(secs) = parse_var::<u64, _>(&lookup, prefix, "TIMEOUT")? {
            options.timeout_ms = secs.saturating_mul(1_000);
        }
        if let Some(attempts) = parse_var(&lookup, prefix, "RETRY_ATTEMPTS")? {
            options.max_attempts = attempts;
        }
        if let Some(delay) = parse_var(&lookup, prefix, "RETRY_DELAY")? {
            options.retry_delay_ms = delay;
        }
        options.call_timeout_ms = parse_var(&lookup, prefix, "CALL_TIMEOUT")?;
        Ok(options)
    }

    pub(crate) fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub(crate) fn attempt_budget(&self) -> usize {
        self.max_attempts.max(1)
    }

    pub(crate) fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

fn parse_var<T, F>(lookup: &F, prefix: &str, name: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
    F: Fn(&str) -> Option<String>,
{
    let key = format!("{prefix}_{name}");
    let Some(raw) = lookup(&key) else {
        return Ok(None);
    };
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|err| ApiError::Config(format!("invalid {key} value '{trimmed}': {err}")))
}

/// Reads a non-empty variable, treating blank values as unset.
pub(crate) fn non_empty<F>(lookup: &F, key: &str) -> Option<String>
where
    F: Fn(&str) -> Option<String>,
{
    lookup(key)
        .map(|value| value.trim().to_owned())
        .filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::ClientOptions;
    use crate::ApiError;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_owned(), (*v).to_owned()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_match_reference_behavior() {
        let options = ClientOptions::default();
        assert_eq!(options.timeout_ms, 30_000);
        assert_eq!(options.max_attempts, 3);
        assert_eq!(options.retry_delay_ms, 1_000);
        assert_eq!(options.call_timeout_ms, None);
    }

    #[test]
    fn lookup_overrides_defaults() {
        let options = ClientOptions::from_lookup(
            "CLOUDFLARE",
            lookup(&[
                ("CLOUDFLARE_TIMEOUT", "5"),
                ("CLOUDFLARE_RETRY_ATTEMPTS", "4"),
                ("CLOUDFLARE_RETRY_DELAY", "250"),
                ("CLOUDFLARE_CALL_TIMEOUT", "9000"),
            ]),
        )
        .expect("options must parse");

        assert_eq!(options.timeout_ms, 5_000);
        assert_eq!(options.max_attempts, 4);
        assert_eq!(options.retry_delay_ms, 250);
        assert_eq!(options.call_timeout_ms, Some(9_000));
    }

    #[test]
    fn blank_values_keep_defaults() {
        let options = ClientOptions::from_lookup("KONG", lookup(&[("KONG_TIMEOUT", "  ")]))
            .expect("options must parse");
        assert_eq!(options, ClientOptions::default());
    }

    #[test]
    fn invalid_value_is_config_error() {
        let err = ClientOptions::from_lookup("KONG", lookup(&[("KONG_RETRY_ATTEMPTS", "many")]))
            .expect_err("must fail");
        match err {
            ApiError::Config(message) => assert!(message.contains("KONG_RETRY_ATTEMPTS")),
            other => panic!("expected config error, got {other:?}"),
        }
    }

    #[test]
    fn zero_attempts_still_tries_once() {
        let options = ClientOptions {
            max_attempts: 0,
            ..ClientOptions::default()
        };
        assert_eq!(options.attempt_budget(), 1);
    }
}
