use std::fmt;

/// Classified cause of a failed attempt.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash)]
pub enum ErrorKind {
    /// Network, DNS or timeout failure before any response arrived.
    Transport,
    /// HTTP 429.
    RateLimited,
    /// HTTP 5xx (and statuses outside the 2xx/4xx ranges).
    Server,
    /// HTTP 4xx other than 429, or a malformed success body.
    Client,
}

impl ErrorKind {
    /// Whether repeating the request can change the outcome.
    pub fn is_retryable(self) -> bool {
        !matches!(self, ErrorKind::Client)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            ErrorKind::Transport => "transport error",
            ErrorKind::RateLimited => "rate limited",
            ErrorKind::Server => "server error",
            ErrorKind::Client => "client error",
        }
    }
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Error type returned by this crate.
#[derive(Clone, Debug, Eq, PartialEq, thiserror::Error)]
pub enum ApiError {
    /// Terminal failure of a call: retries exhausted or a non-retryable outcome.
    #[error("{kind} after {attempts} attempt(s): {message}")]
    Call {
        kind: ErrorKind,
        /// HTTP status of the last attempt, when a response was received.
        status: Option<u16>,
        /// Message of the last attempt outcome.
        message: String,
        attempts: usize,
    },
    /// The caller cancelled the call.
    #[error("call cancelled after {attempts} attempt(s)")]
    Cancelled { attempts: usize },
    /// The per-call wall-clock budget ran out.
    #[error("call exceeded its {budget_ms} ms budget after {attempts} attempt(s)")]
    DeadlineExceeded { budget_ms: u64, attempts: usize },
    /// Missing or invalid client configuration.
    #[error("configuration error: {0}")]
    Config(String),
}

impl ApiError {
    /// Number of attempts made before the call ended. `0` for config errors.
    pub fn attempts(&self) -> usize {
        match self {
            ApiError::Call { attempts, .. }
            | ApiError::Cancelled { attempts }
            | ApiError::DeadlineExceeded { attempts, .. } => *attempts,
            ApiError::Config(_) => 0,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            ApiError::Call { status, .. } => *status,
            _ => None,
        }
    }

    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            ApiError::Call { kind, .. } => Some(*kind),
            _ => None,
        }
    }

    /// Human-readable message without the attempt summary.
    pub fn message(&self) -> String {
        match self {
            ApiError::Call { message, .. } => message.clone(),
            ApiError::Config(message) => message.clone(),
            other => other.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{ApiError, ErrorKind};

    #[test]
    fn only_client_errors_are_final() {
        assert!(ErrorKind::Transport.is_retryable());
        assert!(ErrorKind::RateLimited.is_retryable());
        assert!(ErrorKind::Server.is_retryable());
        assert!(!ErrorKind::Client.is_retryable());
    }

    #[test]
    fn call_error_display_includes_attempts_and_message() {
        let err = ApiError::Call {
            kind: ErrorKind::Server,
            status: Some(503),
            message: "upstream unavailable".to_owned(),
            attempts: 3,
        };
        assert_eq!(
            err.to_string(),
            "server error after 3 attempt(s): upstream unavailable"
        );
        assert_eq!(err.status(), Some(503));
        assert_eq!(err.message(), "upstream unavailable");
    }
}
