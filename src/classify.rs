use std::fmt;
use std::time::Duration;

use reqwest::header;
use serde_json::Value;

use crate::{
    executor::{RawResponse, TransportFailure},
    ErrorKind,
};

/// Vendor convention for success payloads and error messages.
#[derive(Clone, Copy, Debug, Eq, PartialEq, Default)]
pub enum Envelope {
    /// Payload nested under `result`, errors under `errors[0].message`.
    #[default]
    Result,
    /// Body is the payload; raw body text is the error message.
    Raw,
    /// Body text returned verbatim as a JSON string (plain-text endpoints).
    Text,
}

/// Classified result of one network attempt.
#[derive(Clone, Debug, PartialEq)]
pub enum AttemptOutcome {
    Success(Value),
    RateLimited { retry_after: Duration },
    ClientError { status: u16, message: String },
    ServerError { status: u16, message: String },
    TransportError { message: String },
}

impl AttemptOutcome {
    /// `None` for `Success`.
    pub fn kind(&self) -> Option<ErrorKind> {
        match self {
            AttemptOutcome::Success(_) => None,
            AttemptOutcome::RateLimited { .. } => Some(ErrorKind::RateLimited),
            AttemptOutcome::ClientError { .. } => Some(ErrorKind::Client),
            AttemptOutcome::ServerError { .. } => Some(ErrorKind::Server),
            AttemptOutcome::TransportError { .. } => Some(ErrorKind::Transport),
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            AttemptOutcome::RateLimited { .. } => Some(429),
            AttemptOutcome::ClientError { status, .. }
            | AttemptOutcome::ServerError { status, .. } => Some(*status),
            AttemptOutcome::Success(_) | AttemptOutcome::TransportError { .. } => None,
        }
    }

    pub fn message(&self) -> String {
        match self {
            AttemptOutcome::Success(_) => "success".to_owned(),
            AttemptOutcome::RateLimited { retry_after } => {
                format!("rate limited; retry after {} ms", retry_after.as_millis())
            }
            AttemptOutcome::ClientError { message, .. }
            | AttemptOutcome::ServerError { message, .. }
            | AttemptOutcome::TransportError { message } => message.clone(),
        }
    }
}

impl fmt::Display for AttemptOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match (self.kind(), self.status()) {
            (None, _) => f.write_str("success"),
            (Some(kind), Some(status)) => write!(f, "{kind} ({status}): {}", self.message()),
            (Some(kind), None) => write!(f, "{kind}: {}", self.message()),
        }
    }
}

/// Maps one attempt result to an [`AttemptOutcome`].
///
/// `default_retry_after` is used for 429 responses without a usable
/// `Retry-After` header.
pub fn classify(
    attempt: Result<RawResponse, TransportFailure>,
    envelope: Envelope,
    default_retry_after: Duration,
) -> AttemptOutcome {
    let response = match attempt {
        Ok(response) => response,
        Err(failure) => {
            return AttemptOutcome::TransportError {
                message: failure.message,
            }
        }
    };

    match response.status {
        200..=299 => decode_success(&response, envelope),
        429 => AttemptOutcome::RateLimited {
            retry_after: retry_after(&response).unwrap_or(default_retry_after),
        },
        status @ 400..=499 => AttemptOutcome::ClientError {
            status,
            message: error_message(&response, envelope),
        },
        status => AttemptOutcome::ServerError {
            status,
            message: error_message(&response, envelope),
        },
    }
}

fn decode_success(response: &RawResponse, envelope: Envelope) -> AttemptOutcome {
    if envelope == Envelope::Text {
        return AttemptOutcome::Success(Value::String(response.body.clone()));
    }
    if response.body.trim().is_empty() {
        return AttemptOutcome::Success(Value::Null);
    }

    let body = match serde_json::from_str::<Value>(&response.body) {
        Ok(body) => body,
        Err(err) => {
            return AttemptOutcome::ClientError {
                status: response.status,
                message: format!("malformed response body: {err}"),
            }
        }
    };

    match (envelope, body) {
        (Envelope::Result, Value::Object(mut map)) if map.contains_key("result") => {
            AttemptOutcome::Success(map.remove("result").unwrap_or(Value::Null))
        }
        (_, body) => AttemptOutcome::Success(body),
    }
}

/// Integer seconds only; HTTP-date values fall back to the default delay.
fn retry_after(response: &RawResponse) -> Option<Duration> {
    response
        .headers
        .get(header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

fn error_message(response: &RawResponse, envelope: Envelope) -> String {
    let extracted = match envelope {
        Envelope::Result => serde_json::from_str::<Value>(&response.body)
            .ok()
            .and_then(|body| {
                body.pointer("/errors/0/message")
                    .and_then(Value::as_str)
                    .map(str::to_owned)
            }),
        Envelope::Raw | Envelope::Text => {
            Some(response.body.trim().to_owned()).filter(|body| !body.is_empty())
        }
    };

    extracted.unwrap_or_else(|| format!("unknown API error (status {})", response.status))
}
