//! Bounded retry loop around single attempts.
//!
//! Attempts run strictly one after another. Between attempts the loop waits
//! either for the server-provided `Retry-After` (429) or for an exponential
//! backoff (`retry_delay * 2^(attempt - 1)`) after server and transport
//! failures. Client errors end the call on the first attempt.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use serde_json::Value;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use crate::{classify::AttemptOutcome, ApiError, ClientOptions, ErrorKind, Method, Result};

/// Timer used for the waits between attempts.
///
/// Swap in a fake to observe or skip waits in tests.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>>;
}

/// Default [`Sleeper`] backed by `tokio::time::sleep`.
#[derive(Clone, Copy, Debug, Default)]
pub struct TokioSleeper;

impl Sleeper for TokioSleeper {
    fn sleep(&self, duration: Duration) -> Pin<Box<dyn Future<Output = ()> + Send + 'static>> {
        Box::pin(tokio::time::sleep(duration))
    }
}

#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub(crate) struct RetryPolicy {
    max_attempts: usize,
    base_delay: Duration,
}

#[derive(Debug, PartialEq)]
pub(crate) enum Step {
    Finish(Value),
    Retry(Duration),
    Fail(ApiError),
}

impl RetryPolicy {
    pub(crate) fn from_options(options: &ClientOptions) -> Self {
        Self {
            max_attempts: options.attempt_budget(),
            base_delay: options.retry_delay(),
        }
    }

    /// Delay after the `attempt`-th failure (1-based).
    pub(crate) fn backoff(&self, attempt: usize) -> Duration {
        let exp = attempt.saturating_sub(1).min(16) as u32;
        self.base_delay.saturating_mul(1u32 << exp)
    }

    /// Decides what follows the `attempt`-th outcome (1-based).
    pub(crate) fn next_step(&self, attempt: usize, outcome: AttemptOutcome) -> Step {
        let (kind, wait) = match outcome {
            AttemptOutcome::Success(payload) => return Step::Finish(payload),
            AttemptOutcome::RateLimited { retry_after } => {
                (ErrorKind::RateLimited, Some(retry_after))
            }
            AttemptOutcome::ServerError { .. } => {
                (ErrorKind::Server, Some(self.backoff(attempt)))
            }
            AttemptOutcome::TransportError { .. } => {
                (ErrorKind::Transport, Some(self.backoff(attempt)))
            }
            AttemptOutcome::ClientError { .. } => (ErrorKind::Client, None),
        };

        match wait {
            Some(wait) if attempt < self.max_attempts => Step::Retry(wait),
            _ => Step::Fail(ApiError::Call {
                kind,
                status: outcome.status(),
                message: outcome.message(),
                attempts: attempt,
            }),
        }
    }
}

/// Per-call inputs that stay fixed across attempts.
pub(crate) struct CallScope<'a> {
    pub method: Method,
    pub path: &'a str,
    pub policy: RetryPolicy,
    pub sleeper: &'a dyn Sleeper,
    pub cancel: &'a CancellationToken,
    pub budget: Option<Duration>,
}

/// Drives `attempt` until success, a final error, cancellation or the
/// per-call deadline.
///
/// An attempt is counted once it has been issued, so a token that is already
/// cancelled reports `attempts: 0`, while one cancelled mid-request counts
/// the interrupted attempt.
pub(crate) async fn run<F, Fut>(scope: CallScope<'_>, mut attempt: F) -> Result<Value>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = AttemptOutcome>,
{
    let deadline = scope.budget.map(|budget| Instant::now() + budget);
    let mut attempts = 0usize;

    loop {
        if scope.cancel.is_cancelled() {
            return Err(ApiError::Cancelled { attempts });
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            return Err(deadline_exceeded(&scope, attempts));
        }

        attempts += 1;
        let outcome = tokio::select! {
            biased;
            _ = scope.cancel.cancelled() => return Err(ApiError::Cancelled { attempts }),
            _ = expire(deadline) => return Err(deadline_exceeded(&scope, attempts)),
            outcome = attempt() => outcome,
        };

        if !matches!(outcome, AttemptOutcome::Success(_)) {
            tracing::warn!(
                method = %scope.method,
                endpoint = scope.path,
                attempt = attempts as u64,
                outcome = %outcome,
                "API request attempt failed"
            );
        }

        match scope.policy.next_step(attempts, outcome) {
            Step::Finish(payload) => return Ok(payload),
            Step::Fail(err) => return Err(err),
            Step::Retry(wait) => {
                tracing::debug!(
                    method = %scope.method,
                    endpoint = scope.path,
                    attempt = attempts as u64,
                    wait_ms = wait.as_millis() as u64,
                    "retrying API request"
                );
                tokio::select! {
                    biased;
                    _ = scope.cancel.cancelled() => return Err(ApiError::Cancelled { attempts }),
                    _ = expire(deadline) => return Err(deadline_exceeded(&scope, attempts)),
                    _ = scope.sleeper.sleep(wait) => {}
                }
            }
        }
    }
}

async fn expire(deadline: Option<Instant>) {
    match deadline {
        Some(deadline) => tokio::time::sleep_until(deadline).await,
        None => std::future::pending().await,
    }
}

fn deadline_exceeded(scope: &CallScope<'_>, attempts: usize) -> ApiError {
    ApiError::DeadlineExceeded {
        budget_ms: scope
            .budget
            .map(|budget| budget.as_millis() as u64)
            .unwrap_or_default(),
        attempts,
    }
}
