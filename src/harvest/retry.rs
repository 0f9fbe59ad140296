//! Bounded retry with backoff and degraded fallback
//!
//! Every render and extraction step against the flaky backend goes through
//! this policy: a fixed number of attempts with a linearly growing delay,
//! and optionally a lower-fidelity fallback consulted only once the primary
//! path is exhausted. Attempt results are an explicit tagged outcome rather
//! than nested error handlers, so the control flow stays a small loop.

use crate::render::RenderError;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Outcome of a single attempt of a fallible operation
#[derive(Debug)]
pub enum Attempt<T> {
    /// The operation produced a value
    Success(T),

    /// A transient failure (timeout, empty content, navigation error);
    /// retrying the same call may succeed
    Transient(String),

    /// The content rendered but lacked the expected structure; retrying
    /// may help, and the degraded fallback is the last resort
    Shape(String),
}

impl<T> Attempt<T> {
    /// Classifies a renderer result into an attempt outcome
    pub fn from_render(result: Result<T, RenderError>) -> Self {
        match result {
            Ok(value) => Attempt::Success(value),
            Err(e) if e.is_transient() => Attempt::Transient(e.to_string()),
            Err(e) => Attempt::Shape(e.to_string()),
        }
    }
}

/// Error returned once all attempts (and any fallback) have failed
#[derive(Debug, Error)]
#[error("{label} failed after {attempts} attempts: {last_error}")]
pub struct RetryExhausted {
    pub label: String,
    pub attempts: u32,
    pub last_error: String,
}

/// Bounded retry policy with linear backoff
///
/// Attempt N is followed by a wait of N times the base delay, so total
/// elapsed delay grows monotonically (2s, 4s, 6s with the defaults).
/// The policy carries no mutable state and is safe to share across workers.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay,
        }
    }

    /// Runs an operation with bounded retries
    ///
    /// The operation is invoked at most `max_attempts` times; it receives
    /// the 1-based attempt number for logging.
    pub async fn run<T, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T>>,
    {
        let mut last_error = String::new();

        for attempt in 1..=self.max_attempts {
            match op(attempt).await {
                Attempt::Success(value) => return Ok(value),
                Attempt::Transient(message) => {
                    tracing::debug!(
                        "{}: transient failure on attempt {}/{}: {}",
                        label,
                        attempt,
                        self.max_attempts,
                        message
                    );
                    last_error = message;
                }
                Attempt::Shape(message) => {
                    tracing::debug!(
                        "{}: shape failure on attempt {}/{}: {}",
                        label,
                        attempt,
                        self.max_attempts,
                        message
                    );
                    last_error = message;
                }
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.base_delay * attempt).await;
            }
        }

        Err(RetryExhausted {
            label: label.to_string(),
            attempts: self.max_attempts,
            last_error,
        })
    }

    /// Runs an operation with retries, then a one-shot degraded fallback
    ///
    /// The fallback is invoked only after the final primary attempt fails;
    /// exhaustion is reported only when both paths have failed.
    pub async fn run_with_fallback<T, F, Fut, G, GFut>(
        &self,
        label: &str,
        op: F,
        fallback: G,
    ) -> Result<T, RetryExhausted>
    where
        F: FnMut(u32) -> Fut,
        Fut: Future<Output = Attempt<T>>,
        G: FnOnce() -> GFut,
        GFut: Future<Output = Attempt<T>>,
    {
        let primary_error = match self.run(label, op).await {
            Ok(value) => return Ok(value),
            Err(e) => e,
        };

        tracing::info!("{}: primary extraction exhausted, trying text fallback", label);
        match fallback().await {
            Attempt::Success(value) => Ok(value),
            Attempt::Transient(message) | Attempt::Shape(message) => Err(RetryExhausted {
                label: label.to_string(),
                attempts: primary_error.attempts,
                last_error: format!("{}; fallback failed: {}", primary_error.last_error, message),
            }),
        }
    }
}
