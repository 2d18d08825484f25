//! Retry executor for remote calls
//!
//! Wraps any fallible async operation with bounded exponential backoff.
//! Failures are classified through [`Classify`]: transient ones are retried,
//! fatal ones are returned immediately.

use crate::config::RetryConfig;
use crate::crawler::pacing::Shutdown;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use thiserror::Error;

/// Whether a failure is expected to go away by retrying
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureClass {
    /// Rate limiting, server overload, timeouts
    Transient,

    /// Anything retrying will not fix (auth, malformed responses, ...)
    Fatal,
}

/// Failure classifier used by [`RetryExecutor`]
pub trait Classify {
    fn classify(&self) -> FailureClass;
}

/// Outcome of an operation that did not succeed under retry
#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("gave up after {attempts} attempts: {source}")]
    Exhausted { attempts: u32, source: E },

    #[error("non-retryable failure after {attempts} attempt(s): {source}")]
    Fatal { attempts: u32, source: E },

    #[error("cancelled during backoff")]
    Cancelled,
}

impl<E> RetryError<E> {
    /// Classification of the last failure, if the operation failed on its own
    pub fn class(&self) -> Option<FailureClass> {
        match self {
            Self::Exhausted { .. } => Some(FailureClass::Transient),
            Self::Fatal { .. } => Some(FailureClass::Fatal),
            Self::Cancelled => None,
        }
    }

    /// Number of attempts made before giving up
    pub fn attempts(&self) -> u32 {
        match self {
            Self::Exhausted { attempts, .. } | Self::Fatal { attempts, .. } => *attempts,
            Self::Cancelled => 0,
        }
    }
}

/// Backoff policy
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts including the first one
    pub max_attempts: u32,

    /// Delay after the first failed attempt
    pub base_delay: Duration,
}

impl RetryPolicy {
    /// Delay to wait after failed attempt number `attempt` (1-based)
    ///
    /// Doubles with every attempt: base, 2×base, 4×base, ...
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = 1u32
            .checked_shl(attempt.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor)
    }
}

impl From<&RetryConfig> for RetryPolicy {
    fn from(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts,
            base_delay: Duration::from_millis(config.base_delay),
        }
    }
}

/// Runs operations under a [`RetryPolicy`]
#[derive(Clone)]
pub struct RetryExecutor {
    policy: RetryPolicy,
    shutdown: Shutdown,
}

impl RetryExecutor {
    pub fn new(policy: RetryPolicy, shutdown: Shutdown) -> Self {
        Self { policy, shutdown }
    }

    pub fn policy(&self) -> &RetryPolicy {
        &self.policy
    }

    /// Runs `op` until it succeeds, fails fatally, or attempts run out
    ///
    /// `label` identifies the operation in log output.
    pub async fn run<T, E, F, Fut>(&self, label: &str, mut op: F) -> Result<T, RetryError<E>>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        E: Classify + Display,
    {
        let max_attempts = self.policy.max_attempts.max(1);
        let mut attempt = 0;

        loop {
            attempt += 1;

            let error = match op().await {
                Ok(value) => return Ok(value),
                Err(error) => error,
            };

            if error.classify() == FailureClass::Fatal {
                tracing::warn!("{} failed with non-retryable error: {}", label, error);
                return Err(RetryError::Fatal {
                    attempts: attempt,
                    source: error,
                });
            }

            if attempt >= max_attempts {
                tracing::warn!(
                    "{} failed after {} attempts, giving up: {}",
                    label,
                    attempt,
                    error
                );
                return Err(RetryError::Exhausted {
                    attempts: attempt,
                    source: error,
                });
            }

            let delay = self.policy.delay_after(attempt);
            tracing::warn!(
                "{} failed ({}), retrying in {:?} (attempt {}/{})",
                label,
                error,
                delay,
                attempt,
                max_attempts
            );

            if self.shutdown.sleep(delay).await.is_err() {
                return Err(RetryError::Cancelled);
            }
        }
    }
}
