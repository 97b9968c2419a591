// Retry engine: runs a unit of work up to `max_attempts` times, waiting
// between attempts according to a pluggable backoff strategy. A cancellation
// token preempts both the work and the backoff wait.

use std::fmt::Display;
use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};

pub mod backoff;

pub use backoff::{BackoffStrategy, ConstantBackoff, ExponentialBackoff, LinearBackoff};

#[derive(Clone)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff: Arc<dyn BackoffStrategy>,
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, backoff: Arc<dyn BackoffStrategy>) -> Self {
        Self {
            max_attempts,
            backoff,
        }
    }
}

#[derive(Debug, Error)]
pub enum RetryError<E> {
    #[error("retry cancelled")]
    Cancelled,

    #[error("non-retryable error: {0}")]
    NonRetryable(E),

    #[error("all {attempts} attempts failed, last error: {last}")]
    Exhausted { attempts: u32, last: E },
}

impl<E> RetryError<E> {
    pub fn into_inner(self) -> Option<E> {
        match self {
            Self::Cancelled => None,
            Self::NonRetryable(err) | Self::Exhausted { last: err, .. } => Some(err),
        }
    }
}

/// Retries `op` treating every error as retryable.
pub async fn run<T, E, F, Fut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    op: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
{
    run_classified(policy, cancel, |_| true, op).await
}

/// Retries `op`, consulting `is_retryable` after each failure. A
/// non-retryable error stops the engine immediately and is handed back to
/// the caller unchanged.
pub async fn run_classified<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    is_retryable: C,
    mut op: F,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
{
    for attempt in 1..=policy.max_attempts {
        if cancel.is_cancelled() {
            return Err(RetryError::Cancelled);
        }

        let err = match op().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };

        // Classification comes first: a non-retryable error stops the
        // engine on any attempt, the last one included.
        if !is_retryable(&err) {
            warn!(error = %err, attempt, "non-retryable error encountered, giving up");
            return Err(RetryError::NonRetryable(err));
        }

        if attempt == policy.max_attempts {
            return Err(RetryError::Exhausted {
                attempts: attempt,
                last: err,
            });
        }

        let backoff = policy.backoff.next_backoff(attempt);
        debug!(
            error = %err,
            attempt,
            max_attempts = policy.max_attempts,
            backoff_ms = backoff.as_millis() as u64,
            "retrying after error"
        );

        tokio::select! {
            _ = tokio::time::sleep(backoff) => {}
            _ = cancel.cancelled() => return Err(RetryError::Cancelled),
        }
    }

    // max_attempts is validated to be >= 1 by every caller; a zero-attempt
    // policy degenerates to cancellation semantics.
    Err(RetryError::Cancelled)
}

/// Retries `op` and, iff every attempt was exhausted, invokes `discard` with
/// the last error so the caller can transition persistent state.
pub async fn run_with_discard<T, E, F, Fut, D, DFut>(
    policy: &RetryPolicy,
    cancel: &CancellationToken,
    op: F,
    discard: D,
) -> Result<T, RetryError<E>>
where
    E: Display,
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    D: FnOnce(&E) -> DFut,
    DFut: Future<Output = ()>,
{
    match run(policy, cancel, op).await {
        Err(RetryError::Exhausted { attempts, last }) => {
            error!(
                error = %last,
                attempts,
                "all attempts failed, applying discard policy"
            );
            discard(&last).await;
            Err(RetryError::Exhausted { attempts, last })
        }
        other => other,
    }
}
