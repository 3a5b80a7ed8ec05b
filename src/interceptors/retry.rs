use std::fmt;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use rusqlite::ErrorCode;
use tracing::{error, warn};

use crate::chain::Next;
use crate::error::ExecutionFailure;
use crate::interceptor::Interceptor;
use crate::types::{ExecutionContext, Outcome};

type RetryPredicate = Arc<dyn Fn(&ExecutionFailure) -> bool + Send + Sync>;

/// Re-runs the rest of the chain when it fails with a retryable error.
///
/// Every attempt runs all interceptors installed after this one again, so an
/// inner logger records one entry per attempt. By default only SQLite
/// `SQLITE_BUSY` and `SQLITE_LOCKED` failures are retried.
#[derive(Clone)]
pub struct RetryOnFailure {
    max_attempts: u32,
    base_delay: Duration,
    max_delay: Duration,
    retry_if: RetryPredicate,
}

impl RetryOnFailure {
    /// Allows up to `max_attempts` calls in total (at least one).
    pub fn new(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::from_millis(10),
            max_delay: Duration::from_secs(1),
            retry_if: Arc::new(is_busy),
        }
    }

    /// Exponential backoff starting at `base`, capped at `max`.
    pub fn with_backoff(mut self, base: Duration, max: Duration) -> Self {
        self.base_delay = base;
        self.max_delay = max;
        self
    }

    /// Retries only failures accepted by `predicate`.
    pub fn retry_if<P>(mut self, predicate: P) -> Self
    where
        P: Fn(&ExecutionFailure) -> bool + Send + Sync + 'static,
    {
        self.retry_if = Arc::new(predicate);
        self
    }

    /// Maximum number of calls made for one execution.
    pub fn max_attempts(&self) -> u32 {
        self.max_attempts
    }
}

impl fmt::Debug for RetryOnFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RetryOnFailure")
            .field("max_attempts", &self.max_attempts)
            .field("base_delay", &self.base_delay)
            .field("max_delay", &self.max_delay)
            .finish_non_exhaustive()
    }
}

impl Interceptor for RetryOnFailure {
    fn intercept(&self, next: Next<'_>, ctx: &ExecutionContext) -> Outcome {
        let mut attempt = 0;
        loop {
            attempt += 1;
            let err = match next.run(ctx) {
                Ok(output) => return Ok(output),
                Err(err) => err,
            };
            if !(self.retry_if)(&err) {
                return Err(err);
            }
            if attempt >= self.max_attempts {
                error!(
                    connection = ctx.connection(),
                    attempts = attempt,
                    error = %err,
                    "sqlwrap.retry.exhausted"
                );
                return Err(err);
            }
            let delay = backoff_delay(attempt, self.base_delay, self.max_delay);
            warn!(
                connection = ctx.connection(),
                attempt,
                max_attempts = self.max_attempts,
                delay_ms = delay.as_millis() as u64,
                error = %err,
                "sqlwrap.retry.attempt_failed"
            );
            if !delay.is_zero() {
                thread::sleep(delay);
            }
        }
    }

    fn name(&self) -> &str {
        "retry"
    }
}

/// Delay before attempt `attempt + 1`: `base * 2^(attempt - 1)`, capped.
pub fn backoff_delay(attempt: u32, base: Duration, max: Duration) -> Duration {
    let factor = 2u32.saturating_pow(attempt.saturating_sub(1));
    base.saturating_mul(factor).min(max)
}

fn is_busy(failure: &ExecutionFailure) -> bool {
    failure
        .downcast_ref::<rusqlite::Error>()
        .and_then(rusqlite::Error::sqlite_error_code)
        .is_some_and(|code| matches!(code, ErrorCode::DatabaseBusy | ErrorCode::DatabaseLocked))
}
