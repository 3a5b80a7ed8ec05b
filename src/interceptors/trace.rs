use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::chain::Next;
use crate::interceptor::Interceptor;
use crate::types::{ExecutionContext, Outcome};

/// Emits a `tracing` event for every call.
///
/// Successful calls log at `debug` as `sqlwrap.query`; failures and calls
/// slower than the configured threshold log at `warn`.
#[derive(Clone, Debug, Default)]
pub struct TracingInterceptor {
    slow_threshold: Option<Duration>,
    log_params: bool,
}

impl TracingInterceptor {
    /// Creates an interceptor with no slow-query threshold and parameters
    /// omitted from events.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls slower than `threshold` log at `warn`.
    pub fn with_slow_threshold(mut self, threshold: Duration) -> Self {
        self.slow_threshold = Some(threshold);
        self
    }

    /// Include parameter values in events.
    pub fn with_params(mut self, enabled: bool) -> Self {
        self.log_params = enabled;
        self
    }

    fn is_slow(&self, elapsed: Duration) -> bool {
        self.slow_threshold.is_some_and(|threshold| elapsed >= threshold)
    }
}

impl Interceptor for TracingInterceptor {
    fn intercept(&self, next: Next<'_>, ctx: &ExecutionContext) -> Outcome {
        let start = Instant::now();
        let outcome = next.run(ctx);
        let elapsed = start.elapsed();
        let elapsed_us = elapsed.as_micros() as u64;
        let params = if self.log_params {
            format!("{:?}", ctx.params())
        } else {
            String::new()
        };
        match &outcome {
            Ok(output) if self.is_slow(elapsed) => warn!(
                connection = ctx.connection(),
                sql = ctx.sql(),
                params = %params,
                many = ctx.many(),
                elapsed_us,
                rows = output.rows.len(),
                rows_affected = output.rows_affected,
                "sqlwrap.query.slow"
            ),
            Ok(output) => debug!(
                connection = ctx.connection(),
                sql = ctx.sql(),
                params = %params,
                many = ctx.many(),
                elapsed_us,
                rows = output.rows.len(),
                rows_affected = output.rows_affected,
                "sqlwrap.query"
            ),
            Err(err) => warn!(
                connection = ctx.connection(),
                sql = ctx.sql(),
                params = %params,
                many = ctx.many(),
                elapsed_us,
                error = %err,
                "sqlwrap.query.failed"
            ),
        }
        outcome
    }

    fn name(&self) -> &str {
        "tracing"
    }
}
