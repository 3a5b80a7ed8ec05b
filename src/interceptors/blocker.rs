use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use tracing::warn;

use crate::chain::Next;
use crate::error::{ExecutionFailure, QueryBlocked};
use crate::interceptor::Interceptor;
use crate::types::{ExecutionContext, Outcome};

/// Refuses every call without reaching the database.
///
/// Install it around code that must not issue queries; any attempt fails with
/// [`QueryBlocked`].
#[derive(Clone, Debug, Default)]
pub struct StatementBlocker {
    blocked: Arc<AtomicU64>,
}

impl StatementBlocker {
    /// Creates a blocker.
    pub fn new() -> Self {
        Self::default()
    }

    /// Calls refused so far, across all clones.
    pub fn blocked(&self) -> u64 {
        self.blocked.load(Ordering::Relaxed)
    }
}

impl Interceptor for StatementBlocker {
    fn intercept(&self, _next: Next<'_>, ctx: &ExecutionContext) -> Outcome {
        self.blocked.fetch_add(1, Ordering::Relaxed);
        warn!(connection = ctx.connection(), sql = ctx.sql(), "sqlwrap.query.blocked");
        Err(ExecutionFailure::new(QueryBlocked {
            sql: ctx.sql().to_owned(),
        }))
    }

    fn name(&self) -> &str {
        "statement_blocker"
    }
}
