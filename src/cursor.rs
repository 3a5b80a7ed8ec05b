//! Entry point callers use to run SQL through a connection's interceptors.

use std::sync::Arc;

use tracing::trace;

use crate::chain::ChainBuilder;
use crate::connection::Connection;
use crate::types::{Correlation, ExecutionContext, Outcome, Value};

/// Runs statements on a [`Connection`].
///
/// Each call snapshots the connection's stack, composes it around the
/// terminal executor and returns whatever the chain returns. The cursor adds
/// no retry, timing or logging of its own.
#[derive(Clone, Copy, Debug)]
pub struct Cursor<'c> {
    connection: &'c Connection,
}

impl<'c> Cursor<'c> {
    pub(crate) fn new(connection: &'c Connection) -> Self {
        Self { connection }
    }

    /// Connection this cursor belongs to.
    pub fn connection(&self) -> &'c Connection {
        self.connection
    }

    /// Executes one statement.
    pub fn execute(
        &self,
        sql: impl Into<Arc<str>>,
        params: impl Into<Vec<Value>>,
        correlation: Correlation,
    ) -> Outcome {
        let ctx = ExecutionContext::single(
            self.connection.shared_name(),
            sql,
            params.into(),
            correlation,
        );
        self.run(&ctx)
    }

    /// Executes one statement once per parameter set.
    pub fn executemany(
        &self,
        sql: impl Into<Arc<str>>,
        batches: impl Into<Vec<Vec<Value>>>,
        correlation: Correlation,
    ) -> Outcome {
        let ctx = ExecutionContext::batch(
            self.connection.shared_name(),
            sql,
            batches.into(),
            correlation,
        );
        self.run(&ctx)
    }

    /// Executes a statement without parameters or correlation value.
    pub fn execute_plain(&self, sql: impl Into<Arc<str>>) -> Outcome {
        self.execute(sql, Vec::new(), Correlation::none())
    }

    /// Runs an already built context through the current chain.
    pub fn run(&self, ctx: &ExecutionContext) -> Outcome {
        let chain = ChainBuilder::build(self.connection.snapshot(), self.connection.executor().clone());
        trace!(
            connection = ctx.connection(),
            many = ctx.many(),
            interceptors = chain.len(),
            "sqlwrap.cursor.execute"
        );
        chain.call(ctx)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Next;
    use crate::executor::executor_fn;
    use crate::interceptor::from_fn;
    use crate::types::{Params, QueryOutput};
    use parking_lot::Mutex;

    #[test]
    fn executemany_sets_batch_flag() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = seen.clone();
        let conn = Connection::new(
            "c",
            Arc::new(executor_fn(move |ctx| {
                sink.lock().push((ctx.many(), ctx.params().set_count()));
                Ok(QueryOutput::default())
            })),
        );
        let cursor = conn.cursor();
        cursor.execute_plain("SELECT 1").unwrap();
        cursor
            .executemany(
                "INSERT INTO t VALUES (?1)",
                vec![vec![Value::from(1)], vec![Value::from(2)]],
                Correlation::none(),
            )
            .unwrap();
        assert_eq!(*seen.lock(), vec![(false, 1), (true, 2)]);
    }

    #[test]
    fn correlation_reaches_interceptors_and_executor_untouched() {
        let corr = Correlation::new(String::from("req-1"));
        let expected = corr.clone();
        let probe = corr.clone();
        let conn = Connection::new(
            "c",
            Arc::new(executor_fn(move |ctx| {
                assert!(ctx.correlation().ptr_eq(&expected));
                Ok(QueryOutput::default())
            })),
        );
        let _guard = conn.execute_wrapper(from_fn(move |next: Next<'_>, ctx: &ExecutionContext| {
            assert!(ctx.correlation().ptr_eq(&probe));
            assert_eq!(ctx.connection(), "c");
            next.run(ctx)
        }));
        conn.cursor().execute("SELECT 1", Vec::new(), corr).unwrap();
    }

    #[test]
    fn interceptor_can_rewrite_the_call() {
        let conn = Connection::new(
            "c",
            Arc::new(executor_fn(|ctx| {
                Ok(QueryOutput::scalar("sql", ctx.sql()))
            })),
        );
        let _guard = conn.execute_wrapper(from_fn(|next: Next<'_>, ctx: &ExecutionContext| {
            let rewritten = ctx
                .with_sql(format!("/* traced */ {}", ctx.sql()))
                .with_params(Params::Single(Vec::new()));
            next.run(&rewritten)
        }));
        let out = conn.cursor().execute("SELECT ?1", [Value::from(5)], Correlation::none()).unwrap();
        assert_eq!(out.first_value(), Some(&Value::from("/* traced */ SELECT ?1")));
    }
}
