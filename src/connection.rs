use std::fmt;
use std::sync::Arc;

use parking_lot::Mutex;

use crate::chain::{Chain, ChainBuilder, Snapshot};
use crate::config::ConnectionSettings;
use crate::cursor::Cursor;
use crate::error::Result;
use crate::executor::{Executor, SqliteExecutor};
use crate::interceptor::Interceptor;
use crate::scope::ScopeGuard;
use crate::stack::{InterceptorStack, StackToken};

/// A named connection: one terminal executor plus its own interceptor stack.
///
/// `Connection` is `Send + Sync`. Pushes and pops are serialised by a mutex
/// around the stack, and each execution works on a snapshot taken under that
/// mutex, so an in-flight call never sees a half-updated stack. Pairing pushes
/// with pops is still the caller's job: keep one connection per concurrent
/// unit of work when installing scopes.
pub struct Connection {
    name: Arc<str>,
    stack: Mutex<InterceptorStack>,
    executor: Arc<dyn Executor>,
}

impl Connection {
    /// Creates a connection over `executor` with an empty stack.
    pub fn new(name: impl Into<Arc<str>>, executor: Arc<dyn Executor>) -> Self {
        Self {
            name: name.into(),
            stack: Mutex::new(InterceptorStack::new()),
            executor,
        }
    }

    /// Opens a SQLite-backed connection.
    pub fn open_sqlite(name: impl Into<Arc<str>>, settings: &ConnectionSettings) -> Result<Self> {
        let executor = SqliteExecutor::open(settings)?;
        Ok(Self::new(name, Arc::new(executor)))
    }

    /// Connection name.
    pub fn name(&self) -> &str {
        &self.name
    }

    pub(crate) fn shared_name(&self) -> Arc<str> {
        self.name.clone()
    }

    /// Terminal executor.
    pub fn executor(&self) -> &Arc<dyn Executor> {
        &self.executor
    }

    /// Cursor for running statements through the current interceptors.
    pub fn cursor(&self) -> Cursor<'_> {
        Cursor::new(self)
    }

    /// Installs `interceptor` until the returned guard is dropped.
    pub fn execute_wrapper<I>(&self, interceptor: I) -> ScopeGuard<'_>
    where
        I: Interceptor + 'static,
    {
        ScopeGuard::enter(self, Arc::new(interceptor))
    }

    /// Like [`execute_wrapper`](Self::execute_wrapper) for a shared
    /// interceptor.
    pub fn execute_wrapper_shared(&self, interceptor: Arc<dyn Interceptor>) -> ScopeGuard<'_> {
        ScopeGuard::enter(self, interceptor)
    }

    /// Runs `f` with `interceptor` installed.
    pub fn with_interceptor<I, F, T>(&self, interceptor: I, f: F) -> T
    where
        I: Interceptor + 'static,
        F: FnOnce(&Self) -> T,
    {
        let _guard = self.execute_wrapper(interceptor);
        f(self)
    }

    /// Raw push. Prefer [`execute_wrapper`](Self::execute_wrapper).
    pub fn push_interceptor(&self, interceptor: Arc<dyn Interceptor>) -> StackToken {
        self.stack.lock().push(interceptor)
    }

    /// Raw pop; fails unless `token` is the top of the stack.
    pub fn pop_interceptor(&self, token: StackToken) -> Result<Arc<dyn Interceptor>> {
        self.stack.lock().pop(token)
    }

    /// Releases the push identified by `token`.
    ///
    /// Unlike [`pop_interceptor`](Self::pop_interceptor), a buried entry is
    /// not left behind: it is reported as a violation and removed as soon as
    /// the entries above it are gone.
    pub fn release_interceptor(&self, token: StackToken) -> Result<()> {
        self.stack.lock().release(token)
    }

    /// Number of interceptors currently installed.
    pub fn interceptor_count(&self) -> usize {
        self.stack.lock().len()
    }

    /// Snapshot of the installed interceptors, outermost first.
    pub fn snapshot(&self) -> Snapshot {
        self.stack.lock().snapshot()
    }

    /// Chain over the current snapshot.
    pub fn chain(&self) -> Chain {
        ChainBuilder::build(self.snapshot(), self.executor.clone())
    }
}

impl fmt::Debug for Connection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Connection")
            .field("name", &self.name)
            .field("stack", &*self.stack.lock())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::Next;
    use crate::executor::executor_fn;
    use crate::interceptor::from_fn;
    use crate::types::{ExecutionContext, QueryOutput};

    #[test]
    fn with_interceptor_scopes_the_closure() {
        let conn = Connection::new("c", Arc::new(executor_fn(|_| Ok(QueryOutput::default()))));
        let seen = conn.with_interceptor(
            from_fn(|next: Next<'_>, ctx: &ExecutionContext| next.run(ctx)),
            |conn| conn.interceptor_count(),
        );
        assert_eq!(seen, 1);
        assert_eq!(conn.interceptor_count(), 0);
    }

    #[test]
    fn chain_reflects_stack_at_build_time() {
        let conn = Connection::new("c", Arc::new(executor_fn(|_| Ok(QueryOutput::default()))));
        let guard = conn.execute_wrapper(from_fn(|next: Next<'_>, ctx: &ExecutionContext| next.run(ctx)));
        let chain = conn.chain();
        drop(guard);
        assert_eq!(chain.len(), 1);
        assert!(conn.chain().is_empty());
    }
}
