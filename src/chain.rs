//! Composition of an interceptor stack snapshot into one continuation.

use std::fmt;
use std::sync::Arc;

use crate::executor::Executor;
use crate::interceptor::Interceptor;
use crate::types::{ExecutionContext, Outcome};

/// Immutable view of a stack, outermost interceptor first.
pub type Snapshot = Arc<[Arc<dyn Interceptor>]>;

/// Continuation handed to an interceptor.
///
/// Running it invokes the next-inner interceptor, or the terminal executor
/// once the snapshot is exhausted. `Next` is `Copy`, so an interceptor may run
/// it any number of times.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    remaining: &'a [Arc<dyn Interceptor>],
    terminal: &'a dyn Executor,
}

impl<'a> Next<'a> {
    /// Proceeds with the call.
    pub fn run(self, ctx: &ExecutionContext) -> Outcome {
        match self.remaining.split_first() {
            Some((head, rest)) => head.intercept(
                Next {
                    remaining: rest,
                    terminal: self.terminal,
                },
                ctx,
            ),
            None => self.terminal.execute(ctx),
        }
    }

    /// Number of interceptors still between this point and the executor.
    pub fn depth(&self) -> usize {
        self.remaining.len()
    }
}

impl fmt::Debug for Next<'_> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Next").field("depth", &self.depth()).finish()
    }
}

/// Builds [`Chain`]s.
#[derive(Debug, Default, Clone, Copy)]
pub struct ChainBuilder;

impl ChainBuilder {
    /// Composes `snapshot` around `terminal`.
    ///
    /// For a snapshot `[I1, I2, .., In]` the result behaves as
    /// `I1(I2(..In(terminal)))`: `I1` sees the call first and the outcome
    /// last, `In` runs right next to the executor.
    pub fn build(snapshot: Snapshot, terminal: Arc<dyn Executor>) -> Chain {
        Chain {
            interceptors: snapshot,
            terminal,
        }
    }
}

/// Fully composed continuation for one execution.
#[derive(Clone)]
pub struct Chain {
    interceptors: Snapshot,
    terminal: Arc<dyn Executor>,
}

impl Chain {
    /// Runs the call through every interceptor and the terminal executor.
    pub fn call(&self, ctx: &ExecutionContext) -> Outcome {
        self.head().run(ctx)
    }

    /// Continuation at the outermost position.
    pub fn head(&self) -> Next<'_> {
        Next {
            remaining: &self.interceptors,
            terminal: self.terminal.as_ref(),
        }
    }

    /// Number of interceptors in the chain.
    pub fn len(&self) -> usize {
        self.interceptors.len()
    }

    /// Returns `true` if the chain goes straight to the executor.
    pub fn is_empty(&self) -> bool {
        self.interceptors.is_empty()
    }
}

impl fmt::Debug for Chain {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = self.interceptors.iter().map(|i| i.name()).collect();
        f.debug_struct("Chain").field("interceptors", &names).finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ExecutionFailure;
    use crate::executor::executor_fn;
    use crate::interceptor::from_fn;
    use crate::types::{Correlation, QueryOutput};
    use parking_lot::Mutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn ctx() -> ExecutionContext {
        ExecutionContext::single("test".into(), "SELECT 1", Vec::new(), Correlation::none())
    }

    fn recording(tag: &'static str, log: Arc<Mutex<Vec<String>>>) -> Arc<dyn Interceptor> {
        Arc::new(from_fn(move |next: Next<'_>, ctx: &ExecutionContext| {
            log.lock().push(format!("{tag}-before"));
            let outcome = next.run(ctx);
            log.lock().push(format!("{tag}-after"));
            outcome
        }))
    }

    #[test]
    fn empty_chain_calls_terminal() {
        let chain = ChainBuilder::build(
            Arc::from(Vec::new()),
            Arc::new(executor_fn(|_| Ok(QueryOutput::scalar("v", 7)))),
        );
        assert!(chain.is_empty());
        let out = chain.call(&ctx()).unwrap();
        assert_eq!(out.first_value(), Some(&7.into()));
    }

    #[test]
    fn outermost_runs_first_and_sees_outcome_last() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let terminal_log = log.clone();
        let snapshot: Snapshot = Arc::from(vec![
            recording("A", log.clone()),
            recording("B", log.clone()),
        ]);
        let chain = ChainBuilder::build(
            snapshot,
            Arc::new(executor_fn(move |_| {
                terminal_log.lock().push("terminal".into());
                Ok(QueryOutput::scalar("v", 42))
            })),
        );
        let out = chain.call(&ctx()).unwrap();
        assert_eq!(out.first_value(), Some(&42.into()));
        assert_eq!(
            *log.lock(),
            vec!["A-before", "B-before", "terminal", "B-after", "A-after"]
        );
    }

    #[test]
    fn next_depth_counts_remaining_interceptors() {
        let depths = Arc::new(Mutex::new(Vec::new()));
        let probe = |depths: Arc<Mutex<Vec<usize>>>| -> Arc<dyn Interceptor> {
            Arc::new(from_fn(move |next: Next<'_>, ctx: &ExecutionContext| {
                depths.lock().push(next.depth());
                next.run(ctx)
            }))
        };
        let chain = ChainBuilder::build(
            Arc::from(vec![probe(depths.clone()), probe(depths.clone()), probe(depths.clone())]),
            Arc::new(executor_fn(|_| Ok(QueryOutput::default()))),
        );
        chain.call(&ctx()).unwrap();
        assert_eq!(*depths.lock(), vec![2, 1, 0]);
    }

    #[test]
    fn running_next_twice_reruns_inner_interceptors() {
        let inner_calls = Arc::new(AtomicUsize::new(0));
        let terminal_calls = Arc::new(AtomicUsize::new(0));
        let twice: Arc<dyn Interceptor> =
            Arc::new(from_fn(|next: Next<'_>, ctx: &ExecutionContext| {
                let _ = next.run(ctx);
                next.run(ctx)
            }));
        let counter = inner_calls.clone();
        let inner: Arc<dyn Interceptor> =
            Arc::new(from_fn(move |next: Next<'_>, ctx: &ExecutionContext| {
                counter.fetch_add(1, Ordering::SeqCst);
                next.run(ctx)
            }));
        let terminal_counter = terminal_calls.clone();
        let chain = ChainBuilder::build(
            Arc::from(vec![twice, inner]),
            Arc::new(executor_fn(move |_| {
                terminal_counter.fetch_add(1, Ordering::SeqCst);
                Ok(QueryOutput::default())
            })),
        );
        chain.call(&ctx()).unwrap();
        assert_eq!(inner_calls.load(Ordering::SeqCst), 2);
        assert_eq!(terminal_calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn failure_passes_through_every_layer() {
        #[derive(Debug, thiserror::Error)]
        #[error("boom")]
        struct Boom;

        let log = Arc::new(Mutex::new(Vec::new()));
        let chain = ChainBuilder::build(
            Arc::from(vec![recording("A", log.clone()), recording("B", log.clone())]),
            Arc::new(executor_fn(|_| Err(ExecutionFailure::new(Boom)))),
        );
        let err = chain.call(&ctx()).unwrap_err();
        assert!(err.is::<Boom>());
        assert_eq!(*log.lock(), vec!["A-before", "B-before", "B-after", "A-after"]);
    }
}
