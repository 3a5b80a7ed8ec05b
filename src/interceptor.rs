//! The interceptor contract.
//!
//! An interceptor wraps one execution call. It receives the call's
//! [`ExecutionContext`] and a [`Next`] continuation leading towards the
//! terminal executor, and must produce an [`Outcome`]. Within that contract it
//! is free to:
//!
//! * call `next` once and observe or transform the outcome (loggers, timers),
//! * derive a new context and pass that on instead (query rewriters),
//! * never call `next` and answer on its own (blockers, caches),
//! * call `next` several times (retry policies). Every interceptor further
//!   inside the chain runs again on each call, side effects included.

use crate::chain::Next;
use crate::types::{ExecutionContext, Outcome};

/// A unit of behaviour wrapped around a connection's execute primitive.
pub trait Interceptor: Send + Sync {
    /// Handles one call, usually by delegating to `next`.
    fn intercept(&self, next: Next<'_>, ctx: &ExecutionContext) -> Outcome;

    /// Name used in log events.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Interceptor backed by a closure. Built with [`from_fn`].
pub struct FnInterceptor<F> {
    name: &'static str,
    f: F,
}

/// Turns a closure into an [`Interceptor`].
///
/// ```
/// use sqlwrap::{from_fn, Next, ExecutionContext};
///
/// let passthrough = from_fn(|next: Next<'_>, ctx: &ExecutionContext| next.run(ctx));
/// # let _ = passthrough;
/// ```
pub fn from_fn<F>(f: F) -> FnInterceptor<F>
where
    F: Fn(Next<'_>, &ExecutionContext) -> Outcome + Send + Sync,
{
    FnInterceptor { name: "fn", f }
}

impl<F> FnInterceptor<F> {
    /// Sets the name reported in log events.
    pub fn named(mut self, name: &'static str) -> Self {
        self.name = name;
        self
    }
}

impl<F> Interceptor for FnInterceptor<F>
where
    F: Fn(Next<'_>, &ExecutionContext) -> Outcome + Send + Sync,
{
    fn intercept(&self, next: Next<'_>, ctx: &ExecutionContext) -> Outcome {
        (self.f)(next, ctx)
    }

    fn name(&self) -> &str {
        self.name
    }
}
