//! Ready-made interceptors.
//!
//! Observers ([`QueryLogger`], [`TracingInterceptor`]), a short-circuiting
//! [`StatementBlocker`] and a [`RetryOnFailure`] policy.

mod blocker;
mod logger;
mod retry;
mod trace;

pub use blocker::StatementBlocker;
pub use logger::{QueryLogger, QueryRecord, QueryStatus};
pub use retry::{backoff_delay, RetryOnFailure};
pub use trace::TracingInterceptor;
