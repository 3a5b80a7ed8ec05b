//! Query-execution interceptors for SQL connections.
//!
//! Wrap every statement a [`Connection`] executes without touching the call
//! sites: install an [`Interceptor`] for a scope with
//! [`Connection::execute_wrapper`], and each [`Cursor`] call made while the
//! returned [`ScopeGuard`] lives runs through it.
//!
//! ```
//! use std::sync::Arc;
//! use sqlwrap::interceptors::QueryLogger;
//! use sqlwrap::{Connection, SqliteExecutor};
//!
//! let conn = Connection::new("default", Arc::new(SqliteExecutor::open_in_memory().unwrap()));
//! let logger = QueryLogger::new();
//! {
//!     let _scope = conn.execute_wrapper(logger.clone());
//!     conn.cursor().execute_plain("SELECT 1").unwrap();
//! }
//! assert_eq!(logger.queries()[0].sql, "SELECT 1");
//! ```
//!
//! Interceptors compose in installation order: the first one installed sees
//! the call first and the outcome last, the most recent one runs right next
//! to the database.

#![warn(missing_docs)]

pub mod chain;
pub mod config;
mod connection;
pub mod cursor;
pub mod error;
pub mod executor;
pub mod interceptor;
pub mod interceptors;
pub mod logging;
mod registry;
pub mod scope;
pub mod stack;
pub mod types;

pub use chain::{Chain, ChainBuilder, Next, Snapshot};
pub use config::{ConnectionSettings, RegistryConfig};
pub use connection::Connection;
pub use cursor::Cursor;
pub use error::{Error, ExecutionFailure, QueryBlocked, Result};
pub use executor::{executor_fn, Executor, SqliteExecutor};
pub use interceptor::{from_fn, FnInterceptor, Interceptor};
pub use registry::Registry;
pub use scope::ScopeGuard;
pub use stack::{InterceptorStack, StackToken};
pub use types::{Correlation, ExecutionContext, Outcome, Params, QueryOutput, Value};
