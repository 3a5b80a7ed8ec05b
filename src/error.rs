//! Error types.

use std::error::Error as StdError;
use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;

/// Result type alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by the interceptor machinery and the registry.
#[derive(Debug, Error)]
pub enum Error {
    /// A pop targeted something other than the top of an interceptor stack.
    #[error("stack discipline violation: expected top {expected}, got {found}")]
    StackDisciplineViolation {
        /// Token at the top of the stack (`none` when empty).
        expected: String,
        /// Token supplied to the pop.
        found: String,
    },
    /// Registry lookup for a name that is not configured.
    #[error("unknown connection '{0}'")]
    UnknownConnection(String),
    /// Failure raised by a terminal executor or an interceptor.
    #[error(transparent)]
    Execution(#[from] ExecutionFailure),
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// SQLite error while opening or configuring a connection.
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),
    /// Invalid argument supplied by the caller.
    #[error("invalid argument: {0}")]
    InvalidArgument(String),
}

/// Failure produced somewhere inside an execution chain.
///
/// Wraps the original error without adding context so the caller can recover
/// the concrete type with [`ExecutionFailure::downcast_ref`].
pub struct ExecutionFailure {
    source: Box<dyn StdError + Send + Sync + 'static>,
}

impl ExecutionFailure {
    /// Wraps an arbitrary error value.
    pub fn new<E>(err: E) -> Self
    where
        E: StdError + Send + Sync + 'static,
    {
        Self {
            source: Box::new(err),
        }
    }

    /// Wraps an already boxed error.
    pub fn from_boxed(source: Box<dyn StdError + Send + Sync + 'static>) -> Self {
        Self { source }
    }

    /// Returns `true` if the wrapped error is of type `E`.
    pub fn is<E: StdError + 'static>(&self) -> bool {
        self.source.is::<E>()
    }

    /// Borrows the wrapped error as `E` if it has that type.
    pub fn downcast_ref<E: StdError + 'static>(&self) -> Option<&E> {
        self.source.downcast_ref::<E>()
    }

    /// Recovers the wrapped error as `E`, or gives the failure back.
    pub fn downcast<E: StdError + 'static>(self) -> std::result::Result<E, Self> {
        match self.source.downcast::<E>() {
            Ok(err) => Ok(*err),
            Err(source) => Err(Self { source }),
        }
    }

    /// Borrows the wrapped error.
    pub fn get_ref(&self) -> &(dyn StdError + Send + Sync + 'static) {
        &*self.source
    }

    /// Unwraps into the boxed original error.
    pub fn into_inner(self) -> Box<dyn StdError + Send + Sync + 'static> {
        self.source
    }
}

impl fmt::Debug for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(&self.source, f)
    }
}

impl fmt::Display for ExecutionFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Display::fmt(&self.source, f)
    }
}

// Delegates to the wrapped error so the chain looks as if the original error
// had been returned directly.
impl StdError for ExecutionFailure {
    fn source(&self) -> Option<&(dyn StdError + 'static)> {
        self.source.source()
    }
}

impl From<rusqlite::Error> for ExecutionFailure {
    fn from(err: rusqlite::Error) -> Self {
        ExecutionFailure::new(err)
    }
}

/// Error returned by [`StatementBlocker`](crate::interceptors::StatementBlocker).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
#[error("query blocked: {sql}")]
pub struct QueryBlocked {
    /// Statement that was refused.
    pub sql: String,
}
