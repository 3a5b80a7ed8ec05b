//! Scoped installation of interceptors.

use std::sync::Arc;

use tracing::{debug, error};

use crate::connection::Connection;
use crate::error::Result;
use crate::interceptor::Interceptor;
use crate::stack::StackToken;

/// Keeps one interceptor installed on a connection for as long as it lives.
///
/// Dropping the guard pops the interceptor, whether the enclosing block
/// returns normally, bails out early with `?`, or unwinds. Use
/// [`ScopeGuard::exit`] to release explicitly and observe discipline errors.
#[must_use = "the interceptor is removed as soon as the guard is dropped"]
pub struct ScopeGuard<'c> {
    connection: &'c Connection,
    token: Option<StackToken>,
}

impl<'c> ScopeGuard<'c> {
    /// Pushes `interceptor` on `connection` and returns the guard owning that
    /// push.
    pub fn enter(connection: &'c Connection, interceptor: Arc<dyn Interceptor>) -> Self {
        let name = interceptor.name().to_owned();
        let token = connection.push_interceptor(interceptor);
        debug!(
            connection = connection.name(),
            interceptor = %name,
            token = %token,
            "sqlwrap.scope.enter"
        );
        Self {
            connection,
            token: Some(token),
        }
    }

    /// Token of the push this guard owns, `None` once released.
    pub fn token(&self) -> Option<StackToken> {
        self.token
    }

    /// Connection the interceptor is installed on.
    pub fn connection(&self) -> &'c Connection {
        self.connection
    }

    /// Pops the interceptor now.
    ///
    /// Fails with [`Error::StackDisciplineViolation`](crate::Error::StackDisciplineViolation)
    /// if something pushed later is still installed. The interceptor is then
    /// removed together with the last of those later pushes.
    pub fn exit(mut self) -> Result<()> {
        self.release()
    }

    fn release(&mut self) -> Result<()> {
        let Some(token) = self.token.take() else {
            return Ok(());
        };
        debug!(connection = self.connection.name(), token = %token, "sqlwrap.scope.exit");
        self.connection.release_interceptor(token)
    }
}

impl Drop for ScopeGuard<'_> {
    fn drop(&mut self) {
        if let Err(err) = self.release() {
            error!(connection = self.connection.name(), error = %err, "sqlwrap.scope.release_failed");
            if !std::thread::panicking() {
                panic!("interceptor scope released out of order: {err}");
            }
        }
    }
}
