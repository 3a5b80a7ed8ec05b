use std::collections::HashMap;
use std::sync::Arc;

use tracing::info;

use crate::config::RegistryConfig;
use crate::connection::Connection;
use crate::error::{Error, Result};

/// Named connections with an optional default entry.
///
/// Each connection keeps its own interceptor stack; installing an
/// interceptor on one has no effect on any other.
#[derive(Debug, Default)]
pub struct Registry {
    connections: HashMap<String, Arc<Connection>>,
    default: Option<String>,
}

impl Registry {
    /// Creates an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Opens a SQLite connection for every configured entry.
    pub fn from_config(config: &RegistryConfig) -> Result<Self> {
        let mut registry = Self::new();
        for (name, settings) in config.connections() {
            registry.insert(Connection::open_sqlite(name, settings)?);
        }
        registry.set_default(config.default_connection())?;
        info!(
            connections = registry.len(),
            default = registry.default_name().unwrap_or("-"),
            "sqlwrap.registry.ready"
        );
        Ok(registry)
    }

    /// Adds `connection`, returning any entry it replaced.
    pub fn insert(&mut self, connection: Connection) -> Option<Arc<Connection>> {
        self.connections
            .insert(connection.name().to_owned(), Arc::new(connection))
    }

    /// Removes `name`. Clears the default if it pointed there.
    pub fn remove(&mut self, name: &str) -> Option<Arc<Connection>> {
        let removed = self.connections.remove(name);
        if removed.is_some() && self.default.as_deref() == Some(name) {
            self.default = None;
        }
        removed
    }

    /// Sets or clears the default connection.
    pub fn set_default(&mut self, name: Option<&str>) -> Result<()> {
        match name {
            Some(name) if !self.connections.contains_key(name) => {
                Err(Error::UnknownConnection(name.to_owned()))
            }
            Some(name) => {
                self.default = Some(name.to_owned());
                Ok(())
            }
            None => {
                self.default = None;
                Ok(())
            }
        }
    }

    /// Name of the default connection.
    pub fn default_name(&self) -> Option<&str> {
        self.default.as_deref()
    }

    /// Resolves `Some(name)` to that connection and `None` to the default.
    ///
    /// An explicit name never falls back to the default.
    pub fn resolve(&self, name: Option<&str>) -> Result<Arc<Connection>> {
        let key = match name.or(self.default.as_deref()) {
            Some(key) => key,
            None => return Err(Error::UnknownConnection("<default>".to_owned())),
        };
        self.connections
            .get(key)
            .cloned()
            .ok_or_else(|| Error::UnknownConnection(key.to_owned()))
    }

    /// Borrow a connection without cloning the handle.
    pub fn get(&self, name: &str) -> Option<&Arc<Connection>> {
        self.connections.get(name)
    }

    /// Connection names, sorted.
    pub fn names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.connections.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Number of connections.
    pub fn len(&self) -> usize {
        self.connections.len()
    }

    /// Returns `true` if no connection is registered.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::executor::executor_fn;
    use crate::types::QueryOutput;

    fn stub(name: &str) -> Connection {
        Connection::new(name, Arc::new(executor_fn(|_| Ok(QueryOutput::default()))))
    }

    #[test]
    fn resolve_by_name_and_default() -> Result<()> {
        let mut registry = Registry::new();
        registry.insert(stub("default"));
        registry.insert(stub("analytics"));
        registry.set_default(Some("default"))?;
        assert_eq!(registry.resolve(None)?.name(), "default");
        assert_eq!(registry.resolve(Some("analytics"))?.name(), "analytics");
        assert_eq!(registry.names(), vec!["analytics", "default"]);
        Ok(())
    }

    #[test]
    fn unknown_name_does_not_fall_back() {
        let mut registry = Registry::new();
        registry.insert(stub("default"));
        registry.set_default(Some("default")).unwrap();
        let err = registry.resolve(Some("replica")).unwrap_err();
        assert!(matches!(err, Error::UnknownConnection(name) if name == "replica"));
    }

    #[test]
    fn no_default_configured() {
        let mut registry = Registry::new();
        registry.insert(stub("primary"));
        assert!(matches!(registry.resolve(None), Err(Error::UnknownConnection(_))));
    }

    #[test]
    fn default_is_configurable() -> Result<()> {
        let mut registry = Registry::new();
        registry.insert(stub("primary"));
        registry.insert(stub("replica"));
        registry.set_default(Some("replica"))?;
        assert_eq!(registry.resolve(None)?.name(), "replica");
        assert!(registry.set_default(Some("missing")).is_err());
        assert_eq!(registry.default_name(), Some("replica"));
        Ok(())
    }

    #[test]
    fn removing_default_clears_it() {
        let mut registry = Registry::new();
        registry.insert(stub("primary"));
        registry.set_default(Some("primary")).unwrap();
        assert!(registry.remove("primary").is_some());
        assert_eq!(registry.default_name(), None);
        assert!(registry.is_empty());
    }
}
