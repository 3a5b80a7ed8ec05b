//! Registry configuration loaded from TOML.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;

/// Name used for the default connection when the config does not pick one.
pub const DEFAULT_CONNECTION: &str = "default";

/// Environment variable overriding the config file location.
pub const CONFIG_ENV: &str = "SQLWRAP_CONFIG";

const MEMORY_PATH: &str = ":memory:";
const JOURNAL_MODES: &[&str] = &["delete", "truncate", "persist", "memory", "wal", "off"];

/// Settings for one SQLite connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConnectionSettings {
    /// Database file, or `:memory:`.
    pub path: PathBuf,
    /// Open the database read-only.
    pub read_only: bool,
    /// How long SQLite waits on a locked database before failing.
    pub busy_timeout: Option<Duration>,
    /// Journal mode applied after opening.
    pub journal_mode: Option<String>,
}

impl ConnectionSettings {
    /// Settings for a private in-memory database.
    pub fn in_memory() -> Self {
        Self::file(MEMORY_PATH)
    }

    /// Settings for a database file with defaults for everything else.
    pub fn file(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            read_only: false,
            busy_timeout: None,
            journal_mode: None,
        }
    }

    /// Returns `true` for an in-memory database.
    pub fn is_memory(&self) -> bool {
        self.path.as_os_str() == MEMORY_PATH
    }
}

/// Validated registry configuration.
#[derive(Clone, Debug, Default)]
pub struct RegistryConfig {
    source: Option<PathBuf>,
    default: Option<String>,
    connections: BTreeMap<String, ConnectionSettings>,
}

impl RegistryConfig {
    /// Loads the config from `explicit`, then `SQLWRAP_CONFIG`, then the
    /// platform config directory. A missing file yields an empty config.
    pub fn load(explicit: Option<PathBuf>) -> Result<Self, ConfigError> {
        let path = explicit
            .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
            .or_else(default_config_path);
        let Some(path) = path else {
            return Ok(Self::default());
        };
        if !path.exists() {
            return Ok(Self {
                source: Some(path),
                ..Self::default()
            });
        }
        let mut config = Self::from_file(&path)?;
        config.source = Some(path);
        Ok(config)
    }

    /// Reads and validates a config file.
    pub fn from_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let raw: RawConfig = toml::from_str(&contents).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = convert(raw)?;
        config.source = Some(path.to_path_buf());
        Ok(config)
    }

    /// Parses and validates config text.
    pub fn from_toml_str(contents: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = toml::from_str(contents).map_err(|source| ConfigError::Parse {
            path: PathBuf::from("<inline>"),
            source,
        })?;
        convert(raw)
    }

    /// Config with one in-memory connection named `default`.
    pub fn in_memory() -> Self {
        let mut connections = BTreeMap::new();
        connections.insert(DEFAULT_CONNECTION.to_owned(), ConnectionSettings::in_memory());
        Self {
            source: None,
            default: Some(DEFAULT_CONNECTION.to_owned()),
            connections,
        }
    }

    /// File the config came from, if any.
    pub fn source(&self) -> Option<&Path> {
        self.source.as_deref()
    }

    /// Name of the default connection.
    ///
    /// The explicit `default` key wins; otherwise a connection literally named
    /// `default` is used.
    pub fn default_connection(&self) -> Option<&str> {
        self.default.as_deref().or_else(|| {
            self.connections
                .contains_key(DEFAULT_CONNECTION)
                .then_some(DEFAULT_CONNECTION)
        })
    }

    /// Settings for `name`.
    pub fn connection(&self, name: &str) -> Option<&ConnectionSettings> {
        self.connections.get(name)
    }

    /// All connections, sorted by name.
    pub fn connections(&self) -> impl Iterator<Item = (&str, &ConnectionSettings)> {
        self.connections
            .iter()
            .map(|(name, settings)| (name.as_str(), settings))
    }

    /// Returns `true` if no connection is configured.
    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

fn convert(raw: RawConfig) -> Result<RegistryConfig, ConfigError> {
    let mut connections = BTreeMap::new();
    for (name, raw_conn) in raw.connections {
        let settings = convert_connection(&name, raw_conn)?;
        connections.insert(name, settings);
    }
    if let Some(default) = raw.default.as_ref() {
        if !connections.contains_key(default) {
            return Err(ConfigError::DefaultNotFound {
                name: default.clone(),
            });
        }
    }
    Ok(RegistryConfig {
        source: None,
        default: raw.default,
        connections,
    })
}

fn convert_connection(name: &str, raw: RawConnection) -> Result<ConnectionSettings, ConfigError> {
    let journal_mode = match raw.journal_mode {
        Some(mode) => {
            let lowered = mode.to_ascii_lowercase();
            if !JOURNAL_MODES.contains(&lowered.as_str()) {
                return Err(ConfigError::InvalidJournalMode {
                    connection: name.to_owned(),
                    value: mode,
                });
            }
            Some(lowered)
        }
        None => None,
    };
    Ok(ConnectionSettings {
        path: raw.path,
        read_only: raw.read_only.unwrap_or(false),
        busy_timeout: raw.busy_timeout_ms.map(Duration::from_millis),
        journal_mode,
    })
}

#[derive(Debug, Default, Deserialize)]
struct RawConfig {
    #[serde(default)]
    default: Option<String>,
    #[serde(default)]
    connections: BTreeMap<String, RawConnection>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct RawConnection {
    path: PathBuf,
    read_only: Option<bool>,
    busy_timeout_ms: Option<u64>,
    journal_mode: Option<String>,
}

/// Errors raised while loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The file exists but could not be read.
    #[error("failed to read config {path}: {source}")]
    Read {
        /// Config path.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// The file is not valid TOML or has unexpected keys.
    #[error("failed to parse config {path}: {source}")]
    Parse {
        /// Config path.
        path: PathBuf,
        /// Underlying parse error.
        source: toml::de::Error,
    },
    /// `default` names a connection that is not configured.
    #[error("default connection '{name}' is not configured")]
    DefaultNotFound {
        /// Name given as default.
        name: String,
    },
    /// Unsupported journal mode.
    #[error("connection '{connection}' journal_mode '{value}' is invalid")]
    InvalidJournalMode {
        /// Connection name.
        connection: String,
        /// Value found in the file.
        value: String,
    },
}

/// Platform default config location, e.g. `~/.config/sqlwrap/config.toml`.
pub fn default_config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|base| base.join("sqlwrap").join("config.toml"))
}
