//! Configuration handling for the database wrapper.
//!
//! A [`WrapperConfig`] holds named connection strings plus the connection
//! options every wrapper instance is opened with. It can be built in code,
//! loaded from JSON, or read from `DB_WRAPPER_*` environment variables.

use crate::error::{DbError, DbResult};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use url::Url;

pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_ACQUIRE_TIMEOUT_SECS: u64 = 30;
pub const DEFAULT_SQLITE_BUSY_TIMEOUT_SECS: u64 = 5;

/// Prefix for connection strings read from the environment.
pub const CONNECTION_ENV_PREFIX: &str = "DB_WRAPPER_CONNECTION_";

/// Options applied to both connections of a wrapper instance.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct WrapperOptions {
    /// Default per-command timeout in seconds (default: 30)
    pub command_timeout_secs: Option<u64>,
    /// Connection acquire timeout in seconds (default: 30)
    pub acquire_timeout_secs: Option<u64>,
    /// SQLite busy timeout in seconds (default: 5)
    pub sqlite_busy_timeout_secs: Option<u64>,
    /// Put SQLite databases in WAL mode so the two connections can overlap (default: true)
    pub sqlite_wal: Option<bool>,
    /// Create the SQLite file when missing (default: true)
    pub sqlite_create_if_missing: Option<bool>,
}

impl WrapperOptions {
    /// Get command_timeout with default value.
    pub fn command_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.command_timeout_secs
                .unwrap_or(DEFAULT_COMMAND_TIMEOUT_SECS),
        )
    }

    /// Get acquire_timeout with default value.
    pub fn acquire_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.acquire_timeout_secs
                .unwrap_or(DEFAULT_ACQUIRE_TIMEOUT_SECS),
        )
    }

    /// Get sqlite_busy_timeout with default value.
    pub fn sqlite_busy_timeout_or_default(&self) -> Duration {
        Duration::from_secs(
            self.sqlite_busy_timeout_secs
                .unwrap_or(DEFAULT_SQLITE_BUSY_TIMEOUT_SECS),
        )
    }

    pub fn sqlite_wal_or_default(&self) -> bool {
        self.sqlite_wal.unwrap_or(true)
    }

    pub fn sqlite_create_if_missing_or_default(&self) -> bool {
        self.sqlite_create_if_missing.unwrap_or(true)
    }

    /// Validate options and return an error message if invalid.
    pub fn validate(&self) -> Result<(), String> {
        if self.command_timeout_secs == Some(0) {
            return Err("command_timeout_secs must be greater than 0".to_string());
        }
        if self.acquire_timeout_secs == Some(0) {
            return Err("acquire_timeout_secs must be greater than 0".to_string());
        }
        Ok(())
    }
}

/// Named connection strings plus shared options.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WrapperConfig {
    #[serde(default, alias = "ConnectionStrings")]
    pub connection_strings: HashMap<String, String>,
    #[serde(default)]
    pub options: WrapperOptions,
}

impl WrapperConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a named connection string.
    pub fn with_connection(
        mut self,
        name: impl Into<String>,
        connection_string: impl Into<String>,
    ) -> Self {
        self.connection_strings
            .insert(name.into(), connection_string.into());
        self
    }

    pub fn with_options(mut self, options: WrapperOptions) -> Self {
        self.options = options;
        self
    }

    /// Parse configuration from a JSON document.
    ///
    /// Accepts both `connection_strings` and the `ConnectionStrings` section
    /// name used by application settings files.
    pub fn from_json_str(json: &str) -> DbResult<Self> {
        let config: Self = serde_json::from_str(json)
            .map_err(|e| DbError::configuration(format!("Invalid configuration JSON: {e}")))?;
        config.options.validate().map_err(DbError::configuration)?;
        Ok(config)
    }

    /// Collect connection strings from `DB_WRAPPER_CONNECTION_<NAME>` variables.
    ///
    /// Names are lowercased, so `DB_WRAPPER_CONNECTION_MAIN` registers `main`.
    pub fn from_env() -> Self {
        Self::from_vars(std::env::vars())
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Self {
        let connection_strings = vars
            .into_iter()
            .filter_map(|(key, value)| {
                key.strip_prefix(CONNECTION_ENV_PREFIX)
                    .filter(|name| !name.is_empty())
                    .map(|name| (name.to_lowercase(), value))
            })
            .collect();
        Self {
            connection_strings,
            options: WrapperOptions::default(),
        }
    }

    /// Resolve a value that is either a connection string or the name of one.
    ///
    /// Anything that parses as a URL is returned unchanged. Otherwise the value
    /// is looked up by name.
    pub fn connection_string(&self, name_or_connection_string: &str) -> DbResult<String> {
        if is_connection_string(name_or_connection_string) {
            return Ok(name_or_connection_string.to_string());
        }
        self.connection_strings
            .get(name_or_connection_string)
            .cloned()
            .ok_or_else(|| {
                DbError::configuration(format!(
                    "Could not find connection string with name '{}'.",
                    name_or_connection_string
                ))
            })
    }
}

/// True when the value looks like a connection URL or an ADO.NET
/// `key=value;` string rather than a name.
pub fn is_connection_string(value: &str) -> bool {
    // "sqlite:path" parses as a URL with an opaque path
    Url::parse(value).is_ok() || value.contains('=')
}
