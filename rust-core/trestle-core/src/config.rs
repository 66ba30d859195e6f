//! # Configuration
//!
//! Layered loading, each layer overriding the previous:
//! 1. Default values
//! 2. Optional TOML file
//! 3. Environment variables (`APP_*`, `DB_*`)
//!
//! The `[database]` section only exists when a driver is configured.
//! A `.env` file can seed the environment first with [`load_dotenv`].

use crate::database::Driver;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::net::{SocketAddr, ToSocketAddrs};
use std::path::Path;
use std::time::Duration;
use url::Url;

/// Full application configuration
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// HTTP host settings
    #[serde(default)]
    pub server: ServerConfig,
    /// Database settings; `None` runs without a database
    #[serde(default)]
    pub database: Option<DatabaseConfig>,
}

/// HTTP server settings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind
    #[serde(default = "default_host")]
    pub host: String,
    /// Port to bind
    #[serde(default = "default_port")]
    pub port: u16,
    /// Largest accepted request body in bytes
    #[serde(default = "default_max_body_size")]
    pub max_body_size: usize,
    /// How long in-flight connections may drain on shutdown
    #[serde(default = "default_shutdown_timeout")]
    pub shutdown_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            max_body_size: default_max_body_size(),
            shutdown_timeout_secs: default_shutdown_timeout(),
        }
    }
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

const fn default_port() -> u16 {
    8000
}

const fn default_max_body_size() -> usize {
    1024 * 1024
}

const fn default_shutdown_timeout() -> u64 {
    30
}

impl ServerConfig {
    /// Resolve `host:port` to a socket address
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the host does not resolve.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        (self.host.as_str(), self.port)
            .to_socket_addrs()
            .map_err(|e| Error::config(format!("invalid server address {}:{}: {e}", self.host, self.port)))?
            .next()
            .ok_or_else(|| Error::config(format!("server address {}:{} did not resolve", self.host, self.port)))
    }

    /// Drain timeout as a `Duration`
    #[must_use]
    pub const fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }
}

/// Connection settings for one database
///
/// `driver` stays textual until connect time so an unknown value is
/// reported as `Error::UnsupportedDriver` rather than a parse failure.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    /// `mysql`, `pgsql` (or `postgres`), `sqlite`
    #[serde(default)]
    pub driver: String,
    /// Server host; unused for SQLite
    #[serde(default = "default_host")]
    pub host: String,
    /// Server port; the driver default when absent
    #[serde(default)]
    pub port: Option<u16>,
    /// Database name, or file path for SQLite (`:memory:` for in-memory)
    #[serde(default)]
    pub database: String,
    /// Login name
    #[serde(default)]
    pub username: String,
    /// Login password
    #[serde(default)]
    pub password: String,
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            driver: String::new(),
            host: default_host(),
            port: None,
            database: String::new(),
            username: String::new(),
            password: String::new(),
        }
    }
}

impl std::fmt::Debug for DatabaseConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DatabaseConfig")
            .field("driver", &self.driver)
            .field("host", &self.host)
            .field("port", &self.port)
            .field("database", &self.database)
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl DatabaseConfig {
    /// Parsed driver
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedDriver` for anything but the known names.
    pub fn driver(&self) -> Result<Driver> {
        self.driver.parse()
    }

    /// Port to connect to: the configured one or the driver default
    #[must_use]
    pub fn effective_port(&self) -> Option<u16> {
        self.port
            .or_else(|| self.driver().ok().and_then(Driver::default_port))
    }

    fn is_memory(&self) -> bool {
        self.database.is_empty() || self.database == ":memory:"
    }

    /// Connection URL for SQLx; credentials are percent-encoded
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedDriver` for an unknown driver and
    /// `Error::Config` for a host or credentials that cannot form a URL.
    pub fn connection_url(&self) -> Result<String> {
        let driver = self.driver()?;
        let scheme = match driver {
            Driver::Sqlite if self.is_memory() => return Ok("sqlite::memory:".to_string()),
            Driver::Sqlite => return Ok(format!("sqlite://{}", self.database)),
            Driver::MySql => "mysql",
            Driver::Postgres => "postgres",
        };

        let invalid = |what: &str| Error::config(format!("invalid database {what} for {driver}"));

        let mut url = Url::parse(&format!("{scheme}://localhost")).map_err(|_| invalid("scheme"))?;
        url.set_host(Some(&self.host)).map_err(|_| invalid("host"))?;
        url.set_port(self.effective_port()).map_err(|()| invalid("port"))?;
        if !self.username.is_empty() {
            url.set_username(&self.username).map_err(|()| invalid("username"))?;
        }
        if !self.password.is_empty() {
            url.set_password(Some(&self.password)).map_err(|()| invalid("password"))?;
        }
        url.set_path(&self.database);
        Ok(url.to_string())
    }

    /// Where the connection goes, without credentials (for logs and errors)
    #[must_use]
    pub fn endpoint(&self) -> String {
        match self.driver() {
            Ok(Driver::Sqlite) if self.is_memory() => ":memory:".to_string(),
            Ok(Driver::Sqlite) => self.database.clone(),
            _ => match self.effective_port() {
                Some(port) => format!("{}:{port}/{}", self.host, self.database),
                None => format!("{}/{}", self.host, self.database),
            },
        }
    }
}

impl AppConfig {
    /// Parse a TOML document
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the document is not valid configuration.
    pub fn from_toml(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| Error::config(format!("failed to parse config: {e}")))
    }

    /// Defaults, then `path` if given, then the process environment
    ///
    /// # Errors
    ///
    /// Returns `Error::Config` if the file cannot be read or parsed, or an
    /// environment value is malformed.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        Self::from_lookup(path, |key| std::env::var(key).ok())
    }

    /// Like [`Self::load`] with an injected environment lookup
    ///
    /// # Errors
    ///
    /// Same as [`Self::load`].
    pub fn from_lookup<F>(path: Option<&Path>, lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = match path {
            Some(path) => {
                let content = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("failed to read config file {}: {e}", path.display()))
                })?;
                Self::from_toml(&content)?
            }
            None => Self::default(),
        };

        config.apply_env(&lookup)?;
        Ok(config)
    }

    fn apply_env(&mut self, lookup: &impl Fn(&str) -> Option<String>) -> Result<()> {
        if let Some(host) = lookup("APP_HOST") {
            self.server.host = host;
        }
        if let Some(port) = parsed(lookup, "APP_PORT")? {
            self.server.port = port;
        }
        if let Some(size) = parsed(lookup, "APP_MAX_BODY_SIZE")? {
            self.server.max_body_size = size;
        }
        if let Some(secs) = parsed(lookup, "APP_SHUTDOWN_TIMEOUT")? {
            self.server.shutdown_timeout_secs = secs;
        }

        let mut db = self.database.take().unwrap_or_default();
        for (key, field) in [
            ("DB_DRIVER", &mut db.driver),
            ("DB_HOST", &mut db.host),
            ("DB_DATABASE", &mut db.database),
            ("DB_USERNAME", &mut db.username),
            ("DB_PASSWORD", &mut db.password),
        ] {
            if let Some(value) = lookup(key) {
                *field = value;
            }
        }
        if let Some(port) = parsed(lookup, "DB_PORT")? {
            db.port = Some(port);
        }
        self.database = (!db.driver.trim().is_empty()).then_some(db);
        Ok(())
    }
}

fn parsed<T: std::str::FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>> {
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse()
                .map_err(|_| Error::config(format!("{key} has an invalid value: {raw}")))
        })
        .transpose()
}

/// Parse `.env` content into `(key, value)` pairs
///
/// Blank lines and `#` comments are skipped, an optional `export ` prefix
/// is dropped, and one pair of surrounding quotes is stripped.
#[must_use]
pub fn parse_dotenv(content: &str) -> Vec<(String, String)> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .filter_map(|line| {
            let line = line.strip_prefix("export ").unwrap_or(line);
            let (key, value) = line.split_once('=')?;
            let key = key.trim();
            if key.is_empty() {
                return None;
            }
            Some((key.to_string(), unquote(value.trim()).to_string()))
        })
        .collect()
}

fn unquote(value: &str) -> &str {
    for quote in ['"', '\''] {
        if value.len() >= 2 && value.starts_with(quote) && value.ends_with(quote) {
            return &value[1..value.len() - 1];
        }
    }
    value
}

/// Load a `.env` file into the process environment
///
/// Variables already set are never overwritten. Returns how many were set.
///
/// # Errors
///
/// Returns `Error::Config` if the file cannot be read.
pub fn load_dotenv(path: &Path) -> Result<usize> {
    let content = std::fs::read_to_string(path)
        .map_err(|e| Error::config(format!("failed to read env file {}: {e}", path.display())))?;

    let mut loaded = 0;
    for (key, value) in parse_dotenv(&content) {
        if std::env::var_os(&key).is_none() {
            std::env::set_var(&key, value);
            loaded += 1;
        }
    }
    Ok(loaded)
}
