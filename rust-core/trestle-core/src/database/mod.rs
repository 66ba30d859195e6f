//! # Database Module
//!
//! Driver-agnostic database access built on SQLx.
//!
//! - [`DatabaseAdapter`]: the uniform contract (query, CRUD, transactions)
//! - [`SqliteAdapter`], [`MySqlAdapter`], [`PostgresAdapter`]: one open
//!   connection each, differing only in placeholder syntax and URL
//! - [`Adapter`]: tagged union over the three, chosen from configuration
//! - [`Database`]: explicitly constructed binding holding at most one adapter
//! - [`QueryBuilder`]: fluent SELECT rendering plus CRUD delegation
//!
//! Statements are always parameterized. Only table and column identifiers
//! are interpolated into SQL text; callers must not pass untrusted
//! identifiers.

mod connection;
mod mysql;
mod postgres;
mod query;
pub mod sql;
mod sqlite;

pub use connection::Database;
pub use mysql::MySqlAdapter;
pub use postgres::PostgresAdapter;
pub use query::{Direction, JoinKind, QueryBuilder};
pub use sqlite::SqliteAdapter;

use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::future::Future;
use std::str::FromStr;

/// A single column value, bound as a statement parameter or read from a row
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DbValue {
    /// Null value
    Null,
    /// Boolean value
    Bool(bool),
    /// Integer value
    Int(i64),
    /// Float value
    Float(f64),
    /// String value
    String(String),
    /// Binary data
    Bytes(Vec<u8>),
}

impl DbValue {
    /// True for `Null`
    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Integer view; numeric strings are parsed
    #[must_use]
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Int(i) => Some(*i),
            Self::String(s) => s.parse().ok(),
            _ => None,
        }
    }

    /// String view
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Convert a JSON value; arrays and objects are stored as JSON text
    #[must_use]
    pub fn from_json(value: &Value) -> Self {
        match value {
            Value::Null => Self::Null,
            Value::Bool(b) => Self::Bool(*b),
            Value::Number(n) => n
                .as_i64()
                .map_or_else(|| Self::Float(n.as_f64().unwrap_or_default()), Self::Int),
            Value::String(s) => Self::String(s.clone()),
            Value::Array(_) | Value::Object(_) => Self::String(value.to_string()),
        }
    }
}

impl fmt::Display for DbValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("NULL"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Int(i) => write!(f, "{i}"),
            Self::Float(x) => write!(f, "{x}"),
            Self::String(s) => f.write_str(s),
            Self::Bytes(b) => write!(f, "<{} bytes>", b.len()),
        }
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        Self::Int(v)
    }
}

impl From<i32> for DbValue {
    fn from(v: i32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<u32> for DbValue {
    fn from(v: u32) -> Self {
        Self::Int(i64::from(v))
    }
}

impl From<f64> for DbValue {
    fn from(v: f64) -> Self {
        Self::Float(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        Self::Bool(v)
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        Self::String(v)
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        Self::String(v.to_string())
    }
}

impl From<Vec<u8>> for DbValue {
    fn from(v: Vec<u8>) -> Self {
        Self::Bytes(v)
    }
}

impl<T: Into<Self>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map_or(Self::Null, Into::into)
    }
}

impl From<&Value> for DbValue {
    fn from(v: &Value) -> Self {
        Self::from_json(v)
    }
}

impl From<DbValue> for Value {
    fn from(v: DbValue) -> Self {
        match v {
            DbValue::Null => Self::Null,
            DbValue::Bool(b) => Self::Bool(b),
            DbValue::Int(i) => Self::from(i),
            DbValue::Float(x) => Self::from(x),
            DbValue::String(s) => Self::String(s),
            DbValue::Bytes(b) => Self::from(b),
        }
    }
}

/// A row, or a column-to-value map for writes; columns are kept sorted so
/// rendered statements are deterministic
pub type Record = BTreeMap<String, DbValue>;

/// Build a [`Record`] from `(column, value)` pairs
pub fn record<I, K, V>(pairs: I) -> Record
where
    I: IntoIterator<Item = (K, V)>,
    K: Into<String>,
    V: Into<DbValue>,
{
    pairs.into_iter().map(|(k, v)| (k.into(), v.into())).collect()
}

/// Supported SQL dialects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Driver {
    /// MySQL / MariaDB
    MySql,
    /// PostgreSQL
    Postgres,
    /// SQLite
    Sqlite,
}

impl Driver {
    /// Name used in configuration
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::MySql => "mysql",
            Self::Postgres => "pgsql",
            Self::Sqlite => "sqlite",
        }
    }

    /// Port used when configuration leaves it out
    #[must_use]
    pub const fn default_port(self) -> Option<u16> {
        match self {
            Self::MySql => Some(3306),
            Self::Postgres => Some(5432),
            Self::Sqlite => None,
        }
    }

    /// Statement opening a transaction
    #[must_use]
    pub const fn begin_statement(self) -> &'static str {
        match self {
            Self::MySql => "START TRANSACTION",
            Self::Postgres | Self::Sqlite => "BEGIN",
        }
    }
}

impl fmt::Display for Driver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Driver {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mysql" => Ok(Self::MySql),
            "pgsql" | "postgres" | "postgresql" => Ok(Self::Postgres),
            "sqlite" => Ok(Self::Sqlite),
            _ => Err(Error::UnsupportedDriver {
                driver: s.to_string(),
            }),
        }
    }
}

/// Uniform operations over one open database connection
///
/// SQL passed to `query` and `execute` uses `?` placeholders; adapters
/// translate them to their dialect. Write helpers render their statement
/// through [`sql`] and only differ per adapter in how it is executed.
///
/// Transactions are flat: `begin_transaction` while one is active fails
/// with `Error::Transaction`, as do `commit` and `rollback` without one.
/// The open flag is raised before `BEGIN` runs and cleared only once
/// `COMMIT` succeeded or `ROLLBACK` ran, so an interrupted transaction
/// still reads as open.
pub trait DatabaseAdapter: Send + 'static {
    /// Open a connection
    fn connect(config: &DatabaseConfig) -> impl Future<Output = Result<Self>> + Send
    where
        Self: Sized;

    /// Close the connection
    fn close(self) -> impl Future<Output = Result<()>> + Send
    where
        Self: Sized;

    /// Dialect of this adapter
    fn driver(&self) -> Driver;

    /// Run a statement returning rows
    fn query(&mut self, sql: &str, params: &[DbValue]) -> impl Future<Output = Result<Vec<Record>>> + Send;

    /// Run a statement returning the affected row count
    fn execute(&mut self, sql: &str, params: &[DbValue]) -> impl Future<Output = Result<u64>> + Send;

    /// Run a parameterless control statement (`BEGIN`, `COMMIT`, ...)
    fn execute_raw(&mut self, sql: &str) -> impl Future<Output = Result<()>> + Send;

    /// Id generated by the most recent insert on this connection
    fn last_insert_id(&mut self) -> impl Future<Output = Result<String>> + Send;

    /// Whether a transaction is open
    fn in_transaction(&self) -> bool;

    /// Record transaction state around control statements
    fn set_in_transaction(&mut self, active: bool);

    /// Insert one row; returns the affected row count
    fn insert(&mut self, table: &str, data: &Record) -> impl Future<Output = Result<u64>> + Send {
        async move {
            let (statement, params) = sql::insert(table, data)?;
            self.execute(&statement, &params).await
        }
    }

    /// Update rows matching every equality condition
    fn update(
        &mut self,
        table: &str,
        data: &Record,
        conditions: &Record,
    ) -> impl Future<Output = Result<u64>> + Send {
        async move {
            let (statement, params) = sql::update(table, data, conditions)?;
            self.execute(&statement, &params).await
        }
    }

    /// Delete rows matching every equality condition
    fn delete(&mut self, table: &str, conditions: &Record) -> impl Future<Output = Result<u64>> + Send {
        async move {
            let (statement, params) = sql::delete(table, conditions)?;
            self.execute(&statement, &params).await
        }
    }

    /// Open a transaction
    fn begin_transaction(&mut self) -> impl Future<Output = Result<()>> + Send {
        async move {
            if self.in_transaction() {
                return Err(Error::transaction("a transaction is already active"));
            }
            let statement = self.driver().begin_statement();
            self.set_in_transaction(true);
            if let Err(e) = self.execute_raw(statement).await {
                self.set_in_transaction(false);
                return Err(e);
            }
            Ok(())
        }
    }

    /// Commit the open transaction
    fn commit(&mut self) -> impl Future<Output = Result<()>> + Send {
        async move {
            if !self.in_transaction() {
                return Err(Error::transaction("commit without an active transaction"));
            }
            self.execute_raw("COMMIT").await?;
            self.set_in_transaction(false);
            Ok(())
        }
    }

    /// Roll back the open transaction
    fn rollback(&mut self) -> impl Future<Output = Result<()>> + Send {
        async move {
            if !self.in_transaction() {
                return Err(Error::transaction("rollback without an active transaction"));
            }
            let outcome = self.execute_raw("ROLLBACK").await;
            self.set_in_transaction(false);
            outcome
        }
    }
}

/// Adapter selected by the configured driver
pub enum Adapter {
    /// MySQL connection
    MySql(MySqlAdapter),
    /// PostgreSQL connection
    Postgres(PostgresAdapter),
    /// SQLite connection
    Sqlite(SqliteAdapter),
}

impl DatabaseAdapter for Adapter {
    async fn connect(config: &DatabaseConfig) -> Result<Self> {
        match config.driver()? {
            Driver::MySql => Ok(Self::MySql(MySqlAdapter::connect(config).await?)),
            Driver::Postgres => Ok(Self::Postgres(PostgresAdapter::connect(config).await?)),
            Driver::Sqlite => Ok(Self::Sqlite(SqliteAdapter::connect(config).await?)),
        }
    }

    async fn close(self) -> Result<()> {
        match self {
            Self::MySql(a) => a.close().await,
            Self::Postgres(a) => a.close().await,
            Self::Sqlite(a) => a.close().await,
        }
    }

    fn driver(&self) -> Driver {
        match self {
            Self::MySql(_) => Driver::MySql,
            Self::Postgres(_) => Driver::Postgres,
            Self::Sqlite(_) => Driver::Sqlite,
        }
    }

    async fn query(&mut self, sql: &str, params: &[DbValue]) -> Result<Vec<Record>> {
        match self {
            Self::MySql(a) => a.query(sql, params).await,
            Self::Postgres(a) => a.query(sql, params).await,
            Self::Sqlite(a) => a.query(sql, params).await,
        }
    }

    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> Result<u64> {
        match self {
            Self::MySql(a) => a.execute(sql, params).await,
            Self::Postgres(a) => a.execute(sql, params).await,
            Self::Sqlite(a) => a.execute(sql, params).await,
        }
    }

    async fn execute_raw(&mut self, sql: &str) -> Result<()> {
        match self {
            Self::MySql(a) => a.execute_raw(sql).await,
            Self::Postgres(a) => a.execute_raw(sql).await,
            Self::Sqlite(a) => a.execute_raw(sql).await,
        }
    }

    async fn last_insert_id(&mut self) -> Result<String> {
        match self {
            Self::MySql(a) => a.last_insert_id().await,
            Self::Postgres(a) => a.last_insert_id().await,
            Self::Sqlite(a) => a.last_insert_id().await,
        }
    }

    fn in_transaction(&self) -> bool {
        match self {
            Self::MySql(a) => a.in_transaction(),
            Self::Postgres(a) => a.in_transaction(),
            Self::Sqlite(a) => a.in_transaction(),
        }
    }

    fn set_in_transaction(&mut self, active: bool) {
        match self {
            Self::MySql(a) => a.set_in_transaction(active),
            Self::Postgres(a) => a.set_in_transaction(active),
            Self::Sqlite(a) => a.set_in_transaction(active),
        }
    }
}

/// Wrap a SQLx error with the statement context
pub(crate) fn statement_error(driver: Driver, err: &sqlx::Error) -> Error {
    tracing::error!(driver = driver.name(), error = %err, "Statement failed");
    Error::Database {
        message: format!("{driver}: {err}"),
    }
}
