//! SQLite adapter over a single `SqliteConnection`

use super::{statement_error, DatabaseAdapter, DbValue, Driver, Record};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use sqlx::query::Query;
use sqlx::sqlite::{Sqlite, SqliteArguments, SqliteConnectOptions, SqliteConnection, SqliteRow};
use sqlx::{Column, ConnectOptions, Connection, Executor, Row, TypeInfo, ValueRef};
use std::str::FromStr;
use tracing::{debug, info};

const DRIVER: Driver = Driver::Sqlite;

/// SQLite connection
pub struct SqliteAdapter {
    conn: SqliteConnection,
    last_id: i64,
    in_transaction: bool,
}

impl SqliteAdapter {
    /// Open a database by URL (`sqlite::memory:`, `sqlite://app.db`)
    ///
    /// The file is created when missing.
    ///
    /// # Errors
    ///
    /// Returns `Error::Connection` if the URL is malformed or the database
    /// cannot be opened.
    pub async fn open(url: &str) -> Result<Self> {
        let options = SqliteConnectOptions::from_str(url)
            .map_err(|e| Error::Connection {
                driver: DRIVER.name(),
                message: format!("invalid database url: {e}"),
            })?
            .create_if_missing(true);

        let conn = options.connect().await.map_err(|e| Error::Connection {
            driver: DRIVER.name(),
            message: format!("could not open {url}: {e}"),
        })?;

        info!(driver = DRIVER.name(), url = url, "Database connected");
        Ok(Self {
            conn,
            last_id: 0,
            in_transaction: false,
        })
    }
}

fn bind<'q>(
    query: Query<'q, Sqlite, SqliteArguments<'q>>,
    value: &DbValue,
) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    match value {
        DbValue::Null => query.bind(None::<i64>),
        DbValue::Bool(b) => query.bind(*b),
        DbValue::Int(i) => query.bind(*i),
        DbValue::Float(f) => query.bind(*f),
        DbValue::String(s) => query.bind(s.clone()),
        DbValue::Bytes(b) => query.bind(b.clone()),
    }
}

fn prepare<'q>(sql: &'q str, params: &[DbValue]) -> Query<'q, Sqlite, SqliteArguments<'q>> {
    params.iter().fold(sqlx::query(sql), bind)
}

impl DatabaseAdapter for SqliteAdapter {
    async fn connect(config: &DatabaseConfig) -> Result<Self> {
        Self::open(&config.connection_url()?).await
    }

    async fn close(self) -> Result<()> {
        self.conn.close().await.map_err(|e| statement_error(DRIVER, &e))?;
        info!(driver = DRIVER.name(), "Database disconnected");
        Ok(())
    }

    fn driver(&self) -> Driver {
        DRIVER
    }

    async fn query(&mut self, sql: &str, params: &[DbValue]) -> Result<Vec<Record>> {
        debug!(driver = DRIVER.name(), sql = sql, bindings = params.len(), "Running query");
        let rows = prepare(sql, params)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| statement_error(DRIVER, &e))?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> Result<u64> {
        debug!(driver = DRIVER.name(), sql = sql, bindings = params.len(), "Executing statement");
        let result = prepare(sql, params)
            .execute(&mut self.conn)
            .await
            .map_err(|e| statement_error(DRIVER, &e))?;
        self.last_id = result.last_insert_rowid();
        Ok(result.rows_affected())
    }

    async fn execute_raw(&mut self, sql: &str) -> Result<()> {
        debug!(driver = DRIVER.name(), sql = sql, "Executing control statement");
        self.conn
            .execute(sql)
            .await
            .map_err(|e| statement_error(DRIVER, &e))?;
        Ok(())
    }

    async fn last_insert_id(&mut self) -> Result<String> {
        Ok(self.last_id.to_string())
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn set_in_transaction(&mut self, active: bool) {
        self.in_transaction = active;
    }
}

/// Convert a SQLite row using the storage class of each value
fn row_to_record(row: &SqliteRow) -> Record {
    let mut record = Record::new();

    for (i, column) in row.columns().iter().enumerate() {
        let storage = match row.try_get_raw(i) {
            Ok(raw) if !raw.is_null() => raw.type_info().name().to_string(),
            _ => {
                record.insert(column.name().to_string(), DbValue::Null);
                continue;
            }
        };

        let value = match storage.as_str() {
            "INTEGER" | "BOOLEAN" => row.try_get::<i64, _>(i).map(DbValue::Int),
            "REAL" => row.try_get::<f64, _>(i).map(DbValue::Float),
            "BLOB" => row.try_get::<Vec<u8>, _>(i).map(DbValue::Bytes),
            _ => row.try_get::<String, _>(i).map(DbValue::String),
        }
        .unwrap_or(DbValue::Null);

        record.insert(column.name().to_string(), value);
    }

    record
}
