//! MySQL adapter over a single `MySqlConnection`

use super::{statement_error, DatabaseAdapter, DbValue, Driver, Record};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use sqlx::mysql::{MySql, MySqlArguments, MySqlConnection, MySqlRow};
use sqlx::query::Query;
use sqlx::{Column, Connection, Executor, Row, TypeInfo, ValueRef};
use tracing::{debug, info};

const DRIVER: Driver = Driver::MySql;

/// MySQL connection
pub struct MySqlAdapter {
    conn: MySqlConnection,
    last_id: u64,
    in_transaction: bool,
}

fn bind<'q>(query: Query<'q, MySql, MySqlArguments>, value: &DbValue) -> Query<'q, MySql, MySqlArguments> {
    match value {
        DbValue::Null => query.bind(None::<i64>),
        DbValue::Bool(b) => query.bind(*b),
        DbValue::Int(i) => query.bind(*i),
        DbValue::Float(f) => query.bind(*f),
        DbValue::String(s) => query.bind(s.clone()),
        DbValue::Bytes(b) => query.bind(b.clone()),
    }
}

fn prepare<'q>(sql: &'q str, params: &[DbValue]) -> Query<'q, MySql, MySqlArguments> {
    params.iter().fold(sqlx::query(sql), bind)
}

impl DatabaseAdapter for MySqlAdapter {
    async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.connection_url()?;
        let conn = MySqlConnection::connect(&url)
            .await
            .map_err(|e| Error::Connection {
                driver: DRIVER.name(),
                message: format!("could not connect to {}: {e}", config.endpoint()),
            })?;

        info!(driver = DRIVER.name(), endpoint = %config.endpoint(), "Database connected");
        Ok(Self {
            conn,
            last_id: 0,
            in_transaction: false,
        })
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
        if result.last_insert_id() != 0 {
            self.last_id = result.last_insert_id();
        }
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

/// Convert a MySQL row by declared column type
///
/// Types without a lossless mapping (DECIMAL, temporal types) come back as
/// text when the server sends them as text and as `Null` otherwise.
fn row_to_record(row: &MySqlRow) -> Record {
    let mut record = Record::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        if row.try_get_raw(i).map_or(true, |raw| raw.is_null()) {
            record.insert(name, DbValue::Null);
            continue;
        }

        let type_name = column.type_info().name();
        let value = match type_name {
            "BOOLEAN" => row.try_get::<bool, _>(i).map(DbValue::Bool),
            t if t.ends_with("UNSIGNED") => row
                .try_get::<u64, _>(i)
                .map(|v| i64::try_from(v).map_or_else(|_| DbValue::String(v.to_string()), DbValue::Int)),
            "TINYINT" | "SMALLINT" | "MEDIUMINT" | "INT" | "BIGINT" | "YEAR" => {
                row.try_get::<i64, _>(i).map(DbValue::Int)
            }
            "FLOAT" => row.try_get::<f32, _>(i).map(|v| DbValue::Float(f64::from(v))),
            "DOUBLE" => row.try_get::<f64, _>(i).map(DbValue::Float),
            "BINARY" | "VARBINARY" | "TINYBLOB" | "BLOB" | "MEDIUMBLOB" | "LONGBLOB" => {
                row.try_get::<Vec<u8>, _>(i).map(DbValue::Bytes)
            }
            _ => row.try_get::<String, _>(i).map(DbValue::String),
        }
        .unwrap_or(DbValue::Null);

        record.insert(name, value);
    }

    record
}
