//! PostgreSQL adapter over a single `PgConnection`
//!
//! Statements arrive with `?` placeholders and are numbered (`$1..$n`)
//! before they are prepared.

use super::{sql, statement_error, DatabaseAdapter, DbValue, Driver, Record};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use sqlx::encode::IsNull;
use sqlx::postgres::types::Oid;
use sqlx::postgres::{PgArgumentBuffer, PgArguments, PgConnection, PgRow, PgTypeInfo, Postgres};
use sqlx::query::Query;
use sqlx::{Column, Connection, Encode, Executor, Row, Type, TypeInfo, ValueRef};
use tracing::{debug, info};

const DRIVER: Driver = Driver::Postgres;

/// PostgreSQL connection
pub struct PostgresAdapter {
    conn: PgConnection,
    in_transaction: bool,
}

/// NULL sent with an unspecified parameter type (oid 0), so the server
/// infers the type from the column or expression it lands in
struct UntypedNull;

impl Type<Postgres> for UntypedNull {
    fn type_info() -> PgTypeInfo {
        PgTypeInfo::with_oid(Oid(0))
    }
}

impl Encode<'_, Postgres> for UntypedNull {
    fn encode_by_ref(&self, _buf: &mut PgArgumentBuffer) -> IsNull {
        IsNull::Yes
    }
}

fn bind<'q>(query: Query<'q, Postgres, PgArguments>, value: &DbValue) -> Query<'q, Postgres, PgArguments> {
    match value {
        DbValue::Null => query.bind(UntypedNull),
        DbValue::Bool(b) => query.bind(*b),
        DbValue::Int(i) => query.bind(*i),
        DbValue::Float(f) => query.bind(*f),
        DbValue::String(s) => query.bind(s.clone()),
        DbValue::Bytes(b) => query.bind(b.clone()),
    }
}

/// Build the query; statements carrying a NULL are not cached, since the
/// parameter types the server infers for them would pin later bindings
fn prepare<'q>(sql: &'q str, params: &[DbValue]) -> Query<'q, Postgres, PgArguments> {
    let cacheable = !params.iter().any(|v| matches!(v, DbValue::Null));
    params.iter().fold(sqlx::query(sql), bind).persistent(cacheable)
}

impl DatabaseAdapter for PostgresAdapter {
    async fn connect(config: &DatabaseConfig) -> Result<Self> {
        let url = config.connection_url()?;
        let conn = PgConnection::connect(&url)
            .await
            .map_err(|e| Error::Connection {
                driver: DRIVER.name(),
                message: format!("could not connect to {}: {e}", config.endpoint()),
            })?;

        info!(driver = DRIVER.name(), endpoint = %config.endpoint(), "Database connected");
        Ok(Self {
            conn,
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
        let numbered = sql::number_placeholders(sql);
        debug!(driver = DRIVER.name(), sql = %numbered, bindings = params.len(), "Running query");
        let rows = prepare(&numbered, params)
            .fetch_all(&mut self.conn)
            .await
            .map_err(|e| statement_error(DRIVER, &e))?;
        Ok(rows.iter().map(row_to_record).collect())
    }

    async fn execute(&mut self, sql: &str, params: &[DbValue]) -> Result<u64> {
        let numbered = sql::number_placeholders(sql);
        debug!(driver = DRIVER.name(), sql = %numbered, bindings = params.len(), "Executing statement");
        let result = prepare(&numbered, params)
            .execute(&mut self.conn)
            .await
            .map_err(|e| statement_error(DRIVER, &e))?;
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

    /// Value most recently produced by a sequence in this session
    async fn last_insert_id(&mut self) -> Result<String> {
        let rows = self.query("SELECT lastval() AS id", &[]).await?;
        rows.first()
            .and_then(|row| row.get("id"))
            .map(ToString::to_string)
            .ok_or_else(|| Error::Database {
                message: format!("{DRIVER}: lastval() returned no row"),
            })
    }

    fn in_transaction(&self) -> bool {
        self.in_transaction
    }

    fn set_in_transaction(&mut self, active: bool) {
        self.in_transaction = active;
    }
}

/// Convert a PostgreSQL row by column type
fn row_to_record(row: &PgRow) -> Record {
    let mut record = Record::new();

    for (i, column) in row.columns().iter().enumerate() {
        let name = column.name().to_string();
        if row.try_get_raw(i).map_or(true, |raw| raw.is_null()) {
            record.insert(name, DbValue::Null);
            continue;
        }

        let value = match column.type_info().name() {
            "BOOL" => row.try_get::<bool, _>(i).map(DbValue::Bool),
            "INT2" => row.try_get::<i16, _>(i).map(|v| DbValue::Int(i64::from(v))),
            "INT4" => row.try_get::<i32, _>(i).map(|v| DbValue::Int(i64::from(v))),
            "INT8" => row.try_get::<i64, _>(i).map(DbValue::Int),
            "FLOAT4" => row.try_get::<f32, _>(i).map(|v| DbValue::Float(f64::from(v))),
            "FLOAT8" => row.try_get::<f64, _>(i).map(DbValue::Float),
            "BYTEA" => row.try_get::<Vec<u8>, _>(i).map(DbValue::Bytes),
            _ => row.try_get::<String, _>(i).map(DbValue::String),
        }
        .unwrap_or(DbValue::Null);

        record.insert(name, value);
    }

    record
}

#[cfg(test)]
mod tests {
    use super::*;
    use sqlx::Execute;

    #[test]
    fn test_null_is_bound_without_a_type() {
        assert_eq!(<UntypedNull as Type<Postgres>>::type_info(), PgTypeInfo::with_oid(Oid(0)));
        assert_ne!(<UntypedNull as Type<Postgres>>::type_info(), <i64 as Type<Postgres>>::type_info());
        assert!(matches!(UntypedNull.encode_by_ref(&mut PgArgumentBuffer::default()), IsNull::Yes));
    }

    #[test]
    fn test_statements_with_null_skip_the_cache() {
        let sql = "UPDATE users SET note = $1 WHERE id = $2";
        assert!(Execute::persistent(&prepare(sql, &[DbValue::String("x".into()), DbValue::Int(1)])));
        assert!(!Execute::persistent(&prepare(sql, &[DbValue::Null, DbValue::Int(1)])));
    }

    #[tokio::test]
    async fn test_unreachable_server_is_connection_error() {
        let config = DatabaseConfig {
            driver: "pgsql".to_string(),
            host: "127.0.0.1".to_string(),
            port: Some(1),
            database: "app".to_string(),
            username: "postgres".to_string(),
            password: "hunter2".to_string(),
        };
        let err = PostgresAdapter::connect(&config).await.err().unwrap();
        assert!(matches!(err, Error::Connection { driver: "pgsql", .. }));
        assert!(!err.to_string().contains("hunter2"));
    }
}
