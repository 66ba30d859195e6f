//! Database binding
//!
//! Holds at most one adapter behind an async mutex, so statements from
//! concurrent requests are serialized on the single connection. Every
//! operation on an unbound binding fails with `Error::NotConnected`.

use super::{Adapter, DatabaseAdapter, DbValue, QueryBuilder, Record};
use crate::config::DatabaseConfig;
use crate::error::{Error, Result};
use crate::handler::BoxFuture;
use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::warn;

/// Shared handle to the active database adapter
///
/// Cloning is cheap; clones share the same adapter.
pub struct Database<A: DatabaseAdapter = Adapter> {
    slot: Arc<Mutex<Option<A>>>,
}

impl<A: DatabaseAdapter> Clone for Database<A> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<A: DatabaseAdapter> Default for Database<A> {
    fn default() -> Self {
        Self {
            slot: Arc::new(Mutex::new(None)),
        }
    }
}

impl<A: DatabaseAdapter> Database<A> {
    /// Create an unbound handle
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connect with `config` and bind the new adapter
    ///
    /// A previously bound adapter is closed first.
    ///
    /// # Errors
    ///
    /// Returns `Error::UnsupportedDriver` for an unknown driver (before any
    /// I/O) and `Error::Connection` if the connection cannot be opened.
    pub async fn connect(&self, config: &DatabaseConfig) -> Result<()> {
        let adapter = A::connect(config).await?;
        self.install(adapter).await;
        Ok(())
    }

    /// Bind an already connected adapter, closing the previous one
    pub async fn install(&self, adapter: A) {
        let mut slot = self.slot.lock().await;
        if let Some(previous) = slot.replace(adapter) {
            if let Err(e) = previous.close().await {
                warn!(error = %e, "Closing replaced connection failed");
            }
        }
    }

    /// Close and unbind the adapter; a no-op when nothing is bound
    ///
    /// # Errors
    ///
    /// Returns the adapter's close error. The binding is cleared either way.
    pub async fn disconnect(&self) -> Result<()> {
        let previous = self.slot.lock().await.take();
        match previous {
            Some(adapter) => adapter.close().await,
            None => Ok(()),
        }
    }

    /// Whether an adapter is bound
    pub async fn is_connected(&self) -> bool {
        self.slot.lock().await.is_some()
    }

    /// Lock the bound adapter
    ///
    /// A transaction still open at this point belongs to a caller whose
    /// future was dropped mid-transaction; it is rolled back before the
    /// connection is handed out again.
    async fn adapter(&self) -> Result<AdapterGuard<'_, A>> {
        let mut guard = self.slot.lock().await;
        let adapter = guard.as_mut().ok_or(Error::NotConnected)?;
        if adapter.in_transaction() {
            warn!("Rolling back a transaction abandoned by a cancelled caller");
            if let Err(e) = adapter.rollback().await {
                warn!(error = %e, "Rollback of abandoned transaction failed");
            }
        }
        Ok(AdapterGuard(guard))
    }

    /// Run a statement returning rows
    ///
    /// # Errors
    ///
    /// `Error::NotConnected` when unbound; otherwise the adapter's error.
    pub async fn query(&self, sql: &str, params: &[DbValue]) -> Result<Vec<Record>> {
        self.adapter().await?.get()?.query(sql, params).await
    }

    /// Run a statement returning the affected row count
    ///
    /// # Errors
    ///
    /// `Error::NotConnected` when unbound; otherwise the adapter's error.
    pub async fn execute(&self, sql: &str, params: &[DbValue]) -> Result<u64> {
        self.adapter().await?.get()?.execute(sql, params).await
    }

    /// Insert one row
    ///
    /// # Errors
    ///
    /// `Error::NotConnected` when unbound; otherwise the adapter's error.
    pub async fn insert(&self, table: &str, data: &Record) -> Result<u64> {
        self.adapter().await?.get()?.insert(table, data).await
    }

    /// Insert one row and read back its generated id
    ///
    /// Both statements run under one lock, so a concurrent insert cannot
    /// slip in between.
    ///
    /// # Errors
    ///
    /// `Error::NotConnected` when unbound; otherwise the adapter's error.
    pub async fn insert_returning_id(&self, table: &str, data: &Record) -> Result<String> {
        let mut guard = self.adapter().await?;
        let adapter = guard.get()?;
        adapter.insert(table, data).await?;
        adapter.last_insert_id().await
    }

    /// Update rows matching every equality condition
    ///
    /// # Errors
    ///
    /// `Error::NotConnected` when unbound; otherwise the adapter's error.
    pub async fn update(&self, table: &str, data: &Record, conditions: &Record) -> Result<u64> {
        self.adapter().await?.get()?.update(table, data, conditions).await
    }

    /// Delete rows matching every equality condition
    ///
    /// # Errors
    ///
    /// `Error::NotConnected` when unbound; otherwise the adapter's error.
    pub async fn delete(&self, table: &str, conditions: &Record) -> Result<u64> {
        self.adapter().await?.get()?.delete(table, conditions).await
    }

    /// Id generated by the most recent insert
    ///
    /// # Errors
    ///
    /// `Error::NotConnected` when unbound; otherwise the adapter's error.
    pub async fn last_insert_id(&self) -> Result<String> {
        self.adapter().await?.get()?.last_insert_id().await
    }

    /// Start a query against `table`
    #[must_use]
    pub fn table(&self, table: &str) -> QueryBuilder<'static, A> {
        QueryBuilder::bound(self.clone(), table)
    }

    /// Run `work` inside a transaction
    ///
    /// The connection stays locked for the whole transaction. `work`
    /// receives the adapter directly; use [`QueryBuilder::on`] to build
    /// queries against it. The transaction commits when `work` returns
    /// `Ok` and rolls back when it returns `Err` or the commit fails. If
    /// this future is dropped midway, the next operation on the binding
    /// rolls the transaction back.
    ///
    /// ```ignore
    /// db.transaction(|tx| Box::pin(async move {
    ///     QueryBuilder::on(tx, "accounts").where_("id", "=", 1).update(debit).await?;
    ///     QueryBuilder::on(tx, "accounts").where_("id", "=", 2).update(credit).await
    /// })).await?;
    /// ```
    ///
    /// # Errors
    ///
    /// `Error::NotConnected` when unbound, `Error::Transaction` if a
    /// transaction is already open, or the error returned by `work`.
    pub async fn transaction<T, F>(&self, work: F) -> Result<T>
    where
        T: Send,
        F: for<'c> FnOnce(&'c mut A) -> BoxFuture<'c, Result<T>> + Send,
    {
        let mut guard = self.adapter().await?;
        let adapter = guard.get()?;
        adapter.begin_transaction().await?;

        let outcome = match work(&mut *adapter).await {
            Ok(value) => adapter.commit().await.map(|()| value),
            Err(e) => Err(e),
        };
        if outcome.is_err() && adapter.in_transaction() {
            if let Err(rollback) = adapter.rollback().await {
                warn!(error = %rollback, "Rollback failed");
            }
        }
        outcome
    }
}

struct AdapterGuard<'a, A>(MutexGuard<'a, Option<A>>);

impl<A> AdapterGuard<'_, A> {
    fn get(&mut self) -> Result<&mut A> {
        self.0.as_mut().ok_or(Error::NotConnected)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::record;
    use crate::database::recording::RecordingAdapter;
    use std::time::Duration;

    fn statements(log: &crate::database::recording::Log) -> Vec<String> {
        log.lock().unwrap().iter().map(|(s, _)| s.clone()).collect()
    }

    #[tokio::test]
    async fn test_unbound_fails_fast() {
        let db: Database<RecordingAdapter> = Database::new();
        assert!(!db.is_connected().await);
        assert!(matches!(db.query("SELECT 1", &[]).await, Err(Error::NotConnected)));
        assert!(matches!(
            db.insert("users", &record([("name", "x")])).await,
            Err(Error::NotConnected)
        ));
        assert!(matches!(db.last_insert_id().await, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_install_replaces_and_closes_previous() {
        let db = Database::new();
        let (first, first_log) = RecordingAdapter::pair();
        let (second, second_log) = RecordingAdapter::pair();

        db.install(first).await;
        db.install(second).await;
        db.execute("DELETE FROM t WHERE id = ?", &[DbValue::Int(1)]).await.unwrap();

        assert_eq!(statements(&first_log), vec!["CLOSE"]);
        assert_eq!(statements(&second_log), vec!["DELETE FROM t WHERE id = ?"]);
    }

    #[tokio::test]
    async fn test_disconnect_unbinds() {
        let db = Database::new();
        let (adapter, log) = RecordingAdapter::pair();
        db.install(adapter).await;
        db.disconnect().await.unwrap();

        assert!(!db.is_connected().await);
        assert_eq!(statements(&log), vec!["CLOSE"]);
        assert!(matches!(db.execute("SELECT 1", &[]).await, Err(Error::NotConnected)));
        db.disconnect().await.unwrap();
    }

    #[tokio::test]
    async fn test_connect_rejects_unknown_driver_before_io() {
        let db: Database = Database::new();
        let config = DatabaseConfig {
            driver: "oracle".to_string(),
            ..DatabaseConfig::default()
        };
        assert!(matches!(
            db.connect(&config).await,
            Err(Error::UnsupportedDriver { .. })
        ));
        assert!(!db.is_connected().await);
    }

    #[tokio::test]
    async fn test_transaction_commits_on_ok() {
        let db = Database::new();
        let (adapter, log) = RecordingAdapter::pair();
        db.install(adapter).await;

        let affected = db
            .transaction(|tx| {
                Box::pin(async move { tx.insert("users", &record([("name", "Ada")])).await })
            })
            .await
            .unwrap();

        assert_eq!(affected, 1);
        assert_eq!(
            statements(&log),
            vec!["BEGIN", "INSERT INTO users (name) VALUES (?)", "COMMIT"]
        );
    }

    #[tokio::test]
    async fn test_transaction_rolls_back_on_err() {
        let db = Database::new();
        let (adapter, log) = RecordingAdapter::pair();
        db.install(adapter).await;

        let result: Result<()> = db
            .transaction(|tx| {
                Box::pin(async move {
                    tx.delete("users", &record([("id", 1)])).await?;
                    Err(Error::query("abort"))
                })
            })
            .await;

        assert!(matches!(result, Err(Error::Query { .. })));
        assert_eq!(
            statements(&log),
            vec!["BEGIN", "DELETE FROM users WHERE id = ?", "ROLLBACK"]
        );
    }

    #[tokio::test]
    async fn test_failed_commit_rolls_back_and_frees_binding() {
        let db = Database::new();
        let (mut adapter, log) = RecordingAdapter::pair();
        adapter.fail_on = Some("COMMIT");
        db.install(adapter).await;

        let result = db
            .transaction(|tx| Box::pin(async move { tx.insert("users", &record([("name", "Ada")])).await }))
            .await;
        assert!(matches!(result, Err(Error::Database { .. })));
        assert_eq!(
            statements(&log),
            vec!["BEGIN", "INSERT INTO users (name) VALUES (?)", "COMMIT", "ROLLBACK"]
        );

        let retry: Result<()> = db.transaction(|_tx| Box::pin(async { Ok(()) })).await;
        assert!(matches!(retry, Err(Error::Database { .. })));
        assert_eq!(statements(&log)[4..], ["BEGIN", "COMMIT", "ROLLBACK"]);
    }

    #[tokio::test]
    async fn test_cancelled_transaction_is_rolled_back_on_next_use() {
        let db = Database::new();
        let (adapter, log) = RecordingAdapter::pair();
        db.install(adapter).await;

        let stalled = db.transaction(|tx| {
            Box::pin(async move {
                tx.insert("users", &record([("name", "Ada")])).await?;
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
        });
        assert!(tokio::time::timeout(Duration::from_millis(20), stalled).await.is_err());

        db.execute("DELETE FROM users WHERE id = ?", &[DbValue::Int(1)]).await.unwrap();
        assert_eq!(
            statements(&log),
            vec![
                "BEGIN",
                "INSERT INTO users (name) VALUES (?)",
                "ROLLBACK",
                "DELETE FROM users WHERE id = ?",
            ]
        );
    }

    async fn sqlite_memory() -> Database {
        let db: Database = Database::new();
        db.connect(&DatabaseConfig {
            driver: "sqlite".to_string(),
            database: ":memory:".to_string(),
            ..DatabaseConfig::default()
        })
        .await
        .unwrap();
        db
    }

    #[tokio::test]
    async fn test_sqlite_deferred_constraint_failure_releases_transaction() {
        let db = sqlite_memory().await;
        db.execute("PRAGMA foreign_keys = ON", &[]).await.unwrap();
        db.execute("CREATE TABLE parents (id INTEGER PRIMARY KEY)", &[]).await.unwrap();
        db.execute(
            "CREATE TABLE children (id INTEGER PRIMARY KEY, parent_id INTEGER \
             REFERENCES parents(id) DEFERRABLE INITIALLY DEFERRED)",
            &[],
        )
        .await
        .unwrap();

        let orphan = db
            .transaction(|tx| Box::pin(async move { tx.insert("children", &record([("parent_id", 99)])).await }))
            .await;
        assert!(matches!(orphan, Err(Error::Database { .. })));

        let adopted = db
            .transaction(|tx| {
                Box::pin(async move {
                    tx.insert("parents", &record([("id", 1)])).await?;
                    tx.insert("children", &record([("parent_id", 1)])).await
                })
            })
            .await
            .unwrap();
        assert_eq!(adopted, 1);

        let rows = db.query("SELECT COUNT(*) AS n FROM children", &[]).await.unwrap();
        assert_eq!(rows[0].get("n"), Some(&DbValue::Int(1)));
    }

    #[tokio::test]
    async fn test_sqlite_cancelled_transaction_discards_rows() {
        let db = sqlite_memory().await;
        db.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)", &[])
            .await
            .unwrap();

        let stalled = db.transaction(|tx| {
            Box::pin(async move {
                tx.insert("notes", &record([("body", "draft")])).await?;
                tokio::time::sleep(Duration::from_secs(30)).await;
                Ok(())
            })
        });
        assert!(tokio::time::timeout(Duration::from_millis(50), stalled).await.is_err());

        let rows = db.query("SELECT COUNT(*) AS n FROM notes", &[]).await.unwrap();
        assert_eq!(rows[0].get("n"), Some(&DbValue::Int(0)));

        db.transaction(|tx| Box::pin(async move { tx.insert("notes", &record([("body", "kept")])).await }))
            .await
            .unwrap();
        let rows = db.query("SELECT COUNT(*) AS n FROM notes", &[]).await.unwrap();
        assert_eq!(rows[0].get("n"), Some(&DbValue::Int(1)));
    }

    #[tokio::test]
    async fn test_connect_sqlite_memory() {
        let db: Database = Database::new();
        let config = DatabaseConfig {
            driver: "sqlite".to_string(),
            database: ":memory:".to_string(),
            ..DatabaseConfig::default()
        };
        db.connect(&config).await.unwrap();
        db.execute("CREATE TABLE notes (id INTEGER PRIMARY KEY, body TEXT)", &[])
            .await
            .unwrap();
        db.insert("notes", &record([("body", "hello")])).await.unwrap();
        assert_eq!(db.last_insert_id().await.unwrap(), "1");
        db.disconnect().await.unwrap();
    }
}
