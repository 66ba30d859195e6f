//! Fluent query builder
//!
//! Clauses accumulate in declaration order and render to one SELECT with
//! `?` placeholders. Writes go through the adapter's CRUD helpers; their
//! conditions come from the builder's equality predicates.

use super::{Adapter, Database, DatabaseAdapter, DbValue, Record};
use crate::error::{Error, Result};
use std::fmt;

/// Comparison operators accepted by [`QueryBuilder::where_`]
const OPERATORS: &[&str] = &["=", "!=", "<>", "<", "<=", ">", ">=", "LIKE", "NOT LIKE"];

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Direction {
    /// Ascending
    #[default]
    Asc,
    /// Descending
    Desc,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Asc => "ASC",
            Self::Desc => "DESC",
        })
    }
}

/// Join flavour
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    /// `INNER JOIN`
    Inner,
    /// `LEFT JOIN`
    Left,
}

impl fmt::Display for JoinKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Inner => "INNER",
            Self::Left => "LEFT",
        })
    }
}

#[derive(Debug, Clone)]
enum Predicate {
    Basic {
        column: String,
        operator: String,
        value: DbValue,
    },
    In {
        column: String,
        values: Vec<DbValue>,
    },
}

#[derive(Debug, Clone)]
struct Join {
    kind: JoinKind,
    table: String,
    first: String,
    operator: String,
    second: String,
}

enum Target<'a, A: DatabaseAdapter> {
    Unbound,
    Shared(Database<A>),
    Borrowed(&'a mut A),
}

impl<A: DatabaseAdapter> Target<'_, A> {
    async fn query(&mut self, sql: &str, params: &[DbValue]) -> Result<Vec<Record>> {
        match self {
            Self::Unbound => Err(Error::NotConnected),
            Self::Shared(db) => db.query(sql, params).await,
            Self::Borrowed(adapter) => adapter.query(sql, params).await,
        }
    }

    async fn insert(&mut self, table: &str, data: &Record) -> Result<u64> {
        match self {
            Self::Unbound => Err(Error::NotConnected),
            Self::Shared(db) => db.insert(table, data).await,
            Self::Borrowed(adapter) => adapter.insert(table, data).await,
        }
    }

    async fn update(&mut self, table: &str, data: &Record, conditions: &Record) -> Result<u64> {
        match self {
            Self::Unbound => Err(Error::NotConnected),
            Self::Shared(db) => db.update(table, data, conditions).await,
            Self::Borrowed(adapter) => adapter.update(table, data, conditions).await,
        }
    }

    async fn delete(&mut self, table: &str, conditions: &Record) -> Result<u64> {
        match self {
            Self::Unbound => Err(Error::NotConnected),
            Self::Shared(db) => db.delete(table, conditions).await,
            Self::Borrowed(adapter) => adapter.delete(table, conditions).await,
        }
    }
}

/// Accumulates one query against one table
///
/// Builders are consumed by their terminal operation (`get`, `first`,
/// `insert`, `update`, `delete`).
///
/// ```
/// use trestle_core::database::QueryBuilder;
///
/// let query = QueryBuilder::new("users").where_("id", "=", 5);
/// assert_eq!(query.build_select_query(), "SELECT * FROM users WHERE id = ?");
/// ```
pub struct QueryBuilder<'a, A: DatabaseAdapter = Adapter> {
    table: String,
    columns: Vec<String>,
    predicates: Vec<Predicate>,
    joins: Vec<Join>,
    orders: Vec<(String, Direction)>,
    limit: Option<u64>,
    offset: Option<u64>,
    target: Target<'a, A>,
}

impl QueryBuilder<'static, Adapter> {
    /// Builder not bound to any connection; renders SQL only
    ///
    /// Terminal operations fail with `Error::NotConnected`.
    #[must_use]
    pub fn new(table: &str) -> Self {
        Self::with_target(table, Target::Unbound)
    }
}

impl<A: DatabaseAdapter> QueryBuilder<'static, A> {
    pub(crate) fn bound(db: Database<A>, table: &str) -> Self {
        Self::with_target(table, Target::Shared(db))
    }
}

impl<'a, A: DatabaseAdapter> QueryBuilder<'a, A> {
    /// Builder running directly on `adapter`, e.g. inside a transaction
    #[must_use]
    pub fn on(adapter: &'a mut A, table: &str) -> Self {
        Self::with_target(table, Target::Borrowed(adapter))
    }

    fn with_target(table: &str, target: Target<'a, A>) -> Self {
        Self {
            table: table.to_string(),
            columns: Vec::new(),
            predicates: Vec::new(),
            joins: Vec::new(),
            orders: Vec::new(),
            limit: None,
            offset: None,
            target,
        }
    }

    /// Replace the target table
    #[must_use]
    pub fn table(mut self, table: &str) -> Self {
        self.table = table.to_string();
        self
    }

    /// Add projected columns; none means `*`
    #[must_use]
    pub fn select<I, S>(mut self, columns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.columns.extend(columns.into_iter().map(Into::into));
        self
    }

    /// `column operator ?`
    #[must_use]
    pub fn where_(mut self, column: &str, operator: &str, value: impl Into<DbValue>) -> Self {
        self.predicates.push(Predicate::Basic {
            column: column.to_string(),
            operator: operator.trim().to_ascii_uppercase(),
            value: value.into(),
        });
        self
    }

    /// `column IN (?, ...)`, one placeholder per value
    #[must_use]
    pub fn where_in<I, V>(mut self, column: &str, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<DbValue>,
    {
        self.predicates.push(Predicate::In {
            column: column.to_string(),
            values: values.into_iter().map(Into::into).collect(),
        });
        self
    }

    /// Append an ordering
    #[must_use]
    pub fn order_by(mut self, column: &str, direction: Direction) -> Self {
        self.orders.push((column.to_string(), direction));
        self
    }

    /// `LIMIT n`
    #[must_use]
    pub fn limit(mut self, limit: u64) -> Self {
        self.limit = Some(limit);
        self
    }

    /// `OFFSET n`
    #[must_use]
    pub fn offset(mut self, offset: u64) -> Self {
        self.offset = Some(offset);
        self
    }

    /// `INNER JOIN table ON first operator second`
    #[must_use]
    pub fn join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinKind::Inner, table, first, operator, second)
    }

    /// `LEFT JOIN table ON first operator second`
    #[must_use]
    pub fn left_join(self, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.push_join(JoinKind::Left, table, first, operator, second)
    }

    fn push_join(mut self, kind: JoinKind, table: &str, first: &str, operator: &str, second: &str) -> Self {
        self.joins.push(Join {
            kind,
            table: table.to_string(),
            first: first.to_string(),
            operator: operator.to_string(),
            second: second.to_string(),
        });
        self
    }

    /// Render the SELECT statement
    #[must_use]
    pub fn build_select_query(&self) -> String {
        let columns = if self.columns.is_empty() {
            "*".to_string()
        } else {
            self.columns.join(", ")
        };
        let mut sql = format!("SELECT {columns} FROM {}", self.table);

        for join in &self.joins {
            sql.push_str(&format!(
                " {} JOIN {} ON {} {} {}",
                join.kind, join.table, join.first, join.operator, join.second
            ));
        }

        if !self.predicates.is_empty() {
            let clauses: Vec<String> = self.predicates.iter().map(render_predicate).collect();
            sql.push_str(" WHERE ");
            sql.push_str(&clauses.join(" AND "));
        }

        if !self.orders.is_empty() {
            let orders: Vec<String> = self
                .orders
                .iter()
                .map(|(column, direction)| format!("{column} {direction}"))
                .collect();
            sql.push_str(" ORDER BY ");
            sql.push_str(&orders.join(", "));
        }

        if let Some(limit) = self.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }
        if let Some(offset) = self.offset {
            sql.push_str(&format!(" OFFSET {offset}"));
        }

        sql
    }

    /// Values bound to the placeholders of [`Self::build_select_query`],
    /// in predicate declaration order
    #[must_use]
    pub fn bindings(&self) -> Vec<DbValue> {
        self.predicates
            .iter()
            .flat_map(|predicate| match predicate {
                Predicate::Basic { value, .. } => std::slice::from_ref(value),
                Predicate::In { values, .. } => values.as_slice(),
            })
            .cloned()
            .collect()
    }

    /// Run the SELECT
    ///
    /// # Errors
    ///
    /// `Error::Query` for an unsupported comparison operator,
    /// `Error::NotConnected` for an unbound builder, or the adapter's error.
    pub async fn get(mut self) -> Result<Vec<Record>> {
        self.check_operators()?;
        let sql = self.build_select_query();
        let bindings = self.bindings();
        self.target.query(&sql, &bindings).await
    }

    /// First row of the SELECT with `LIMIT 1`
    ///
    /// # Errors
    ///
    /// Same as [`Self::get`].
    pub async fn first(self) -> Result<Option<Record>> {
        Ok(self.limit(1).get().await?.into_iter().next())
    }

    /// Insert `data` into the table; returns the affected row count
    ///
    /// # Errors
    ///
    /// `Error::NotConnected` for an unbound builder, or the adapter's error.
    pub async fn insert(mut self, data: &Record) -> Result<u64> {
        self.target.insert(&self.table, data).await
    }

    /// Update rows matching the builder's equality predicates
    ///
    /// # Errors
    ///
    /// `Error::Query` unless every predicate is a basic `=` predicate and
    /// at least one exists.
    pub async fn update(mut self, data: &Record) -> Result<u64> {
        let conditions = self.equality_conditions("update")?;
        self.target.update(&self.table, data, &conditions).await
    }

    /// Delete rows matching the builder's equality predicates
    ///
    /// # Errors
    ///
    /// `Error::Query` unless every predicate is a basic `=` predicate and
    /// at least one exists.
    pub async fn delete(mut self) -> Result<u64> {
        let conditions = self.equality_conditions("delete")?;
        self.target.delete(&self.table, &conditions).await
    }

    fn check_operators(&self) -> Result<()> {
        for predicate in &self.predicates {
            if let Predicate::Basic { column, operator, .. } = predicate {
                if !OPERATORS.contains(&operator.as_str()) {
                    return Err(Error::query(format!(
                        "unsupported operator '{operator}' on column {column}"
                    )));
                }
            }
        }
        Ok(())
    }

    fn equality_conditions(&self, action: &str) -> Result<Record> {
        if self.predicates.is_empty() {
            return Err(Error::query(format!(
                "{action} on {} requires at least one where condition",
                self.table
            )));
        }

        let mut conditions = Record::new();
        for predicate in &self.predicates {
            match predicate {
                Predicate::Basic {
                    column,
                    operator,
                    value,
                } if operator == "=" => {
                    if conditions.insert(column.clone(), value.clone()).is_some() {
                        return Err(Error::query(format!(
                            "{action} on {} has more than one condition on {column}",
                            self.table
                        )));
                    }
                }
                Predicate::Basic { column, operator, .. } => {
                    return Err(Error::query(format!(
                        "{action} supports only '=' conditions, got {column} {operator}"
                    )));
                }
                Predicate::In { column, .. } => {
                    return Err(Error::query(format!(
                        "{action} does not support where_in conditions (column {column})"
                    )));
                }
            }
        }
        Ok(conditions)
    }
}

fn render_predicate(predicate: &Predicate) -> String {
    match predicate {
        Predicate::Basic {
            column, operator, ..
        } => format!("{column} {operator} ?"),
        // An empty set matches nothing and binds nothing
        Predicate::In { values, .. } if values.is_empty() => "1 = 0".to_string(),
        Predicate::In { column, values } => {
            format!("{column} IN ({})", vec!["?"; values.len()].join(", "))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::recording::RecordingAdapter;
    use crate::database::{record, sql};

    #[test]
    fn test_simple_where() {
        let query = QueryBuilder::new("users").where_("id", "=", 5);
        assert_eq!(query.build_select_query(), "SELECT * FROM users WHERE id = ?");
        assert_eq!(query.bindings(), vec![DbValue::Int(5)]);
    }

    #[test]
    fn test_clause_order_is_fixed() {
        let query = QueryBuilder::new("posts")
            .limit(10)
            .order_by("posts.created_at", Direction::Desc)
            .where_("posts.published", "=", true)
            .left_join("comments", "comments.post_id", "=", "posts.id")
            .select(["posts.id", "users.name"])
            .join("users", "users.id", "=", "posts.user_id")
            .offset(20);

        assert_eq!(
            query.build_select_query(),
            "SELECT posts.id, users.name FROM posts \
             LEFT JOIN comments ON comments.post_id = posts.id \
             INNER JOIN users ON users.id = posts.user_id \
             WHERE posts.published = ? \
             ORDER BY posts.created_at DESC \
             LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_bindings_follow_declaration_order() {
        let query = QueryBuilder::new("users")
            .where_("age", ">", 18)
            .where_in("role", ["admin", "editor"])
            .where_("name", "like", "A%")
            .where_in("id", [3, 1, 2]);

        let sql = query.build_select_query();
        assert_eq!(
            sql,
            "SELECT * FROM users WHERE age > ? AND role IN (?, ?) AND name LIKE ? AND id IN (?, ?, ?)"
        );
        let bindings = query.bindings();
        assert_eq!(sql::placeholder_count(&sql), bindings.len());
        assert_eq!(
            bindings,
            vec![
                DbValue::Int(18),
                DbValue::from("admin"),
                DbValue::from("editor"),
                DbValue::from("A%"),
                DbValue::Int(3),
                DbValue::Int(1),
                DbValue::Int(2),
            ]
        );
    }

    #[test]
    fn test_empty_where_in_matches_nothing() {
        let query = QueryBuilder::new("users").where_in("id", Vec::<i64>::new());
        assert_eq!(query.build_select_query(), "SELECT * FROM users WHERE 1 = 0");
        assert!(query.bindings().is_empty());
    }

    #[tokio::test]
    async fn test_unbound_builder_is_not_connected() {
        let result = QueryBuilder::new("users").get().await;
        assert!(matches!(result, Err(Error::NotConnected)));
    }

    #[tokio::test]
    async fn test_first_limits_to_one_row() {
        let (adapter, log) = RecordingAdapter::pair();
        let mut adapter = adapter.with_rows(vec![record([("id", 7)])]);

        let row = QueryBuilder::on(&mut adapter, "users")
            .where_("active", "=", true)
            .first()
            .await
            .unwrap();

        assert_eq!(row, Some(record([("id", 7)])));
        let log = log.lock().unwrap();
        assert_eq!(log[0].0, "SELECT * FROM users WHERE active = ? LIMIT 1");
        assert_eq!(log[0].1, vec![DbValue::Bool(true)]);
    }

    #[tokio::test]
    async fn test_first_on_empty_result() {
        let (mut adapter, _log) = RecordingAdapter::pair();
        let row = QueryBuilder::on(&mut adapter, "users").first().await.unwrap();
        assert!(row.is_none());
    }

    #[tokio::test]
    async fn test_update_uses_equality_predicates() {
        let (mut adapter, log) = RecordingAdapter::pair();
        let affected = QueryBuilder::on(&mut adapter, "users")
            .where_("id", "=", 4)
            .update(&record([("name", "Grace")]))
            .await
            .unwrap();

        assert_eq!(affected, 1);
        let log = log.lock().unwrap();
        assert_eq!(log[0].0, "UPDATE users SET name = ? WHERE id = ?");
        assert_eq!(log[0].1, vec![DbValue::from("Grace"), DbValue::Int(4)]);
    }

    #[tokio::test]
    async fn test_writes_reject_unsupported_predicates() {
        let (mut adapter, log) = RecordingAdapter::pair();

        let only_in = QueryBuilder::on(&mut adapter, "users").where_in("id", [1, 2]).delete().await;
        assert!(matches!(only_in, Err(Error::Query { .. })));

        let mixed = QueryBuilder::on(&mut adapter, "users")
            .where_("active", "=", false)
            .where_in("id", [1, 2])
            .update(&record([("name", "x")]))
            .await;
        assert!(matches!(mixed, Err(Error::Query { .. })));

        let range = QueryBuilder::on(&mut adapter, "users").where_("id", ">", 1).delete().await;
        assert!(matches!(range, Err(Error::Query { .. })));

        let unfiltered = QueryBuilder::on(&mut adapter, "users").delete().await;
        assert!(matches!(unfiltered, Err(Error::Query { .. })));

        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_unknown_operator_is_rejected() {
        let (mut adapter, log) = RecordingAdapter::pair();
        let result = QueryBuilder::on(&mut adapter, "users")
            .where_("id", "= 1 OR 1 =", 1)
            .get()
            .await;
        assert!(matches!(result, Err(Error::Query { .. })));
        assert!(log.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_bound_builder_against_sqlite() {
        let db: Database = Database::new();
        let config = crate::config::DatabaseConfig {
            driver: "sqlite".to_string(),
            database: ":memory:".to_string(),
            ..Default::default()
        };
        db.connect(&config).await.unwrap();
        db.execute("CREATE TABLE tags (id INTEGER PRIMARY KEY, label TEXT)", &[])
            .await
            .unwrap();
        for label in ["rust", "sql", "http"] {
            db.table("tags").insert(&record([("label", label)])).await.unwrap();
        }

        let rows = db
            .table("tags")
            .select(["label"])
            .where_in("id", [1, 3])
            .order_by("label", Direction::Asc)
            .get()
            .await
            .unwrap();
        assert_eq!(rows, vec![record([("label", "http")]), record([("label", "rust")])]);

        let deleted = db.table("tags").where_("label", "=", "sql").delete().await.unwrap();
        assert_eq!(deleted, 1);
    }
}
