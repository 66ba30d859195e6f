//! Query builder rendering and SQLite-backed round trips through the
//! public database API.

use trestle_core::database::sql::{number_placeholders, placeholder_count};
use trestle_core::database::{record, Direction};
use trestle_core::{Database, DatabaseConfig, DbValue, Error, Model, ModelSchema, QueryBuilder};

async fn memory_db() -> Database {
    let db = Database::new();
    db.connect(&DatabaseConfig {
        driver: "sqlite".to_string(),
        database: ":memory:".to_string(),
        ..DatabaseConfig::default()
    })
    .await
    .unwrap();
    db.execute(
        "CREATE TABLE accounts (id INTEGER PRIMARY KEY, owner TEXT NOT NULL, balance INTEGER NOT NULL)",
        &[],
    )
    .await
    .unwrap();
    for (owner, balance) in [("ada", 100), ("bob", 20), ("cy", 55)] {
        db.insert("accounts", &record([("owner", DbValue::from(owner)), ("balance", DbValue::from(balance))]))
            .await
            .unwrap();
    }
    db
}

async fn balance_of(db: &Database, id: i64) -> i64 {
    db.table("accounts")
        .where_("id", "=", id)
        .first()
        .await
        .unwrap()
        .and_then(|row| row.get("balance").and_then(DbValue::as_i64))
        .unwrap()
}

#[test]
fn test_where_renders_single_binding() {
    let qb = QueryBuilder::new("users").where_("id", "=", 5);
    assert_eq!(qb.build_select_query(), "SELECT * FROM users WHERE id = ?");
    assert_eq!(qb.bindings(), vec![DbValue::Int(5)]);
}

#[test]
fn test_placeholders_match_bindings_in_order() {
    let builders = [
        QueryBuilder::new("users"),
        QueryBuilder::new("users")
            .where_("age", ">=", 18)
            .where_in("role", ["admin", "editor"])
            .where_("name", "like", "a%"),
        QueryBuilder::new("posts")
            .join("users", "users.id", "=", "posts.user_id")
            .where_in("posts.id", Vec::<i64>::new())
            .where_("users.active", "=", true)
            .order_by("posts.id", Direction::Desc)
            .limit(10)
            .offset(20),
    ];

    for qb in &builders {
        let sql = qb.build_select_query();
        assert_eq!(placeholder_count(&sql), qb.bindings().len(), "{sql}");
    }

    let qb = &builders[1];
    assert_eq!(
        qb.bindings(),
        vec![
            DbValue::Int(18),
            DbValue::from("admin"),
            DbValue::from("editor"),
            DbValue::from("a%"),
        ]
    );
    assert_eq!(
        number_placeholders(&qb.build_select_query()),
        "SELECT * FROM users WHERE age >= $1 AND role IN ($2, $3) AND name LIKE $4"
    );
}

#[test]
fn test_unbound_builder_reports_not_connected() {
    let result = tokio_test::block_on(QueryBuilder::new("users").get());
    assert!(matches!(result, Err(Error::NotConnected)));
}

#[tokio::test]
async fn test_builder_filters_orders_and_pages() {
    let db = memory_db().await;

    let rows = db
        .table("accounts")
        .select(["owner"])
        .where_("balance", ">", 30)
        .order_by("owner", Direction::Desc)
        .get()
        .await
        .unwrap();
    let owners: Vec<_> = rows.iter().filter_map(|r| r.get("owner").and_then(DbValue::as_str)).collect();
    assert_eq!(owners, ["cy", "ada"]);

    let page = db
        .table("accounts")
        .order_by("id", Direction::Asc)
        .limit(1)
        .offset(1)
        .get()
        .await
        .unwrap();
    assert_eq!(page.len(), 1);
    assert_eq!(page[0].get("owner").and_then(DbValue::as_str), Some("bob"));
}

#[tokio::test]
async fn test_builder_update_and_delete() {
    let db = memory_db().await;

    let updated = db
        .table("accounts")
        .where_("owner", "=", "bob")
        .update(&record([("balance", 0)]))
        .await
        .unwrap();
    assert_eq!(updated, 1);
    assert_eq!(balance_of(&db, 2).await, 0);

    let unfiltered = db.table("accounts").delete().await;
    assert!(matches!(unfiltered, Err(Error::Query { .. })));

    let deleted = db.table("accounts").where_("id", "=", 3).delete().await.unwrap();
    assert_eq!(deleted, 1);
    assert!(db.table("accounts").where_("id", "=", 3).first().await.unwrap().is_none());
}

#[tokio::test]
async fn test_transfer_commits_both_legs() {
    let db = memory_db().await;

    db.transaction(|tx| {
        Box::pin(async move {
            QueryBuilder::on(&mut *tx, "accounts")
                .where_("id", "=", 1)
                .update(&record([("balance", 70)]))
                .await?;
            QueryBuilder::on(&mut *tx, "accounts")
                .where_("id", "=", 2)
                .update(&record([("balance", 50)]))
                .await
        })
    })
    .await
    .unwrap();

    assert_eq!(balance_of(&db, 1).await, 70);
    assert_eq!(balance_of(&db, 2).await, 50);
}

#[tokio::test]
async fn test_failed_transfer_rolls_back() {
    let db = memory_db().await;

    let result: trestle_core::Result<()> = db
        .transaction(|tx| {
            Box::pin(async move {
                QueryBuilder::on(&mut *tx, "accounts")
                    .where_("id", "=", 1)
                    .update(&record([("balance", 0)]))
                    .await?;
                Err(Error::query("insufficient funds"))
            })
        })
        .await;

    assert!(matches!(result, Err(Error::Query { .. })));
    assert_eq!(balance_of(&db, 1).await, 100);
}

struct Account;

impl ModelSchema for Account {
    const TABLE: &'static str = "accounts";
    const FILLABLE: &'static [&'static str] = &["owner", "balance"];
    const HIDDEN: &'static [&'static str] = &["balance"];
}

#[tokio::test]
async fn test_model_save_find_and_hide() {
    let db = memory_db().await;

    let mut account: Model<Account> =
        Model::new(record([("owner", DbValue::from("dee")), ("balance", DbValue::from(5))]));
    account.save(&db).await.unwrap();
    assert_eq!(account.id(), Some(&DbValue::Int(4)));

    let found = Model::<Account>::find(&db, 4).await.unwrap().unwrap();
    assert_eq!(found.get("owner"), Some(&DbValue::from("dee")));
    let visible = found.to_json();
    assert_eq!(visible["owner"], "dee");
    assert!(visible.get("balance").is_none());

    assert_eq!(Model::<Account>::all(&db).await.unwrap().len(), 4);
}

#[tokio::test]
async fn test_unknown_driver_is_rejected() {
    let db: Database = Database::new();
    let err = db
        .connect(&DatabaseConfig {
            driver: "mongodb".to_string(),
            ..DatabaseConfig::default()
        })
        .await
        .unwrap_err();
    assert!(matches!(err, Error::UnsupportedDriver { .. }));
    assert!(!db.is_connected().await);
}
