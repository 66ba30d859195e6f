//! Application routes and components

use serde_json::json;
use trestle_core::database::Direction;
use trestle_core::{
    validate_request, Component, CorsMiddleware, Database, DbValue, LoggingMiddleware, MiddlewareRef, Model,
    ModelSchema, Params, Request, RequestIdMiddleware, Response, Result, Router, VERSION,
};

/// Rows of the `users` table
pub struct User;

impl ModelSchema for User {
    const TABLE: &'static str = "users";
    const FILLABLE: &'static [&'static str] = &["name", "email"];
}

type UserModel = Model<User>;

const DEFAULT_PER_PAGE: u64 = 15;
const MAX_PER_PAGE: u64 = 100;

/// Register middleware, components and routes
///
/// The `users` resource is only mounted when a database is configured.
pub fn register(router: &mut Router, db: &Database, with_users: bool) -> Result<()> {
    router
        .registry_mut()
        .register_middleware("request-id", RequestIdMiddleware::new())
        .register_middleware("logging", LoggingMiddleware::new())
        .register_middleware("cors", CorsMiddleware::new())
        .register_component("Status", status(db.clone()));

    router.use_middleware("request-id").use_middleware("logging");
    router.get("/api/v1/status", "Status@check")?;

    if with_users {
        router.registry_mut().register_component("Users", users(db));
        router.group(vec![MiddlewareRef::from("cors")], |r| {
            r.get("/api/v1/users", "Users@index")?;
            r.get("/api/v1/users/:int", "Users@show")?;
            r.post("/api/v1/users", "Users@store")?;
            r.delete("/api/v1/users/:int", "Users@destroy")?;
            r.options("/api/v1/users", "Users@index")?;
            Ok(())
        })?;
    }

    Ok(())
}

fn status(db: Database) -> Component {
    Component::new().operation("check", move |_req: Request, _params: Params| {
        let db = db.clone();
        async move {
            json!({
                "service": "trestle",
                "version": VERSION,
                "database": db.is_connected().await,
            })
        }
    })
}

fn users(db: &Database) -> Component {
    let (index_db, show_db, store_db, destroy_db) = (db.clone(), db.clone(), db.clone(), db.clone());

    Component::new()
        .operation("index", move |req: Request, _params: Params| index(index_db.clone(), req))
        .operation("show", move |_req: Request, params: Params| show(show_db.clone(), params))
        .operation("store", move |req: Request, _params: Params| store(store_db.clone(), req))
        .operation("destroy", move |_req: Request, params: Params| destroy(destroy_db.clone(), params))
}

fn page_param(req: &Request, key: &str) -> Option<u64> {
    req.query(key).and_then(|raw| raw.parse().ok()).filter(|n| *n > 0)
}

async fn index(db: Database, req: Request) -> Result<Response> {
    let page = page_param(&req, "page").unwrap_or(1);
    let per_page = page_param(&req, "per_page").unwrap_or(DEFAULT_PER_PAGE).min(MAX_PER_PAGE);

    let total = db
        .query("SELECT COUNT(*) AS total FROM users", &[])
        .await?
        .first()
        .and_then(|row| row.get("total"))
        .and_then(DbValue::as_i64)
        .and_then(|n| u64::try_from(n).ok())
        .unwrap_or(0);

    let users: Vec<UserModel> = UserModel::query(&db)
        .order_by("id", Direction::Asc)
        .limit(per_page)
        .offset((page - 1).saturating_mul(per_page))
        .get()
        .await?
        .into_iter()
        .map(UserModel::hydrate)
        .collect();

    Ok(Response::paginated(&users, total, per_page, page))
}

async fn show(db: Database, params: Params) -> Result<Response> {
    let Some(id) = params.int(0) else {
        return Ok(Response::bad_request("Invalid user id"));
    };
    Ok(match UserModel::find(&db, id).await? {
        Some(user) => Response::ok(&user),
        None => Response::not_found("User not found"),
    })
}

async fn store(db: Database, req: Request) -> Result<Response> {
    validate_request(&req, &[("name", "required|max:100"), ("email", "required|email")])?;

    let mut user = UserModel::from_input(&req.inputs());
    user.save(&db).await?;
    Ok(Response::created(&user))
}

async fn destroy(db: Database, params: Params) -> Result<Response> {
    let Some(id) = params.int(0) else {
        return Ok(Response::bad_request("Invalid user id"));
    };
    let Some(user) = UserModel::find(&db, id).await? else {
        return Ok(Response::not_found("User not found"));
    };
    user.delete(&db).await?;
    Ok(Response::no_content())
}
