//! Response envelopes and validation failures as seen by a client.

use serde_json::json;
use trestle_core::{
    handler, validate_request, Method, Params, Request, RequestIdMiddleware, Response, Router,
};

#[test]
fn test_pagination_meta() {
    let items: Vec<u32> = (21..=30).collect();
    let res = Response::paginated(&items, 95, 10, 3);
    let body = res.body_json().unwrap();

    assert_eq!(body["status"], "success");
    assert_eq!(body["data"].as_array().unwrap().len(), 10);
    assert_eq!(
        body["meta"],
        json!({ "current_page": 3, "last_page": 10, "per_page": 10, "total": 95 })
    );
}

#[test]
fn test_envelopes_carry_status() {
    let created = Response::created(&json!({ "id": 1 }));
    assert_eq!(created.status, 201);
    assert_eq!(created.header("content-type"), Some("application/json"));

    let forbidden = Response::forbidden("Nope");
    assert_eq!(forbidden.status, 403);
    assert_eq!(forbidden.body_json().unwrap(), json!({ "status": "error", "message": "Nope" }));

    assert_eq!(Response::no_content().body_str(), "");
}

fn signup_router() -> Router {
    let mut router = Router::new();
    router
        .post(
            "/signup",
            handler(|req: Request, _params: Params| async move {
                validate_request(&req, &[("email", "email|required"), ("age", "numeric")])?;
                Ok::<_, trestle_core::Error>(Response::created(&req.inputs()))
            }),
        )
        .unwrap();
    router
}

#[tokio::test]
async fn test_missing_field_reports_every_rule() {
    let res = signup_router()
        .dispatch(Request::with_json(Method::Post, "/signup", &json!({})))
        .await;

    assert_eq!(res.status, 400);
    let body = res.body_json().unwrap();
    assert_eq!(body["status"], "error");
    assert_eq!(body["errors"]["email"].as_array().unwrap().len(), 2);
    assert!(body["errors"].get("age").is_none());
}

#[tokio::test]
async fn test_valid_payload_passes_through() {
    let res = signup_router()
        .dispatch(Request::with_json(
            Method::Post,
            "/signup",
            &json!({ "email": "ada@example.com", "age": "36" }),
        ))
        .await;

    assert_eq!(res.status, 201);
    assert_eq!(res.body_json().unwrap()["data"]["email"], "ada@example.com");
}

#[tokio::test]
async fn test_request_id_is_echoed() {
    let mut router = Router::new();
    router.use_middleware(trestle_core::MiddlewareRef::new(RequestIdMiddleware::new()));
    router
        .get("/ping", handler(|_req, _params| async { "pong" }))
        .unwrap();

    let generated = router.dispatch(Request::get("/ping")).await;
    assert!(generated.header("x-request-id").is_some_and(|id| !id.is_empty()));

    let mut req = Request::get("/ping");
    req.set_header("x-request-id", "abc-123");
    let echoed = router.dispatch(req).await;
    assert_eq!(echoed.header("X-Request-Id"), Some("abc-123"));
}
