//! # Route Handlers
//!
//! A route points either at a handler value or at a `"Component@operation"`
//! name that the [`Registry`](crate::registry::Registry) resolves at
//! dispatch time.

use crate::request::Request;
use crate::response::{IntoResponse, Response};
use crate::types::Params;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A boxed future for async handler and middleware operations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Type-erased route handler
///
/// Receives the request and the positional path parameters.
pub type Handler = Arc<dyn Fn(Request, Params) -> BoxFuture<'static, Response> + Send + Sync>;

/// Wrap an async function into a [`Handler`]
///
/// The return value is normalized through [`IntoResponse`]: a `Response`
/// passes unchanged, JSON objects and arrays become a success envelope,
/// scalars become raw content.
///
/// ```ignore
/// let show = handler(|_req, params| async move {
///     json!({ "id": params.int(0) })
/// });
/// ```
pub fn handler<F, Fut, R>(f: F) -> Handler
where
    F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = R> + Send + 'static,
    R: IntoResponse,
{
    Arc::new(move |req, params| {
        let fut = f(req, params);
        Box::pin(async move { fut.await.into_response() })
    })
}

/// Reference to the code a route runs
#[derive(Clone)]
pub enum HandlerRef {
    /// Directly invocable handler
    Direct(Handler),
    /// `"Component@operation"` resolved through the registry
    Named(String),
}

impl fmt::Debug for HandlerRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(_) => f.write_str("HandlerRef::Direct(..)"),
            Self::Named(name) => f.debug_tuple("HandlerRef::Named").field(name).finish(),
        }
    }
}

impl From<Handler> for HandlerRef {
    fn from(handler: Handler) -> Self {
        Self::Direct(handler)
    }
}

impl From<&str> for HandlerRef {
    fn from(reference: &str) -> Self {
        Self::Named(reference.to_string())
    }
}

impl From<String> for HandlerRef {
    fn from(reference: String) -> Self {
        Self::Named(reference)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_handler_normalizes_json_object() {
        let h = handler(|_req, params| async move { json!({ "id": params.int(0) }) });
        let res = h(Request::get("/"), Params::new(vec!["5".to_string()])).await;
        let body = res.body_json().unwrap();
        assert_eq!(body["status"], "success");
        assert_eq!(body["data"]["id"], 5);
    }

    #[tokio::test]
    async fn test_handler_keeps_response() {
        let h = handler(|_req, _params| async { Response::no_content() });
        let res = h(Request::get("/"), Params::default()).await;
        assert_eq!(res.status, 204);
    }

    #[tokio::test]
    async fn test_handler_scalar_is_raw() {
        let h = handler(|_req, _params| async { "pong" });
        let res = h(Request::get("/"), Params::default()).await;
        assert_eq!(res.body, "pong");
        assert_eq!(res.status, 200);
    }

    #[test]
    fn test_handler_ref_from_str() {
        let r: HandlerRef = "Users@show".into();
        assert!(matches!(r, HandlerRef::Named(ref n) if n == "Users@show"));
    }
}
