//! # Handler Registry
//!
//! Late binding for `"Component@operation"` handler references and named
//! middleware. The registry is filled at startup, then owned by the
//! [`Router`](crate::router::Router) and only read during dispatch.

use crate::error::{Error, Result};
use crate::handler::{handler, Handler, HandlerRef};
use crate::middleware::{Middleware, MiddlewareRef};
use crate::request::Request;
use crate::response::IntoResponse;
use crate::types::Params;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use tracing::debug;

/// A named group of operations, addressed as `"Component@operation"`
#[derive(Default, Clone)]
pub struct Component {
    operations: HashMap<String, Handler>,
}

impl Component {
    /// Create a component without operations
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add an operation
    #[must_use]
    pub fn operation<F, Fut, R>(mut self, name: &str, f: F) -> Self
    where
        F: Fn(Request, Params) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = R> + Send + 'static,
        R: IntoResponse,
    {
        self.operations.insert(name.to_string(), handler(f));
        self
    }

    /// Add an already wrapped handler
    #[must_use]
    pub fn handler(mut self, name: &str, h: Handler) -> Self {
        self.operations.insert(name.to_string(), h);
        self
    }

    /// Whether the component defines `name`
    #[must_use]
    pub fn has_operation(&self, name: &str) -> bool {
        self.operations.contains_key(name)
    }
}

/// String-keyed lookup of components and middleware
#[derive(Default, Clone)]
pub struct Registry {
    components: HashMap<String, Component>,
    middlewares: HashMap<String, Arc<dyn Middleware>>,
}

impl Registry {
    /// Create an empty registry
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register (or replace) a component
    pub fn register_component(&mut self, name: &str, component: Component) -> &mut Self {
        debug!(component = name, "Registered component");
        self.components.insert(name.to_string(), component);
        self
    }

    /// Register (or replace) a named middleware
    pub fn register_middleware<M: Middleware + 'static>(&mut self, name: &str, middleware: M) -> &mut Self {
        debug!(middleware = name, "Registered middleware");
        self.middlewares.insert(name.to_string(), Arc::new(middleware));
        self
    }

    /// Resolve a handler reference
    ///
    /// # Errors
    ///
    /// Returns `Error::HandlerResolution` when the reference has no `@`,
    /// names an unknown component, or an unknown operation.
    pub fn resolve_handler<'a>(&'a self, reference: &'a HandlerRef) -> Result<&'a Handler> {
        let name = match reference {
            HandlerRef::Direct(h) => return Ok(h),
            HandlerRef::Named(name) => name,
        };

        let unresolved = |reason: String| Error::HandlerResolution {
            reference: name.clone(),
            reason,
        };

        let (component, operation) = name
            .split_once('@')
            .ok_or_else(|| unresolved("Invalid route handler".to_string()))?;

        let target = self
            .components
            .get(component)
            .ok_or_else(|| unresolved(format!("Controller not found: {component}")))?;

        target
            .operations
            .get(operation)
            .ok_or_else(|| unresolved(format!("Method not found: {component}@{operation}")))
    }

    /// Resolve a middleware reference
    ///
    /// # Errors
    ///
    /// Returns `Error::HandlerResolution` when the name is not registered.
    pub fn resolve_middleware<'a>(&'a self, reference: &'a MiddlewareRef) -> Result<&'a dyn Middleware> {
        match reference {
            MiddlewareRef::Direct(m) => Ok(&**m),
            MiddlewareRef::Named(name) => self
                .middlewares
                .get(name)
                .map(|m| &**m)
                .ok_or_else(|| Error::HandlerResolution {
                    reference: name.clone(),
                    reason: format!("Middleware not found: {name}"),
                }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::middleware::CorsMiddleware;
    use serde_json::json;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_component(
            "Users",
            Component::new().operation("show", |_req, params| async move {
                json!({ "id": params.int(0) })
            }),
        );
        registry.register_middleware("Cors", CorsMiddleware::new());
        registry
    }

    fn reason(err: Error) -> String {
        match err {
            Error::HandlerResolution { reason, .. } => reason,
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_resolves_named_operation() {
        let registry = registry();
        let reference = HandlerRef::from("Users@show");
        let h = registry.resolve_handler(&reference).unwrap();
        let res = h(Request::get("/"), Params::new(vec!["3".to_string()])).await;
        assert_eq!(res.body_json().unwrap()["data"]["id"], 3);
    }

    #[test]
    fn test_missing_separator() {
        let reference = HandlerRef::from("UsersShow");
        let err = registry().resolve_handler(&reference).err().unwrap();
        assert_eq!(reason(err), "Invalid route handler");
    }

    #[test]
    fn test_unknown_component() {
        let reference = HandlerRef::from("Posts@index");
        let err = registry().resolve_handler(&reference).err().unwrap();
        assert_eq!(reason(err), "Controller not found: Posts");
    }

    #[test]
    fn test_unknown_operation() {
        let reference = HandlerRef::from("Users@destroy");
        let err = registry().resolve_handler(&reference).err().unwrap();
        assert_eq!(reason(err), "Method not found: Users@destroy");
    }

    #[test]
    fn test_middleware_lookup() {
        let registry = registry();
        let found = MiddlewareRef::from("Cors");
        assert_eq!(registry.resolve_middleware(&found).unwrap().name(), "CorsMiddleware");

        let missing = MiddlewareRef::from("Auth");
        let err = registry.resolve_middleware(&missing).err().unwrap();
        assert_eq!(reason(err), "Middleware not found: Auth");
    }

    #[test]
    fn test_component_operations() {
        let component = Component::new().operation("index", |_req, _params| async { "ok" });
        assert!(component.has_operation("index"));
        assert!(!component.has_operation("show"));
    }
}
