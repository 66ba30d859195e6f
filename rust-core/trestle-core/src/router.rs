//! # Router
//!
//! Ordered route table with first-match-wins dispatch.
//!
//! Routes are scanned in registration order; the first one whose method
//! and compiled template match wins, regardless of how specific later
//! routes are. The matched route runs behind its middleware chain:
//! ambient middleware, then the group scope captured at registration,
//! then the route's own links.
//!
//! `dispatch` never fails: unmatched requests become a 404 response and
//! unresolvable handler or middleware references become a 500 response.

use crate::error::{Error, Result};
use crate::handler::{BoxFuture, HandlerRef};
use crate::middleware::{terminal, MiddlewareRef, Pipeline};
use crate::registry::Registry;
use crate::request::Request;
use crate::response::Response;
use crate::route::Route;
use crate::types::Params;
use std::str::FromStr;
use tracing::{debug, warn};

/// HTTP methods supported by the router
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP HEAD
    Head,
    /// HTTP OPTIONS
    Options,
}

impl Method {
    /// Upper-case method name
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
            Self::Patch => "PATCH",
            Self::Head => "HEAD",
            Self::Options => "OPTIONS",
        }
    }

    /// Convert from a hyper method; `None` for methods no route can use
    #[must_use]
    pub fn from_hyper(method: &hyper::Method) -> Option<Self> {
        method.as_str().parse().ok()
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            "PATCH" => Ok(Self::Patch),
            "HEAD" => Ok(Self::Head),
            "OPTIONS" => Ok(Self::Options),
            other => Err(Error::InvalidRoutePattern {
                pattern: other.to_string(),
                reason: "unsupported HTTP method".to_string(),
            }),
        }
    }
}

/// Route table plus the middleware and registry used to run it
#[derive(Default)]
pub struct Router {
    routes: Vec<Route>,
    /// Applied to every route, in order
    middlewares: Vec<MiddlewareRef>,
    /// Stack of group middleware active during registration
    scope: Vec<MiddlewareRef>,
    registry: Registry,
}

impl Router {
    /// Create a new empty router
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router that resolves named references through `registry`
    #[must_use]
    pub fn with_registry(registry: Registry) -> Self {
        Self {
            registry,
            ..Self::default()
        }
    }

    /// Registry for named handlers and middleware
    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// Append a middleware applied to every route
    pub fn use_middleware(&mut self, middleware: impl Into<MiddlewareRef>) -> &mut Self {
        self.middlewares.push(middleware.into());
        self
    }

    /// Register a route
    ///
    /// The group scope active at this point is recorded with the route.
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the template does not compile.
    pub fn add_route(
        &mut self,
        method: Method,
        uri: &str,
        handler: impl Into<HandlerRef>,
        middlewares: Vec<MiddlewareRef>,
    ) -> Result<&mut Self> {
        let route = Route::new(method, uri, handler.into(), self.scope.clone(), middlewares)?;
        debug!(method = %method, uri = uri, index = self.routes.len(), "Registered route");
        self.routes.push(route);
        Ok(self)
    }

    /// Register a GET route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the template does not compile.
    pub fn get(&mut self, uri: &str, handler: impl Into<HandlerRef>) -> Result<&mut Self> {
        self.add_route(Method::Get, uri, handler, Vec::new())
    }

    /// Register a POST route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the template does not compile.
    pub fn post(&mut self, uri: &str, handler: impl Into<HandlerRef>) -> Result<&mut Self> {
        self.add_route(Method::Post, uri, handler, Vec::new())
    }

    /// Register a PUT route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the template does not compile.
    pub fn put(&mut self, uri: &str, handler: impl Into<HandlerRef>) -> Result<&mut Self> {
        self.add_route(Method::Put, uri, handler, Vec::new())
    }

    /// Register a PATCH route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the template does not compile.
    pub fn patch(&mut self, uri: &str, handler: impl Into<HandlerRef>) -> Result<&mut Self> {
        self.add_route(Method::Patch, uri, handler, Vec::new())
    }

    /// Register a DELETE route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the template does not compile.
    pub fn delete(&mut self, uri: &str, handler: impl Into<HandlerRef>) -> Result<&mut Self> {
        self.add_route(Method::Delete, uri, handler, Vec::new())
    }

    /// Register an OPTIONS route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the template does not compile.
    pub fn options(&mut self, uri: &str, handler: impl Into<HandlerRef>) -> Result<&mut Self> {
        self.add_route(Method::Options, uri, handler, Vec::new())
    }

    /// Register routes with additional middleware
    ///
    /// `middlewares` wrap every route registered inside `register`. The
    /// scope is restored afterwards, also when `register` fails. Groups
    /// nest: inner scopes append to outer ones.
    ///
    /// # Errors
    ///
    /// Propagates the first error returned by `register`.
    pub fn group<F>(&mut self, middlewares: Vec<MiddlewareRef>, register: F) -> Result<&mut Self>
    where
        F: FnOnce(&mut Self) -> Result<()>,
    {
        let depth = self.scope.len();
        self.scope.extend(middlewares);
        let outcome = register(self);
        self.scope.truncate(depth);
        outcome?;
        Ok(self)
    }

    /// Registered routes in dispatch order
    #[must_use]
    pub fn routes(&self) -> &[Route] {
        &self.routes
    }

    /// Dispatch a request to the first matching route
    pub async fn dispatch(&self, req: Request) -> Response {
        let Some((route, params)) = self.find(&req) else {
            debug!(method = %req.method, path = %req.path, "No route matched");
            return Error::RouteNotFound {
                method: req.method.to_string(),
                path: req.path,
            }
            .into_response();
        };

        debug!(
            method = %req.method,
            path = %req.path,
            route = route.uri(),
            params = params.len(),
            "Route matched"
        );

        let chain = route.middleware_chain(&self.middlewares);
        let handler = route.handler();
        let invoke = terminal(move |req| self.invoke(handler, req, params));
        Pipeline::run(chain.links(), &self.registry, req, invoke).await
    }

    fn find(&self, req: &Request) -> Option<(&Route, Params)> {
        self.routes
            .iter()
            .find_map(|route| route.matches(req.method, &req.path).map(|params| (route, params)))
    }

    fn invoke<'a>(&'a self, handler: &'a HandlerRef, req: Request, params: Params) -> BoxFuture<'a, Response> {
        match self.registry.resolve_handler(handler) {
            Ok(h) => h(req, params),
            Err(e) => {
                warn!(error = %e, "Handler resolution failed");
                Box::pin(async move { e.into_response() })
            }
        }
    }
}
