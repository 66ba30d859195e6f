//! # Route Table Entries
//!
//! A route couples a method and a compiled path template with the handler
//! it runs and the middleware that wraps it. Routes are immutable once
//! the router has accepted them.

use crate::error::Result;
use crate::handler::HandlerRef;
use crate::matcher::PathMatcher;
use crate::middleware::{MiddlewareChain, MiddlewareRef};
use crate::router::Method;
use crate::types::Params;

/// A registered route
#[derive(Debug, Clone)]
pub struct Route {
    method: Method,
    matcher: PathMatcher,
    handler: HandlerRef,
    /// Group scope active when the route was registered
    group_middlewares: Vec<MiddlewareRef>,
    /// Route-specific middleware
    middlewares: Vec<MiddlewareRef>,
}

impl Route {
    /// Compile a route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the template does not compile.
    pub fn new(
        method: Method,
        uri: &str,
        handler: HandlerRef,
        group_middlewares: Vec<MiddlewareRef>,
        middlewares: Vec<MiddlewareRef>,
    ) -> Result<Self> {
        Ok(Self {
            method,
            matcher: PathMatcher::compile(uri)?,
            handler,
            group_middlewares,
            middlewares,
        })
    }

    /// Parameters captured from `path` when both method and path match
    #[must_use]
    pub fn matches(&self, method: Method, path: &str) -> Option<Params> {
        if self.method != method {
            return None;
        }
        self.matcher.match_path(path)
    }

    /// Effective middleware: `ambient`, then group scope, then route links
    #[must_use]
    pub fn middleware_chain(&self, ambient: &[MiddlewareRef]) -> MiddlewareChain {
        MiddlewareChain::new()
            .extend(ambient)
            .extend(&self.group_middlewares)
            .extend(&self.middlewares)
    }

    /// HTTP method
    #[must_use]
    pub fn method(&self) -> Method {
        self.method
    }

    /// URI template as registered
    #[must_use]
    pub fn uri(&self) -> &str {
        self.matcher.template()
    }

    /// Handler reference
    #[must_use]
    pub fn handler(&self) -> &HandlerRef {
        &self.handler
    }
}
