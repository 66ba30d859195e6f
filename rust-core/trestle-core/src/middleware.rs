//! # Middleware System
//!
//! Chain-of-responsibility request interception.
//!
//! Every middleware receives the request and a [`Next`] continuation bound to
//! the rest of the chain. It either calls `next.run(req)` (with the same or a
//! derived request) and returns that response, possibly decorated, or returns
//! its own response without calling `next`, which skips every later link and
//! the handler.
//!
//! Links run strictly in registration order; there is no concurrency inside
//! one chain.

use crate::handler::BoxFuture;
use crate::registry::Registry;
use crate::request::Request;
use crate::response::Response;
use crate::router::Method;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info, warn};

/// Middleware trait for request/response interception
pub trait Middleware: Send + Sync {
    /// Handle the request, delegating to `next` or short-circuiting
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response>;

    /// Middleware name for logging
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

/// Reference to a middleware: an instance or a name in the [`Registry`]
#[derive(Clone)]
pub enum MiddlewareRef {
    /// Middleware instance
    Direct(Arc<dyn Middleware>),
    /// Name resolved through the registry at dispatch time
    Named(String),
}

impl MiddlewareRef {
    /// Wrap a middleware instance
    #[must_use]
    pub fn new<M: Middleware + 'static>(middleware: M) -> Self {
        Self::Direct(Arc::new(middleware))
    }
}

impl fmt::Debug for MiddlewareRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Direct(m) => f.debug_tuple("MiddlewareRef::Direct").field(&m.name()).finish(),
            Self::Named(name) => f.debug_tuple("MiddlewareRef::Named").field(name).finish(),
        }
    }
}

impl From<&str> for MiddlewareRef {
    fn from(name: &str) -> Self {
        Self::Named(name.to_string())
    }
}

impl From<String> for MiddlewareRef {
    fn from(name: String) -> Self {
        Self::Named(name)
    }
}

impl From<Arc<dyn Middleware>> for MiddlewareRef {
    fn from(middleware: Arc<dyn Middleware>) -> Self {
        Self::Direct(middleware)
    }
}

/// Terminal link of a chain, invoked once every middleware has delegated
pub type Terminal<'a> = Box<dyn FnOnce(Request) -> BoxFuture<'a, Response> + Send + 'a>;

/// Box an async closure as a [`Terminal`]
pub fn terminal<'a, F, Fut>(f: F) -> Terminal<'a>
where
    F: FnOnce(Request) -> Fut + Send + 'a,
    Fut: Future<Output = Response> + Send + 'a,
{
    Box::new(move |req| -> BoxFuture<'a, Response> { Box::pin(f(req)) })
}

/// Continuation bound to the remainder of a chain
pub struct Next<'a> {
    links: &'a [MiddlewareRef],
    registry: &'a Registry,
    terminal: Terminal<'a>,
}

impl<'a> Next<'a> {
    /// Run the remaining links, then the terminal
    ///
    /// A link that cannot be resolved produces a 500 error response in
    /// place of the rest of the chain.
    pub fn run(self, req: Request) -> BoxFuture<'a, Response> {
        let Some((first, rest)) = self.links.split_first() else {
            return (self.terminal)(req);
        };

        let middleware = match self.registry.resolve_middleware(first) {
            Ok(m) => m,
            Err(e) => {
                warn!(error = %e, "Middleware resolution failed");
                return Box::pin(async move { e.into_response() });
            }
        };

        debug!(middleware = middleware.name(), "Running middleware");
        let next = Next {
            links: rest,
            registry: self.registry,
            terminal: self.terminal,
        };
        middleware.handle(req, next)
    }

    /// Number of links still ahead
    #[must_use]
    pub fn remaining(&self) -> usize {
        self.links.len()
    }
}

/// Composes an ordered middleware list with a terminal handler
pub struct Pipeline;

impl Pipeline {
    /// Run `links` in order, ending with `terminal`
    pub fn run<'a>(
        links: &'a [MiddlewareRef],
        registry: &'a Registry,
        req: Request,
        terminal: Terminal<'a>,
    ) -> BoxFuture<'a, Response> {
        Next {
            links,
            registry,
            terminal,
        }
        .run(req)
    }
}

/// Per-dispatch middleware list: ambient first, then group, then route
#[derive(Debug, Default, Clone)]
pub struct MiddlewareChain {
    links: Vec<MiddlewareRef>,
}

impl MiddlewareChain {
    /// Create a new empty middleware chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append links, keeping their order (no deduplication)
    #[must_use]
    pub fn extend(mut self, links: &[MiddlewareRef]) -> Self {
        self.links.extend_from_slice(links);
        self
    }

    /// The materialized links
    #[must_use]
    pub fn links(&self) -> &[MiddlewareRef] {
        &self.links
    }

    /// Get the number of middlewares
    #[must_use]
    pub fn len(&self) -> usize {
        self.links.len()
    }

    /// Check if chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }
}

/// Middleware backed by a closure, see [`from_fn`]
pub struct FnMiddleware<F> {
    f: F,
    name: &'static str,
}

/// Build a middleware from a closure
///
/// ```ignore
/// let auth = from_fn("Auth", |req, next| Box::pin(async move {
///     if req.header("authorization").is_none() {
///         return Response::unauthorized("Unauthorized");
///     }
///     next.run(req).await
/// }));
/// ```
pub fn from_fn<F>(name: &'static str, f: F) -> FnMiddleware<F>
where
    F: for<'a> Fn(Request, Next<'a>) -> BoxFuture<'a, Response> + Send + Sync,
{
    FnMiddleware { f, name }
}

impl<F> Middleware for FnMiddleware<F>
where
    F: for<'a> Fn(Request, Next<'a>) -> BoxFuture<'a, Response> + Send + Sync,
{
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        (self.f)(req, next)
    }

    fn name(&self) -> &'static str {
        self.name
    }
}

/// Logging middleware - logs requests as structured events
#[derive(Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Create a new logging middleware
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Middleware for LoggingMiddleware {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let method = req.method;
            let path = req.path.clone();
            let request_id = req.header("x-request-id").unwrap_or("-").to_string();
            info!(
                method = %method,
                path = %path,
                request_id = %request_id,
                "Request received"
            );

            let start = Instant::now();
            let res = next.run(req).await;
            info!(
                method = %method,
                path = %path,
                status = res.status,
                request_id = %request_id,
                elapsed_ms = u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX),
                "Response sent"
            );
            res
        })
    }

    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }
}

/// Assigns an `x-request-id` when the client did not send one and echoes
/// it on the response
#[derive(Default)]
pub struct RequestIdMiddleware {
    counter: AtomicU64,
}

impl RequestIdMiddleware {
    /// Header carrying the id
    pub const HEADER: &'static str = "x-request-id";

    /// Create a new request id middleware
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn generate(&self) -> String {
        let seq = self.counter.fetch_add(1, Ordering::Relaxed);
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_nanos());
        format!("{nanos:x}-{seq:04x}")
    }
}

impl Middleware for RequestIdMiddleware {
    fn handle<'a>(&'a self, mut req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let existing = req
                .header(Self::HEADER)
                .filter(|v| !v.is_empty())
                .map(str::to_string);
            let id = match existing {
                Some(id) => id,
                None => {
                    let generated = self.generate();
                    req.set_header(Self::HEADER, &generated);
                    generated
                }
            };
            let mut res = next.run(req).await;
            res.set_header(Self::HEADER, &id);
            res
        })
    }

    fn name(&self) -> &'static str {
        "RequestIdMiddleware"
    }
}

/// CORS middleware - adds Cross-Origin Resource Sharing headers
///
/// `OPTIONS` requests are answered directly with 204.
#[derive(Clone)]
pub struct CorsMiddleware {
    allow_origin: String,
    allow_methods: String,
    allow_headers: String,
}

impl Default for CorsMiddleware {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
        }
    }
}

impl CorsMiddleware {
    /// Create a new CORS middleware with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set allowed origin
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allow_origin = origin.into();
        self
    }

    /// Set allowed methods
    #[must_use]
    pub fn allow_methods(mut self, methods: impl Into<String>) -> Self {
        self.allow_methods = methods.into();
        self
    }

    /// Set allowed headers
    #[must_use]
    pub fn allow_headers(mut self, headers: impl Into<String>) -> Self {
        self.allow_headers = headers.into();
        self
    }

    /// Get the Access-Control-Allow-Origin header value
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.allow_origin
    }

    fn decorate(&self, res: &mut Response) {
        res.set_header("Access-Control-Allow-Origin", &self.allow_origin);
        res.set_header("Access-Control-Allow-Methods", &self.allow_methods);
        res.set_header("Access-Control-Allow-Headers", &self.allow_headers);
    }
}

impl Middleware for CorsMiddleware {
    fn handle<'a>(&'a self, req: Request, next: Next<'a>) -> BoxFuture<'a, Response> {
        Box::pin(async move {
            let mut res = if req.method == Method::Options {
                Response::no_content()
            } else {
                next.run(req).await
            };
            self.decorate(&mut res);
            res
        })
    }

    fn name(&self) -> &'static str {
        "CorsMiddleware"
    }
}
