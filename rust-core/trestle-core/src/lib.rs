//! # Trestle Core
//!
//! Core library for the Trestle web toolkit.
//! Provides request routing with a middleware pipeline, request/response
//! value objects, and a database layer with a fluent query builder.
//!
//! ## Architecture
//!
//! A request reaches the [`Router`], which picks the first route matching
//! method and path, runs the ambient, group and route middleware in order
//! and finally the handler. Handlers reach the database through an
//! explicitly constructed [`Database`] binding rather than global state.
//!
//! ## Modules
//!
//! - `server` - HTTP server built on Hyper
//! - `router` - Route table and dispatch
//! - `route` - A registered route with its compiled matcher
//! - `matcher` - Path template compilation (`:int`, `:uuid`, `{name}`, ...)
//! - `middleware` - Middleware trait, pipeline and built-in middleware
//! - `registry` - Name-based handler and middleware lookup
//! - `handler` - Handler types
//! - `request` / `response` - HTTP value objects and JSON envelopes
//! - `validation` - Field rules and structured validation errors
//! - `database` - SQLx adapters (MySQL, PostgreSQL, SQLite) and query builder
//! - `model` - Table-backed models with fillable/hidden masks
//! - `config` - Layered configuration
//! - `logging` - Tracing subscriber setup
//! - `json` - JSON parsing with simd-json
//! - `types` - Path tokens and captured parameters
//! - `error` - Error types and handling

pub mod config;
pub mod database;
pub mod error;
pub mod handler;
pub mod json;
pub mod logging;
pub mod matcher;
pub mod middleware;
pub mod model;
pub mod registry;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod types;
pub mod validation;

pub use config::{AppConfig, DatabaseConfig, ServerConfig};
pub use database::{Adapter, Database, DatabaseAdapter, DbValue, Driver, QueryBuilder, Record};
pub use error::{Error, Result};
pub use handler::{handler, BoxFuture, Handler, HandlerRef};
pub use matcher::PathMatcher;
pub use middleware::{
    from_fn, CorsMiddleware, LoggingMiddleware, Middleware, MiddlewareChain, MiddlewareRef, Next,
    RequestIdMiddleware,
};
pub use model::{Model, ModelSchema};
pub use registry::{Component, Registry};
pub use request::Request;
pub use response::{IntoResponse, Response};
pub use route::Route;
pub use router::{Method, Router};
pub use server::Server;
pub use types::{Params, PathToken};
pub use validation::{validate, validate_request, FieldError, ValidationCode, ValidationErrors};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert_eq!(VERSION, "0.1.0");
    }
}
