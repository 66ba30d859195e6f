//! # HTTP Request
//!
//! Normalized request value handed to middleware and handlers.
//!
//! - Headers are kept in a `HeaderMap`, so lookups are case-insensitive
//! - Query string is parsed once at construction
//! - Form and JSON bodies are decoded on access; JSON wins on key collision

use crate::error::{Error, Result};
use crate::json::parse_json_bytes;
use crate::router::Method;
use http_body_util::BodyExt;
use hyper::body::Bytes;
use hyper::http::Extensions;
use serde_json::{Map, Value};
use std::collections::HashMap;
use url::form_urlencoded;

/// HTTP request seen by the router
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    /// Raw query string (e.g., "page=1&limit=10")
    query_string: Option<String>,
    /// Parsed query parameters
    query_params: HashMap<String, String>,
    /// Request headers
    headers: hyper::HeaderMap,
    /// Request body (collected)
    body: Option<Bytes>,
    /// Values attached by middleware for later links
    extensions: Extensions,
}

impl Request {
    /// Create a request manually (for testing/internal use)
    ///
    /// `path` may carry a query string.
    pub fn new(
        method: Method,
        path: impl Into<String>,
        headers_map: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Self {
        let path = path.into();
        let (path, query_string) = if let Some((p, q)) = path.split_once('?') {
            (p.to_string(), Some(q.to_string()))
        } else {
            (path, None)
        };

        let query_params = parse_query_string(query_string.as_deref());

        let mut headers = hyper::HeaderMap::new();
        for (k, v) in headers_map {
            if let (Ok(n), Ok(v)) = (
                hyper::header::HeaderName::from_bytes(k.as_bytes()),
                hyper::header::HeaderValue::from_str(&v),
            ) {
                headers.insert(n, v);
            }
        }

        Self {
            method,
            path,
            query_string,
            query_params,
            headers,
            body,
            extensions: Extensions::new(),
        }
    }

    /// Shorthand for a body-less request
    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::Get, path, HashMap::new(), None)
    }

    /// Shorthand for a request carrying a JSON body
    pub fn with_json(method: Method, path: impl Into<String>, body: &Value) -> Self {
        let headers = HashMap::from([("content-type".to_string(), "application/json".to_string())]);
        Self::new(method, path, headers, Some(Bytes::from(body.to_string())))
    }

    /// Create from hyper request with body size limit
    ///
    /// # Errors
    ///
    /// Returns `Error::RouteNotFound` for a method no route can register,
    /// and `Error::PayloadTooLarge` if the declared or actual body length
    /// exceeds `max_body_size`.
    pub async fn from_hyper_with_limit(
        req: hyper::Request<hyper::body::Incoming>,
        max_body_size: usize,
    ) -> Result<Self> {
        let Some(method) = Method::from_hyper(req.method()) else {
            return Err(Error::RouteNotFound {
                method: req.method().to_string(),
                path: req.uri().path().to_string(),
            });
        };

        let uri = req.uri();
        let path = uri.path().to_string();
        let query_string = uri.query().map(String::from);

        let query_params = parse_query_string(query_string.as_deref());

        let headers = req.headers().clone();
        if let Some(content_len) = headers
            .get(hyper::header::CONTENT_LENGTH)
            .and_then(|len| len.to_str().ok())
            .and_then(|len| len.parse::<usize>().ok())
        {
            if content_len > max_body_size {
                return Err(Error::PayloadTooLarge {
                    limit: max_body_size,
                    actual: content_len,
                });
            }
        }

        let body = match BodyExt::collect(req.into_body()).await {
            Ok(collected) => {
                let bytes = collected.to_bytes();
                if bytes.len() > max_body_size {
                    return Err(Error::PayloadTooLarge {
                        limit: max_body_size,
                        actual: bytes.len(),
                    });
                }
                Some(bytes)
            }
            Err(_) => None,
        };

        Ok(Self {
            method,
            path,
            query_string,
            query_params,
            headers,
            body,
            extensions: Extensions::new(),
        })
    }

    /// Check the method, ignoring case
    #[must_use]
    pub fn is_method(&self, method: &str) -> bool {
        self.method.as_str().eq_ignore_ascii_case(method)
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            hyper::header::HeaderName::from_bytes(name.as_bytes()),
            hyper::header::HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// Get all headers as a HashMap (lowercase names)
    #[must_use]
    pub fn headers_map(&self) -> HashMap<String, String> {
        self.headers
            .iter()
            .filter_map(|(k, v)| {
                v.to_str()
                    .ok()
                    .map(|val| (k.as_str().to_string(), val.to_string()))
            })
            .collect()
    }

    /// Get a single query parameter
    #[must_use]
    pub fn query(&self, key: &str) -> Option<&str> {
        self.query_params.get(key).map(String::as_str)
    }

    /// Get query parameters as a HashMap
    #[must_use]
    pub fn query_map(&self) -> &HashMap<String, String> {
        &self.query_params
    }

    /// Get raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }

    /// Get the request body as bytes
    #[must_use]
    pub fn body_bytes(&self) -> Option<&[u8]> {
        self.body.as_deref()
    }

    /// Get the request body as string (UTF-8)
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        self.body_bytes().and_then(|b| std::str::from_utf8(b).ok())
    }

    /// True when Content-Type declares JSON
    #[must_use]
    pub fn is_json(&self) -> bool {
        self.header("content-type")
            .is_some_and(|ct| ct.contains("application/json"))
    }

    fn is_form(&self) -> bool {
        self.header("content-type")
            .is_some_and(|ct| ct.contains("application/x-www-form-urlencoded"))
    }

    /// Decoded form body (empty unless the body is url-encoded)
    #[must_use]
    pub fn form(&self) -> Map<String, Value> {
        if !self.is_form() {
            return Map::new();
        }
        parse_query_string(self.body_str())
            .into_iter()
            .map(|(k, v)| (k, Value::String(v)))
            .collect()
    }

    /// Decoded JSON body object (empty if absent, not JSON, or not an object)
    #[must_use]
    pub fn json_body(&self) -> Map<String, Value> {
        if !self.is_json() {
            return Map::new();
        }
        let Some(bytes) = self.body_bytes() else {
            return Map::new();
        };
        let mut buf = bytes.to_vec();
        match parse_json_bytes::<Value>(&mut buf) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        }
    }

    /// Body parameters: form merged with JSON, JSON taking precedence
    #[must_use]
    pub fn inputs(&self) -> Map<String, Value> {
        let mut merged = self.form();
        merged.extend(self.json_body());
        merged
    }

    /// A single body parameter
    #[must_use]
    pub fn input(&self, key: &str) -> Option<Value> {
        self.inputs().remove(key)
    }

    /// Query, form and JSON parameters merged in that order
    #[must_use]
    pub fn all(&self) -> Map<String, Value> {
        let mut merged: Map<String, Value> = self
            .query_params
            .iter()
            .map(|(k, v)| (k.clone(), Value::String(v.clone())))
            .collect();
        merged.extend(self.inputs());
        merged
    }

    /// Attach a typed value for downstream middleware and handlers
    pub fn insert_extension<T: Clone + Send + Sync + 'static>(&mut self, value: T) {
        self.extensions.insert(value);
    }

    /// Read a value attached by an earlier link
    #[must_use]
    pub fn extension<T: Send + Sync + 'static>(&self) -> Option<&T> {
        self.extensions.get::<T>()
    }
}

/// Parse an url-encoded string into a map
///
/// `+` decodes to a space and the last duplicate key wins.
fn parse_query_string(query: Option<&str>) -> HashMap<String, String> {
    query
        .map(|q| form_urlencoded::parse(q.as_bytes()).into_owned().collect())
        .unwrap_or_default()
}
