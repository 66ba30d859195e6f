//! # HTTP Response
//!
//! Response value plus the standard JSON envelopes:
//!
//! - success: `{"status":"success","data":...}`
//! - paginated: success envelope plus `meta`
//! - error: `{"status":"error","message":...,"errors"?:{field:[...]}}`
//!
//! [`IntoResponse`] normalizes handler return values: a `Response` passes
//! through, object-shaped values become a success envelope, scalars become
//! raw content.

use crate::error::{Error, Result};
use crate::validation::ValidationErrors;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use serde::Serialize;
use serde_json::{json, Value};
use std::collections::{BTreeMap, HashMap};

/// Default content type for every response
pub const DEFAULT_CONTENT_TYPE: &str = "application/json";

/// HTTP response produced by handlers and middleware
#[derive(Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
    /// Content type
    pub content_type: String,
    /// Response headers (Content-Type excluded)
    pub headers: HashMap<String, String>,
}

impl std::fmt::Debug for Response {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Response")
            .field("status", &self.status)
            .field("body", &self.body)
            .field("content_type", &self.content_type)
            .field("headers", &self.headers)
            .finish()
    }
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            content_type: DEFAULT_CONTENT_TYPE.to_string(),
            headers: HashMap::new(),
        }
    }
}

impl Response {
    /// Create a response with raw content and status 200
    #[must_use]
    pub fn raw(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Create a response whose body is the JSON encoding of `value`
    #[must_use]
    pub fn json<T: Serialize + ?Sized>(value: &T) -> Self {
        match serde_json::to_string(value) {
            Ok(body) => Self::raw(body),
            Err(e) => Self::error(format!("Serialize error: {e}"), 500),
        }
    }

    /// Create a text response
    #[must_use]
    pub fn text(body: impl Into<String>) -> Self {
        Self::raw(body).with_header("Content-Type", "text/plain")
    }

    /// 200 success envelope
    #[must_use]
    pub fn ok<T: Serialize + ?Sized>(data: &T) -> Self {
        Self::json(&json!({ "status": "success", "data": data }))
    }

    /// 201 success envelope
    #[must_use]
    pub fn created<T: Serialize + ?Sized>(data: &T) -> Self {
        Self::ok(data).with_status(201)
    }

    /// 204 with an empty body
    #[must_use]
    pub fn no_content() -> Self {
        Self::raw("").with_status(204)
    }

    /// 200 success envelope with pagination metadata
    ///
    /// `last_page` is `ceil(total / per_page)`; a zero `per_page` yields 0.
    #[must_use]
    pub fn paginated<T: Serialize>(items: &[T], total: u64, per_page: u64, page: u64) -> Self {
        let last_page = if per_page == 0 {
            0
        } else {
            total.div_ceil(per_page)
        };
        Self::json(&json!({
            "status": "success",
            "data": items,
            "meta": {
                "current_page": page,
                "last_page": last_page,
                "per_page": per_page,
                "total": total,
            }
        }))
    }

    /// Error envelope with an explicit status
    #[must_use]
    pub fn error(message: impl Into<String>, status: u16) -> Self {
        Self::json(&json!({ "status": "error", "message": message.into() })).with_status(status)
    }

    /// 400 error envelope
    #[must_use]
    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::error(message, 400)
    }

    /// 401 error envelope
    #[must_use]
    pub fn unauthorized(message: impl Into<String>) -> Self {
        Self::error(message, 401)
    }

    /// 403 error envelope
    #[must_use]
    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::error(message, 403)
    }

    /// 404 error envelope
    #[must_use]
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::error(message, 404)
    }

    /// 400 envelope carrying the field -> messages mapping
    #[must_use]
    pub fn validation_failed(errors: &ValidationErrors) -> Self {
        Self::json(&json!({
            "status": "error",
            "message": "Validation failed",
            "errors": errors.messages_by_field(),
        }))
        .with_status(400)
    }

    /// Set status code
    #[must_use]
    pub const fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set a header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
            return;
        }
        self.headers.retain(|k, _| !k.eq_ignore_ascii_case(key));
        self.headers.insert(key.to_string(), value.to_string());
    }

    /// Get a header value (case-insensitive)
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("content-type") {
            return Some(&self.content_type);
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Body as text
    #[must_use]
    pub fn body_str(&self) -> &str {
        &self.body
    }

    /// Parse the body as JSON
    ///
    /// # Errors
    ///
    /// Returns `Error::Json` if the body is not valid JSON.
    pub fn body_json(&self) -> Result<Value> {
        Ok(serde_json::from_str(&self.body)?)
    }

    /// Convert to hyper Response
    pub(crate) fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = hyper::Response::builder()
            .status(status)
            .header("Content-Type", &self.content_type);
        for (k, v) in &self.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|_| {
                let mut fallback =
                    hyper::Response::new(Full::new(Bytes::from_static(b"Internal Server Error")));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            })
    }
}

/// Conversion of handler return values into a [`Response`]
pub trait IntoResponse {
    /// Perform the conversion
    fn into_response(self) -> Response;
}

impl IntoResponse for Response {
    fn into_response(self) -> Response {
        self
    }
}

impl IntoResponse for Value {
    fn into_response(self) -> Response {
        match self {
            Self::Object(_) | Self::Array(_) => Response::ok(&self),
            Self::String(s) => Response::raw(s),
            Self::Null => Response::raw(""),
            scalar => Response::raw(scalar.to_string()),
        }
    }
}

impl IntoResponse for String {
    fn into_response(self) -> Response {
        Response::raw(self)
    }
}

impl IntoResponse for &'static str {
    fn into_response(self) -> Response {
        Response::raw(self)
    }
}

impl IntoResponse for () {
    fn into_response(self) -> Response {
        Response::raw("")
    }
}

macro_rules! scalar_into_response {
    ($($ty:ty),*) => {
        $(
            impl IntoResponse for $ty {
                fn into_response(self) -> Response {
                    Response::raw(self.to_string())
                }
            }
        )*
    };
}

scalar_into_response!(i32, i64, u32, u64, usize, f64, bool);

impl<T: Serialize> IntoResponse for Vec<T> {
    fn into_response(self) -> Response {
        Response::ok(&self)
    }
}

impl<T: Serialize> IntoResponse for HashMap<String, T> {
    fn into_response(self) -> Response {
        Response::ok(&self)
    }
}

impl<T: Serialize> IntoResponse for BTreeMap<String, T> {
    fn into_response(self) -> Response {
        Response::ok(&self)
    }
}

impl<T: IntoResponse> IntoResponse for std::result::Result<T, Error> {
    fn into_response(self) -> Response {
        match self {
            Ok(value) => value.into_response(),
            Err(err) => err.into_response(),
        }
    }
}
