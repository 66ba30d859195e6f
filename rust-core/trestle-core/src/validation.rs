//! # Validation Module
//!
//! Field rule interpreter and structured validation errors.
//!
//! Rules are written per field as `"required|min:3|max:50|email|numeric"`.
//! Failures are collected (never short-circuited) so a single response can
//! report every broken rule.

use crate::error::{Error, Result};
use crate::request::Request;
use regex::Regex;
use serde::Serialize;
use serde_json::{Map, Value};
use std::collections::{BTreeMap, HashMap};
use std::sync::OnceLock;

/// Error code for categorizing validation failures
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationCode {
    /// Required field is missing
    Required,
    /// Value is invalid type
    InvalidType,
    /// Value is too short
    TooShort,
    /// Value is too long
    TooLong,
    /// Value doesn't match pattern
    InvalidFormat,
}

/// A single validation error for a specific field
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Field name
    pub field: String,
    /// Human-readable error message
    pub message: String,
    /// Machine-readable error code
    pub code: ValidationCode,
}

impl FieldError {
    /// Create a new field error
    pub fn new(field: impl Into<String>, message: impl Into<String>, code: ValidationCode) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
            code,
        }
    }

    /// Create a "required field" error
    pub fn required(field: impl Into<String>) -> Self {
        let field_str = field.into();
        Self {
            message: format!("The {field_str} field is required."),
            field: field_str,
            code: ValidationCode::Required,
        }
    }

    /// Create a "not a number" error
    pub fn not_numeric(field: impl Into<String>) -> Self {
        let field_str = field.into();
        Self {
            message: format!("The {field_str} field must be a number."),
            field: field_str,
            code: ValidationCode::InvalidType,
        }
    }

    /// Create an "invalid email" error
    pub fn invalid_email(field: impl Into<String>) -> Self {
        let field_str = field.into();
        Self {
            message: format!("The {field_str} field must be a valid email address."),
            field: field_str,
            code: ValidationCode::InvalidFormat,
        }
    }

    /// Create a "too short" error
    pub fn too_short(field: impl Into<String>, min: usize) -> Self {
        let field_str = field.into();
        Self {
            message: format!("The {field_str} field must be at least {min} characters."),
            field: field_str,
            code: ValidationCode::TooShort,
        }
    }

    /// Create a "too long" error
    pub fn too_long(field: impl Into<String>, max: usize) -> Self {
        let field_str = field.into();
        Self {
            message: format!("The {field_str} field may not be greater than {max} characters."),
            field: field_str,
            code: ValidationCode::TooLong,
        }
    }
}

/// Collection of validation errors
///
/// Allows aggregating multiple field errors for a single request.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ValidationErrors {
    /// List of field-level errors
    pub errors: Vec<FieldError>,
}

impl ValidationErrors {
    /// Create an empty error collection
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a field error
    pub fn add(&mut self, error: FieldError) {
        self.errors.push(error);
    }

    /// Add a required field error
    pub fn add_required(&mut self, field: impl Into<String>) {
        self.add(FieldError::required(field));
    }

    /// Check if there are any errors
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    /// Get the number of errors
    #[must_use]
    pub fn len(&self) -> usize {
        self.errors.len()
    }

    /// Group errors by field
    #[must_use]
    pub fn by_field(&self) -> HashMap<String, Vec<&FieldError>> {
        let mut map: HashMap<String, Vec<&FieldError>> = HashMap::new();
        for error in &self.errors {
            map.entry(error.field.clone()).or_default().push(error);
        }
        map
    }

    /// Field -> messages mapping, as rendered in the 400 envelope
    #[must_use]
    pub fn messages_by_field(&self) -> BTreeMap<String, Vec<String>> {
        let mut map: BTreeMap<String, Vec<String>> = BTreeMap::new();
        for error in &self.errors {
            map.entry(error.field.clone())
                .or_default()
                .push(error.message.clone());
        }
        map
    }

    /// `Ok(())` when empty, `Err(Error::Validation)` otherwise
    ///
    /// # Errors
    ///
    /// Returns `Error::Validation` carrying `self` when any rule failed.
    pub fn into_result(self) -> Result<()> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(Error::Validation(self))
        }
    }
}

/// Result type for validation operations
pub type ValidationResult<T> = std::result::Result<T, ValidationErrors>;

/// A single parsed rule
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Rule {
    /// Value must be present and non-empty
    Required,
    /// At least N characters
    Min(usize),
    /// At most N characters
    Max(usize),
    /// Well-formed email address
    Email,
    /// Numeric value or numeric string
    Numeric,
}

impl Rule {
    /// Parse a `|`-separated rule string; unknown rules are skipped
    #[must_use]
    pub fn parse_all(spec: &str) -> Vec<Self> {
        spec.split('|').filter_map(Self::parse).collect()
    }

    fn parse(part: &str) -> Option<Self> {
        let part = part.trim();
        match part {
            "required" => Some(Self::Required),
            "email" => Some(Self::Email),
            "numeric" => Some(Self::Numeric),
            _ => {
                let (name, arg) = part.split_once(':')?;
                let n = arg.trim().parse().ok()?;
                match name {
                    "min" => Some(Self::Min(n)),
                    "max" => Some(Self::Max(n)),
                    _ => None,
                }
            }
        }
    }

    fn check(self, field: &str, value: Option<&Value>) -> Option<FieldError> {
        let present = value.filter(|v| !v.is_null());
        match self {
            Self::Required => present
                .map_or(true, is_empty_value)
                .then(|| FieldError::required(field)),
            Self::Min(min) => present
                .filter(|v| char_len(v) < min)
                .map(|_| FieldError::too_short(field, min)),
            Self::Max(max) => present
                .filter(|v| char_len(v) > max)
                .map(|_| FieldError::too_long(field, max)),
            Self::Email => (!present.is_some_and(is_email)).then(|| FieldError::invalid_email(field)),
            Self::Numeric => present
                .filter(|v| !is_numeric(v))
                .map(|_| FieldError::not_numeric(field)),
        }
    }
}

/// Run `rules` (field, rule string) against `data`
///
/// # Errors
///
/// Returns every failed rule, in rule declaration order.
pub fn validate(data: &Map<String, Value>, rules: &[(&str, &str)]) -> ValidationResult<()> {
    let mut errors = ValidationErrors::new();
    for (field, spec) in rules {
        for rule in Rule::parse_all(spec) {
            if let Some(error) = rule.check(field, data.get(*field)) {
                errors.add(error);
            }
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Validate everything the request carries (query, form and JSON input)
///
/// # Errors
///
/// Returns `Error::Validation`, which renders as a 400 response.
pub fn validate_request(request: &Request, rules: &[(&str, &str)]) -> Result<()> {
    validate(&request.all(), rules).map_err(Error::Validation)
}

fn is_empty_value(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn char_len(value: &Value) -> usize {
    match value {
        Value::String(s) => s.chars().count(),
        other => other.to_string().chars().count(),
    }
}

fn is_numeric(value: &Value) -> bool {
    match value {
        Value::Number(_) => true,
        Value::String(s) => s.trim().parse::<f64>().is_ok_and(f64::is_finite),
        _ => false,
    }
}

fn email_regex() -> &'static Regex {
    static EMAIL: OnceLock<Regex> = OnceLock::new();
    EMAIL.get_or_init(|| {
        Regex::new(r"^[A-Za-z0-9.!#$%&'*+/=?^_`{|}~-]+@[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?(?:\.[A-Za-z0-9](?:[A-Za-z0-9-]{0,61}[A-Za-z0-9])?)+$")
            .unwrap_or_else(|e| unreachable!("static email pattern: {e}"))
    })
}

fn is_email(value: &Value) -> bool {
    value.as_str().is_some_and(|s| email_regex().is_match(s))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap_or_default()
    }

    #[test]
    fn test_field_error_required() {
        let error = FieldError::required("email");
        assert_eq!(error.field, "email");
        assert_eq!(error.code, ValidationCode::Required);
        assert!(error.message.contains("required"));
    }

    #[test]
    fn test_validation_errors_add() {
        let mut errors = ValidationErrors::new();
        assert!(errors.is_empty());

        errors.add_required("email");
        errors.add(FieldError::too_short("password", 8));

        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_by_field() {
        let mut errors = ValidationErrors::new();
        errors.add(FieldError::required("email"));
        errors.add(FieldError::invalid_email("email"));
        errors.add(FieldError::required("name"));

        let grouped = errors.by_field();
        assert_eq!(grouped.get("email").map(Vec::len), Some(2));
        assert_eq!(grouped.get("name").map(Vec::len), Some(1));
    }

    #[test]
    fn test_rule_parsing() {
        assert_eq!(
            Rule::parse_all("required|min:3|max:10|email|numeric|unknown|min:x"),
            vec![
                Rule::Required,
                Rule::Min(3),
                Rule::Max(10),
                Rule::Email,
                Rule::Numeric
            ]
        );
    }

    #[test]
    fn test_email_required_on_empty_input() {
        let errors = validate(&Map::new(), &[("email", "email|required")]).unwrap_err();
        let messages = errors.messages_by_field();
        assert_eq!(messages.get("email").map(Vec::len), Some(2));
    }

    #[test]
    fn test_required_emptiness() {
        for empty in [json!(""), json!("0"), json!(0), json!(false), json!([]), json!(null)] {
            let result = validate(&data(json!({ "name": empty })), &[("name", "required")]);
            assert!(result.is_err());
        }
        assert!(validate(&data(json!({"name": "Ada"})), &[("name", "required")]).is_ok());
    }

    #[test]
    fn test_min_max_skip_absent_values() {
        assert!(validate(&Map::new(), &[("name", "min:3|max:5")]).is_ok());

        let errors = validate(&data(json!({"name": "ab"})), &[("name", "min:3")]).unwrap_err();
        assert_eq!(errors.errors[0].code, ValidationCode::TooShort);

        let errors = validate(&data(json!({"name": "abcdef"})), &[("name", "max:5")]).unwrap_err();
        assert_eq!(errors.errors[0].code, ValidationCode::TooLong);
    }

    #[test]
    fn test_min_counts_characters_not_bytes() {
        assert!(validate(&data(json!({"name": "çağ"})), &[("name", "max:3")]).is_ok());
    }

    #[test]
    fn test_email_format() {
        assert!(validate(&data(json!({"e": "a@b.io"})), &[("e", "email")]).is_ok());
        assert!(validate(&data(json!({"e": "not-an-email"})), &[("e", "email")]).is_err());
        assert!(validate(&data(json!({"e": "a@b"})), &[("e", "email")]).is_err());
    }

    #[test]
    fn test_numeric() {
        assert!(validate(&data(json!({"n": 12})), &[("n", "numeric")]).is_ok());
        assert!(validate(&data(json!({"n": "12.5"})), &[("n", "numeric")]).is_ok());
        assert!(validate(&data(json!({"n": "12a"})), &[("n", "numeric")]).is_err());
        assert!(validate(&data(json!({"n": "inf"})), &[("n", "numeric")]).is_err());
    }

    #[test]
    fn test_numeric_skips_absent_field() {
        assert!(validate(&Map::new(), &[("age", "numeric")]).is_ok());
        assert!(validate(&data(json!({"age": null})), &[("age", "numeric")]).is_ok());

        let errors = validate(&Map::new(), &[("age", "numeric|required")]).unwrap_err();
        assert_eq!(errors.errors, vec![FieldError::required("age")]);
    }

    #[test]
    fn test_into_result_and_response() {
        let errors = validate(&Map::new(), &[("email", "email|required")]).unwrap_err();
        let err = errors.into_result().unwrap_err();
        let res = err.into_response();
        assert_eq!(res.status, 400);
        let body = res.body_json().unwrap();
        assert_eq!(body["message"], "Validation failed");
        assert_eq!(body["errors"]["email"].as_array().map(Vec::len), Some(2));
    }
}
