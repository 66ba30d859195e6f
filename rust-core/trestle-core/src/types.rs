//! # Path Tokens and Captured Parameters
//!
//! Typed placeholder tokens accepted in route templates and the
//! positional parameter list handed to handlers.

use std::fmt;
use std::str::FromStr;

/// Typed placeholder tokens usable in a route template
///
/// `/users/:int`, `/posts/:slug`, `/files/:any`, `/orders/:uuid`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PathToken {
    /// One or more ASCII digits
    Int,
    /// One or more ASCII letters
    String,
    /// Letters, digits and hyphens
    Slug,
    /// Any run of characters except `/`
    Any,
    /// Canonical lowercase UUID
    Uuid,
}

impl PathToken {
    /// Substitution priority: longer tokens first so that no token is
    /// consumed by a shorter one sharing its prefix.
    pub const PRIORITY: [Self; 5] = [Self::String, Self::Uuid, Self::Slug, Self::Int, Self::Any];

    /// Token as written in templates (without the leading `:`)
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Int => "int",
            Self::String => "string",
            Self::Slug => "slug",
            Self::Any => "any",
            Self::Uuid => "uuid",
        }
    }

    /// Capture group substituted for the token
    #[must_use]
    pub const fn capture(self) -> &'static str {
        match self {
            Self::Int => r"(\d+)",
            Self::String => r"([a-zA-Z]+)",
            Self::Slug => r"([a-zA-Z0-9\-]+)",
            Self::Any => r"([^/]+)",
            Self::Uuid => r"([0-9a-f]{8}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{4}-[0-9a-f]{12})",
        }
    }

    /// Look a token up by its name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::PRIORITY.into_iter().find(|t| t.name() == name)
    }
}

impl fmt::Display for PathToken {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, ":{}", self.name())
    }
}

/// Positional parameters captured from the request path
///
/// Values appear in template declaration order.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Params(Vec<String>);

impl Params {
    /// Create from captured values
    #[must_use]
    pub fn new(values: Vec<String>) -> Self {
        Self(values)
    }

    /// Raw value at position `index`
    #[must_use]
    pub fn get(&self, index: usize) -> Option<&str> {
        self.0.get(index).map(String::as_str)
    }

    /// Value at `index` parsed into `T`
    ///
    /// Returns `None` if the position is missing or does not parse.
    #[must_use]
    pub fn parse<T: FromStr>(&self, index: usize) -> Option<T> {
        self.get(index).and_then(|raw| raw.parse().ok())
    }

    /// Value at `index` as i64 (convenience method)
    #[must_use]
    pub fn int(&self, index: usize) -> Option<i64> {
        self.parse(index)
    }

    /// Number of captured parameters
    #[must_use]
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// True when the route captured nothing
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// All values in order
    #[must_use]
    pub fn as_slice(&self) -> &[String] {
        &self.0
    }
}

impl From<Vec<String>> for Params {
    fn from(values: Vec<String>) -> Self {
        Self(values)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_token_lookup() {
        assert_eq!(PathToken::from_name("int"), Some(PathToken::Int));
        assert_eq!(PathToken::from_name("uuid"), Some(PathToken::Uuid));
        assert_eq!(PathToken::from_name("float"), None);
    }

    #[test]
    fn test_priority_is_longest_first() {
        let lengths: Vec<usize> = PathToken::PRIORITY.iter().map(|t| t.name().len()).collect();
        let mut sorted = lengths.clone();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        assert_eq!(lengths, sorted);
    }

    #[test]
    fn test_token_display() {
        assert_eq!(PathToken::Slug.to_string(), ":slug");
    }

    #[test]
    fn test_params_access() {
        let params = Params::new(vec!["42".to_string(), "hello".to_string()]);
        assert_eq!(params.len(), 2);
        assert_eq!(params.get(0), Some("42"));
        assert_eq!(params.int(0), Some(42));
        assert_eq!(params.int(1), None);
        assert_eq!(params.parse::<String>(1), Some("hello".to_string()));
        assert_eq!(params.get(2), None);
    }
}
