//! # Path Matcher
//!
//! Compiles a route template into an anchored regular expression.
//!
//! The template is escaped first, then each typed token (`:int`, `:string`,
//! `:slug`, `:any`, `:uuid`) is replaced by its capture group, longest token
//! name first, and finally every `{name}` placeholder becomes a non-slash
//! capture. Captures keep template order, so handlers receive them
//! positionally.
//!
//! A token only matches at a word boundary: `/users/:integer` keeps
//! `:integer` as literal text.

use crate::error::{Error, Result};
use crate::types::{Params, PathToken};
use regex::{Captures, Regex};
use std::sync::OnceLock;

const FREE_CAPTURE: &str = r"([^/]+)";

fn token_regex() -> &'static Regex {
    static TOKENS: OnceLock<Regex> = OnceLock::new();
    TOKENS.get_or_init(|| {
        let names: Vec<&str> = PathToken::PRIORITY.iter().map(|t| t.name()).collect();
        Regex::new(&format!(r":({})\b", names.join("|")))
            .unwrap_or_else(|e| unreachable!("static token pattern: {e}"))
    })
}

fn placeholder_regex() -> &'static Regex {
    static PLACEHOLDER: OnceLock<Regex> = OnceLock::new();
    PLACEHOLDER.get_or_init(|| {
        Regex::new(r"\\\{[A-Za-z0-9_]+\\\}")
            .unwrap_or_else(|e| unreachable!("static placeholder pattern: {e}"))
    })
}

/// Compiled route template
#[derive(Debug, Clone)]
pub struct PathMatcher {
    template: String,
    regex: Regex,
}

impl PathMatcher {
    /// Compile a template
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if the generated expression does
    /// not compile.
    pub fn compile(template: &str) -> Result<Self> {
        let source = Self::to_regex(template);
        let regex = Regex::new(&format!("^{source}$")).map_err(|e| Error::InvalidRoutePattern {
            pattern: template.to_string(),
            reason: e.to_string(),
        })?;

        Ok(Self {
            template: template.to_string(),
            regex,
        })
    }

    /// Regular expression source (unanchored) for a template
    #[must_use]
    pub fn to_regex(template: &str) -> String {
        let escaped = regex::escape(template);
        let typed = token_regex().replace_all(&escaped, |caps: &Captures<'_>| {
            PathToken::from_name(&caps[1]).map_or_else(|| caps[0].to_string(), |t| t.capture().to_string())
        });
        placeholder_regex()
            .replace_all(&typed, FREE_CAPTURE)
            .into_owned()
    }

    /// Match a request path; returns captured values in declaration order
    #[must_use]
    pub fn match_path(&self, path: &str) -> Option<Params> {
        let caps = self.regex.captures(path)?;
        let values = caps
            .iter()
            .skip(1)
            .map(|m| m.map_or_else(String::new, |m| m.as_str().to_string()))
            .collect();
        Some(Params::new(values))
    }

    /// The template this matcher was compiled from
    #[must_use]
    pub fn template(&self) -> &str {
        &self.template
    }

    /// Number of capture groups
    #[must_use]
    pub fn param_count(&self) -> usize {
        self.regex.captures_len() - 1
    }
}
