//! Path pattern matching.
//!
//! # Responsibilities
//! - Compile route patterns once at registration
//! - Match a request path against the whole pattern
//! - Extract capture groups
//!
//! # Design Decisions
//! - Patterns are regular expressions anchored at both ends
//! - Patterns without regex metacharacters compile to an exact-string
//!   matcher and never touch the regex engine
//! - Matching is case-sensitive

use regex::Regex;

use crate::error::HttpError;
use crate::http::request::Captures;

/// Matches a request path and yields its captures.
pub trait Matcher: Send + Sync + std::fmt::Debug {
    /// `Some(captures)` if the entire path matches; index 0 is the full match.
    fn captures(&self, path: &str) -> Option<Captures>;
}

/// Literal path, compared byte for byte.
#[derive(Debug, Clone)]
pub struct ExactMatcher {
    path: String,
}

impl ExactMatcher {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into() }
    }
}

impl Matcher for ExactMatcher {
    fn captures(&self, path: &str) -> Option<Captures> {
        (path == self.path).then(|| vec![Some(path.to_string())])
    }
}

/// Full-match regular expression.
#[derive(Debug, Clone)]
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    pub fn new(pattern: &str) -> Result<Self, HttpError> {
        let regex = Regex::new(&format!("^(?:{})$", pattern)).map_err(|source| HttpError::InvalidPattern {
            pattern: pattern.to_string(),
            source,
        })?;
        Ok(Self { regex })
    }
}

impl Matcher for RegexMatcher {
    fn captures(&self, path: &str) -> Option<Captures> {
        self.regex.captures(path).map(|caps| {
            caps.iter()
                .map(|m| m.map(|m| m.as_str().to_string()))
                .collect()
        })
    }
}

/// Compile `pattern` into the cheapest matcher that implements it.
pub fn compile(pattern: &str) -> Result<Box<dyn Matcher>, HttpError> {
    if regex::escape(pattern) == pattern {
        Ok(Box::new(ExactMatcher::new(pattern)))
    } else {
        Ok(Box::new(RegexMatcher::new(pattern)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn regex_route_captures_digits_only() {
        let m = compile(r"/user/([0-9]+)").unwrap();
        let caps = m.captures("/user/42").unwrap();
        assert_eq!(caps, vec![Some("/user/42".to_string()), Some("42".to_string())]);
        assert!(m.captures("/user/abc").is_none());
        // whole-path match only
        assert!(m.captures("/user/42/extra").is_none());
    }

    #[test]
    fn literal_pattern_is_exact() {
        let m = compile("/hi").unwrap();
        assert!(m.captures("/hi").is_some());
        assert!(m.captures("/hi/").is_none());
        assert!(m.captures("/HI").is_none());
    }

    #[test]
    fn invalid_pattern_is_reported() {
        let err = compile("/broken(").unwrap_err();
        assert!(matches!(err, HttpError::InvalidPattern { .. }));
    }
}
