//! Rule predicates evaluated by the policy engine.
//!
//! # Responsibilities
//! - Detect a client-supplied forwarded-address header
//! - Detect `?recursive=` expansion requests
//! - Match paths exactly, by prefix, or by unanchored regular expression
//!
//! # Design Decisions
//! - Each predicate is a small immutable value; the engine owns the ordering
//! - Path matching is case-sensitive
//! - Patterns compile once into a `RegexSet`

use std::collections::HashSet;
use std::fmt;

use axum::http::HeaderMap;
use regex::RegexSet;
use url::form_urlencoded;

use crate::security::headers::X_FORWARDED_FOR;

/// The parts of a request the policy looks at.
#[derive(Debug, Clone, Copy)]
pub struct RequestView<'a> {
    /// Percent-decoded request path.
    pub path: &'a str,
    /// Raw query string, without the leading `?`.
    pub query: Option<&'a str>,
    pub headers: &'a HeaderMap,
}

/// A single predicate over a request.
pub trait Rule: Send + Sync + fmt::Debug {
    /// Short stable name, used in logs.
    fn name(&self) -> &'static str;

    /// Returns true if the request matches this rule.
    fn matches(&self, request: &RequestView<'_>) -> bool;
}

/// Matches any request carrying `X-Forwarded-For`, even with an empty value.
#[derive(Debug, Clone, Copy, Default)]
pub struct ForwardedHeaderRule;

impl Rule for ForwardedHeaderRule {
    fn name(&self) -> &'static str {
        "forwarded-header"
    }

    fn matches(&self, request: &RequestView<'_>) -> bool {
        request.headers.contains_key(X_FORWARDED_FOR)
    }
}

/// Matches requests whose first `recursive` query value is non-empty.
#[derive(Debug, Clone, Copy, Default)]
pub struct RecursiveQueryRule;

impl Rule for RecursiveQueryRule {
    fn name(&self) -> &'static str {
        "recursive-query"
    }

    fn matches(&self, request: &RequestView<'_>) -> bool {
        let Some(query) = request.query else {
            return false;
        };
        form_urlencoded::parse(query.as_bytes())
            .find(|(key, _)| key == "recursive")
            .is_some_and(|(_, value)| !value.is_empty())
    }
}

/// Matches paths equal to one of a fixed set.
#[derive(Debug, Clone)]
pub struct ExactPaths {
    name: &'static str,
    paths: HashSet<String>,
}

impl ExactPaths {
    pub fn new<I, S>(name: &'static str, paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name,
            paths: paths.into_iter().map(Into::into).collect(),
        }
    }
}

impl Rule for ExactPaths {
    fn name(&self) -> &'static str {
        self.name
    }

    fn matches(&self, request: &RequestView<'_>) -> bool {
        self.paths.contains(request.path)
    }
}

/// Matches paths containing a match for any of a set of regular expressions.
#[derive(Debug, Clone)]
pub struct PathPatterns {
    name: &'static str,
    set: RegexSet,
}

impl PathPatterns {
    pub fn new<I, S>(name: &'static str, patterns: I) -> Result<Self, regex::Error>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        Ok(Self {
            name,
            set: RegexSet::new(patterns)?,
        })
    }
}

impl Rule for PathPatterns {
    fn name(&self) -> &'static str {
        self.name
    }

    fn matches(&self, request: &RequestView<'_>) -> bool {
        self.set.is_match(request.path)
    }
}

/// Matches paths starting with any of a list of prefixes.
#[derive(Debug, Clone)]
pub struct PathPrefixes {
    name: &'static str,
    prefixes: Vec<String>,
}

impl PathPrefixes {
    pub fn new<I, S>(name: &'static str, prefixes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name,
            prefixes: prefixes.into_iter().map(Into::into).collect(),
        }
    }
}

impl Rule for PathPrefixes {
    fn name(&self) -> &'static str {
        self.name
    }

    fn matches(&self, request: &RequestView<'_>) -> bool {
        self.prefixes.iter().any(|p| request.path.starts_with(p.as_str()))
    }
}
