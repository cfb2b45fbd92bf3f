//! Field projections and the matchers evaluated against them.
//!
//! "The output contains X" is just [`FieldMatch::Contains`] over
//! [`Projection::Raw`], so every check can be unit-tested on captured
//! output without a cluster.

use std::fmt;

use regex::Regex;
use serde_json::Value;

use crate::error::ConvergeError;

/// How to project an object's current representation to a string.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Projection {
    /// `kind.group/name`, as printed by `-o name`.
    Name,
    /// A CLI JSONPath template, e.g. `{.status.phase}`, evaluated by the CLI.
    JsonPath(String),
    /// An RFC 6901 pointer, e.g. `/status/readyReplicas`, evaluated locally
    /// over `-o json`.
    Pointer(String),
    /// Default human-readable output.
    Raw,
}

impl Projection {
    /// Shorthand for [`Projection::JsonPath`]; braces are added when missing.
    #[must_use]
    pub fn jsonpath(expr: impl Into<String>) -> Self {
        let expr = expr.into();
        if expr.starts_with('{') {
            Self::JsonPath(expr)
        } else {
            Self::JsonPath(format!("{{{expr}}}"))
        }
    }

    /// Shorthand for [`Projection::Pointer`].
    #[must_use]
    pub fn pointer(pointer: impl Into<String>) -> Self {
        Self::Pointer(pointer.into())
    }

    /// Output flags to append to a `get`.
    #[must_use]
    pub fn output_args(&self) -> Vec<String> {
        match self {
            Self::Name => vec!["-o".into(), "name".into()],
            Self::JsonPath(expr) => vec!["-o".into(), format!("jsonpath={expr}")],
            Self::Pointer(_) => vec!["-o".into(), "json".into()],
            Self::Raw => Vec::new(),
        }
    }

    /// Reduce raw CLI output to the projected value.
    ///
    /// Pointers that resolve to nothing yield an empty string, matching what
    /// the CLI prints for a JSONPath over a missing field.
    ///
    /// # Errors
    ///
    /// Returns [`ConvergeError::Decode`] if a pointer projection receives
    /// output that is not JSON.
    pub fn extract(&self, output: &str) -> Result<String, ConvergeError> {
        match self {
            Self::Name | Self::JsonPath(_) | Self::Raw => Ok(output.to_string()),
            Self::Pointer(pointer) => {
                let doc: Value = serde_json::from_str(output)
                    .map_err(|e| ConvergeError::decode("JSON object", e))?;
                Ok(doc.pointer(pointer).map(render).unwrap_or_default())
            }
        }
    }
}

impl fmt::Display for Projection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Name => write!(f, "name"),
            Self::JsonPath(expr) => write!(f, "jsonpath={expr}"),
            Self::Pointer(pointer) => write!(f, "pointer={pointer}"),
            Self::Raw => write!(f, "raw"),
        }
    }
}

fn render(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Expectation on a projected value.
#[derive(Debug, Clone)]
pub enum FieldMatch {
    Equals(String),
    NotEquals(String),
    Contains(String),
    NotContains(String),
    Matches(Regex),
    NonEmpty,
}

impl FieldMatch {
    #[must_use]
    pub fn matches(&self, value: &str) -> bool {
        match self {
            Self::Equals(expected) => value == expected,
            Self::NotEquals(expected) => value != expected,
            Self::Contains(needle) => value.contains(needle.as_str()),
            Self::NotContains(needle) => !value.contains(needle.as_str()),
            Self::Matches(re) => re.is_match(value),
            Self::NonEmpty => !value.trim().is_empty(),
        }
    }
}

impl fmt::Display for FieldMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Equals(v) => write!(f, "== {v:?}"),
            Self::NotEquals(v) => write!(f, "!= {v:?}"),
            Self::Contains(v) => write!(f, "contains {v:?}"),
            Self::NotContains(v) => write!(f, "does not contain {v:?}"),
            Self::Matches(re) => write!(f, "matches /{}/", re.as_str()),
            Self::NonEmpty => write!(f, "is non-empty"),
        }
    }
}

/// Expectation on the size of a resource set.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CountMatch {
    Exactly(usize),
    AtLeast(usize),
    AtMost(usize),
}

impl CountMatch {
    #[must_use]
    pub fn matches(&self, count: usize) -> bool {
        match *self {
            Self::Exactly(n) => count == n,
            Self::AtLeast(n) => count >= n,
            Self::AtMost(n) => count <= n,
        }
    }
}

impl fmt::Display for CountMatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exactly(n) => write!(f, "exactly {n}"),
            Self::AtLeast(n) => write!(f, "at least {n}"),
            Self::AtMost(n) => write!(f, "at most {n}"),
        }
    }
}

/// Parse a replica-style counter; an absent field reads as zero.
///
/// # Errors
///
/// Returns [`ConvergeError::Decode`] for anything but an unsigned integer.
pub fn parse_count(value: &str, what: &str) -> Result<u32, ConvergeError> {
    let value = value.trim();
    if value.is_empty() {
        return Ok(0);
    }
    value
        .parse()
        .map_err(|e| ConvergeError::decode(what, format!("{value:?}: {e}")))
}
