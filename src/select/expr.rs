// src/select/expr.rs
// =============================================================================
// Parsing of selector expressions.
//
// Grammar of the raw string:
//
//   expr  := ["xpath:"] query ["join"]
//
// - "xpath:" switches to the path-query mode, anything else is CSS
// - a trailing "join" (directly after ')' or ']', or after whitespace)
//   concatenates every match instead of taking the first one
//
// Examples:
//   "xpath://h2//text()"          path query, first-match
//   "xpath:p//text()join"         path query, joined
//   "div.course a::attr(href)"    css query
// =============================================================================

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

use super::css::CssQuery;
use super::path::PathQuery;

const PATH_PREFIX: &str = "xpath:";
const JOIN_SUFFIX: &str = "join";

/// Errors produced while compiling a selector expression.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SelectorError {
    #[error("empty selector expression")]
    Empty,

    #[error("invalid path query '{expr}' at offset {offset}: {reason}")]
    Path {
        expr: String,
        offset: usize,
        reason: String,
    },

    #[error("invalid css query '{expr}': {reason}")]
    Css { expr: String, reason: String },
}

#[derive(Debug, Clone)]
pub(crate) enum Query {
    Path(PathQuery),
    Css(CssQuery),
}

/// A compiled selector expression.
#[derive(Debug, Clone)]
pub struct SelectorExpr {
    raw: String,
    query: Query,
    join: bool,
}

impl SelectorExpr {
    /// Compiles a raw selector string.
    pub fn parse(raw: &str) -> Result<Self, SelectorError> {
        let trimmed = raw.trim();
        let (body, join) = split_join(trimmed);

        let query = match body.strip_prefix(PATH_PREFIX) {
            Some(path) => Query::Path(PathQuery::parse(path.trim())?),
            None => Query::Css(CssQuery::parse(body)?),
        };

        Ok(Self {
            raw: trimmed.to_string(),
            query,
            join,
        })
    }

    pub fn raw(&self) -> &str {
        &self.raw
    }

    /// True when matches are concatenated instead of collapsed.
    pub fn is_join(&self) -> bool {
        self.join
    }

    pub fn is_path(&self) -> bool {
        matches!(self.query, Query::Path(_))
    }

    pub(crate) fn query(&self) -> &Query {
        &self.query
    }
}

impl FromStr for SelectorExpr {
    type Err = SelectorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl fmt::Display for SelectorExpr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}

// Splits the join modifier off the end of an expression.
//
// "join" only counts as the modifier when it cannot be part of a name, so
// "div.join" stays a plain css class selector.
fn split_join(expr: &str) -> (&str, bool) {
    let Some(body) = expr.strip_suffix(JOIN_SUFFIX) else {
        return (expr, false);
    };

    match body.chars().last() {
        Some(')') | Some(']') => (body, true),
        Some(c) if c.is_whitespace() => (body.trim_end(), true),
        _ => (expr, false),
    }
}
