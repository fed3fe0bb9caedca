// src/select/mod.rs
// =============================================================================
// Selector resolution: evaluates a selector expression against a node of a
// parsed page and returns the matches in document order.
//
// Two addressing modes are supported:
// - path queries ("xpath:" prefix) for hierarchical node/attribute addressing
// - shorthand queries (plain CSS) for flat class/tag addressing
//
// Expressions are compiled once, when a crawl target is built, so resolving
// against a page can no longer fail. A malformed expression surfaces as a
// SelectorError at compile time.
// =============================================================================

mod css;
mod expr;
mod path;

pub use expr::{SelectorError, SelectorExpr};

use scraper::{ElementRef, Html};

use expr::Query;

/// A node that a selector is evaluated against.
///
/// `Document` is the whole page (absolute and relative paths start from the
/// document node), `Element` narrows evaluation to one subtree.
#[derive(Clone, Copy)]
pub enum Scope<'a> {
    Document(&'a Html),
    Element(ElementRef<'a>),
}

impl<'a> Scope<'a> {
    /// The `<html>` element of the page this scope belongs to.
    pub fn root_element(&self) -> ElementRef<'a> {
        match self {
            Scope::Document(html) => html.root_element(),
            Scope::Element(el) => el
                .ancestors()
                .filter_map(ElementRef::wrap)
                .last()
                .unwrap_or(*el),
        }
    }
}

/// One selector match: either an element or a plain value (text node,
/// attribute value, or pseudo-element output).
#[derive(Debug, Clone)]
pub enum Match<'a> {
    Element(ElementRef<'a>),
    Value(String),
}

impl<'a> Match<'a> {
    /// String value of the match. Elements yield their full text content.
    pub fn text(&self) -> String {
        match self {
            Match::Element(el) => el.text().collect(),
            Match::Value(v) => v.clone(),
        }
    }

    /// Link target carried by the match: the value itself, or the element's
    /// `href` attribute.
    pub fn href(&self) -> Option<String> {
        match self {
            Match::Element(el) => el.value().attr("href").map(str::to_string),
            Match::Value(v) => Some(v.clone()),
        }
    }

    pub fn into_element(self) -> Option<ElementRef<'a>> {
        match self {
            Match::Element(el) => Some(el),
            Match::Value(_) => None,
        }
    }
}

/// Resolves `expr` against `scope`, returning matches in document order.
pub fn resolve<'a>(scope: Scope<'a>, expr: &SelectorExpr) -> Vec<Match<'a>> {
    match expr.query() {
        Query::Path(query) => query.evaluate(scope),
        Query::Css(query) => query.evaluate(scope),
    }
}

/// Resolves `expr` to element nodes only, dropping value matches.
pub fn resolve_elements<'a>(scope: Scope<'a>, expr: &SelectorExpr) -> Vec<ElementRef<'a>> {
    resolve(scope, expr)
        .into_iter()
        .filter_map(Match::into_element)
        .collect()
}

/// Resolves `expr` to plain strings. Parses `raw` first, so this is the
/// entry point for callers holding an uncompiled expression.
pub fn resolve_str(scope: Scope<'_>, raw: &str) -> Result<Vec<String>, SelectorError> {
    let expr = SelectorExpr::parse(raw)?;
    Ok(resolve(scope, &expr).iter().map(Match::text).collect())
}
