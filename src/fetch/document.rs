// src/fetch/document.rs
// =============================================================================
// A parsed page.
//
// Owns the `scraper` tree for one fetch and the URL it was served from.
// Documents are built right after a fetch completes and dropped as soon as
// the page's steps have run.
// =============================================================================

use scraper::Html;
use url::Url;

use super::Page;
use crate::select::{self, Match, Scope, SelectorExpr};

pub struct Document {
    url: Url,
    html: Html,
}

impl Document {
    pub fn parse(page: &Page) -> Self {
        Self::from_html(page.url.clone(), &page.body)
    }

    pub fn from_html(url: Url, html: &str) -> Self {
        Self {
            url,
            html: Html::parse_document(html),
        }
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// The whole page as a selector scope.
    pub fn root(&self) -> Scope<'_> {
        Scope::Document(&self.html)
    }

    pub fn select(&self, expr: &SelectorExpr) -> Vec<Match<'_>> {
        select::resolve(self.root(), expr)
    }

    /// Resolves a possibly-relative link against this page's URL.
    ///
    /// Returns None for in-page anchors and non-navigational schemes
    /// (mailto:, tel:, javascript:, data:) and for hrefs that do not parse.
    pub fn resolve_url(&self, href: &str) -> Option<Url> {
        let href = href.trim();
        if href.is_empty()
            || href.starts_with('#')
            || href.starts_with("mailto:")
            || href.starts_with("tel:")
            || href.starts_with("javascript:")
            || href.starts_with("data:")
        {
            return None;
        }

        let resolved = self.url.join(href).ok()?;
        match resolved.scheme() {
            "http" | "https" | "file" => Some(resolved),
            _ => None,
        }
    }
}
