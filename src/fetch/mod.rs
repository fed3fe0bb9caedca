// src/fetch/mod.rs
// =============================================================================
// The fetching collaborator.
//
// The crawl engine never talks HTTP directly. It asks a `Fetcher` for a page
// and gets back the raw body plus the metadata it needs (final URL and
// declared content type). Parsing happens afterwards, synchronously, so a
// parsed `Document` never lives across an await point.
//
// Submodules:
// - document: the parsed, immutable page handed to the extraction code
// - http: the default reqwest-based fetcher
// =============================================================================

mod document;
mod http;

pub use document::Document;
pub use http::{FetchSettings, HttpFetcher};

use async_trait::async_trait;
use thiserror::Error;
use url::Url;

/// Per-request options derived from the crawl target.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FetchOptions {
    /// The page needs JavaScript to run before its markup is stable.
    pub render: bool,
}

/// A fetched, not yet parsed page.
#[derive(Debug, Clone)]
pub struct Page {
    /// URL after redirects; relative links resolve against it.
    pub url: Url,
    pub status: u16,
    /// Declared content type, if the server sent one.
    pub content_type: Option<String>,
    pub body: String,
}

impl Page {
    pub fn html(url: Url, body: impl Into<String>) -> Self {
        Self {
            url,
            status: 200,
            content_type: Some("text/html; charset=utf-8".to_string()),
            body: body.into(),
        }
    }

    /// True when the declared content type is page markup.
    ///
    /// Pages without a content type are treated as markup.
    pub fn is_markup(&self) -> bool {
        let Some(content_type) = &self.content_type else {
            return true;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();
        matches!(
            essence.as_str(),
            "text/html" | "application/xhtml+xml" | "text/xml" | "application/xml"
        )
    }
}

/// Errors a fetcher can report. The crawl treats every one of them as
/// "this page produced nothing".
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("request to {url} timed out")]
    Timeout { url: String },

    #[error("request to {url} returned HTTP {status}")]
    Status { url: String, status: u16 },

    #[error("could not connect to {url}: {reason}")]
    Connect { url: String, reason: String },

    #[error("request to {url} failed: {reason}")]
    Other { url: String, reason: String },

    #[error("failed to build HTTP client: {0}")]
    Client(#[source] reqwest::Error),
}

/// Something that can turn a URL into a page.
#[async_trait]
pub trait Fetcher: Send + Sync {
    async fn fetch(&self, url: &Url, options: FetchOptions) -> Result<Page, FetchError>;

    /// Whether `FetchOptions::render` actually executes page scripts.
    fn renders_javascript(&self) -> bool {
        false
    }
}
