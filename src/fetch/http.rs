// src/fetch/http.rs
// =============================================================================
// The default fetcher, built on reqwest.
//
// - one shared Client (connection pooling across the whole run)
// - non-2xx responses become FetchError::Status
// - reqwest errors are sorted into timeout / connect / other
// - an optional politeness delay before every request
// - bodies are only downloaded for markup responses; anything else comes back
//   with an empty body so the crawl can skip it without transferring it
// - "render" requests wait a fixed settle delay after the response arrives;
//   scripts are not executed, so JavaScript-built content stays missing
// =============================================================================

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use tracing::debug;
use url::Url;

use super::{FetchError, FetchOptions, Fetcher, Page};

const DEFAULT_USER_AGENT: &str = concat!("step-crawler/", env!("CARGO_PKG_VERSION"));

/// Knobs for the HTTP fetcher, filled from the command line.
#[derive(Debug, Clone)]
pub struct FetchSettings {
    pub timeout: Duration,
    pub user_agent: Option<String>,
    /// Pause before each request.
    pub request_delay: Duration,
    /// Wait applied to pages fetched with `render: true`.
    pub settle_delay: Duration,
}

impl Default for FetchSettings {
    fn default() -> Self {
        Self {
            timeout: Duration::from_secs(30),
            user_agent: None,
            request_delay: Duration::ZERO,
            settle_delay: Duration::from_secs(8),
        }
    }
}

pub struct HttpFetcher {
    client: Client,
    request_delay: Duration,
    settle_delay: Duration,
}

impl HttpFetcher {
    pub fn new(settings: &FetchSettings) -> Result<Self, FetchError> {
        let client = Client::builder()
            .timeout(settings.timeout)
            .redirect(reqwest::redirect::Policy::limited(10))
            .user_agent(
                settings
                    .user_agent
                    .clone()
                    .unwrap_or_else(|| DEFAULT_USER_AGENT.to_string()),
            )
            .build()
            .map_err(FetchError::Client)?;

        Ok(Self {
            client,
            request_delay: settings.request_delay,
            settle_delay: settings.settle_delay,
        })
    }
}

#[async_trait]
impl Fetcher for HttpFetcher {
    async fn fetch(&self, url: &Url, options: FetchOptions) -> Result<Page, FetchError> {
        if !self.request_delay.is_zero() {
            tokio::time::sleep(self.request_delay).await;
        }

        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| categorize_error(url, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(FetchError::Status {
                url: url.to_string(),
                status: status.as_u16(),
            });
        }

        let final_url = response.url().clone();
        let content_type = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);

        let mut page = Page {
            url: final_url,
            status: status.as_u16(),
            content_type,
            body: String::new(),
        };

        // Dropping the response closes the connection before the body is read
        if !page.is_markup() {
            debug!(
                "Not downloading {} ({})",
                page.url,
                page.content_type.as_deref().unwrap_or_default()
            );
            return Ok(page);
        }

        page.body = response
            .text()
            .await
            .map_err(|e| categorize_error(url, e))?;

        if options.render && !self.settle_delay.is_zero() {
            debug!("Waiting {:?} for {} to settle", self.settle_delay, page.url);
            tokio::time::sleep(self.settle_delay).await;
        }

        Ok(page)
    }
}

// Sorts a reqwest error into the FetchError variants.
fn categorize_error(url: &Url, error: reqwest::Error) -> FetchError {
    let url = url.to_string();

    if error.is_timeout() {
        FetchError::Timeout { url }
    } else if error.is_connect() {
        FetchError::Connect {
            url,
            reason: error.to_string(),
        }
    } else if let Some(status) = error.status() {
        FetchError::Status {
            url,
            status: status.as_u16(),
        }
    } else {
        FetchError::Other {
            url,
            reason: error.to_string(),
        }
    }
}
