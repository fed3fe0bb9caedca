// src/crawl/driver.rs
// =============================================================================
// The traversal driver: crawls one target from its start URL.
//
// How it works:
// 1. Start with the start URL in the queue (and in the visited set)
// 2. Fetch up to `concurrency` queued pages at once
// 3. When a fetch completes, parse the page and:
//    - pagination pages: queue unseen next pages, then run the step chain
//      if the strategy says this page is extracted
//    - sub-fetched pages: resume the chain that asked for them
// 4. Records go into the report, sub-fetches go back into the queue
// 5. Repeat until nothing is queued or in flight, or the crawl is cancelled
//
// Only this loop touches the visited set, so it needs no locking. Fetch
// failures and non-markup pages end their branch and are counted.
// =============================================================================

use std::collections::{HashSet, VecDeque};
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use url::Url;

use super::canonical::canonicalize;
use super::pipeline::{Emission, StepRunner, SubFetch};
use super::target::CrawlTarget;
use crate::extract::Record;
use crate::fetch::{Document, FetchError, FetchOptions, Fetcher, Page};

/// Default number of fetches in flight per target.
pub const DEFAULT_CONCURRENCY: usize = 8;

/// Canonical URLs seen during one crawl. Only ever grows.
#[derive(Debug, Default)]
pub struct VisitedSet {
    seen: HashSet<String>,
}

impl VisitedSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Marks `url` visited. Returns false if it already was.
    pub fn insert(&mut self, url: &Url) -> bool {
        self.seen.insert(canonicalize(url))
    }

    pub fn contains(&self, url: &Url) -> bool {
        self.seen.contains(&canonicalize(url))
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

/// What one crawl produced.
#[derive(Debug, Default)]
pub struct CrawlReport {
    pub name: String,
    pub records: Vec<Record>,
    pub pages_fetched: usize,
    pub fetch_failures: usize,
    /// Pages dropped by the content-type check.
    pub skipped: usize,
    pub cancelled: bool,
}

impl CrawlReport {
    pub fn record_count(&self) -> usize {
        self.records.len()
    }
}

// A queued page and why it is being fetched.
#[derive(Debug)]
enum Work {
    Paginate { url: Url, depth: usize },
    Sub(SubFetch),
}

impl Work {
    fn url(&self) -> &Url {
        match self {
            Work::Paginate { url, .. } => url,
            Work::Sub(sub) => &sub.url,
        }
    }
}

pub struct TraversalDriver {
    fetcher: Arc<dyn Fetcher>,
    concurrency: usize,
    cancel: CancellationToken,
}

impl TraversalDriver {
    pub fn new(fetcher: Arc<dyn Fetcher>) -> Self {
        Self {
            fetcher,
            concurrency: DEFAULT_CONCURRENCY,
            cancel: CancellationToken::new(),
        }
    }

    pub fn with_concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    /// Stops the crawl at the next fetch boundary once `cancel` fires.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    // Crawls `target` to completion (or cancellation).
    //
    // The loop keeps up to `concurrency` fetches in flight. Each finished
    // fetch is handled right away on this task, which may queue more work.
    // The crawl ends when nothing is queued and nothing is in flight.
    //
    // Returns: the report, including the records collected so far when
    // the crawl was cancelled
    pub async fn crawl(&self, target: &CrawlTarget) -> CrawlReport {
        if target.render && !self.fetcher.renders_javascript() {
            warn!(
                "Target '{}' asks for rendering, but the fetcher does not run scripts",
                target.name
            );
        }

        let options = FetchOptions {
            render: target.render,
        };
        let mut crawl = Crawl::new(target);
        let mut in_flight = FuturesUnordered::new();

        info!("Crawling '{}' from {}", target.name, target.start_url);

        loop {
            while in_flight.len() < self.concurrency {
                let Some(work) = crawl.queue.pop_front() else {
                    break;
                };
                in_flight.push(fetch_work(Arc::clone(&self.fetcher), work, options));
            }

            if in_flight.is_empty() {
                break;
            }

            tokio::select! {
                biased;

                _ = self.cancel.cancelled() => {
                    warn!(
                        "Crawl of '{}' cancelled with {} fetches in flight",
                        target.name,
                        in_flight.len()
                    );
                    crawl.report.cancelled = true;
                    break;
                }
                Some((work, result)) = in_flight.next() => {
                    crawl.handle(work, result);
                }
            }
        }

        info!(
            "Finished '{}': {} records from {} pages ({} failed, {} skipped)",
            target.name,
            crawl.report.records.len(),
            crawl.report.pages_fetched,
            crawl.report.fetch_failures,
            crawl.report.skipped
        );

        crawl.report
    }
}

// Fetches the page of one work item and hands the item back with the
// result, so the loop knows what the page was for
async fn fetch_work(
    fetcher: Arc<dyn Fetcher>,
    work: Work,
    options: FetchOptions,
) -> (Work, Result<Page, FetchError>) {
    let result = fetcher.fetch(work.url(), options).await;
    (work, result)
}

// Mutable state of one crawl, owned by the driver loop.
struct Crawl<'t> {
    target: &'t CrawlTarget,
    visited: VisitedSet,
    queue: VecDeque<Work>,
    report: CrawlReport,
}

impl<'t> Crawl<'t> {
    fn new(target: &'t CrawlTarget) -> Self {
        let mut visited = VisitedSet::new();
        visited.insert(&target.start_url);

        let mut queue = VecDeque::new();
        queue.push_back(Work::Paginate {
            url: target.start_url.clone(),
            depth: 0,
        });

        Self {
            target,
            visited,
            queue,
            report: CrawlReport {
                name: target.name.clone(),
                ..CrawlReport::default()
            },
        }
    }

    // Handles one finished fetch:
    // - failures and non-markup pages are counted and end their branch
    // - pagination pages are expanded, then extracted if the gate allows it
    // - sub-fetched pages resume the chain that asked for them
    fn handle(&mut self, work: Work, result: Result<Page, FetchError>) {
        let page = match result {
            Ok(page) => page,
            Err(e) => {
                warn!("Failed to fetch {}: {}", work.url(), e);
                self.report.fetch_failures += 1;
                return;
            }
        };
        self.report.pages_fetched += 1;

        if !page.is_markup() {
            info!(
                "Skipping {} ({})",
                page.url,
                page.content_type.as_deref().unwrap_or("unknown content type")
            );
            self.report.skipped += 1;
            return;
        }

        let doc = Document::parse(&page);
        let attach_source = self.target.attach_source;

        match work {
            Work::Paginate { depth, .. } => {
                debug!("Fetched {} [depth {}]", doc.url(), depth);
                self.expand(&doc, depth);

                if self.target.pagination.should_extract(&doc) {
                    let runner = StepRunner::new(&doc, Arc::clone(&self.target.steps), attach_source);
                    self.absorb(runner);
                } else {
                    debug!("No target content on {}, not extracting", doc.url());
                }
            }
            Work::Sub(sub) => {
                debug!("Fetched sub-page {}", doc.url());
                self.absorb(StepRunner::resume(&doc, sub.then, attach_source));
            }
        }
    }

    // Queues the unseen pages that `doc` paginates to.
    fn expand(&mut self, doc: &Document, depth: usize) {
        for url in self.target.pagination.next_pages(doc, depth) {
            if self.visited.insert(&url) {
                self.queue.push_back(Work::Paginate {
                    url,
                    depth: depth + 1,
                });
            } else {
                debug!("Already visited {}", url);
            }
        }
    }

    // Collects what a step runner produced: records go into the report,
    // sub-fetches into the queue (deduplicated ones only when unseen)
    fn absorb(&mut self, emissions: impl Iterator<Item = Emission>) {
        for emission in emissions {
            match emission {
                Emission::Record(record) => self.report.records.push(record),
                Emission::Fetch(sub) => {
                    if sub.dedup && !self.visited.insert(&sub.url) {
                        debug!("Already visited {}", sub.url);
                        continue;
                    }
                    self.queue.push_back(Work::Sub(sub));
                }
            }
        }
    }
}
