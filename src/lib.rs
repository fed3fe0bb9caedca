// src/lib.rs
// =============================================================================
// step-crawler: declarative crawling and record extraction.
//
// A crawl target names a start URL, a pagination strategy and a chain of
// steps. The driver fetches pages, the pagination strategy decides which
// pages come next, and the step chain turns each page into records, fetching
// linked sub-pages when a step follows a link.
//
// Modules, leaf first:
// - select: selector expressions (path queries and CSS) over a parsed page
// - extract: field values, records and the record finder
// - fetch: the Fetcher trait, parsed documents and the HTTP fetcher
// - crawl: canonical URLs, pagination, the step interpreter and the driver
// - config: TOML/JSON crawl definitions compiled into crawl targets
// - output: writing each target's records as a JSON file
// =============================================================================

pub mod config;
pub mod crawl;
pub mod extract;
pub mod fetch;
pub mod output;
pub mod select;
