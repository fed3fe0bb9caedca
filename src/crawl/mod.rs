// src/crawl/mod.rs
// =============================================================================
// This module crawls crawl targets and turns their pages into records.
//
// Submodules:
// - canonical: URL normalization for the visited set
// - target: compiled crawl definitions (steps, detail-page rules)
// - pagination: which pages a page leads to, and whether it is extracted
// - pipeline: the step interpreter, one page at a time
// - driver: the fetch loop that ties everything together per target
//
// Pages are fetched concurrently, but all bookkeeping (the queue, the visited
// set, the collected records) lives in one loop.
// =============================================================================

mod canonical;
mod driver;
mod pagination;
mod pipeline;
mod target;

pub use canonical::{canonical_path, canonicalize, canonicalize_str};
pub use driver::{CrawlReport, TraversalDriver, VisitedSet, DEFAULT_CONCURRENCY};
pub use pagination::{EnumeratedLinks, Pagination, RecursiveSearch};
pub use pipeline::{Continuation, Emission, Frame, StepRunner, SubFetch};
pub use target::{
    CrawlTarget, DynamicFindStep, FollowStep, Step, MISSING_DESCRIPTION, MISSING_TITLE,
};
