// src/crawl/target.rs
// =============================================================================
// Compiled crawl definitions.
//
// A CrawlTarget is what the config loader hands to the driver: every
// selector already compiled, every URL already parsed, the step list frozen
// behind an Arc so in-flight sub-fetches can point back into it without
// copying. Nothing here changes once a crawl starts.
// =============================================================================

use std::sync::Arc;

use indexmap::IndexMap;
use regex::Regex;
use url::Url;

use super::pagination::Pagination;
use crate::extract::{extract_field, FieldValue, FindStep, Record, SOURCE_FIELD};
use crate::fetch::Document;
use crate::select::{self, SelectorExpr};

/// Value used when a detail page has no title.
pub const MISSING_TITLE: &str = "No Title Found";
/// Value used when a detail page has no description.
pub const MISSING_DESCRIPTION: &str = "No Description Found";

/// One step of an extraction chain.
#[derive(Debug, Clone)]
pub enum Step {
    Find(FindStep),
    Follow(FollowStep),
    DynamicFind(DynamicFindStep),
}

impl Step {
    pub fn kind(&self) -> &'static str {
        match self {
            Step::Find(_) => "find",
            Step::Follow(_) => "follow",
            Step::DynamicFind(_) => "dynamic_find",
        }
    }
}

/// Follows the link(s) stored in a field of the carry record and runs
/// `next_steps` against every linked page.
#[derive(Debug, Clone)]
pub struct FollowStep {
    pub link_field: String,
    pub next_steps: Arc<[Step]>,
}

/// Finds links carrying a numeric id, rewrites each into a detail URL and
/// extracts one record from every detail page.
#[derive(Debug, Clone)]
pub struct DynamicFindStep {
    pub search_space: SelectorExpr,
    pub base_url: Url,
    pub category_id: String,
    pub fields: IndexMap<String, SelectorExpr>,
    /// First capture group is the id.
    pub id_pattern: Regex,
    /// Appended verbatim to every derived URL's query.
    pub extra_query: Option<String>,
    /// Links on the listing page that lead to more listing pages.
    pub pagination_selector: Option<SelectorExpr>,
}

impl DynamicFindStep {
    // Builds the detail URL for a listing link, or None when the link
    // carries no id.
    //
    // Example (base_url "https://x.edu/ajax/preview.php", category "34"):
    //   "preview_course_nopop.php?catoid=34&coid=123"
    //   -> "https://x.edu/ajax/preview.php?catoid=34&coid=123"
    //   extra_query "show" is appended as "&show"
    pub fn detail_url(&self, href: &str) -> Option<Url> {
        let id = self.id_pattern.captures(href)?.get(1)?.as_str();

        let mut url = self.base_url.clone();
        url.query_pairs_mut()
            .append_pair("catoid", &self.category_id)
            .append_pair("coid", id);

        if let Some(extra) = self.extra_query.as_deref().filter(|e| !e.is_empty()) {
            let query = match url.query() {
                Some(q) if !q.is_empty() => format!("{}&{}", q, extra),
                _ => extra.to_string(),
            };
            url.set_query(Some(&query));
        }

        Some(url)
    }

    // Every detail URL the listing page links to, in document order
    pub fn detail_urls(&self, doc: &Document) -> Vec<Url> {
        select::resolve(doc.root(), &self.search_space)
            .iter()
            .filter_map(|m| m.href())
            .filter_map(|href| self.detail_url(&href))
            .collect()
    }

    // Further listing pages named by the pagination selector, resolved
    // against the listing page
    pub fn listing_pages(&self, doc: &Document) -> Vec<Url> {
        let Some(selector) = &self.pagination_selector else {
            return Vec::new();
        };
        select::resolve(doc.root(), selector)
            .iter()
            .filter_map(|m| m.href())
            .filter_map(|href| doc.resolve_url(&href))
            .collect()
    }

    // Extracts the record of one detail page. Declared fields come first;
    // title and description fall back to fixed strings when missing or blank.
    pub fn extract_detail(&self, doc: &Document, attach_source: bool) -> Record {
        let mut record: Record = self
            .fields
            .iter()
            .map(|(name, expr)| (name.as_str(), extract_field(doc.root(), expr)))
            .collect();

        for (name, fallback) in [("title", MISSING_TITLE), ("description", MISSING_DESCRIPTION)] {
            let missing = record.get(name).map_or(true, FieldValue::is_blank);
            if missing {
                record.insert(name, Some(FieldValue::from(fallback)));
            }
        }

        if attach_source {
            record.insert(SOURCE_FIELD, Some(FieldValue::Text(doc.url().to_string())));
        }

        record
    }
}

/// A fully validated crawl definition.
#[derive(Debug, Clone)]
pub struct CrawlTarget {
    pub name: String,
    pub start_url: Url,
    pub steps: Arc<[Step]>,
    pub pagination: Pagination,
    /// Pages need scripts to run before their markup is complete.
    pub render: bool,
    /// Add a `source` field with the page URL to every found record.
    pub attach_source: bool,
}
