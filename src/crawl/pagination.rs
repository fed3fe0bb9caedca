// src/crawl/pagination.rs
// =============================================================================
// Pagination strategies: which further pages a page leads to, and whether a
// page's own records are extracted.
//
// - None: only the start page, always extracted
// - EnumeratedLinks: every link the selector finds is another page with
//   the same strategy; every page is extracted
// - RecursiveSearch: a bounded walk over links that contain a filter
//   string; pages are extracted only when the target selector matches
//
// The strategies only look at one page. Deduplication belongs to the driver,
// which owns the visited set.
// =============================================================================

use tracing::debug;
use url::Url;

use crate::fetch::Document;
use crate::select::{self, Scope, SelectorExpr};

#[derive(Debug, Clone)]
pub struct EnumeratedLinks {
    pub search_space: Option<SelectorExpr>,
    pub link_selector: SelectorExpr,
}

#[derive(Debug, Clone)]
pub struct RecursiveSearch {
    pub search_space: Option<SelectorExpr>,
    pub link_selector: SelectorExpr,
    /// Pages where this matches nothing are walked through but not extracted.
    pub target_page_selector: Option<SelectorExpr>,
    /// 0 means the start page only.
    pub max_depth: usize,
    /// Only links whose URL contains this string are followed.
    pub contains: String,
}

#[derive(Debug, Clone, Default)]
pub enum Pagination {
    #[default]
    None,
    EnumeratedLinks(EnumeratedLinks),
    RecursiveSearch(RecursiveSearch),
}

impl Pagination {
    pub fn kind(&self) -> &'static str {
        match self {
            Pagination::None => "none",
            Pagination::EnumeratedLinks(_) => "enumerated_links",
            Pagination::RecursiveSearch(_) => "recursive_search",
        }
    }

    // Whether the step chain runs on this page. Only a recursive search with
    // a target-page selector can say no: when the selector matches nothing,
    // the page is still expanded but not extracted.
    pub fn should_extract(&self, doc: &Document) -> bool {
        match self {
            Pagination::RecursiveSearch(RecursiveSearch {
                target_page_selector: Some(gate),
                ..
            }) => !doc.select(gate).is_empty(),
            _ => true,
        }
    }

    // Pages this page leads to.
    //
    // Parameters:
    //   doc: the page just fetched
    //   depth: the depth it was reached at (the start page is 0)
    //
    // Returns: absolute URLs in document order. Duplicates are left in, the
    // driver's visited set removes them. A recursive search returns nothing
    // once depth has reached max_depth, and only URLs containing its filter.
    pub fn next_pages(&self, doc: &Document, depth: usize) -> Vec<Url> {
        match self {
            Pagination::None => Vec::new(),
            Pagination::EnumeratedLinks(links) => {
                page_links(doc, links.search_space.as_ref(), &links.link_selector)
            }
            Pagination::RecursiveSearch(search) => {
                if depth >= search.max_depth {
                    debug!("Depth limit {} reached at {}", search.max_depth, doc.url());
                    return Vec::new();
                }
                page_links(doc, search.search_space.as_ref(), &search.link_selector)
                    .into_iter()
                    .filter(|url| url.as_str().contains(&search.contains))
                    .collect()
            }
        }
    }
}

// Resolves the link selector inside every search-space node.
fn page_links(doc: &Document, search_space: Option<&SelectorExpr>, links: &SelectorExpr) -> Vec<Url> {
    let scopes: Vec<Scope<'_>> = match search_space {
        Some(expr) => select::resolve_elements(doc.root(), expr)
            .into_iter()
            .map(Scope::Element)
            .collect(),
        None => vec![doc.root()],
    };

    scopes
        .into_iter()
        .flat_map(|scope| select::resolve(scope, links))
        .filter_map(|m| m.href())
        .filter_map(|href| doc.resolve_url(&href))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expr(raw: &str) -> SelectorExpr {
        SelectorExpr::parse(raw).unwrap()
    }

    fn doc(html: &str) -> Document {
        Document::from_html(Url::parse("https://example.com/catalog/").unwrap(), html)
    }

    const PAGE: &str = r#"
        <nav class="pages"><a href="?page=2">2</a><a href="?page=3">3</a></nav>
        <div id="links">
          <a href="/catalog/art">Art</a>
          <a href="https://elsewhere.org/catalog/x">Away</a>
          <a href="mailto:x@example.com">Mail</a>
        </div>
    "#;

    fn search(max_depth: usize, gate: Option<&str>) -> Pagination {
        Pagination::RecursiveSearch(RecursiveSearch {
            search_space: Some(expr("#links")),
            link_selector: expr("a::attr(href)"),
            target_page_selector: gate.map(expr),
            max_depth,
            contains: "example.com".to_string(),
        })
    }

    #[test]
    fn test_none_has_no_next_pages() {
        assert!(Pagination::None.next_pages(&doc(PAGE), 0).is_empty());
        assert!(Pagination::None.should_extract(&doc(PAGE)));
    }

    #[test]
    fn test_enumerated_links_in_search_space() {
        let pagination = Pagination::EnumeratedLinks(EnumeratedLinks {
            search_space: Some(expr("nav.pages")),
            link_selector: expr("a"),
        });
        let pages: Vec<_> = pagination
            .next_pages(&doc(PAGE), 5)
            .into_iter()
            .map(String::from)
            .collect();
        assert_eq!(
            pages,
            vec![
                "https://example.com/catalog/?page=2",
                "https://example.com/catalog/?page=3"
            ]
        );
    }

    #[test]
    fn test_recursive_search_filters_by_contains() {
        let pages = search(3, None).next_pages(&doc(PAGE), 0);
        assert_eq!(pages.len(), 1);
        assert_eq!(pages[0].as_str(), "https://example.com/catalog/art");
    }

    #[test]
    fn test_recursive_search_stops_at_depth() {
        assert!(search(1, None).next_pages(&doc(PAGE), 1).is_empty());
        assert!(search(0, None).next_pages(&doc(PAGE), 0).is_empty());
    }

    #[test]
    fn test_target_page_gate() {
        assert!(search(1, Some("#links")).should_extract(&doc(PAGE)));
        assert!(!search(1, Some("table.courses")).should_extract(&doc(PAGE)));
        assert!(search(1, None).should_extract(&doc(PAGE)));
    }
}
