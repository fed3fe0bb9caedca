// src/crawl/canonical.rs
// =============================================================================
// URL canonicalization for the visited set.
//
// Two links that point at the same page must produce the same key:
// - scheme and host are lowercased, default ports dropped (the url crate
//   does this while parsing)
// - the fragment is dropped, it never changes what the server returns
// - trailing slashes are stripped from the path, except for the root "/"
//
// canonicalize(canonicalize(u)) == canonicalize(u) for every URL.
// =============================================================================

use url::Url;

// Returns the canonical dedup key for `url`.
//
// Example:
//   "HTTPS://Example.com:443/a/b/#top" -> "https://example.com/a/b"
//   "https://example.com"              -> "https://example.com/"
//
// Applying it to its own output changes nothing.
pub fn canonicalize(url: &Url) -> String {
    let mut url = url.clone();
    url.set_fragment(None);

    if !url.cannot_be_a_base() {
        let path = canonical_path(url.path()).to_string();
        url.set_path(&path);
    }

    url.to_string()
}

// Parses `raw` and returns its canonical key
pub fn canonicalize_str(raw: &str) -> Result<String, url::ParseError> {
    Url::parse(raw).map(|url| canonicalize(&url))
}

// Path with trailing slashes removed; the root stays "/".
//   "/a/b//" -> "/a/b"
//   "/"      -> "/"
pub fn canonical_path(path: &str) -> &str {
    let trimmed = path.trim_end_matches('/');
    if trimmed.is_empty() {
        "/"
    } else {
        trimmed
    }
}
