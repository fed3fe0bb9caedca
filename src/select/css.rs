// src/select/css.rs
// =============================================================================
// Shorthand (CSS) queries.
//
// Plain selectors are handed to the `scraper` crate. Two trailing pseudo
// elements are layered on top, since scraper only ever returns elements:
//
//   "h2::text"          direct text nodes of each matched element
//   "a::attr(href)"     an attribute value of each matched element
//
// A pseudo element on its own ("::text") applies to the scope node itself.
// =============================================================================

use scraper::{ElementRef, Selector};

use super::expr::SelectorError;
use super::{Match, Scope};

#[derive(Debug, Clone, PartialEq, Eq)]
enum Pseudo {
    None,
    Text,
    Attr(String),
}

#[derive(Debug, Clone)]
pub(crate) struct CssQuery {
    selector: Option<Selector>,
    pseudo: Pseudo,
}

impl CssQuery {
    pub(crate) fn parse(raw: &str) -> Result<Self, SelectorError> {
        let raw = raw.trim();
        let (body, pseudo) = split_pseudo(raw)?;

        let selector = if body.is_empty() {
            None
        } else {
            let parsed = Selector::parse(body).map_err(|e| SelectorError::Css {
                expr: raw.to_string(),
                reason: format!("{:?}", e),
            })?;
            Some(parsed)
        };

        if selector.is_none() && pseudo == Pseudo::None {
            return Err(SelectorError::Empty);
        }

        Ok(Self { selector, pseudo })
    }

    pub(crate) fn evaluate<'a>(&self, scope: Scope<'a>) -> Vec<Match<'a>> {
        let elements: Vec<ElementRef<'a>> = match (&self.selector, scope) {
            (Some(sel), Scope::Document(html)) => html.select(sel).collect(),
            (Some(sel), Scope::Element(el)) => el.select(sel).collect(),
            (None, Scope::Document(html)) => vec![html.root_element()],
            (None, Scope::Element(el)) => vec![el],
        };

        match &self.pseudo {
            Pseudo::None => elements.into_iter().map(Match::Element).collect(),
            Pseudo::Text => elements
                .into_iter()
                .flat_map(|el| {
                    el.children()
                        .filter_map(|child| child.value().as_text())
                        .map(|text| Match::Value(text.to_string()))
                })
                .collect(),
            Pseudo::Attr(name) => elements
                .into_iter()
                .filter_map(|el| el.value().attr(name))
                .map(|value| Match::Value(value.to_string()))
                .collect(),
        }
    }
}

fn split_pseudo(raw: &str) -> Result<(&str, Pseudo), SelectorError> {
    if let Some(body) = raw.strip_suffix("::text") {
        return Ok((body.trim_end(), Pseudo::Text));
    }

    if let Some(open) = raw.rfind("::attr(") {
        let inner = &raw[open + "::attr(".len()..];
        let name = inner
            .strip_suffix(')')
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .ok_or_else(|| SelectorError::Css {
                expr: raw.to_string(),
                reason: "malformed ::attr() pseudo element".to_string(),
            })?;
        return Ok((raw[..open].trim_end(), Pseudo::Attr(name.to_string())));
    }

    Ok((raw, Pseudo::None))
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    fn values(html: &Html, raw: &str) -> Vec<String> {
        CssQuery::parse(raw)
            .unwrap()
            .evaluate(Scope::Document(html))
            .iter()
            .map(Match::text)
            .collect()
    }

    #[test]
    fn test_text_pseudo_takes_direct_text_only() {
        let html = Html::parse_document("<p>Hello <b>big</b> world</p>");
        assert_eq!(values(&html, "p::text"), vec!["Hello ", " world"]);
        assert_eq!(values(&html, "p"), vec!["Hello big world"]);
    }

    #[test]
    fn test_attr_pseudo() {
        let html = Html::parse_document(r#"<a href="/x">x</a><a>no href</a>"#);
        assert_eq!(values(&html, "a::attr(href)"), vec!["/x"]);
    }

    #[test]
    fn test_bare_pseudo_applies_to_scope() {
        let html = Html::parse_document(r#"<div class="row">Row text</div>"#);
        let row = html
            .select(&Selector::parse("div.row").unwrap())
            .next()
            .unwrap();
        let query = CssQuery::parse("::text").unwrap();
        let found: Vec<_> = query
            .evaluate(Scope::Element(row))
            .iter()
            .map(Match::text)
            .collect();
        assert_eq!(found, vec!["Row text"]);
    }

    #[test]
    fn test_malformed_attr_pseudo() {
        assert!(CssQuery::parse("a::attr(").is_err());
        assert!(CssQuery::parse("a::attr()").is_err());
    }
}
