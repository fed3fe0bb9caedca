// src/extract/field.rs
// =============================================================================
// Field extraction and the Record type.
//
// A field value is built from a selector's matches:
// - join modifier: strip every match, drop empties, join with one space
//   (always a string, possibly empty)
// - otherwise: strip, drop empties, then
//     zero left -> absent
//     one left  -> that string
//     more      -> the ordered list
//
// A list-valued link field is what makes a follow step fan out, so the
// collapse rule above also decides how many sub-pages get fetched.
// =============================================================================

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use crate::select::{self, Match, Scope, SelectorExpr};

/// An extracted value: a single string or an ordered list of strings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FieldValue {
    Text(String),
    List(Vec<String>),
}

impl FieldValue {
    /// Every string in the value; a scalar becomes a one-element list.
    pub fn values(&self) -> Vec<&str> {
        match self {
            FieldValue::Text(s) => vec![s.as_str()],
            FieldValue::List(items) => items.iter().map(String::as_str).collect(),
        }
    }

    /// True for the empty string (join results can be empty).
    pub fn is_blank(&self) -> bool {
        match self {
            FieldValue::Text(s) => s.is_empty(),
            FieldValue::List(items) => items.is_empty(),
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(s) => Some(s),
            FieldValue::List(_) => None,
        }
    }
}

impl From<&str> for FieldValue {
    fn from(s: &str) -> Self {
        FieldValue::Text(s.to_string())
    }
}

impl From<Vec<&str>> for FieldValue {
    fn from(items: Vec<&str>) -> Self {
        FieldValue::List(items.into_iter().map(str::to_string).collect())
    }
}

/// One extracted result: field name -> value, in declaration order.
///
/// Absent values are kept as `None` so every declared field shows up in the
/// output (as JSON null).
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Record(IndexMap<String, Option<FieldValue>>);

impl Record {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, name: impl Into<String>, value: Option<FieldValue>) {
        self.0.insert(name.into(), value);
    }

    /// The value of `name`, if the field exists and is present.
    pub fn get(&self, name: &str) -> Option<&FieldValue> {
        self.0.get(name).and_then(Option::as_ref)
    }

    pub fn contains_field(&self, name: &str) -> bool {
        self.0.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn field_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Right-biased union: fields of `child` overwrite fields of `self`.
    ///
    /// Keys keep their first position, so an overwritten field stays where
    /// the outer record declared it.
    pub fn merged(&self, child: &Record) -> Record {
        let mut out = self.clone();
        for (name, value) in &child.0 {
            out.0.insert(name.clone(), value.clone());
        }
        out
    }
}

impl<K: Into<String>> FromIterator<(K, Option<FieldValue>)> for Record {
    fn from_iter<I: IntoIterator<Item = (K, Option<FieldValue>)>>(iter: I) -> Self {
        Record(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Extracts one field value from `scope`.
pub fn extract_field(scope: Scope<'_>, expr: &SelectorExpr) -> Option<FieldValue> {
    let matches = select::resolve(scope, expr);
    collapse(matches.iter().map(Match::text), expr.is_join())
}

// Applies the join / collapse-or-list rule to raw match strings.
fn collapse<I, S>(raw: I, join: bool) -> Option<FieldValue>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    let survivors: Vec<String> = raw
        .into_iter()
        .map(|s| s.as_ref().trim().to_string())
        .filter(|s| !s.is_empty())
        .collect();

    if join {
        return Some(FieldValue::Text(survivors.join(" ")));
    }

    match survivors.len() {
        0 => None,
        1 => survivors.into_iter().next().map(FieldValue::Text),
        _ => Some(FieldValue::List(survivors)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use scraper::Html;

    #[test]
    fn test_collapse_drops_blank_matches() {
        assert_eq!(collapse(["x", " ", "y"], false), Some(vec!["x", "y"].into()));
    }

    #[test]
    fn test_collapse_single_match_is_scalar() {
        assert_eq!(collapse(["  x  "], false), Some("x".into()));
    }

    #[test]
    fn test_collapse_nothing_is_absent() {
        assert_eq!(collapse(Vec::<&str>::new(), false), None);
        assert_eq!(collapse(["  ", "\n\t"], false), None);
    }

    #[test]
    fn test_join_never_absent() {
        assert_eq!(collapse([" a ", "", "b"], true), Some("a b".into()));
        assert_eq!(collapse(Vec::<&str>::new(), true), Some("".into()));
    }

    #[test]
    fn test_extract_field_from_html() {
        let html = Html::parse_document("<ul><li>x</li><li> </li><li>y</li></ul>");
        let scope = Scope::Document(&html);

        let list = SelectorExpr::parse("li").unwrap();
        assert_eq!(extract_field(scope, &list), Some(vec!["x", "y"].into()));

        let joined = SelectorExpr::parse("xpath://li/text()join").unwrap();
        assert_eq!(extract_field(scope, &joined), Some("x y".into()));

        let missing = SelectorExpr::parse("p").unwrap();
        assert_eq!(extract_field(scope, &missing), None);
    }

    #[test]
    fn test_merge_is_right_biased() {
        let outer: Record = [("title", Some("T".into())), ("link", Some("/x".into()))]
            .into_iter()
            .collect();
        let nested: Record = [("title", Some("T2".into()))].into_iter().collect();

        let merged = outer.merged(&nested);
        assert_eq!(merged.get("title"), Some(&"T2".into()));
        assert_eq!(merged.get("link"), Some(&"/x".into()));
        assert_eq!(merged.field_names().collect::<Vec<_>>(), vec!["title", "link"]);
    }

    #[test]
    fn test_nested_absent_overwrites_outer() {
        let outer: Record = [("title", Some("T".into()))].into_iter().collect();
        let nested: Record = [("title", None)].into_iter().collect();
        assert_eq!(outer.merged(&nested).get("title"), None);
    }

    #[test]
    fn test_record_serializes_in_declaration_order() {
        let record: Record = [
            ("title", Some("T".into())),
            ("tags", Some(vec!["a", "b"].into())),
            ("missing", None),
        ]
        .into_iter()
        .collect();
        assert_eq!(
            serde_json::to_string(&record).unwrap(),
            r#"{"title":"T","tags":["a","b"],"missing":null}"#
        );
    }
}
