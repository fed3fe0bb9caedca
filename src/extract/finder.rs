// src/extract/finder.rs
// =============================================================================
// The record finder: turns one page into a sequence of records.
//
//   1. narrow the page to the search space (or keep the whole page)
//   2. find the repeating rows inside every scope node
//   3. extract every declared field of a row into a Record
//   4. drop records whose required fields are absent or empty
//
// "Required" means the first `num_required` fields in declaration order, so
// the order fields are declared in matters.
// =============================================================================

use indexmap::IndexMap;

use super::field::{extract_field, FieldValue, Record};
use crate::select::{self, Scope, SelectorExpr};

/// Name of the field that carries the page URL when sources are attached.
pub const SOURCE_FIELD: &str = "source";

/// A compiled extraction step.
#[derive(Debug, Clone)]
pub struct FindStep {
    pub search_space: Option<SelectorExpr>,
    pub repeating: SelectorExpr,
    pub fields: IndexMap<String, SelectorExpr>,
    pub num_required: usize,
    /// Constant fields added to every record this step produces.
    pub include: IndexMap<String, String>,
}

impl FindStep {
    pub fn new(repeating: SelectorExpr, fields: IndexMap<String, SelectorExpr>) -> Self {
        Self {
            search_space: None,
            repeating,
            fields,
            num_required: 0,
            include: IndexMap::new(),
        }
    }

    pub fn with_search_space(mut self, search_space: SelectorExpr) -> Self {
        self.search_space = Some(search_space);
        self
    }

    pub fn with_required(mut self, num_required: usize) -> Self {
        self.num_required = num_required;
        self
    }

    /// Names of the fields a record must carry to be kept.
    pub fn required_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().take(self.num_required).map(String::as_str)
    }

    /// Every field name a record from this step can carry.
    pub fn produced_fields(&self) -> impl Iterator<Item = &str> {
        self.fields.keys().chain(self.include.keys()).map(String::as_str)
    }

    fn keeps(&self, record: &Record) -> bool {
        self.required_fields()
            .all(|name| record.get(name).is_some_and(|v| !v.is_blank()))
    }

    fn extract(&self, row: Scope<'_>, source: Option<&str>) -> Record {
        let mut record: Record = self
            .fields
            .iter()
            .map(|(name, expr)| (name.as_str(), extract_field(row, expr)))
            .collect();

        for (name, value) in &self.include {
            if !record.contains_field(name) {
                record.insert(name.as_str(), Some(FieldValue::Text(value.clone())));
            }
        }

        if let Some(url) = source {
            record.insert(SOURCE_FIELD, Some(FieldValue::Text(url.to_string())));
        }

        record
    }
}

/// Runs a find step over `scope`.
///
/// The sequence is lazy and cannot be restarted: every call walks the page
/// again. Records come out in document order within a scope node, scope
/// nodes in the order the search space selected them.
pub fn find<'a>(
    scope: Scope<'a>,
    step: &'a FindStep,
    source: Option<&'a str>,
) -> impl Iterator<Item = Record> + 'a {
    let scopes: Vec<Scope<'a>> = match &step.search_space {
        Some(search_space) => select::resolve_elements(scope, search_space)
            .into_iter()
            .map(Scope::Element)
            .collect(),
        None => vec![scope],
    };

    scopes
        .into_iter()
        .flat_map(move |scope| select::resolve_elements(scope, &step.repeating))
        .map(move |row| step.extract(Scope::Element(row), source))
        .filter(move |record| step.keeps(record))
}
