// src/extract/mod.rs
// =============================================================================
// Record extraction from a parsed page.
//
// Submodules:
// - field: the Record type and the single-field extraction rule
// - finder: repeating-row discovery and required-field filtering
//
// Everything here is a pure function of an already parsed page, so nothing
// needs locking and results are always in document order.
// =============================================================================

mod field;
mod finder;

pub use field::{extract_field, FieldValue, Record};
pub use finder::{find, FindStep, SOURCE_FIELD};
