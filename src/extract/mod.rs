//! Detail-view extraction
//!
//! Turns a rendered activity detail view into a flat [`ActivityRecord`]. The
//! engine is tolerant by construction: a record missing a field or section
//! simply lacks that key, and only a detail view that never becomes ready at
//! all is reported as a (soft) failure the caller can skip past.

mod engine;
mod record;

pub use engine::{ExtractError, ExtractResult, ExtractionEngine};
pub use record::{activity_id_from_url, collapse_whitespace, ActivityRecord, VALUE_SEPARATOR};
