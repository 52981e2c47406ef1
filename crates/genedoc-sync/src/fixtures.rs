//! Two small generations shared by the applier and verifier tests.

use chrono::NaiveDate;
use genedoc_types::{Document, GenerationId};

pub(crate) fn generation() -> GenerationId {
    let date = NaiveDate::from_ymd_opt(2013, 4, 15).unwrap();
    GenerationId::with_suffix("mygene", date, "aaaaaaaa").unwrap()
}

/// `{1: {a: 1}, 2: {a: 2}}`
pub(crate) fn old_docs() -> Vec<Document> {
    vec![
        Document::empty("1").with_field("a", 1),
        Document::empty("2").with_field("a", 2),
    ]
}

/// `{2: {a: 99}, 3: {a: 3}}`
pub(crate) fn new_docs() -> Vec<Document> {
    vec![
        Document::empty("2").with_field("a", 99),
        Document::empty("3").with_field("a", 3),
    ]
}
