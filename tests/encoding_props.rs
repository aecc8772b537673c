//! Property-based tests for document escaping.
//!
//! Escaping then unescaping must give back the original tree for any
//! document, whatever characters its strings hold.

use couchkit::encoding::{escape, escape_document, unescape, unescape_document};
use couchkit::store::Document;
use proptest::prelude::*;
use serde_json::Value;

/// Strings mixing arbitrary Unicode, astral-plane characters and text that
/// already looks escaped.
fn text() -> impl Strategy<Value = String> {
    prop_oneof![
        any::<String>(),
        "\\PC{0,24}",
        "(%u[0-9A-Fa-f]{4}|%[0-9A-Fa-f]{2}|%u|%|[a-z @*_+./-]){0,8}",
        prop::collection::vec(prop::char::range('\u{10000}', '\u{10FFFF}'), 1..4)
            .prop_map(|chars| chars.into_iter().collect()),
    ]
}

fn leaf() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(Value::from),
        text().prop_map(Value::String),
    ]
}

fn value() -> impl Strategy<Value = Value> {
    leaf().prop_recursive(4, 64, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..6).prop_map(Value::Array),
            prop::collection::btree_map(text(), inner, 0..6)
                .prop_map(|fields| Value::Object(fields.into_iter().collect())),
        ]
    })
}

fn document() -> impl Strategy<Value = Document> {
    prop::collection::btree_map(text(), value(), 0..8)
        .prop_map(|fields| fields.into_iter().collect())
}

proptest! {
    /// Any string survives escape followed by unescape.
    #[test]
    fn string_round_trips(input in text()) {
        prop_assert_eq!(unescape(&escape(&input)), input);
    }

    /// Escaped text only uses ASCII.
    #[test]
    fn escaped_text_is_ascii(input in text()) {
        prop_assert!(escape(&input).is_ascii());
    }

    /// Any document tree survives escape_document followed by unescape_document.
    #[test]
    fn document_round_trips(original in document()) {
        let mut doc = original.clone();
        unescape_document(escape_document(&mut doc));
        prop_assert_eq!(doc, original);
    }
}
