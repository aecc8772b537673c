//! Percent-style escaping of document string values.
//!
//! Uses the classic `escape()` alphabet: ASCII letters, digits and `@*_+-./`
//! are kept, other UTF-16 code units below 256 become `%XX` and wider ones
//! become `%uXXXX`. [`unescape`] is the exact inverse of [`escape`].

use serde_json::Value;

use crate::store::Document;

const HEX: &[u8; 16] = b"0123456789ABCDEF";

fn is_unreserved(unit: u16) -> bool {
    match u8::try_from(unit) {
        Ok(b) => b.is_ascii_alphanumeric() || b"@*_+-./".contains(&b),
        Err(_) => false,
    }
}

fn push_hex(out: &mut String, value: u16, digits: u32) {
    for shift in (0..digits).rev() {
        let nibble = (value >> (shift * 4)) & 0xF;
        out.push(HEX[nibble as usize] as char);
    }
}

/// Escape a single string.
pub fn escape(input: &str) -> String {
    let mut out = String::with_capacity(input.len());
    for unit in input.encode_utf16() {
        if is_unreserved(unit) {
            out.push(unit as u8 as char);
        } else if unit < 0x100 {
            out.push('%');
            push_hex(&mut out, unit, 2);
        } else {
            out.push_str("%u");
            push_hex(&mut out, unit, 4);
        }
    }
    out
}

fn parse_hex(units: &[u16]) -> Option<u16> {
    units.iter().try_fold(0u16, |acc, &unit| {
        let digit = char::from_u32(u32::from(unit))?.to_digit(16)?;
        Some((acc << 4) | digit as u16)
    })
}

/// Unescape a single string. Malformed `%` sequences are kept as-is.
pub fn unescape(input: &str) -> String {
    let units: Vec<u16> = input.encode_utf16().collect();
    let mut decoded = Vec::with_capacity(units.len());
    let mut i = 0;

    while i < units.len() {
        if units[i] == u16::from(b'%') {
            if units.get(i + 1) == Some(&u16::from(b'u')) {
                if let Some(unit) = units.get(i + 2..i + 6).and_then(parse_hex) {
                    decoded.push(unit);
                    i += 6;
                    continue;
                }
            } else if let Some(unit) = units.get(i + 1..i + 3).and_then(parse_hex) {
                decoded.push(unit);
                i += 3;
                continue;
            }
        }
        decoded.push(units[i]);
        i += 1;
    }

    String::from_utf16_lossy(&decoded)
}

fn transform_value(value: &mut Value, f: fn(&str) -> String) {
    match value {
        Value::String(s) => *s = f(s),
        Value::Object(map) => transform_map(map, f),
        Value::Array(items) => items.iter_mut().for_each(|item| transform_value(item, f)),
        _ => {}
    }
}

fn transform_map(map: &mut Document, f: fn(&str) -> String) {
    for value in map.values_mut() {
        transform_value(value, f);
    }
}

/// Escape every string leaf of `doc` in place, returning it for chaining.
pub fn escape_document(doc: &mut Document) -> &mut Document {
    transform_map(doc, escape);
    doc
}

/// Unescape every string leaf of `doc` in place, returning it for chaining.
pub fn unescape_document(doc: &mut Document) -> &mut Document {
    transform_map(doc, unescape);
    doc
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_escape_alphabet() {
        assert_eq!(escape("abc-XYZ_09.@*+/"), "abc-XYZ_09.@*+/");
        assert_eq!(escape("a b&c"), "a%20b%26c");
        assert_eq!(escape("é"), "%E9");
        assert_eq!(escape("€"), "%u20AC");
        assert_eq!(escape("😀"), "%uD83D%uDE00");
        assert_eq!(escape(""), "");
    }

    #[test]
    fn test_unescape_forms() {
        assert_eq!(unescape("a%20b%26c"), "a b&c");
        assert_eq!(unescape("%u20AC%E9"), "€é");
        assert_eq!(unescape("%uD83D%uDE00"), "😀");
        assert_eq!(unescape("%u20ac"), "€");
    }

    #[test]
    fn test_unescape_keeps_malformed_sequences() {
        assert_eq!(unescape("100%"), "100%");
        assert_eq!(unescape("%zz"), "%zz");
        assert_eq!(unescape("%u12"), "%u12");
        assert_eq!(unescape("%u12G4"), "%u12G4");
    }

    #[test]
    fn test_string_round_trip() {
        for input in ["plain", "with space", "tab\tnewline\n", "ünïcödé €", "%41 literal", "😀 emoji"] {
            assert_eq!(unescape(&escape(input)), input);
        }
    }

    #[test]
    fn test_escape_document_recurses() {
        let mut doc = match json!({
            "_id": "user 1",
            "title": "Hello World",
            "count": 3,
            "flag": true,
            "missing": null,
            "attributes": {"tags": ["a b", "c"], "nested": {"deep": "x&y"}}
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        escape_document(&mut doc);

        assert_eq!(doc["_id"], json!("user%201"));
        assert_eq!(doc["title"], json!("Hello%20World"));
        assert_eq!(doc["count"], json!(3));
        assert_eq!(doc["flag"], json!(true));
        assert_eq!(doc["missing"], Value::Null);
        assert_eq!(doc["attributes"]["tags"], json!(["a%20b", "c"]));
        assert_eq!(doc["attributes"]["nested"]["deep"], json!("x%26y"));
    }

    #[test]
    fn test_document_round_trip() {
        let original = match json!({
            "name": "Zoë & co",
            "notes": ["50% off", "€5"],
            "meta": {"path": "/a b/c", "inner": {"x": "é"}}
        }) {
            Value::Object(map) => map,
            _ => unreachable!(),
        };

        let mut doc = original.clone();
        unescape_document(escape_document(&mut doc));
        assert_eq!(doc, original);
    }
}
