//! Canonical JSON serialization for the Story IR.
//!
//! Canonical form is stable across runs and platforms: object keys are
//! sorted lexicographically, arrays keep insertion order, floats use the
//! shortest representation that round-trips, and integers never grow a
//! decimal point. Saves, fixtures, and content-addressed caches all depend
//! on byte-for-byte stability, so `to_canonical_json` of equal stories is
//! equal text.

use serde::Serialize;
use serde_json::Value as JsonValue;

use crate::story::Story;

/// Serializes a story to canonical JSON.
pub fn to_canonical_json(story: &Story) -> Result<String, serde_json::Error> {
    canonical_string(story)
}

/// Serializes any value to canonical JSON (sorted keys, stable numbers).
/// Save bundles and snapshots use this for byte-stable output.
pub fn canonical_string<T: Serialize>(value: &T) -> Result<String, serde_json::Error> {
    let value = serde_json::to_value(value)?;
    let mut out = String::new();
    write_canonical(&value, &mut out);
    Ok(out)
}

/// Parses a story from JSON (canonical or not).
pub fn from_json(text: &str) -> Result<Story, serde_json::Error> {
    serde_json::from_str(text)
}

/// Writes `value` with lexicographically sorted object keys.
///
/// serde_json already formats numbers in shortest round-trip form (itoa for
/// integers, ryu for floats); this writer only adds the key ordering.
fn write_canonical(value: &JsonValue, out: &mut String) {
    match value {
        JsonValue::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                // serde_json escapes the key for us.
                out.push_str(&serde_json::to_string(key).unwrap_or_default());
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
        JsonValue::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        leaf => {
            out.push_str(&leaf.to_string());
        }
    }
}
