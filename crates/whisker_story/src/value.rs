//! The runtime value domain.
//!
//! Every value a story can hold — variables, literals, interpolation
//! results — is a [`Value`]. Map keys keep insertion order so that
//! serialization is deterministic.
//!
//! # Truthiness
//!
//! Whisker defines its own truthiness, distinct from the usual host-language
//! rules: `nil`, `false`, numeric zero (including `-0.0`), and the empty
//! string are falsy. Everything else is truthy — including empty arrays,
//! empty maps, and the strings `"0"` and `"false"`. Every boolean context in
//! the engine routes through [`Value::is_truthy`].
//!
//! # Indexing
//!
//! Surface syntax is 1-indexed (`items[1]` is the first element); the
//! `Array` variant stores elements 0-indexed. The interpreter applies the
//! bias at the boundary.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A dynamically typed story value.
///
/// Serializes as plain JSON: `Nil` is `null`, arrays are arrays, maps are
/// objects in insertion order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Nil,
    Bool(bool),
    Int(i64),
    Float(f64),
    Str(String),
    Array(Vec<Value>),
    Map(IndexMap<String, Value>),
}

impl Value {
    /// The type name used in diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Nil => "nil",
            Value::Bool(_) => "bool",
            Value::Int(_) => "int",
            Value::Float(_) => "float",
            Value::Str(_) => "string",
            Value::Array(_) => "array",
            Value::Map(_) => "map",
        }
    }

    /// Whisker truthiness: `nil`, `false`, numeric zero, and `""` are falsy;
    /// all other values are truthy.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Nil => false,
            Value::Bool(b) => *b,
            Value::Int(n) => *n != 0,
            // 0.0 == -0.0 in IEEE 754, so this covers negative zero.
            Value::Float(f) => *f != 0.0,
            Value::Str(s) => !s.is_empty(),
            Value::Array(_) | Value::Map(_) => true,
        }
    }

    /// Numeric coercion used by arithmetic and comparisons.
    ///
    /// Integers and floats coerce; everything else is `None` and the caller
    /// reports a type mismatch.
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Value::Int(n) => Some(*n as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Renders the value the way interpolation prints it.
    ///
    /// Strings print bare (no quotes); nested values inside arrays and maps
    /// print in literal form.
    pub fn to_display_string(&self) -> String {
        match self {
            Value::Nil => String::new(),
            Value::Bool(b) => b.to_string(),
            Value::Int(n) => n.to_string(),
            Value::Float(f) => format_float(*f),
            Value::Str(s) => s.clone(),
            Value::Array(items) => {
                let parts: Vec<String> = items.iter().map(Value::to_literal_string).collect();
                format!("[{}]", parts.join(", "))
            }
            Value::Map(entries) => {
                let parts: Vec<String> = entries
                    .iter()
                    .map(|(k, v)| format!("{}: {}", k, v.to_literal_string()))
                    .collect();
                format!("{{{}}}", parts.join(", "))
            }
        }
    }

    fn to_literal_string(&self) -> String {
        match self {
            Value::Str(s) => format!("\"{}\"", s),
            Value::Nil => "nil".to_string(),
            other => other.to_display_string(),
        }
    }
}

impl Default for Value {
    fn default() -> Self {
        Value::Nil
    }
}

/// Shortest form that round-trips: integral floats keep a trailing `.0` so
/// they stay floats when re-parsed.
fn format_float(f: f64) -> String {
    if f.is_finite() && f == f.trunc() && f.abs() < 1e15 {
        format!("{:.1}", f)
    } else {
        format!("{}", f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn nil_false_zero_and_empty_string_are_falsy() {
        assert!(!Value::Nil.is_truthy());
        assert!(!Value::Bool(false).is_truthy());
        assert!(!Value::Int(0).is_truthy());
        assert!(!Value::Float(0.0).is_truthy());
        assert!(!Value::Float(-0.0).is_truthy());
        assert!(!Value::Str(String::new()).is_truthy());
    }

    #[test]
    fn surprising_values_are_truthy() {
        assert!(Value::Str("0".into()).is_truthy());
        assert!(Value::Str("false".into()).is_truthy());
        assert!(Value::Array(vec![]).is_truthy());
        assert!(Value::Map(IndexMap::new()).is_truthy());
        assert!(Value::Int(-1).is_truthy());
        assert!(Value::Float(0.1).is_truthy());
    }

    #[test]
    fn serializes_as_plain_json() {
        let mut map = IndexMap::new();
        map.insert("hp".to_string(), Value::Int(10));
        map.insert("name".to_string(), Value::Str("kit".into()));
        let value = Value::Map(map);
        let json = serde_json::to_string(&value).unwrap();
        assert_eq!(json, r#"{"hp":10,"name":"kit"}"#);
    }

    #[test]
    fn deserializes_integers_and_floats_distinctly() {
        let int: Value = serde_json::from_str("3").unwrap();
        let float: Value = serde_json::from_str("3.5").unwrap();
        assert_eq!(int, Value::Int(3));
        assert_eq!(float, Value::Float(3.5));
    }

    #[test]
    fn nil_round_trips_through_null() {
        let json = serde_json::to_string(&Value::Nil).unwrap();
        assert_eq!(json, "null");
        let back: Value = serde_json::from_str(&json).unwrap();
        assert_eq!(back, Value::Nil);
    }

    #[test]
    fn display_string_prints_strings_bare() {
        assert_eq!(Value::Str("hi".into()).to_display_string(), "hi");
        assert_eq!(
            Value::Array(vec![Value::Str("a".into()), Value::Int(2)]).to_display_string(),
            "[\"a\", 2]"
        );
    }

    #[test]
    fn float_display_keeps_trailing_point_zero() {
        assert_eq!(Value::Float(2.0).to_display_string(), "2.0");
        assert_eq!(Value::Float(2.5).to_display_string(), "2.5");
    }
}
