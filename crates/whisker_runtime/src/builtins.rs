//! The closed builtin library.
//!
//! Pure math, string, and collection helpers, coarse time reads, and the
//! `visited()` story query. Nothing here touches the host environment:
//! collection operations return new values rather than mutating in place,
//! and the time functions are read-only.
//!
//! Array positions are 1-indexed at this surface — `substring("abc", 1, 2)`
//! is `"ab"` — and converted to 0-indexed storage internally.

use std::time::{SystemTime, UNIX_EPOCH};

use whisker_story::Value;

use crate::error::RuntimeError;
use crate::interpret::{value_eq, Evaluator};

/// Dispatches a builtin by name. Unknown names produce a type-mismatch
/// warning and `Nil`.
pub fn call(
    name: &str,
    args: Vec<Value>,
    evaluator: &mut Evaluator<'_>,
) -> Result<Value, RuntimeError> {
    let result = match name {
        // Math
        "min" => fold_numeric(&args, f64::min),
        "max" => fold_numeric(&args, f64::max),
        "abs" => unary_numeric_preserve(&args, f64::abs),
        "floor" => unary_to_int(&args, f64::floor),
        "ceil" => unary_to_int(&args, f64::ceil),
        "round" => unary_to_int(&args, |n| n.round()),
        "sqrt" => unary_numeric(&args, f64::sqrt).map(float_value),
        "pow" => match (number(&args, 0), number(&args, 1)) {
            (Some(base), Some(exp)) => Some(Value::Float(base.powf(exp))),
            _ => None,
        },

        // Strings
        "length" => length(&args),
        "substring" => substring(&args),
        "uppercase" => string_map(&args, |s| s.to_uppercase()),
        "lowercase" => string_map(&args, |s| s.to_lowercase()),
        "trim" => string_map(&args, |s| s.trim().to_string()),
        "replace" => replace(&args),
        "split" => split(&args),
        "join" => join(&args),
        "find" => find(&args),

        // Collections
        "append" => append(&args),
        "remove_at" => remove_at(&args),
        "contains" => contains(&args),
        "keys" => keys(&args),
        "values" => values(&args),
        "sort" => sort(&args),

        // Time (coarse, read-only)
        "now" => Some(Value::Float(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .map(|d| d.as_secs_f64())
                .unwrap_or(0.0),
        )),
        "elapsed" => Some(Value::Float(evaluator.epoch.elapsed().as_secs_f64())),

        // Story queries
        "visited" => {
            let name = match args.first() {
                Some(Value::Str(s)) => s.clone(),
                _ => {
                    evaluator.type_mismatch("visited() takes a passage id string".to_string());
                    return Ok(Value::Nil);
                }
            };
            if !evaluator.caps.state_read {
                evaluator.type_mismatch("visited() requires state:read".to_string());
                return Ok(Value::Nil);
            }
            Some(Value::Int(evaluator.state.visit_count(&name) as i64))
        }

        _ => {
            evaluator.type_mismatch(format!("unknown function '{}'", name));
            return Ok(Value::Nil);
        }
    };

    match result {
        Some(value) => Ok(value),
        None => {
            evaluator.type_mismatch(format!("bad arguments to '{}'", name));
            Ok(Value::Nil)
        }
    }
}

fn number(args: &[Value], idx: usize) -> Option<f64> {
    args.get(idx)?.as_number()
}

/// Preserves integer-ness where the inputs were all integers.
fn fold_numeric(args: &[Value], f: fn(f64, f64) -> f64) -> Option<Value> {
    if args.is_empty() {
        return None;
    }
    let mut acc = number(args, 0)?;
    for idx in 1..args.len() {
        acc = f(acc, number(args, idx)?);
    }
    let all_ints = args.iter().all(|v| matches!(v, Value::Int(_)));
    Some(if all_ints {
        Value::Int(acc as i64)
    } else {
        Value::Float(acc)
    })
}

fn unary_numeric(args: &[Value], f: fn(f64) -> f64) -> Option<f64> {
    Some(f(number(args, 0)?))
}

/// Like `unary_numeric`, but preserves integer-ness when the input was an integer.
fn unary_numeric_preserve(args: &[Value], f: fn(f64) -> f64) -> Option<Value> {
    let n = number(args, 0)?;
    let result = f(n);
    Some(if matches!(args.first(), Some(Value::Int(_))) {
        Value::Int(result as i64)
    } else {
        Value::Float(result)
    })
}

fn unary_to_int(args: &[Value], f: fn(f64) -> f64) -> Option<Value> {
    Some(Value::Int(f(number(args, 0)?) as i64))
}

fn float_value(f: f64) -> Value {
    Value::Float(f)
}

fn length(args: &[Value]) -> Option<Value> {
    Some(Value::Int(match args.first()? {
        Value::Str(s) => s.chars().count() as i64,
        Value::Array(items) => items.len() as i64,
        Value::Map(entries) => entries.len() as i64,
        _ => return None,
    }))
}

/// `substring(s, start, end?)` — 1-indexed, inclusive bounds.
fn substring(args: &[Value]) -> Option<Value> {
    let Value::Str(s) = args.first()? else {
        return None;
    };
    let chars: Vec<char> = s.chars().collect();
    let start = (number(args, 1)? as usize).max(1) - 1;
    let end = match args.get(2) {
        Some(v) => (v.as_number()? as usize).min(chars.len()),
        None => chars.len(),
    };
    if start >= end {
        return Some(Value::Str(String::new()));
    }
    Some(Value::Str(chars[start..end].iter().collect()))
}

fn string_map(args: &[Value], f: impl Fn(&str) -> String) -> Option<Value> {
    match args.first()? {
        Value::Str(s) => Some(Value::Str(f(s))),
        _ => None,
    }
}

fn replace(args: &[Value]) -> Option<Value> {
    match (args.first()?, args.get(1)?, args.get(2)?) {
        (Value::Str(s), Value::Str(from), Value::Str(to)) => {
            Some(Value::Str(s.replace(from.as_str(), to)))
        }
        _ => None,
    }
}

fn split(args: &[Value]) -> Option<Value> {
    match (args.first()?, args.get(1)?) {
        (Value::Str(s), Value::Str(sep)) => Some(Value::Array(
            s.split(sep.as_str())
                .map(|part| Value::Str(part.to_string()))
                .collect(),
        )),
        _ => None,
    }
}

fn join(args: &[Value]) -> Option<Value> {
    match (args.first()?, args.get(1)?) {
        (Value::Array(items), Value::Str(sep)) => {
            let parts: Vec<String> = items.iter().map(Value::to_display_string).collect();
            Some(Value::Str(parts.join(sep)))
        }
        _ => None,
    }
}

/// `find(s, needle)` — 1-based character position or `nil`.
fn find(args: &[Value]) -> Option<Value> {
    match (args.first()?, args.get(1)?) {
        (Value::Str(s), Value::Str(needle)) => Some(match s.find(needle.as_str()) {
            Some(byte_idx) => Value::Int(s[..byte_idx].chars().count() as i64 + 1),
            None => Value::Nil,
        }),
        _ => None,
    }
}

fn append(args: &[Value]) -> Option<Value> {
    match args.first()? {
        Value::Array(items) => {
            let mut next = items.clone();
            next.push(args.get(1)?.clone());
            Some(Value::Array(next))
        }
        _ => None,
    }
}

/// `remove_at(arr, i)` — 1-indexed; out-of-range leaves the array alone.
fn remove_at(args: &[Value]) -> Option<Value> {
    match (args.first()?, args.get(1)?) {
        (Value::Array(items), idx) => {
            let idx = idx.as_number()? as usize;
            let mut next = items.clone();
            if idx >= 1 && idx <= next.len() {
                next.remove(idx - 1);
            }
            Some(Value::Array(next))
        }
        _ => None,
    }
}

fn contains(args: &[Value]) -> Option<Value> {
    let needle = args.get(1)?;
    Some(Value::Bool(match args.first()? {
        Value::Array(items) => items.iter().any(|v| value_eq(v, needle)),
        Value::Map(entries) => match needle {
            Value::Str(key) => entries.contains_key(key),
            _ => false,
        },
        Value::Str(s) => match needle {
            Value::Str(sub) => s.contains(sub.as_str()),
            _ => false,
        },
        _ => return None,
    }))
}

fn keys(args: &[Value]) -> Option<Value> {
    match args.first()? {
        Value::Map(entries) => Some(Value::Array(
            entries.keys().map(|k| Value::Str(k.clone())).collect(),
        )),
        _ => None,
    }
}

fn values(args: &[Value]) -> Option<Value> {
    match args.first()? {
        Value::Map(entries) => Some(Value::Array(entries.values().cloned().collect())),
        _ => None,
    }
}

/// `sort(arr)`, `sort(arr, "desc")`, `sort(arr, key)`, `sort(arr, key, "desc")`.
///
/// The provided comparator is expressed as string arguments, since the
/// value domain has no function type: `"asc"`/`"desc"` select the
/// direction, and any other string names the map key to order an array of
/// maps by. Sort keys must be all-numeric or all-string; elements missing
/// the named key order as `nil`, below every other key. The sort is
/// stable in both directions.
fn sort(args: &[Value]) -> Option<Value> {
    let Value::Array(items) = args.first()? else {
        return None;
    };

    let mut descending = false;
    let mut field: Option<&str> = None;
    for arg in &args[1..] {
        let Value::Str(s) = arg else {
            return None;
        };
        match s.as_str() {
            "asc" => descending = false,
            "desc" => descending = true,
            name => field = Some(name),
        }
    }

    let sort_key = |v: &Value| -> Value {
        match (field, v) {
            (Some(name), Value::Map(entries)) => {
                entries.get(name).cloned().unwrap_or(Value::Nil)
            }
            _ => v.clone(),
        }
    };

    let keys: Vec<Value> = items.iter().map(|v| sort_key(v)).collect();
    let numeric = keys
        .iter()
        .all(|k| k.as_number().is_some() || matches!(k, Value::Nil));
    let stringy = keys.iter().all(|k| matches!(k, Value::Str(_) | Value::Nil));
    if !numeric && !stringy {
        return None;
    }

    let mut next = items.clone();
    if descending {
        next.sort_by(|a, b| compare_sort_keys(&sort_key(b), &sort_key(a)));
    } else {
        next.sort_by(|a, b| compare_sort_keys(&sort_key(a), &sort_key(b)));
    }
    Some(Value::Array(next))
}

/// Total order over validated sort keys: `nil` first, then numbers by
/// value or strings lexicographically.
fn compare_sort_keys(a: &Value, b: &Value) -> std::cmp::Ordering {
    use std::cmp::Ordering;
    match (a, b) {
        (Value::Nil, Value::Nil) => Ordering::Equal,
        (Value::Nil, _) => Ordering::Less,
        (_, Value::Nil) => Ordering::Greater,
        (Value::Str(x), Value::Str(y)) => x.cmp(y),
        _ => match (a.as_number(), b.as_number()) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(Ordering::Equal),
            _ => Ordering::Equal,
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::interpret::{Budget, EvalCaps};
    use crate::state::GameState;
    use std::time::Instant;
    use whisker_base::Diagnostic;

    fn run(name: &str, args: Vec<Value>) -> (Value, Vec<Diagnostic>) {
        let mut state = GameState::new(10);
        state.record_visit("Start");
        state.record_visit("Start");
        let mut budget = Budget::new(10_000, 5_000);
        let mut diagnostics = Vec::new();
        let mut evaluator = Evaluator {
            state: &mut state,
            caps: EvalCaps::full(),
            budget: &mut budget,
            diagnostics: &mut diagnostics,
            epoch: Instant::now(),
        };
        let value = call(name, args, &mut evaluator).expect("within budget");
        (value, diagnostics)
    }

    fn ok(name: &str, args: Vec<Value>) -> Value {
        let (value, diags) = run(name, args);
        assert!(diags.is_empty(), "{} warned: {:?}", name, diags);
        value
    }

    #[test]
    fn math_preserves_integers() {
        assert_eq!(ok("min", vec![Value::Int(3), Value::Int(1)]), Value::Int(1));
        assert_eq!(ok("max", vec![Value::Int(3), Value::Float(4.5)]), Value::Float(4.5));
        assert_eq!(ok("abs", vec![Value::Int(-3)]), Value::Int(3));
        assert_eq!(ok("floor", vec![Value::Float(2.9)]), Value::Int(2));
        assert_eq!(ok("ceil", vec![Value::Float(2.1)]), Value::Int(3));
        assert_eq!(ok("round", vec![Value::Float(2.5)]), Value::Int(3));
    }

    #[test]
    fn sqrt_and_pow_are_floats() {
        assert_eq!(ok("sqrt", vec![Value::Int(9)]), Value::Float(3.0));
        assert_eq!(
            ok("pow", vec![Value::Int(2), Value::Int(10)]),
            Value::Float(1024.0)
        );
    }

    #[test]
    fn substring_is_one_indexed_inclusive() {
        let s = Value::Str("lantern".into());
        assert_eq!(
            ok("substring", vec![s.clone(), Value::Int(1), Value::Int(4)]),
            Value::Str("lant".into())
        );
        assert_eq!(
            ok("substring", vec![s, Value::Int(5)]),
            Value::Str("ern".into())
        );
    }

    #[test]
    fn find_returns_one_based_position_or_nil() {
        let s = Value::Str("lantern".into());
        assert_eq!(
            ok("find", vec![s.clone(), Value::Str("ant".into())]),
            Value::Int(2)
        );
        assert_eq!(ok("find", vec![s, Value::Str("zzz".into())]), Value::Nil);
    }

    #[test]
    fn split_and_join_round_trip() {
        let split = ok(
            "split",
            vec![Value::Str("a,b,c".into()), Value::Str(",".into())],
        );
        assert_eq!(
            split,
            Value::Array(vec![
                Value::Str("a".into()),
                Value::Str("b".into()),
                Value::Str("c".into())
            ])
        );
        assert_eq!(
            ok("join", vec![split, Value::Str(",".into())]),
            Value::Str("a,b,c".into())
        );
    }

    #[test]
    fn append_is_pure() {
        let original = Value::Array(vec![Value::Int(1)]);
        let appended = ok("append", vec![original.clone(), Value::Int(2)]);
        assert_eq!(
            appended,
            Value::Array(vec![Value::Int(1), Value::Int(2)])
        );
        // Builtins never mutate their inputs.
        assert_eq!(original, Value::Array(vec![Value::Int(1)]));
    }

    #[test]
    fn remove_at_is_one_indexed() {
        let arr = Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)]);
        assert_eq!(
            ok("remove_at", vec![arr.clone(), Value::Int(2)]),
            Value::Array(vec![Value::Int(1), Value::Int(3)])
        );
        // Out of range is a no-op.
        assert_eq!(ok("remove_at", vec![arr.clone(), Value::Int(99)]), arr);
    }

    #[test]
    fn keys_preserve_insertion_order() {
        let mut map = indexmap::IndexMap::new();
        map.insert("z".to_string(), Value::Int(1));
        map.insert("a".to_string(), Value::Int(2));
        assert_eq!(
            ok("keys", vec![Value::Map(map)]),
            Value::Array(vec![Value::Str("z".into()), Value::Str("a".into())])
        );
    }

    #[test]
    fn sort_orders_numbers_and_strings() {
        assert_eq!(
            ok(
                "sort",
                vec![Value::Array(vec![Value::Int(3), Value::Int(1), Value::Int(2)])]
            ),
            Value::Array(vec![Value::Int(1), Value::Int(2), Value::Int(3)])
        );
    }

    #[test]
    fn sort_desc_comparator_reverses_the_order() {
        assert_eq!(
            ok(
                "sort",
                vec![
                    Value::Array(vec![Value::Int(1), Value::Int(3), Value::Int(2)]),
                    Value::Str("desc".into()),
                ]
            ),
            Value::Array(vec![Value::Int(3), Value::Int(2), Value::Int(1)])
        );
    }

    #[test]
    fn sort_by_key_orders_arrays_of_maps() {
        fn fighter(name: &str, hp: i64) -> Value {
            let mut map = indexmap::IndexMap::new();
            map.insert("name".to_string(), Value::Str(name.into()));
            map.insert("hp".to_string(), Value::Int(hp));
            Value::Map(map)
        }
        let party = Value::Array(vec![fighter("kit", 7), fighter("ash", 12), fighter("moss", 3)]);

        let by_hp = ok("sort", vec![party.clone(), Value::Str("hp".into())]);
        let Value::Array(sorted) = &by_hp else {
            panic!("expected array, got {:?}", by_hp);
        };
        let hps: Vec<&Value> = sorted
            .iter()
            .map(|v| match v {
                Value::Map(m) => &m["hp"],
                _ => panic!("expected map"),
            })
            .collect();
        assert_eq!(hps, vec![&Value::Int(3), &Value::Int(7), &Value::Int(12)]);

        let by_hp_desc = ok(
            "sort",
            vec![party, Value::Str("hp".into()), Value::Str("desc".into())],
        );
        let Value::Array(sorted) = &by_hp_desc else {
            panic!("expected array");
        };
        assert!(matches!(&sorted[0], Value::Map(m) if m["hp"] == Value::Int(12)));
    }

    #[test]
    fn sort_puts_missing_keys_first() {
        let mut with_key = indexmap::IndexMap::new();
        with_key.insert("rank".to_string(), Value::Int(1));
        let without_key = indexmap::IndexMap::new();
        let sorted = ok(
            "sort",
            vec![
                Value::Array(vec![Value::Map(with_key), Value::Map(without_key.clone())]),
                Value::Str("rank".into()),
            ],
        );
        let Value::Array(items) = &sorted else {
            panic!("expected array");
        };
        assert_eq!(items[0], Value::Map(without_key));
    }

    #[test]
    fn sort_rejects_a_non_string_comparator() {
        let (value, diags) = run(
            "sort",
            vec![
                Value::Array(vec![Value::Int(2), Value::Int(1)]),
                Value::Int(1),
            ],
        );
        assert_eq!(value, Value::Nil);
        assert!(!diags.is_empty());
    }

    #[test]
    fn sort_rejects_mixed_key_types() {
        let (value, diags) = run(
            "sort",
            vec![Value::Array(vec![Value::Int(1), Value::Str("a".into())])],
        );
        assert_eq!(value, Value::Nil);
        assert!(!diags.is_empty());
    }

    #[test]
    fn visited_reads_visit_counts() {
        assert_eq!(
            ok("visited", vec![Value::Str("Start".into())]),
            Value::Int(2)
        );
        assert_eq!(
            ok("visited", vec![Value::Str("Never".into())]),
            Value::Int(0)
        );
    }

    #[test]
    fn unknown_function_warns_and_yields_nil() {
        let (value, diags) = run("launch_missiles", vec![]);
        assert_eq!(value, Value::Nil);
        assert!(!diags.is_empty());
    }

    #[test]
    fn bad_arguments_warn_and_yield_nil() {
        let (value, diags) = run("sqrt", vec![Value::Str("nope".into())]);
        assert_eq!(value, Value::Nil);
        assert!(!diags.is_empty());
    }
}
