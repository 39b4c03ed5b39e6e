//! Equality policy used to classify PASS vs FAIL.
//!
//! Type-aware deep equality over JSON values with a small set of tagged
//! encodings for Python values JSON cannot express:
//!
//! - `{"__set__": [...]}`: a `set`/`frozenset`; equals another set or an
//!   expected array regardless of order (multiset semantics).
//! - `{"__float__": "inf" | "-inf" | "nan"}`: a non-finite float; `nan`
//!   equals nothing.
//! - `{"__repr__": "..."}`: an object with no JSON form; equals only an
//!   identical tag.
//!
//! Numbers compare across int/float with an absolute tolerance of
//! [`FLOAT_TOLERANCE`]. Booleans never equal numbers.

use serde_json::{Map, Number, Value};

pub const FLOAT_TOLERANCE: f64 = 1e-9;

pub const SET_TAG: &str = "__set__";
pub const FLOAT_TAG: &str = "__float__";
pub const REPR_TAG: &str = "__repr__";

/// Tagged view of a harness-encoded value.
enum Tagged<'a> {
    Set(&'a [Value]),
    Float(&'a str),
    Repr(&'a str),
}

fn tagged(value: &Value) -> Option<Tagged<'_>> {
    let map = value.as_object()?;
    if map.len() != 1 {
        return None;
    }
    let (key, inner) = map.iter().next()?;
    match (key.as_str(), inner) {
        (SET_TAG, Value::Array(items)) => Some(Tagged::Set(items)),
        (FLOAT_TAG, Value::String(label)) => Some(Tagged::Float(label)),
        (REPR_TAG, Value::String(text)) => Some(Tagged::Repr(text)),
        _ => None,
    }
}

/// Compare an actual value returned by a candidate against the expected value.
pub fn values_match(actual: &Value, expected: &Value) -> bool {
    match (tagged(actual), tagged(expected)) {
        (Some(Tagged::Set(a)), Some(Tagged::Set(e))) => unordered_match(a, e),
        (Some(Tagged::Set(a)), None) => match expected {
            Value::Array(e) => unordered_match(a, e),
            _ => false,
        },
        (None, Some(Tagged::Set(e))) => match actual {
            Value::Array(a) => unordered_match(a, e),
            _ => false,
        },
        (Some(Tagged::Float(a)), Some(Tagged::Float(e))) => a == e && a != "nan",
        (Some(Tagged::Repr(a)), Some(Tagged::Repr(e))) => a == e,
        (Some(_), _) | (_, Some(_)) => false,
        (None, None) => plain_match(actual, expected),
    }
}

fn plain_match(actual: &Value, expected: &Value) -> bool {
    match (actual, expected) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(a), Value::Bool(e)) => a == e,
        (Value::Number(a), Value::Number(e)) => numbers_match(a, e),
        (Value::String(a), Value::String(e)) => a == e,
        (Value::Array(a), Value::Array(e)) => {
            a.len() == e.len() && a.iter().zip(e).all(|(x, y)| values_match(x, y))
        }
        (Value::Object(a), Value::Object(e)) => objects_match(a, e),
        _ => false,
    }
}

fn numbers_match(actual: &Number, expected: &Number) -> bool {
    if let (Some(a), Some(e)) = (actual.as_i64(), expected.as_i64()) {
        return a == e;
    }
    if let (Some(a), Some(e)) = (actual.as_u64(), expected.as_u64()) {
        return a == e;
    }
    match (actual.as_f64(), expected.as_f64()) {
        (Some(a), Some(e)) => (a - e).abs() <= FLOAT_TOLERANCE,
        _ => false,
    }
}

fn objects_match(actual: &Map<String, Value>, expected: &Map<String, Value>) -> bool {
    actual.len() == expected.len()
        && expected
            .iter()
            .all(|(key, e)| actual.get(key).is_some_and(|a| values_match(a, e)))
}

/// Order-insensitive comparison; each expected element is matched at most once.
fn unordered_match(actual: &[Value], expected: &[Value]) -> bool {
    if actual.len() != expected.len() {
        return false;
    }
    let mut used = vec![false; expected.len()];
    actual.iter().all(|a| {
        let slot = expected
            .iter()
            .enumerate()
            .position(|(idx, e)| !used[idx] && values_match(a, e));
        match slot {
            Some(idx) => {
                used[idx] = true;
                true
            }
            None => false,
        }
    })
}

/// Render a value for human-facing messages, Python-flavoured.
pub fn render_value(value: &Value) -> String {
    if let Some(tag) = tagged(value) {
        return match tag {
            Tagged::Set(items) if items.is_empty() => "set()".to_string(),
            Tagged::Set(items) => format!("{{{}}}", render_items(items)),
            Tagged::Float(label) => label.to_string(),
            Tagged::Repr(text) => text.to_string(),
        };
    }
    match value {
        Value::Null => "None".to_string(),
        Value::Bool(true) => "True".to_string(),
        Value::Bool(false) => "False".to_string(),
        Value::Array(items) => format!("[{}]", render_items(items)),
        Value::Object(map) => {
            let body = map
                .iter()
                .map(|(key, inner)| format!("{key:?}: {}", render_value(inner)))
                .collect::<Vec<_>>()
                .join(", ");
            format!("{{{body}}}")
        }
        Value::String(text) => format!("{text:?}"),
        Value::Number(number) => number.to_string(),
    }
}

fn render_items(items: &[Value]) -> String {
    items
        .iter()
        .map(render_value)
        .collect::<Vec<_>>()
        .join(", ")
}
