//! Structural comparison between a local command payload and a remote listing entry.
//!
//! The platform echoes payloads back with small differences: numbers may come
//! back as strings, absent keys and explicit nulls are interchangeable, and
//! choice values may change representation. Comparison tolerates exactly
//! those differences.

use serde_json::Value;

/// Top-level keys compared between a local payload and a remote entry.
const TOP_LEVEL_KEYS: &[&str] = &[
    "type",
    "name",
    "description",
    "name_localizations",
    "description_localizations",
    "default_member_permissions",
    "dm_permission",
    "nsfw",
    "guild_id",
];

const NULL: Value = Value::Null;

fn field<'a>(value: &'a Value, key: &str) -> &'a Value {
    value.get(key).unwrap_or(&NULL)
}

fn options(value: &Value) -> &[Value] {
    value
        .get("options")
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}

/// Whether a remote entry matches the local payload closely enough to skip re-registration.
pub fn is_payload_equal(local: &Value, remote: &Value) -> bool {
    for key in TOP_LEVEL_KEYS {
        if !deep_eq(field(local, key), field(remote, key)) {
            tracing::debug!(
                key,
                local = %field(local, key),
                remote = %field(remote, key),
                "Command payload key differs"
            );
            return false;
        }
    }

    let local_options = options(local);
    let remote_options = options(remote);
    if local_options.len() != remote_options.len() {
        tracing::debug!("Option count differs");
        return false;
    }

    // options are matched by name; neither side guarantees ordering
    for option in local_options {
        let name = field(option, "name");
        match remote_options.iter().find(|r| field(r, "name") == name) {
            Some(remote_option) if deep_eq(option, remote_option) => {}
            Some(_) => {
                tracing::debug!(option = %name, "Option differs");
                return false;
            }
            None => {
                tracing::debug!(option = %name, "Remote is missing an option");
                return false;
            }
        }
    }
    true
}

/// Recursive equality over JSON values.
///
/// A missing key equals `null`, a numeric string equals the number it parses
/// to, and the `value` key of `choices` elements is not compared.
pub fn deep_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => x
            .keys()
            .chain(y.keys())
            .all(|key| key_eq(key, x.get(key).unwrap_or(&NULL), y.get(key).unwrap_or(&NULL))),
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| deep_eq(a, b))
        }
        (Value::String(s), Value::Number(n)) | (Value::Number(n), Value::String(s)) => {
            numeric_string_eq(s, n)
        }
        (Value::Number(x), Value::Number(y)) => match (x.as_f64(), y.as_f64()) {
            (Some(fx), Some(fy)) if x.is_f64() || y.is_f64() => fx == fy,
            _ => x == y,
        },
        _ => a == b,
    }
}

fn key_eq(key: &str, a: &Value, b: &Value) -> bool {
    if key != "choices" {
        return deep_eq(a, b);
    }
    match (a, b) {
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(a, b)| choice_eq(a, b))
        }
        _ => deep_eq(a, b),
    }
}

fn choice_eq(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Object(x), Value::Object(y)) => x
            .keys()
            .chain(y.keys())
            .filter(|key| key.as_str() != "value")
            .all(|key| deep_eq(x.get(key).unwrap_or(&NULL), y.get(key).unwrap_or(&NULL))),
        _ => deep_eq(a, b),
    }
}

fn numeric_string_eq(s: &str, n: &serde_json::Number) -> bool {
    if let (Ok(parsed), Some(n)) = (s.parse::<u64>(), n.as_u64()) {
        return parsed == n;
    }
    if let (Ok(parsed), Some(n)) = (s.parse::<i64>(), n.as_i64()) {
        return parsed == n;
    }
    match (s.parse::<f64>(), n.as_f64()) {
        (Ok(parsed), Some(n)) => parsed == n,
        _ => false,
    }
}
