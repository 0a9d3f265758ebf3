use serde_json::Value;
use std::collections::BTreeMap;

/// Recursively sorts object keys and serializes with no whitespace.
/// Number formatting falls through to `serde_json`'s own `Display` for
/// `Value`, which matches the platform default referenced in spec.md
/// §4.7 closely enough for hashing purposes: the same `Value` always
/// serializes to the same bytes.
pub fn canonical_json(value: &Value) -> String {
    serde_json::to_string(&sort_value(value)).expect("canonical values always serialize")
}

fn sort_value(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let sorted: BTreeMap<String, Value> = map
                .iter()
                .map(|(k, v)| (k.clone(), sort_value(v)))
                .collect();
            let mut out = serde_json::Map::new();
            for (k, v) in sorted {
                out.insert(k, v);
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(sort_value).collect()),
        other => other.clone(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn stable_under_key_reordering() {
        let a = json!({"b": 1, "a": 2, "c": {"y": 1, "x": 2}});
        let b = json!({"a": 2, "c": {"x": 2, "y": 1}, "b": 1});
        assert_eq!(canonical_json(&a), canonical_json(&b));
    }

    #[test]
    fn no_whitespace() {
        let v = json!({"a": 1});
        assert_eq!(canonical_json(&v), "{\"a\":1}");
    }
}
