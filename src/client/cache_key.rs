//! Cache keys for API responses.

use reqwest::Method;
use serde_json::Value;

/// Builds the cache key for a request as `METHOD:url:body`.
///
/// The body is rendered with object keys sorted at every level, so bodies
/// that differ only in key order share a key.
pub fn cache_key(method: &Method, url: &str, body: Option<&Value>) -> String {
    let mut key = format!("{}:{}:", method, url);
    if let Some(body) = body {
        write_canonical(body, &mut key);
    }
    key
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut fields: Vec<(&String, &Value)> = map.iter().collect();
            fields.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');
            for (i, (name, field)) in fields.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(name.clone()).to_string());
                out.push(':');
                write_canonical(field, out);
            }
            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }
            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn test_key_layout() {
        assert_eq!(
            cache_key(&Method::GET, "https://api.test/clients", None),
            "GET:https://api.test/clients:"
        );
        assert_eq!(
            cache_key(&Method::POST, "/search", Some(&json!({"q": "acme"}))),
            r#"POST:/search:{"q":"acme"}"#
        );
    }

    #[test]
    fn test_nested_key_order_is_irrelevant() {
        let a: Value = serde_json::from_str(r#"{"b": {"y": 1, "x": [{"n": 2, "m": 1}]}, "a": "s"}"#).unwrap();
        let b: Value = serde_json::from_str(r#"{"a": "s", "b": {"x": [{"m": 1, "n": 2}], "y": 1}}"#).unwrap();
        assert_eq!(
            cache_key(&Method::GET, "/x", Some(&a)),
            cache_key(&Method::GET, "/x", Some(&b))
        );
    }

    #[test]
    fn test_distinct_inputs_distinct_keys() {
        let url = "/clients";
        let base = cache_key(&Method::GET, url, Some(&json!({"page": 1})));
        assert_ne!(base, cache_key(&Method::GET, url, Some(&json!({"page": 2}))));
        assert_ne!(base, cache_key(&Method::POST, url, Some(&json!({"page": 1}))));
        assert_ne!(base, cache_key(&Method::GET, "/other", Some(&json!({"page": 1}))));
        assert_ne!(
            cache_key(&Method::GET, url, Some(&json!([1, 2]))),
            cache_key(&Method::GET, url, Some(&json!([2, 1])))
        );
    }

    proptest! {
        #[test]
        fn prop_insertion_order_does_not_change_key(
            fields in proptest::collection::btree_map("[a-z]{1,6}", any::<i64>(), 0..8)
        ) {
            let forward: serde_json::Map<String, Value> =
                fields.iter().map(|(k, v)| (k.clone(), json!(v))).collect();
            let reverse: serde_json::Map<String, Value> =
                fields.iter().rev().map(|(k, v)| (k.clone(), json!(v))).collect();

            prop_assert_eq!(
                cache_key(&Method::GET, "/p", Some(&Value::Object(forward))),
                cache_key(&Method::GET, "/p", Some(&Value::Object(reverse)))
            );
        }
    }
}
