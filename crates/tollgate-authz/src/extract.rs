//! JSON-path extraction over arbitrary request bodies.
//!
//! The supported syntax is small:
//!
//! - `$.a.b.c` walks nested objects (`$.` or `$` prefix optional)
//! - `$.items[*]` returns every element of an array
//! - `$.items[*].a.b` projects a nested field out of every element
//!
//! A missing field is an error, except when its name contains `Used` or
//! `Exists`: such fields report their absence as `false`.

use serde_json::Value;

use crate::error::ExtractError;

const WILDCARD: &str = "[*]";

/// Extract the value addressed by `json_path` from `data`.
///
/// Wildcard paths always produce an array with one entry per source element,
/// in source order.
pub fn extract(data: &Value, json_path: &str) -> Result<Value, ExtractError> {
    let body = json_path
        .strip_prefix("$.")
        .or_else(|| json_path.strip_prefix('$'))
        .unwrap_or(json_path);

    let Some((prefix, suffix)) = body.split_once(WILDCARD) else {
        reject_brackets(json_path, body)?;
        return traverse(data, body, json_path);
    };

    if suffix.contains(WILDCARD) {
        return Err(malformed(json_path, "more than one [*] wildcard"));
    }
    if !suffix.is_empty() && !suffix.starts_with('.') {
        return Err(malformed(json_path, "[*] must be followed by '.' or end the path"));
    }
    reject_brackets(json_path, prefix)?;
    reject_brackets(json_path, suffix)?;

    let elements = match traverse(data, prefix, json_path)? {
        Value::Array(elements) => elements,
        _ => {
            return Err(ExtractError::TypeMismatch {
                path: json_path.to_string(),
                step: prefix.to_string(),
                expected: "array",
            })
        }
    };

    let suffix = suffix.trim_start_matches('.');
    if suffix.is_empty() {
        return Ok(Value::Array(elements));
    }

    elements
        .iter()
        .enumerate()
        .map(|(index, element)| {
            if !element.is_object() {
                return Err(ExtractError::TypeMismatch {
                    path: json_path.to_string(),
                    step: format!("{prefix}[{index}]"),
                    expected: "object",
                });
            }
            traverse(element, suffix, json_path)
        })
        .collect::<Result<Vec<_>, _>>()
        .map(Value::Array)
}

/// Whether a missing field with this name reads as `false`.
pub fn is_existence_field(name: &str) -> bool {
    name.contains("Used") || name.contains("Exists")
}

fn traverse(data: &Value, dotted: &str, full_path: &str) -> Result<Value, ExtractError> {
    let mut current = data;

    for segment in dotted.split('.').filter(|s| !s.is_empty()) {
        let Value::Object(map) = current else {
            return Err(ExtractError::TypeMismatch {
                path: full_path.to_string(),
                step: segment.to_string(),
                expected: "object",
            });
        };
        match map.get(segment) {
            Some(next) => current = next,
            None if is_existence_field(segment) => return Ok(Value::Bool(false)),
            None => {
                return Err(ExtractError::MissingField {
                    path: full_path.to_string(),
                    field: segment.to_string(),
                })
            }
        }
    }

    Ok(current.clone())
}

fn reject_brackets(full_path: &str, part: &str) -> Result<(), ExtractError> {
    if part.contains(['[', ']']) {
        return Err(malformed(full_path, "only [*] is supported inside brackets"));
    }
    Ok(())
}

fn malformed(path: &str, reason: &'static str) -> ExtractError {
    ExtractError::MalformedPath {
        path: path.to_string(),
        reason,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::{json, Map};

    #[test]
    fn test_simple_and_nested_fields() {
        let data = json!({"user": {"profile": {"name": "ada"}}, "count": 3});
        assert_eq!(extract(&data, "$.count").unwrap(), json!(3));
        assert_eq!(extract(&data, "$.user.profile.name").unwrap(), json!("ada"));
        assert_eq!(extract(&data, "user.profile").unwrap(), json!({"name": "ada"}));
    }

    #[test]
    fn test_root_paths() {
        let data = json!({"a": 1});
        assert_eq!(extract(&data, "$").unwrap(), data);
        assert_eq!(extract(&data, "$.").unwrap(), data);
        assert_eq!(extract(&data, "$a").unwrap(), json!(1));
    }

    #[test]
    fn test_empty_segments_are_skipped() {
        let data = json!({"a": {"b": true}});
        assert_eq!(extract(&data, "$.a..b").unwrap(), json!(true));
    }

    #[test]
    fn test_missing_field_is_an_error() {
        let data = json!({"a": {}});
        let err = extract(&data, "$.a.b").unwrap_err();
        assert_eq!(
            err,
            ExtractError::MissingField {
                path: "$.a.b".to_string(),
                field: "b".to_string(),
            }
        );
    }

    #[test]
    fn test_existence_fields_default_to_false() {
        let data = json!({"flags": {}});
        assert_eq!(extract(&data, "$.flags.couponUsed").unwrap(), json!(false));
        assert_eq!(extract(&data, "$.flags.addressExists").unwrap(), json!(false));
    }

    #[test]
    fn test_existence_fields_keep_real_value() {
        let data = json!({"couponUsed": "SAVE10", "addressExists": 0});
        assert_eq!(extract(&data, "$.couponUsed").unwrap(), json!("SAVE10"));
        assert_eq!(extract(&data, "$.addressExists").unwrap(), json!(0));
    }

    #[test]
    fn test_traversing_into_scalar_is_type_mismatch() {
        let data = json!({"a": "text"});
        let err = extract(&data, "$.a.b").unwrap_err();
        assert!(matches!(err, ExtractError::TypeMismatch { expected: "object", .. }));
    }

    #[test]
    fn test_wildcard_projection() {
        let data = json!({"items": [{"id": "a"}, {"id": "b"}]});
        assert_eq!(extract(&data, "$.items[*].id").unwrap(), json!(["a", "b"]));
    }

    #[test]
    fn test_wildcard_nested_projection() {
        let data = json!({"orders": [
            {"line": {"sku": "x1"}},
            {"line": {"sku": "x2"}},
            {"line": {"sku": "x3"}}
        ]});
        assert_eq!(
            extract(&data, "$.orders[*].line.sku").unwrap(),
            json!(["x1", "x2", "x3"])
        );
    }

    #[test]
    fn test_wildcard_raw_elements() {
        let data = json!({"tags": ["a", 1, {"k": "v"}, null]});
        assert_eq!(extract(&data, "$.tags[*]").unwrap(), json!(["a", 1, {"k": "v"}, null]));
    }

    #[test]
    fn test_wildcard_on_root_array() {
        let data = json!([{"id": 1}, {"id": 2}]);
        assert_eq!(extract(&data, "$[*].id").unwrap(), json!([1, 2]));
    }

    #[test]
    fn test_wildcard_existence_per_element() {
        let data = json!({"items": [{"giftUsed": true}, {}]});
        assert_eq!(extract(&data, "$.items[*].giftUsed").unwrap(), json!([true, false]));
    }

    #[test]
    fn test_wildcard_missing_field_in_element() {
        let data = json!({"items": [{"id": "a"}, {"name": "b"}]});
        let err = extract(&data, "$.items[*].id").unwrap_err();
        assert!(matches!(err, ExtractError::MissingField { ref field, .. } if field == "id"));
    }

    #[test]
    fn test_wildcard_base_must_be_array() {
        let data = json!({"items": {"id": "a"}});
        let err = extract(&data, "$.items[*].id").unwrap_err();
        assert!(matches!(err, ExtractError::TypeMismatch { expected: "array", .. }));
    }

    #[test]
    fn test_wildcard_element_must_be_object() {
        let data = json!({"items": [{"id": "a"}, 7]});
        let err = extract(&data, "$.items[*].id").unwrap_err();
        match err {
            ExtractError::TypeMismatch { step, expected, .. } => {
                assert_eq!(step, "items[1]");
                assert_eq!(expected, "object");
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_malformed_paths() {
        let data = json!({"a": [[{"b": 1}]]});
        for path in ["$.a[*][*].b", "$.a[*]b", "$.a[0].b", "$.a]"] {
            let err = extract(&data, path).unwrap_err();
            assert!(
                matches!(err, ExtractError::MalformedPath { .. }),
                "{path} should be malformed, got {err:?}"
            );
        }
    }

    fn leaf() -> impl Strategy<Value = Value> {
        prop_oneof![
            any::<bool>().prop_map(Value::Bool),
            any::<i64>().prop_map(Value::from),
            "[a-z ]{0,12}".prop_map(Value::String),
            Just(Value::Null),
        ]
    }

    fn nested_object() -> impl Strategy<Value = Value> {
        let key = "[a-z]{1,6}";
        leaf().prop_recursive(3, 32, 4, move |inner| {
            prop::collection::btree_map(key, inner, 1..4)
                .prop_map(|m| Value::Object(m.into_iter().collect::<Map<_, _>>()))
        })
    }

    fn leaves(value: &Value, prefix: &str, out: &mut Vec<(String, Value)>) {
        match value {
            Value::Object(map) if !map.is_empty() => {
                for (key, child) in map {
                    leaves(child, &format!("{prefix}.{key}"), out);
                }
            }
            other => out.push((prefix.to_string(), other.clone())),
        }
    }

    proptest! {
        #[test]
        fn prop_every_leaf_reads_back(value in nested_object()) {
            let mut found = Vec::new();
            leaves(&value, "$", &mut found);
            for (path, expected) in found {
                prop_assert_eq!(extract(&value, &path).unwrap(), expected);
            }
        }

        #[test]
        fn prop_projection_has_one_value_per_element(ids in prop::collection::vec(any::<i64>(), 0..20)) {
            let items: Vec<Value> = ids.iter().map(|id| json!({"f": id})).collect();
            let data = json!({"arr": items});
            let projected = extract(&data, "$.arr[*].f").unwrap();
            let expected: Vec<Value> = ids.into_iter().map(Value::from).collect();
            prop_assert_eq!(projected, Value::Array(expected));
        }
    }
}
