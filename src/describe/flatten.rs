use serde_json::Value;

/// Flatten a parsed payload into `"path": value` leaf lines, suffixing
/// object keys with `.key` and array elements with `[i]`.
pub fn flatten_paths(value: &Value, prefix: &str) -> Vec<String> {
    let mut out = Vec::new();
    match value {
        Value::Object(map) => {
            for (key, val) in map {
                let next = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                out.extend(flatten_paths(val, &next));
            }
        }
        Value::Array(items) => {
            for (i, val) in items.iter().enumerate() {
                out.extend(flatten_paths(val, &format!("{prefix}[{i}]")));
            }
        }
        leaf => out.push(format!("\"{prefix}\": {}", leaf_text(leaf))),
    }
    out
}

fn leaf_text(leaf: &Value) -> String {
    match leaf {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}

/// Structure-only projection: keep nested object/array shape, drop every
/// scalar-valued entry. Used to shrink prompts the service rejected as
/// oversized.
pub fn strip_values(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .filter(|(_, v)| v.is_object() || v.is_array())
                .map(|(k, v)| (k.clone(), strip_values(v)))
                .collect(),
        ),
        Value::Array(items) => Value::Array(
            items
                .iter()
                .filter(|v| v.is_object() || v.is_array())
                .map(strip_values)
                .collect(),
        ),
        _ => Value::Null,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn nested_paths_are_suffixed() {
        let value = json!({"a": {"b": [{"c": 1}, {"c": "two"}]}});
        let paths = flatten_paths(&value, "");
        assert_eq!(paths, ["\"a.b[0].c\": 1", "\"a.b[1].c\": two"]);
    }

    #[test]
    fn scalars_flatten_at_the_root() {
        let value = json!({"code": 0, "msg": "ok"});
        let paths = flatten_paths(&value, "");
        assert_eq!(paths, ["\"code\": 0", "\"msg\": ok"]);
    }

    #[test]
    fn strip_values_keeps_only_nested_shape() {
        let value = json!({
            "scene": "health",
            "page": {"size": 20, "filters": [{"kind": "date"}]},
            "ids": [1, 2, 3]
        });
        let skeleton = strip_values(&value);
        assert_eq!(skeleton, json!({"page": {"filters": [{}]}, "ids": []}));
    }
}
