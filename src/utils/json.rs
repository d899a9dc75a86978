use serde_json::Value;

/// Select a value by dotted path; numeric segments index into arrays.
pub fn select(
    value: &Value,
    path: &str,
) -> Option<Value> {
    let mut current = value;
    for key in path.split('.').filter(|k| !k.is_empty()) {
        current = match current {
            Value::Array(items) => items.get(key.parse::<usize>().ok()?)?,
            _ => current.get(key)?,
        };
    }
    Some(current.clone())
}

/// Render a value for string interpolation; strings are not quoted.
pub fn to_text(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => "null".to_string(),
        v => v.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn test_select() {
        let value = json!({ "a": { "b": [10, { "c": "x" }] } });
        assert_eq!(select(&value, "a.b.0"), Some(json!(10)));
        assert_eq!(select(&value, "a.b.1.c"), Some(json!("x")));
        assert_eq!(select(&value, ""), Some(value.clone()));
        assert_eq!(select(&value, "a.z"), None);
        assert_eq!(select(&value, "a.b.x"), None);
    }

    #[test]
    fn test_to_text() {
        assert_eq!(to_text(&json!("hi")), "hi");
        assert_eq!(to_text(&json!(1.5)), "1.5");
        assert_eq!(to_text(&json!({ "k": true })), "{\"k\":true}");
    }
}
