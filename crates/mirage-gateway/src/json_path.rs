//! JSON path extraction for body conditions and body templates.
//!
//! Supports the common subset of path syntaxes seen in rule definitions:
//!
//! - `field` / `field.nested` - object fields
//! - `items.0.id` - numeric segments index into arrays
//! - `$.items[0].id` - bracket indexing, optional `$.` prefix
//! - `items[*].id` - wildcard returns the first match

/// Extract a value from a JSON body as a string.
///
/// Scalars are rendered bare (no quotes around strings); objects and arrays
/// are rendered as compact JSON. Returns `None` on unparseable bodies or
/// paths that do not resolve.
pub fn extract_json_path(body: &str, path: &str) -> Option<String> {
    let json: serde_json::Value = serde_json::from_str(body).ok()?;

    let path = path.strip_prefix("$.").unwrap_or(path);
    let path = path.strip_prefix('$').unwrap_or(path);

    let value = navigate_json(&json, path)?;

    match value {
        serde_json::Value::String(s) => Some(s.clone()),
        serde_json::Value::Number(n) => Some(n.to_string()),
        serde_json::Value::Bool(b) => Some(b.to_string()),
        serde_json::Value::Null => Some("null".to_string()),
        _ => Some(value.to_string()),
    }
}

/// Navigate a JSON structure following a path.
fn navigate_json<'a>(value: &'a serde_json::Value, path: &str) -> Option<&'a serde_json::Value> {
    if path.is_empty() {
        return Some(value);
    }

    // Split on first . or [
    let (segment, rest) = if let Some(bracket_pos) = path.find('[') {
        let dot_pos = path.find('.');
        match dot_pos {
            Some(d) if d < bracket_pos => {
                let (seg, rest) = path.split_at(d);
                (seg, rest.strip_prefix('.').unwrap_or(rest))
            }
            _ => {
                let (seg, rest) = path.split_at(bracket_pos);
                (seg, rest)
            }
        }
    } else if let Some(dot_pos) = path.find('.') {
        let (seg, rest) = path.split_at(dot_pos);
        (seg, rest.strip_prefix('.').unwrap_or(rest))
    } else {
        (path, "")
    };

    // Bracket segment: [index] or [*]
    if segment.is_empty() && path.starts_with('[') {
        if let Some(end) = path.find(']') {
            let index_str = &path[1..end];
            let rest = path[end + 1..]
                .strip_prefix('.')
                .unwrap_or(&path[end + 1..]);

            if index_str == "*" {
                if let serde_json::Value::Array(arr) = value {
                    for item in arr {
                        if let Some(result) = navigate_json(item, rest) {
                            return Some(result);
                        }
                    }
                }
                return None;
            } else if let Ok(index) = index_str.parse::<usize>() {
                let arr = value.as_array()?;
                return navigate_json(arr.get(index)?, rest);
            }
        }
        return None;
    }

    match value {
        serde_json::Value::Object(obj) => navigate_json(obj.get(segment)?, rest),
        // Numeric dot segments index into arrays: items.0.id
        serde_json::Value::Array(arr) => {
            let index = segment.parse::<usize>().ok()?;
            navigate_json(arr.get(index)?, rest)
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const BODY: &str = r#"{
        "user": {"name": "alice", "age": 34, "admin": true},
        "items": [{"id": 1}, {"id": 2}],
        "note": null
    }"#;

    #[test]
    fn test_top_level_field() {
        assert_eq!(
            extract_json_path(BODY, "user.name").as_deref(),
            Some("alice")
        );
    }

    #[test]
    fn test_scalar_rendering() {
        assert_eq!(extract_json_path(BODY, "user.age").as_deref(), Some("34"));
        assert_eq!(
            extract_json_path(BODY, "user.admin").as_deref(),
            Some("true")
        );
        assert_eq!(extract_json_path(BODY, "note").as_deref(), Some("null"));
    }

    #[test]
    fn test_array_index_dot_and_bracket() {
        assert_eq!(extract_json_path(BODY, "items.0.id").as_deref(), Some("1"));
        assert_eq!(
            extract_json_path(BODY, "$.items[1].id").as_deref(),
            Some("2")
        );
    }

    #[test]
    fn test_wildcard_returns_first_match() {
        assert_eq!(
            extract_json_path(BODY, "items[*].id").as_deref(),
            Some("1")
        );
    }

    #[test]
    fn test_compound_value_rendered_as_json() {
        let got = extract_json_path(BODY, "items.0").unwrap();
        let value: serde_json::Value = serde_json::from_str(&got).unwrap();
        assert_eq!(value, serde_json::json!({"id": 1}));
    }

    #[test]
    fn test_missing_path_and_bad_body() {
        assert!(extract_json_path(BODY, "user.email").is_none());
        assert!(extract_json_path("not json", "user").is_none());
        assert!(extract_json_path(BODY, "items.9").is_none());
    }
}
