//! Canonical content fingerprints used to tell a real edit apart from
//! metadata noise (a touched `updated_at`, reordered JSON keys, a
//! reshuffled todo list).

use serde_json::Value;

/// Lower-case hex MD5 digest of an arbitrary string.
pub fn hash(input: &str) -> String {
    format!("{:x}", md5::compute(input.as_bytes()))
}

/// Hashes Markdown body text after stripping the `updated_at:` line from
/// a leading YAML front-matter block, so touching only that field never
/// changes the hash.
pub fn markdown_hash(text: &str) -> String {
    hash(&strip_front_matter_updated_at(text))
}

fn strip_front_matter_updated_at(text: &str) -> String {
    let mut lines = text.lines();
    let Some(first) = lines.next() else {
        return text.to_string();
    };
    if first.trim_end() != "---" {
        return text.to_string();
    }

    let mut front_matter = Vec::new();
    let mut rest = Vec::new();
    let mut closed = false;
    for line in lines {
        if !closed {
            if line.trim_end() == "---" {
                closed = true;
                continue;
            }
            if !line.trim_start().starts_with("updated_at:") {
                front_matter.push(line);
            }
        } else {
            rest.push(line);
        }
    }

    if !closed {
        // No closing fence found; treat the whole text as opaque.
        return text.to_string();
    }

    let mut out = String::from("---\n");
    for line in &front_matter {
        out.push_str(line);
        out.push('\n');
    }
    out.push_str("---\n");
    out.push_str(&rest.join("\n"));
    out
}

/// Deep-clones `value` with `exclude_keys` removed at every nesting level
/// and object keys sorted, then hashes the stable serialization.
pub fn json_hash(value: &Value, exclude_keys: &[&str]) -> String {
    let canonical = canonicalize(value, exclude_keys);
    hash(&canonical.to_string())
}

fn canonicalize(value: &Value, exclude_keys: &[&str]) -> Value {
    match value {
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().filter(|k| !exclude_keys.contains(&k.as_str())).collect();
            keys.sort();
            let mut sorted = serde_json::Map::new();
            for key in keys {
                sorted.insert(key.clone(), canonicalize(&map[key], exclude_keys));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(|v| canonicalize(v, exclude_keys)).collect()),
        other => other.clone(),
    }
}

/// Hashes a todo list independent of ordering or `updated_at` drift: each
/// entry has `updated_at` stripped, the list is sorted by `id`, then the
/// result is `json_hash`ed.
pub fn todos_hash(list: &[Value]) -> String {
    let mut stripped: Vec<Value> = list
        .iter()
        .map(|v| {
            let mut v = v.clone();
            if let Value::Object(map) = &mut v {
                map.remove("updated_at");
            }
            v
        })
        .collect();

    stripped.sort_by(|a, b| {
        let a_id = a.get("id").and_then(Value::as_str).unwrap_or_default();
        let b_id = b.get("id").and_then(Value::as_str).unwrap_or_default();
        a_id.cmp(b_id)
    });

    json_hash(&Value::Array(stripped), &[])
}

/// Hashes a settings map; identical to `json_hash` with no exclusions.
pub fn settings_hash(settings: &Value) -> String {
    json_hash(settings, &[])
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn markdown_hash_ignores_updated_at_line() {
        let a = "---\ntitle: hi\nupdated_at: 2024-01-01\n---\nbody text";
        let b = "---\ntitle: hi\nupdated_at: 2099-12-31\n---\nbody text";
        assert_eq!(markdown_hash(a), markdown_hash(b));
    }

    #[test]
    fn markdown_hash_reacts_to_body_change() {
        let a = "---\ntitle: hi\nupdated_at: 2024-01-01\n---\nbody text";
        let b = "---\ntitle: hi\nupdated_at: 2024-01-01\n---\nother text";
        assert_ne!(markdown_hash(a), markdown_hash(b));
    }

    #[test]
    fn json_hash_ignores_key_order() {
        let a = json!({"a": 1, "b": 2});
        let b = json!({"b": 2, "a": 1});
        assert_eq!(json_hash(&a, &[]), json_hash(&b, &[]));
    }

    #[test]
    fn json_hash_ignores_excluded_keys() {
        let a = json!({"a": 1, "updated_at": "2024"});
        let b = json!({"a": 1, "updated_at": "2099"});
        assert_eq!(json_hash(&a, &["updated_at"]), json_hash(&b, &["updated_at"]));
    }

    #[test]
    fn todos_hash_ignores_order_and_updated_at() {
        let list_a = vec![
            json!({"id": "2", "content": "b", "updated_at": "t1"}),
            json!({"id": "1", "content": "a", "updated_at": "t2"}),
        ];
        let list_b = vec![
            json!({"id": "1", "content": "a", "updated_at": "t9"}),
            json!({"id": "2", "content": "b", "updated_at": "t8"}),
        ];
        assert_eq!(todos_hash(&list_a), todos_hash(&list_b));
    }
}
