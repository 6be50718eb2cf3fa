//! Index mapping flattening.
//!
//! Turns the nested `properties` tree of a mapping response into
//! `field.path -> type` pairs.

use serde_json::Value;
use std::collections::BTreeMap;

/// Flattens a `GET /{index}/_mapping` response per index.
///
/// Fields without a `type` (object fields) contribute only their children;
/// multi-fields under `fields` are listed as `parent.sub`.
pub fn flatten_mapping_response(response: &Value) -> BTreeMap<String, BTreeMap<String, String>> {
    let mut flattened = BTreeMap::new();
    if let Some(indices) = response.as_object() {
        for (index, body) in indices {
            let mut fields = BTreeMap::new();
            if let Some(properties) = body.pointer("/mappings/properties") {
                flatten_properties(properties, "", &mut fields);
            }
            flattened.insert(index.clone(), fields);
        }
    }
    flattened
}

/// Flattens one `properties` object into `out`.
pub fn flatten_properties(properties: &Value, prefix: &str, out: &mut BTreeMap<String, String>) {
    let Some(properties) = properties.as_object() else {
        return;
    };

    for (name, definition) in properties {
        let path = if prefix.is_empty() {
            name.clone()
        } else {
            format!("{}.{}", prefix, name)
        };

        if let Some(field_type) = definition.get("type").and_then(Value::as_str) {
            out.insert(path.clone(), field_type.to_string());
        }
        if let Some(children) = definition.get("properties") {
            flatten_properties(children, &path, out);
        }
        if let Some(multi) = definition.get("fields") {
            flatten_properties(multi, &path, out);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_flatten_nested_mapping() {
        let response = json!({
            "logs-app": {
                "mappings": {
                    "properties": {
                        "@timestamp": {"type": "date"},
                        "host": {"properties": {
                            "name": {"type": "keyword"},
                            "ip": {"type": "ip"}
                        }},
                        "message": {"type": "text", "fields": {"raw": {"type": "keyword"}}}
                    }
                }
            }
        });

        let flattened = flatten_mapping_response(&response);
        let fields = &flattened["logs-app"];

        assert_eq!(fields["@timestamp"], "date");
        assert_eq!(fields["host.name"], "keyword");
        assert_eq!(fields["host.ip"], "ip");
        assert_eq!(fields["message"], "text");
        assert_eq!(fields["message.raw"], "keyword");
        assert!(!fields.contains_key("host"));
    }

    #[test]
    fn test_index_without_mappings() {
        let flattened = flatten_mapping_response(&json!({"empty": {"mappings": {}}}));
        assert!(flattened["empty"].is_empty());
    }
}
