const REDACTED: &str = "[REDACTED]";
const SENSITIVE_FIELDS: &[&str] = &["password", "apiKey", "api_key", "data_base64"];

/// Replace sensitive fields in a JSON value in place, recursively. Used to
/// sanitize request bodies before they're attached to a log line (spec §4.7
/// — bodies are sanitized before logging, never echoed to the client as-is).
pub fn redact_json(value: &mut serde_json::Value) {
    match value {
        serde_json::Value::Object(map) => {
            for (key, entry) in map.iter_mut() {
                if SENSITIVE_FIELDS.contains(&key.as_str()) {
                    *entry = serde_json::Value::String(REDACTED.to_string());
                } else {
                    redact_json(entry);
                }
            }
        }
        serde_json::Value::Array(items) => {
            for item in items.iter_mut() {
                redact_json(item);
            }
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn redacts_top_level_and_nested_fields() {
        let mut body = json!({
            "orderId": "abc",
            "password": "hunter2",
            "nested": { "api_key": "sk-live-1", "ok": "fine" },
            "list": [{ "data_base64": "xyz" }],
        });
        redact_json(&mut body);
        assert_eq!(body["password"], json!("[REDACTED]"));
        assert_eq!(body["nested"]["api_key"], json!("[REDACTED]"));
        assert_eq!(body["nested"]["ok"], json!("fine"));
        assert_eq!(body["list"][0]["data_base64"], json!("[REDACTED]"));
        assert_eq!(body["orderId"], json!("abc"));
    }
}
