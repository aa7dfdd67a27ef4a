//! ABOUTME: Sensitive-field redaction for error-path logging
//! ABOUTME: Recursively scrubs JSON values and header maps against a denylist

use actix_web::http::header::HeaderMap;
use serde_json::Value;
use std::collections::BTreeMap;

const REDACTED: &str = "[REDACTED]";

/// Key-name fragments whose values must never reach the logs.
/// Matching is case-insensitive substring on the key.
const SENSITIVE_KEYS: &[&str] = &[
    "password",
    "token",
    "secret",
    "creditcard",
    "credit_card",
    "credit-card",
    "ssn",
    "cookie",
    "authorization",
    "apikey",
    "api_key",
    "api-key",
];

fn is_sensitive(key: &str) -> bool {
    let key = key.to_lowercase();
    SENSITIVE_KEYS.iter().any(|fragment| key.contains(fragment))
}

/// Return a copy of the JSON value with sensitive fields replaced by
/// `"[REDACTED]"`. Non-sensitive fields pass through untouched.
pub fn sanitize_json(value: &Value) -> Value {
    match value {
        Value::Object(map) => Value::Object(
            map.iter()
                .map(|(key, inner)| {
                    if is_sensitive(key) {
                        (key.clone(), Value::String(REDACTED.to_string()))
                    } else {
                        (key.clone(), sanitize_json(inner))
                    }
                })
                .collect(),
        ),
        Value::Array(items) => Value::Array(items.iter().map(sanitize_json).collect()),
        other => other.clone(),
    }
}

/// Render headers as a loggable map with sensitive values redacted
pub fn sanitize_headers(headers: &HeaderMap) -> BTreeMap<String, String> {
    headers
        .iter()
        .map(|(name, value)| {
            let name_str = name.as_str().to_string();
            let rendered = if is_sensitive(&name_str) {
                REDACTED.to_string()
            } else {
                value.to_str().unwrap_or("<binary>").to_string()
            };
            (name_str, rendered)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_password_redacted_email_untouched() {
        let body = json!({"email": "a@example.com", "password": "hunter2"});
        let clean = sanitize_json(&body);

        assert_eq!(clean["email"], "a@example.com");
        assert_eq!(clean["password"], REDACTED);
    }

    #[test]
    fn test_nested_and_array_values() {
        let body = json!({
            "user": {"apiKey": "abc", "name": "x"},
            "items": [{"refresh_token": "zzz"}]
        });
        let clean = sanitize_json(&body);

        assert_eq!(clean["user"]["apiKey"], REDACTED);
        assert_eq!(clean["user"]["name"], "x");
        assert_eq!(clean["items"][0]["refresh_token"], REDACTED);
    }

    #[test]
    fn test_case_insensitive_match() {
        let body = json!({"Authorization": "Bearer x", "SSN": "123-45-6789"});
        let clean = sanitize_json(&body);

        assert_eq!(clean["Authorization"], REDACTED);
        assert_eq!(clean["SSN"], REDACTED);
    }

    #[test]
    fn test_headers_redacted() {
        let mut headers = HeaderMap::new();
        headers.insert(
            actix_web::http::header::AUTHORIZATION,
            "Bearer secret".parse().unwrap(),
        );
        headers.insert(
            actix_web::http::header::CONTENT_TYPE,
            "application/json".parse().unwrap(),
        );

        let clean = sanitize_headers(&headers);
        assert_eq!(clean["authorization"], REDACTED);
        assert_eq!(clean["content-type"], "application/json");
    }
}
