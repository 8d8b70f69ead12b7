// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//! Recursive redaction of diagnostic payloads before they touch disk.
use std::sync::OnceLock;

use regex::{Captures, Regex};
use serde_json::Value;

pub const MASK: &str = "***REDACTED***";

const SENSITIVE_KEYWORDS: &[&str] = &[
    "token", "secret", "password", "api_key", "apikey", "authorization", "cookie", "sessionid", "private_key",
];

fn email_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"\b([A-Za-z0-9._%+-]+)@([A-Za-z0-9.-]+\.[A-Za-z]{2,})\b").unwrap())
}

fn bearer_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?i)\bBearer\s+[A-Za-z0-9._-]+\b").unwrap())
}

fn secret_value_patterns() -> &'static [Regex] {
    static PATTERNS: OnceLock<Vec<Regex>> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        vec![
            Regex::new(r"\bsk-[A-Za-z0-9]{8,}\b").unwrap(),
            Regex::new(r"\bxox[baprs]-[A-Za-z0-9-]{10,}\b").unwrap(),
            Regex::new(r"\bgh[pousr]_[A-Za-z0-9]{20,}\b").unwrap(),
        ]
    })
}

fn is_sensitive_key(key: &str) -> bool {
    let normalized = key.to_lowercase().replace('-', "_");
    SENSITIVE_KEYWORDS.iter().any(|kw| normalized.contains(kw))
}

fn mask_email(caps: &Captures) -> String {
    let local = &caps[1];
    let domain = &caps[2];
    let (head, suffix) = domain.split_once('.').unwrap_or((domain, ""));

    let local_masked = format!("{}***", local.chars().next().map(String::from).unwrap_or_default());
    let head_masked = format!("{}***", head.chars().next().map(String::from).unwrap_or_default());
    if suffix.is_empty() {
        format!("{local_masked}@{head_masked}")
    } else {
        format!("{local_masked}@{head_masked}.{suffix}")
    }
}

fn redact_text(text: &str) -> String {
    let redacted = email_re().replace_all(text, mask_email);
    let bearer_replacement = format!("Bearer {MASK}");
    let redacted = bearer_re().replace_all(&redacted, bearer_replacement.as_str());
    let mut redacted = redacted.into_owned();
    for pattern in secret_value_patterns() {
        redacted = pattern.replace_all(&redacted, MASK).into_owned();
    }
    redacted
}

fn redact_inner(value: Value, key: Option<&str>) -> Value {
    if key.map(is_sensitive_key).unwrap_or(false) {
        return Value::String(MASK.to_string());
    }
    match value {
        Value::Object(map) => Value::Object(map.into_iter().map(|(k, v)| (k.clone(), redact_inner(v, Some(&k)))).collect()),
        Value::Array(items) => Value::Array(items.into_iter().map(|v| redact_inner(v, key)).collect()),
        Value::String(s) => Value::String(redact_text(&s)),
        other => other,
    }
}

/// Return a redacted copy of a JSON payload: sensitive-keyed values are
/// masked wholesale, every remaining string is scanned for embedded
/// emails, bearer tokens, and API-key-shaped secrets.
pub fn redact_payload(payload: Value) -> Value {
    redact_inner(payload, None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn masks_sensitive_keys_wholesale() {
        let payload = json!({"api_key": "abc123", "nested": {"Authorization": "xyz"}});
        let redacted = redact_payload(payload);
        assert_eq!(redacted["api_key"], MASK);
        assert_eq!(redacted["nested"]["Authorization"], MASK);
    }

    #[test]
    fn masks_email_bearer_and_api_key_in_one_string() {
        let payload = json!({
            "note": "contact jane.doe@example.com with Bearer sk-abcdefgh12345678 attached"
        });
        let redacted = redact_payload(payload);
        let note = redacted["note"].as_str().unwrap();
        assert!(note.contains("j***@e***.com"));
        assert!(note.contains(&format!("Bearer {MASK}")));
    }

    #[test]
    fn recurses_through_arrays() {
        let payload = json!({"events": [{"password": "hunter2"}, {"value": "fine"}]});
        let redacted = redact_payload(payload);
        assert_eq!(redacted["events"][0]["password"], MASK);
        assert_eq!(redacted["events"][1]["value"], "fine");
    }

    #[test]
    fn leaves_non_sensitive_strings_untouched() {
        let payload = json!({"message": "all systems nominal"});
        let redacted = redact_payload(payload);
        assert_eq!(redacted["message"], "all systems nominal");
    }

    #[test]
    fn key_match_is_case_and_separator_insensitive() {
        let payload = json!({"API-KEY": "abc", "Session-Id": "xyz"});
        let redacted = redact_payload(payload);
        assert_eq!(redacted["API-KEY"], MASK);
        assert_eq!(redacted["Session-Id"], MASK);
    }
}
