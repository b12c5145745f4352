//! Redaction of sensitive request/response content.

use axum::http::HeaderMap;
use regex::Regex;
use std::borrow::Cow;

/// Headers whose presence suppresses traffic logging entirely.
pub const SENSITIVE_HEADERS: [&str; 6] = [
    "authorization",
    "cookie",
    "x-api-key",
    "x-auth-token",
    "x-access-token",
    "set-cookie",
];

const SENSITIVE_FIELDS: [&str; 5] = ["password", "token", "secret", "api_key", "credit_card"];

pub const REDACTED: &str = r#""[REDACTED]""#;

pub struct Sanitizer {
    patterns: Vec<Regex>,
}

impl Sanitizer {
    pub fn new() -> Self {
        Self {
            patterns: compile_patterns(&SENSITIVE_FIELDS),
        }
    }

    /// Replace every sensitive `"field": "value"` pair with a redaction marker.
    pub fn sanitize<'a>(&self, body: &'a str) -> Cow<'a, str> {
        let mut body = Cow::Borrowed(body);
        for pattern in &self.patterns {
            let replaced = match pattern.replace_all(&body, REDACTED) {
                Cow::Owned(replaced) => Some(replaced),
                Cow::Borrowed(_) => None,
            };
            if let Some(replaced) = replaced {
                body = Cow::Owned(replaced);
            }
        }
        body
    }

    pub fn has_sensitive_header(headers: &HeaderMap) -> bool {
        SENSITIVE_HEADERS.iter().any(|name| headers.contains_key(*name))
    }
}

impl Default for Sanitizer {
    fn default() -> Self {
        Self::new()
    }
}

/// Compile the field patterns, logging and skipping any that fail.
fn compile_patterns(fields: &[&str]) -> Vec<Regex> {
    fields
        .iter()
        .filter_map(|field| {
            let pattern = format!(r#"(?i)"{}"\s*:\s*"[^"]*""#, regex::escape(field));
            Regex::new(&pattern)
                .map_err(|e| tracing::error!("Failed to compile redaction pattern '{}': {}", pattern, e))
                .ok()
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_password_is_redacted() {
        let sanitizer = Sanitizer::new();
        assert_eq!(
            sanitizer.sanitize(r#"{"username":"john","password":"secret123"}"#),
            r#"{"username":"john","[REDACTED]"}"#
        );
    }

    #[test]
    fn test_token_only_body() {
        let sanitizer = Sanitizer::new();
        assert_eq!(sanitizer.sanitize(r#"{"token":"abc"}"#), r#"{"[REDACTED]"}"#);
    }

    #[test]
    fn test_case_and_whitespace_insensitive() {
        let sanitizer = Sanitizer::new();
        assert_eq!(
            sanitizer.sanitize(r#"{"API_KEY" : "k", "Credit_Card":"4111", "Secret":  "s"}"#),
            r#"{"[REDACTED]", "[REDACTED]", "[REDACTED]"}"#
        );
    }

    #[test]
    fn test_clean_body_is_untouched() {
        let sanitizer = Sanitizer::new();
        let body = r#"{"username":"john","age":"42"}"#;
        assert!(matches!(sanitizer.sanitize(body), Cow::Borrowed(b) if b == body));
    }

    #[test]
    fn test_sensitive_headers() {
        let mut headers = HeaderMap::new();
        headers.insert("content-type", HeaderValue::from_static("application/json"));
        assert!(!Sanitizer::has_sensitive_header(&headers));

        headers.insert("x-api-key", HeaderValue::from_static("k"));
        assert!(Sanitizer::has_sensitive_header(&headers));
    }
}
