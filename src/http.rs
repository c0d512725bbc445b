use reqwest::{header::HeaderMap, StatusCode};

use crate::{
    errors::{APIError, FieldError},
    REQUEST_ID_HEADER,
};

/// Structured header list with validation.
#[derive(Clone, Debug, Default)]
pub struct HeaderList(Vec<HeaderEntry>);

impl HeaderList {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    /// Add a header entry.
    ///
    /// # Panics
    /// Panics if the header key or value is empty or contains only whitespace.
    pub fn push(&mut self, entry: HeaderEntry) {
        assert!(
            entry.is_valid(),
            "Invalid header: key and value must be non-empty (got key={:?}, value={:?})",
            entry.key,
            entry.value
        );
        self.0.push(entry);
    }

    pub fn with(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.push(HeaderEntry::new(key, value));
        self
    }

    pub fn iter(&self) -> impl Iterator<Item = &HeaderEntry> {
        self.0.iter()
    }
}

#[derive(Clone, Debug)]
pub struct HeaderEntry {
    pub key: String,
    pub value: String,
}

impl HeaderEntry {
    pub fn new(key: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            value: value.into(),
        }
    }

    pub fn is_valid(&self) -> bool {
        !(self.key.trim().is_empty() || self.value.trim().is_empty())
    }
}

pub(crate) fn request_id_from_headers(headers: &HeaderMap) -> Option<String> {
    headers
        .get(REQUEST_ID_HEADER)
        .and_then(|value| value.to_str().ok())
        .filter(|s| !s.is_empty())
        .map(|s| s.to_string())
}

fn str_field(value: &serde_json::Value, key: &str) -> Option<String> {
    value.get(key).and_then(|v| v.as_str()).map(|s| s.to_string())
}

/// Build an [`APIError`] from a non-2xx completion response.
///
/// Understands the `{"error": {"message", "type", "code"}}` envelope used by
/// OpenAI-compatible providers and falls back to the raw body otherwise.
pub(crate) fn parse_api_error_parts(status: StatusCode, headers: &HeaderMap, body: String) -> APIError {
    let request_id = request_id_from_headers(headers);
    let status_code = status.as_u16();
    let status_text = status
        .canonical_reason()
        .unwrap_or("request failed")
        .to_string();

    if body.is_empty() {
        return APIError {
            status: status_code,
            code: None,
            message: status_text,
            request_id,
            fields: Vec::new(),
            raw_body: None,
        };
    }

    if let Ok(value) = serde_json::from_str::<serde_json::Value>(&body) {
        let envelope = value
            .get("error")
            .filter(|v| v.is_object())
            .unwrap_or(&value);
        if let Some(message) = str_field(envelope, "message") {
            // OpenAI puts the machine-readable reason in `code`, sometimes only in `type`.
            let code = str_field(envelope, "code").or_else(|| str_field(envelope, "type"));
            let fields = str_field(envelope, "param")
                .map(|param| {
                    vec![FieldError {
                        field: Some(param),
                        message: message.clone(),
                    }]
                })
                .unwrap_or_default();
            return APIError {
                status: status_code,
                code,
                message,
                request_id,
                fields,
                raw_body: Some(body),
            };
        }
    }

    APIError {
        status: status_code,
        code: None,
        message: body.clone(),
        request_id,
        fields: Vec::new(),
        raw_body: Some(body),
    }
}
