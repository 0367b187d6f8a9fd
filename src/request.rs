//! Minimal request view consumed by the engine.
//!
//! The HTTP middleware owns the real request; it hands the engine this
//! flattened view of the parts the token lifecycle needs. Token extraction
//! tries the named request parameter, then an urlencoded body, then a JSON
//! body; the AJAX header is handled separately by the token service.

use std::collections::HashMap;

/// A request as seen by the CSRF engine.
#[derive(Debug, Clone, Default)]
pub struct CsrfRequest {
    pub method: String,
    pub path: String,
    pub headers: HashMap<String, String>,
    pub parameters: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl CsrfRequest {
    pub fn new(method: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            method: method.into(),
            path: path.into(),
            ..Default::default()
        }
    }

    pub fn with_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn with_parameter(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.parameters.insert(name.into(), value.into());
        self
    }

    pub fn with_body(mut self, body: impl Into<Vec<u8>>) -> Self {
        self.body = body.into();
        self
    }

    /// Look up a header, exact name first, then ASCII case-insensitive.
    pub fn header(&self, name: &str) -> Option<&str> {
        if let Some(value) = self.headers.get(name) {
            return Some(value);
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(name))
            .map(|(_, v)| v.as_str())
    }

    pub fn parameter(&self, name: &str) -> Option<&str> {
        self.parameters.get(name).map(String::as_str)
    }

    /// Extract the presented token from the parameter chain:
    /// request parameter, then urlencoded body, then JSON body.
    pub(crate) fn token_candidate(&self, field: &str) -> Option<String> {
        if let Some(value) = self.parameter(field) {
            return Some(value.to_string());
        }
        if self.body.is_empty() {
            return None;
        }
        if let Ok(pairs) = serde_urlencoded::from_bytes::<Vec<(String, String)>>(&self.body) {
            for (key, value) in pairs {
                if key == field {
                    return Some(value);
                }
            }
        }
        if let Ok(json) = serde_json::from_slice::<serde_json::Value>(&self.body) {
            if let Some(value) = json.get(field) {
                return value.as_str().map(|s| s.to_string());
            }
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_header_lookup_case_insensitive() {
        let req = CsrfRequest::new("POST", "/x").with_header("X-Csrf-Token", "abc");
        assert_eq!(req.header("X-Csrf-Token"), Some("abc"));
        assert_eq!(req.header("x-csrf-token"), Some("abc"));
        assert_eq!(req.header("X-Other"), None);
    }

    #[test]
    fn test_token_from_parameter() {
        let req = CsrfRequest::new("POST", "/x").with_parameter("csrf_token", "abc");
        assert_eq!(req.token_candidate("csrf_token"), Some("abc".to_string()));
    }

    #[test]
    fn test_token_from_urlencoded_body() {
        let req = CsrfRequest::new("POST", "/x").with_body("name=alice&csrf_token=abc");
        assert_eq!(req.token_candidate("csrf_token"), Some("abc".to_string()));
    }

    #[test]
    fn test_token_from_json_body() {
        let req = CsrfRequest::new("POST", "/x").with_body(r#"{"csrf_token":"abc","name":"x"}"#);
        assert_eq!(req.token_candidate("csrf_token"), Some("abc".to_string()));
    }

    #[test]
    fn test_parameter_beats_body() {
        let req = CsrfRequest::new("POST", "/x")
            .with_parameter("csrf_token", "from-param")
            .with_body("csrf_token=from-body");
        assert_eq!(
            req.token_candidate("csrf_token"),
            Some("from-param".to_string())
        );
    }

    #[test]
    fn test_token_absent() {
        let req = CsrfRequest::new("POST", "/x").with_body("name=alice");
        assert_eq!(req.token_candidate("csrf_token"), None);
    }
}
