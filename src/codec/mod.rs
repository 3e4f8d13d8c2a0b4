//! Payload decoding.
//!
//! Turns the text of a pulled configuration plus its declared content type
//! into a [`serde_json::Value`]. YAML documents are decoded into the same
//! value model so consumers see one structure regardless of source format.

use crate::error::Result;
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContentKind {
    Json,
    Yaml,
    Unknown,
}

impl ContentKind {
    /// Classify a media type, ignoring parameters such as `charset`.
    pub fn from_content_type(content_type: Option<&str>) -> Self {
        let Some(content_type) = content_type else {
            return ContentKind::Unknown;
        };
        let essence = content_type
            .split(';')
            .next()
            .unwrap_or_default()
            .trim()
            .to_ascii_lowercase();

        if essence.ends_with("/json") || essence.ends_with("+json") {
            ContentKind::Json
        } else if essence.ends_with("yaml") || essence.ends_with("yml") {
            ContentKind::Yaml
        } else {
            ContentKind::Unknown
        }
    }
}

/// Decode `raw` according to `content_type`.
///
/// JSON and YAML failures are returned as errors. Payloads with a missing or
/// unrecognized content type are tried as JSON and otherwise returned as a
/// plain string, so that path never fails.
pub fn parse(raw: &str, content_type: Option<&str>) -> Result<Value> {
    match ContentKind::from_content_type(content_type) {
        ContentKind::Json => Ok(serde_json::from_str(raw)?),
        ContentKind::Yaml => Ok(serde_yaml_ng::from_str(raw)?),
        ContentKind::Unknown => {
            Ok(serde_json::from_str(raw).unwrap_or_else(|_| Value::String(raw.to_string())))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_content_kind_classification() {
        assert_eq!(
            ContentKind::from_content_type(Some("application/json")),
            ContentKind::Json
        );
        assert_eq!(
            ContentKind::from_content_type(Some("application/json; charset=utf-8")),
            ContentKind::Json
        );
        assert_eq!(
            ContentKind::from_content_type(Some("application/vnd.flags+json")),
            ContentKind::Json
        );
        assert_eq!(
            ContentKind::from_content_type(Some("application/x-yaml")),
            ContentKind::Yaml
        );
        assert_eq!(
            ContentKind::from_content_type(Some("text/yaml")),
            ContentKind::Yaml
        );
        assert_eq!(
            ContentKind::from_content_type(Some("text/plain")),
            ContentKind::Unknown
        );
        assert_eq!(ContentKind::from_content_type(None), ContentKind::Unknown);
    }

    #[test]
    fn test_parse_json_object() {
        let original = json!({"enabled": true, "limits": {"max": 10}, "tags": ["a", "b"]});
        let raw = serde_json::to_string(&original).unwrap();

        let parsed = parse(&raw, Some("application/json")).unwrap();
        assert_eq!(parsed, original);
    }

    #[test]
    fn test_parse_malformed_json_fails() {
        let err = parse("{\"a\": ", Some("application/json")).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_parse_yaml_document() {
        let raw = "service:\n  name: checkout\n  replicas: 3\nflags:\n  - beta\n";
        let parsed = parse(raw, Some("application/x-yaml")).unwrap();

        assert_eq!(
            parsed,
            json!({"service": {"name": "checkout", "replicas": 3}, "flags": ["beta"]})
        );
    }

    #[test]
    fn test_parse_malformed_yaml_fails() {
        let err = parse("key: [unterminated", Some("text/yaml")).unwrap_err();
        assert!(err.is_parse());
    }

    #[test]
    fn test_unknown_content_type_tries_json() {
        let parsed = parse("{\"a\":1}", None).unwrap();
        assert_eq!(parsed, json!({"a": 1}));
    }

    #[test]
    fn test_unknown_content_type_falls_back_to_text() {
        let raw = "max_connections=10\nmode=strict";
        let parsed = parse(raw, Some("text/plain")).unwrap();
        assert_eq!(parsed, Value::String(raw.to_string()));
    }
}
