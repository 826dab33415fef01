//! Best-effort model of the external service's response payloads.
//!
//! The service does not publish a schema; fields drift between
//! `status`/`state`/`result`/`currentStep` and messages are free text. The
//! payload is therefore a small tagged union — a parsed JSON object, or a
//! raw-text fallback for anything that doesn't parse — with duck-typed
//! field accessors. The *interpretation* of these fields (success, pending,
//! already-completed) is deliberately not here; it lives in one place in
//! the job pipeline so the heuristic surface stays auditable.

use serde_json::{Map, Value};

/// A response payload from the external service.
#[derive(Clone, Debug, PartialEq)]
pub enum UpstreamPayload {
    /// Parsed JSON object.
    Json(Map<String, Value>),
    /// Unparsed text, kept verbatim. Accessors treat it as message-only.
    Raw(String),
}

impl UpstreamPayload {
    /// Parse an SSE frame's data: a JSON object, or the raw text as a
    /// message-only payload.
    pub fn from_frame_data(data: &str) -> Self {
        match serde_json::from_str::<Value>(data) {
            Ok(Value::Object(map)) => Self::Json(map),
            _ => Self::Raw(data.to_string()),
        }
    }

    /// Parse a poll response body. Unparseable bodies become an
    /// error-shaped object carrying the text, mirroring how the service's
    /// HTML error pages must surface as failures rather than panics.
    pub fn from_poll_body(body: &str) -> Self {
        match serde_json::from_str::<Value>(body) {
            Ok(Value::Object(map)) => Self::Json(map),
            _ => {
                let mut map = Map::new();
                map.insert("status".to_string(), Value::String("error".to_string()));
                map.insert("message".to_string(), Value::String(body.to_string()));
                Self::Json(map)
            }
        }
    }

    /// Scalar field rendered as a string, if present and non-null.
    pub fn get_str(&self, key: &str) -> Option<String> {
        let Self::Json(map) = self else { return None };
        match map.get(key)? {
            Value::String(s) => Some(s.clone()),
            Value::Bool(b) => Some(b.to_string()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }

    /// First of `keys` that yields a string value.
    pub fn first_str(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.get_str(k))
    }

    pub fn get_bool(&self, key: &str) -> Option<bool> {
        match self {
            Self::Json(map) => map.get(key)?.as_bool(),
            Self::Raw(_) => None,
        }
    }

    /// The human-readable message: the `message` field, or the whole text
    /// for the raw fallback.
    pub fn message(&self) -> Option<String> {
        match self {
            Self::Json(_) => self.get_str("message"),
            Self::Raw(text) => Some(text.clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn frame_data_parses_objects_and_falls_back_to_raw() {
        let parsed = UpstreamPayload::from_frame_data("{\"status\":\"SUCCESS\"}");
        assert_eq!(parsed.get_str("status").as_deref(), Some("SUCCESS"));

        let raw = UpstreamPayload::from_frame_data("document uploaded");
        assert_eq!(raw, UpstreamPayload::Raw("document uploaded".into()));
        assert_eq!(raw.message().as_deref(), Some("document uploaded"));
        assert!(raw.get_str("status").is_none());
    }

    #[test]
    fn json_arrays_are_not_objects() {
        let payload = UpstreamPayload::from_frame_data("[1,2,3]");
        assert!(matches!(payload, UpstreamPayload::Raw(_)));
    }

    #[test]
    fn poll_body_fallback_is_error_shaped() {
        let payload = UpstreamPayload::from_poll_body("<html>502 Bad Gateway</html>");
        assert_eq!(payload.get_str("status").as_deref(), Some("error"));
        assert_eq!(
            payload.message().as_deref(),
            Some("<html>502 Bad Gateway</html>")
        );
    }

    #[test]
    fn first_str_respects_priority_order() {
        let payload =
            UpstreamPayload::from_frame_data("{\"state\":\"PENDING\",\"status\":\"QUEUED\"}");
        assert_eq!(
            payload.first_str(&["currentStep", "status", "state"]).as_deref(),
            Some("QUEUED")
        );
    }

    #[test]
    fn scalars_render_as_strings_but_null_does_not() {
        let payload = UpstreamPayload::from_frame_data(
            "{\"success\":true,\"code\":17,\"missing\":null}",
        );
        assert_eq!(payload.get_str("success").as_deref(), Some("true"));
        assert_eq!(payload.get_str("code").as_deref(), Some("17"));
        assert!(payload.get_str("missing").is_none());
        assert_eq!(payload.get_bool("success"), Some(true));
    }
}
