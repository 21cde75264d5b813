use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// An inbound provider notification as the web layer received it: query and
/// form fields (or a decoded JSON body), headers, and the untouched body for
/// providers that sign raw bytes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct InboundCallback {
    #[serde(default)]
    pub fields: Map<String, Value>,
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub raw_body: Option<Vec<u8>>,
}

impl InboundCallback {
    pub fn from_fields(fields: Map<String, Value>) -> Self {
        Self {
            fields,
            ..Default::default()
        }
    }

    /// Keeps the body bytes for signature checks and exposes its top-level
    /// JSON object keys as fields.
    pub fn from_json_body(body: impl Into<Vec<u8>>) -> Self {
        let body = body.into();
        let fields = match serde_json::from_slice::<Value>(&body) {
            Ok(Value::Object(map)) => map,
            _ => Map::new(),
        };
        Self {
            fields,
            headers: BTreeMap::new(),
            raw_body: Some(body),
        }
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_ascii_lowercase(), value.into());
        self
    }

    pub fn with_field(mut self, key: &str, value: impl Into<Value>) -> Self {
        self.fields.insert(key.to_string(), value.into());
        self
    }

    /// Field as text; numbers and booleans are rendered, blanks are `None`.
    pub fn text(&self, key: &str) -> Option<String> {
        match self.fields.get(key)? {
            Value::String(s) if !s.trim().is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            Value::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }

    pub fn first_text(&self, keys: &[&str]) -> Option<String> {
        keys.iter().find_map(|k| self.text(k))
    }

    pub fn header(&self, name: &str) -> Option<&str> {
        let wanted = name.to_ascii_lowercase();
        self.headers
            .iter()
            .find(|(k, _)| k.to_ascii_lowercase() == wanted)
            .map(|(_, v)| v.as_str())
    }

    pub fn payload(&self) -> Value {
        Value::Object(self.fields.clone())
    }

    /// Bytes a body signature is computed over. Falls back to the compact
    /// JSON of `fields` when the raw body was not kept.
    pub fn signing_body(&self) -> Vec<u8> {
        match &self.raw_body {
            Some(body) => body.clone(),
            None => serde_json::to_vec(&self.fields).unwrap_or_default(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn json_body_becomes_fields_and_keeps_bytes() {
        let body = br#"{"order_id":"o-1","amount":12}"#.to_vec();
        let cb = InboundCallback::from_json_body(body.clone()).with_header("Signature", "abc");
        assert_eq!(cb.text("order_id").as_deref(), Some("o-1"));
        assert_eq!(cb.text("amount").as_deref(), Some("12"));
        assert_eq!(cb.header("signature"), Some("abc"));
        assert_eq!(cb.signing_body(), body);
    }

    #[test]
    fn blank_fields_read_as_absent() {
        let cb = InboundCallback::default()
            .with_field("a", "  ")
            .with_field("b", json!(null))
            .with_field("c", "x");
        assert_eq!(cb.text("a"), None);
        assert_eq!(cb.text("b"), None);
        assert_eq!(cb.first_text(&["a", "b", "c"]).as_deref(), Some("x"));
    }
}
