//! JSON-RPC 2.0 envelopes

use serde::Deserialize;
use serde::Serialize;
use serde_json::Value;

pub const JSONRPC_VERSION: &str = "2.0";

/// Client-to-server request. Ids are signed integers allocated from 0.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestEnvelope<P> {
    pub jsonrpc: String,
    pub id: i64,
    pub method: String,
    pub params: P,
}

impl<P> RequestEnvelope<P> {
    pub fn new(id: i64, method: &str, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            id,
            method: method.to_string(),
            params,
        }
    }
}

/// Fire-and-forget message with no id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope<P> {
    pub jsonrpc: String,
    pub method: String,
    pub params: P,
}

impl<P> NotificationEnvelope<P> {
    pub fn new(method: &str, params: P) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.to_string(),
            params,
        }
    }
}

/// Server reply carrying either a result or an error object.
#[derive(Debug, Clone, Deserialize)]
pub struct ResponseEnvelope {
    #[serde(default)]
    pub jsonrpc: Option<String>,
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub result: Option<Value>,
    #[serde(default)]
    pub error: Option<ResponseError>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ResponseError {
    pub code: i64,
    pub message: String,
}

/// Minimal probe the receive loop parses from every incoming frame before
/// deciding where it goes: an empty method means a response, a method with an
/// id means a server-initiated request, a bare method means a notification.
#[derive(Debug, Default, Deserialize)]
pub struct FrameHeader {
    #[serde(default)]
    pub id: Option<i64>,
    #[serde(default)]
    pub method: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn request_envelope_roundtrip() {
        let request = RequestEnvelope::new(3, "textDocument/hover", serde_json::json!({"a": 1}));
        let encoded = serde_json::to_vec(&request).unwrap();
        let decoded: RequestEnvelope<Value> = serde_json::from_slice(&encoded).unwrap();
        assert_eq!(decoded, request);
        assert_eq!(decoded.jsonrpc, "2.0");
    }

    #[test]
    fn response_header_has_empty_method() {
        let frame = r#"{"jsonrpc":"2.0","id":7,"result":{"ok":true}}"#;
        let header: FrameHeader = serde_json::from_str(frame).unwrap();
        assert_eq!(header.id, Some(7));
        assert_eq!(header.method, None);
    }

    #[test]
    fn notification_header_has_no_id() {
        let frame = r#"{"jsonrpc":"2.0","method":"textDocument/publishDiagnostics","params":{}}"#;
        let header: FrameHeader = serde_json::from_str(frame).unwrap();
        assert_eq!(header.id, None);
        assert_eq!(
            header.method.as_deref(),
            Some("textDocument/publishDiagnostics")
        );
    }

    #[test]
    fn error_envelope_parses() {
        let frame = r#"{"jsonrpc":"2.0","id":1,"error":{"code":-32601,"message":"no such method"}}"#;
        let response: ResponseEnvelope = serde_json::from_str(frame).unwrap();
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "no such method");
        assert!(response.result.is_none());
    }
}
