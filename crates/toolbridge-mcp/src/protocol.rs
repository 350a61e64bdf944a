//! JSON-RPC 2.0 message types for the MCP wire protocol

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// MCP method names
pub mod methods {
    pub const INITIALIZE: &str = "initialize";
    pub const INITIALIZED: &str = "notifications/initialized";
    pub const TOOLS_LIST: &str = "tools/list";
    pub const TOOLS_CALL: &str = "tools/call";
}

/// Request identifier (MCP servers echo it back verbatim)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    Number(i64),
    String(String),
}

/// JSON-RPC request
#[derive(Debug, Clone, Serialize)]
pub struct JsonRpcRequest {
    pub jsonrpc: &'static str,
    pub id: RequestId,
    pub method: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    pub fn new(id: RequestId, method: &str) -> Self {
        Self {
            jsonrpc: "2.0",
            id,
            method: method.to_string(),
            params: None,
        }
    }

    pub fn with_params(mut self, params: Value) -> Self {
        self.params = Some(params);
        self
    }
}

/// JSON-RPC notification (no id, no response expected)
pub fn notification(method: &str) -> Value {
    serde_json::json!({
        "jsonrpc": "2.0",
        "method": method,
    })
}

/// JSON-RPC response
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcResponse {
    #[allow(dead_code)]
    pub jsonrpc: String,
    pub id: Option<RequestId>,
    pub result: Option<Value>,
    pub error: Option<JsonRpcError>,
}

/// JSON-RPC error object
#[derive(Debug, Clone, Deserialize)]
pub struct JsonRpcError {
    pub code: i32,
    pub message: String,
    #[serde(default)]
    pub data: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_serializes_without_empty_params() {
        let request = JsonRpcRequest::new(RequestId::Number(1), methods::TOOLS_LIST);
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["jsonrpc"], "2.0");
        assert_eq!(value["id"], 1);
        assert_eq!(value["method"], "tools/list");
        assert!(value.get("params").is_none());
    }

    #[test]
    fn test_request_with_params() {
        let request = JsonRpcRequest::new(RequestId::Number(2), methods::TOOLS_CALL)
            .with_params(serde_json::json!({"name": "echo"}));
        let value = serde_json::to_value(&request).unwrap();

        assert_eq!(value["params"]["name"], "echo");
    }

    #[test]
    fn test_response_with_error() {
        let raw = r#"{"jsonrpc":"2.0","id":3,"error":{"code":-32601,"message":"Method not found"}}"#;
        let response: JsonRpcResponse = serde_json::from_str(raw).unwrap();

        assert_eq!(response.id, Some(RequestId::Number(3)));
        assert!(response.result.is_none());
        let error = response.error.unwrap();
        assert_eq!(error.code, -32601);
        assert_eq!(error.message, "Method not found");
    }

    #[test]
    fn test_string_request_id_roundtrip() {
        let raw = r#"{"jsonrpc":"2.0","id":"abc","result":{}}"#;
        let response: JsonRpcResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.id, Some(RequestId::String("abc".to_string())));
    }
}
