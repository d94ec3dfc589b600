//! # JSON-RPC 2.0
//!
//! Envelope types for requests, notifications and responses. Responses are
//! decoded leniently: a peer that omits an empty `result` still produces a
//! successful response with a `null` result.

use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::Value;
use std::fmt;

use crate::error::McpError;
use crate::methods::JSONRPC_VERSION;

/// JSON-RPC version type
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct JsonRpcVersion;

impl Serialize for JsonRpcVersion {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        serializer.serialize_str(JSONRPC_VERSION)
    }
}

impl<'de> Deserialize<'de> for JsonRpcVersion {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: Deserializer<'de>,
    {
        let version = String::deserialize(deserializer)?;
        if version == JSONRPC_VERSION {
            Ok(JsonRpcVersion)
        } else {
            Err(serde::de::Error::custom(format!(
                "Invalid JSON-RPC version: expected '{JSONRPC_VERSION}', got '{version}'"
            )))
        }
    }
}

/// Request identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RequestId {
    /// Integer id (what kvmcp clients allocate)
    Number(i64),
    /// String id
    String(String),
}

impl RequestId {
    /// Integer form of the id, if it has one.
    ///
    /// String ids holding a decimal integer count as numeric.
    pub fn as_i64(&self) -> Option<i64> {
        match self {
            Self::Number(n) => Some(*n),
            Self::String(s) => s.parse().ok(),
        }
    }

    /// Resolve a raw JSON `id` to an integer.
    ///
    /// Accepts integers, integral floats (`7.0`) and decimal strings.
    pub fn numeric_from_value(value: &Value) -> Option<i64> {
        match value {
            Value::Number(n) => n.as_i64().or_else(|| {
                n.as_f64()
                    .filter(|f| f.fract() == 0.0 && f.abs() < i64::MAX as f64)
                    .map(|f| f as i64)
            }),
            Value::String(s) => s.parse().ok(),
            _ => None,
        }
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::String(s) => write!(f, "{s}"),
        }
    }
}

impl From<i64> for RequestId {
    fn from(id: i64) -> Self {
        Self::Number(id)
    }
}

impl From<&str> for RequestId {
    fn from(id: &str) -> Self {
        Self::String(id.to_string())
    }
}

impl From<String> for RequestId {
    fn from(id: String) -> Self {
        Self::String(id)
    }
}

/// JSON-RPC request message
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcRequest {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Request identifier
    pub id: RequestId,
    /// Request method name
    pub method: String,
    /// Request parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcRequest {
    /// Create a request
    pub fn new(id: RequestId, method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC notification message (no response expected)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcNotification {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Notification method name
    pub method: String,
    /// Notification parameters
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub params: Option<Value>,
}

impl JsonRpcNotification {
    /// Create a notification
    pub fn new(method: impl Into<String>, params: Option<Value>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            method: method.into(),
            params,
        }
    }
}

/// JSON-RPC response message
///
/// `result` and `error` are mutually exclusive on the wire; the constructors
/// keep it that way.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JsonRpcResponse {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Request identifier (null for errors raised before the id was known)
    #[serde(default)]
    pub id: Option<RequestId>,
    /// Result (mutually exclusive with error)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    /// Error (mutually exclusive with result)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<JsonRpcError>,
}

impl JsonRpcResponse {
    /// Create a success response
    pub fn success(id: Option<RequestId>, result: Value) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            result: Some(result),
            error: None,
        }
    }

    /// Create an error response
    pub fn error(id: Option<RequestId>, error: impl Into<JsonRpcError>) -> Self {
        Self {
            jsonrpc: JsonRpcVersion,
            id,
            result: None,
            error: Some(error.into()),
        }
    }

    /// Check if this is an error response
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Split into the result value or the peer's error.
    ///
    /// A response carrying neither yields `Value::Null`.
    ///
    /// # Errors
    ///
    /// Returns the peer's error converted to [`McpError`].
    pub fn into_result(self) -> Result<Value, McpError> {
        match self.error {
            Some(error) => Err(error.into()),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }
}

/// JSON-RPC error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct JsonRpcError {
    /// Error code
    pub code: i32,
    /// Error message
    pub message: String,
    /// Additional error data
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl JsonRpcError {
    /// Create a new JSON-RPC error
    pub fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            data: None,
        }
    }

    /// Create a parse error (-32700)
    pub fn parse_error(details: impl Into<String>) -> Self {
        Self {
            code: -32700,
            message: "Parse error".to_string(),
            data: Some(serde_json::json!({ "details": details.into() })),
        }
    }

    /// Create an invalid request error (-32600)
    pub fn invalid_request(reason: impl Into<String>) -> Self {
        Self {
            code: -32600,
            message: "Invalid Request".to_string(),
            data: Some(serde_json::json!({ "reason": reason.into() })),
        }
    }

    /// Create a method not found error (-32601)
    pub fn method_not_found(method: &str) -> Self {
        Self::new(-32601, format!("Method not found: {method}"))
    }

    /// Create an invalid params error (-32602)
    pub fn invalid_params(details: &str) -> Self {
        Self::new(-32602, format!("Invalid params: {details}"))
    }

    /// Create an internal error (-32603)
    pub fn internal_error(details: &str) -> Self {
        Self::new(-32603, format!("Internal error: {details}"))
    }
}

impl fmt::Display for JsonRpcError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} ({})", self.message, self.code)
    }
}

/// Inbound message as seen by a server: a request when `id` is present,
/// a notification otherwise.
#[derive(Debug, Clone, Deserialize)]
pub struct IncomingMessage {
    /// JSON-RPC version
    pub jsonrpc: JsonRpcVersion,
    /// Request ID (absent for notifications)
    #[serde(default)]
    pub id: Option<RequestId>,
    /// Method name
    pub method: String,
    /// Method parameters
    #[serde(default)]
    pub params: Option<Value>,
}

impl IncomingMessage {
    /// True when no reply is expected
    pub fn is_notification(&self) -> bool {
        self.id.is_none()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use serde_json::json;

    #[test]
    fn test_request_serialization() {
        let request = JsonRpcRequest::new(
            RequestId::Number(7),
            "tools/call",
            Some(json!({"name": "echo", "arguments": {"text": "hi"}})),
        );
        let value = serde_json::to_value(&request).unwrap();
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "id": 7,
                "method": "tools/call",
                "params": {"name": "echo", "arguments": {"text": "hi"}}
            })
        );
    }

    #[test]
    fn test_version_rejected() {
        let raw = r#"{"jsonrpc":"1.0","id":1,"method":"ping"}"#;
        let err = serde_json::from_str::<JsonRpcRequest>(raw).unwrap_err();
        assert!(err.to_string().contains("Invalid JSON-RPC version"));
    }

    #[test]
    fn test_response_without_result() {
        let raw = r#"{"jsonrpc":"2.0","id":3}"#;
        let response: JsonRpcResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(response.id, Some(RequestId::Number(3)));
        assert_eq!(response.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn test_error_response() {
        let raw = r#"{"jsonrpc":"2.0","id":"a","error":{"code":-32601,"message":"Method not found"}}"#;
        let response: JsonRpcResponse = serde_json::from_str(raw).unwrap();
        assert!(response.is_error());
        let err = response.into_result().unwrap_err();
        assert_eq!(err.jsonrpc_code(), -32601);
    }

    #[test]
    fn test_success_omits_error() {
        let response = JsonRpcResponse::success(Some(RequestId::Number(1)), json!({}));
        assert_eq!(
            serde_json::to_string(&response).unwrap(),
            r#"{"jsonrpc":"2.0","id":1,"result":{}}"#
        );

        let response = JsonRpcResponse::error(None, JsonRpcError::method_not_found("nope"));
        assert_eq!(
            serde_json::to_value(&response).unwrap(),
            json!({"jsonrpc": "2.0", "id": null, "error": {"code": -32601, "message": "Method not found: nope"}})
        );
    }

    #[test]
    fn test_numeric_id_resolution() {
        assert_eq!(RequestId::numeric_from_value(&json!(42)), Some(42));
        assert_eq!(RequestId::numeric_from_value(&json!(42.0)), Some(42));
        assert_eq!(RequestId::numeric_from_value(&json!(42.5)), None);
        assert_eq!(RequestId::numeric_from_value(&json!("42")), Some(42));
        assert_eq!(RequestId::numeric_from_value(&json!(null)), None);
        // integers beyond 2^53 keep their exact value
        let big = (1_i64 << 53) + 1;
        assert_eq!(RequestId::numeric_from_value(&json!(big)), Some(big));
    }

    #[test]
    fn test_incoming_notification() {
        let raw = r#"{"jsonrpc":"2.0","method":"notifications/initialized"}"#;
        let message: IncomingMessage = serde_json::from_str(raw).unwrap();
        assert!(message.is_notification());

        let raw = r#"{"jsonrpc":"2.0","id":"x-1","method":"ping"}"#;
        let message: IncomingMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.id, Some(RequestId::String("x-1".into())));
    }
}
