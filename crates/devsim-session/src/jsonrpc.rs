//! JSON-RPC 2.0 envelopes carried in message bodies.

use devsim_frame::Message;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Protocol version string carried in every envelope.
pub const JSONRPC_VERSION: &str = "2.0";

/// Header naming the body encoding.
pub const CONTENT_TYPE_HEADER: &str = "content-type";
pub const CONTENT_TYPE_JSON: &str = "application/json";

/// JSON-RPC request. A request without an `id` is a notification.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcRequest {
    pub jsonrpc: String,
    pub method: String,
    #[serde(default, skip_serializing_if = "Value::is_null")]
    pub params: Value,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<u64>,
}

impl RpcRequest {
    pub fn new(method: impl Into<String>, params: Value, id: u64) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: Some(id),
        }
    }

    pub fn notification(method: impl Into<String>, params: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: None,
        }
    }

    /// Parse the body of a request message.
    pub fn from_message(msg: &Message) -> serde_json::Result<Self> {
        serde_json::from_slice(&msg.body)
    }

    /// Wrap this request in a request message addressed to `resource`.
    pub fn to_message(&self, resource: &str) -> serde_json::Result<Message> {
        let body = serde_json::to_vec(self)?;
        Ok(Message::request(resource, body).with_header(CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON))
    }
}

/// JSON-RPC error object.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcError {
    pub code: i64,
    pub message: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "rpc error {}: {}", self.code, self.message)
    }
}

impl std::error::Error for RpcError {}

/// JSON-RPC response: exactly one of `result` / `error` is meaningful.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RpcResponse {
    pub jsonrpc: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<RpcError>,
    /// `None` when the peer could not determine the request id.
    pub id: Option<u64>,
}

impl RpcResponse {
    pub fn success(id: u64, result: Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: Some(result),
            error: None,
            id: Some(id),
        }
    }

    pub fn failure(id: Option<u64>, error: RpcError) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result: None,
            error: Some(error),
            id,
        }
    }

    /// Parse the body of a response message.
    pub fn from_message(msg: &Message) -> serde_json::Result<Self> {
        serde_json::from_slice(&msg.body)
    }

    /// Wrap this response in a response message addressed to `resource`.
    pub fn to_message(&self, resource: &str) -> serde_json::Result<Message> {
        let body = serde_json::to_vec(self)?;
        Ok(Message::response(resource, body).with_header(CONTENT_TYPE_HEADER, CONTENT_TYPE_JSON))
    }

    /// Collapse into `Ok(result)` or `Err(error)`. A missing result is `null`.
    pub fn into_result(self) -> Result<Value, RpcError> {
        match self.error {
            Some(err) => Err(err),
            None => Ok(self.result.unwrap_or(Value::Null)),
        }
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;

    use super::*;

    #[test]
    fn request_envelope_shape() {
        let req = RpcRequest::new("add_device", json!({"type": "lighting"}), 3);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(
            value,
            json!({
                "jsonrpc": "2.0",
                "method": "add_device",
                "params": {"type": "lighting"},
                "id": 3
            })
        );
    }

    #[test]
    fn notification_omits_id_and_null_params() {
        let req = RpcRequest::notification("heartbeat", Value::Null);
        let value = serde_json::to_value(&req).unwrap();
        assert_eq!(value, json!({"jsonrpc": "2.0", "method": "heartbeat"}));
    }

    #[test]
    fn response_with_result() {
        let resp: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","result":{"ok":true},"id":7}"#).unwrap();
        assert_eq!(resp.id, Some(7));
        assert_eq!(resp.into_result().unwrap(), json!({"ok": true}));
    }

    #[test]
    fn response_with_error() {
        let resp: RpcResponse = serde_json::from_str(
            r#"{"jsonrpc":"2.0","error":{"code":-32601,"message":"no such method"},"id":null}"#,
        )
        .unwrap();
        assert!(resp.is_error());
        assert_eq!(resp.id, None);
        let err = resp.into_result().unwrap_err();
        assert_eq!(err.code, -32601);
        assert_eq!(err.to_string(), "rpc error -32601: no such method");
    }

    #[test]
    fn null_result_is_success() {
        let resp: RpcResponse =
            serde_json::from_str(r#"{"jsonrpc":"2.0","result":null,"id":1}"#).unwrap();
        assert_eq!(resp.into_result().unwrap(), Value::Null);
    }

    #[test]
    fn message_wrapping() {
        let msg = RpcRequest::new("ping", Value::Null, 1).to_message("device").unwrap();
        assert!(msg.is_request());
        assert_eq!(msg.resource, "device");
        assert_eq!(msg.header(CONTENT_TYPE_HEADER), Some(CONTENT_TYPE_JSON));
        let parsed = RpcRequest::from_message(&msg).unwrap();
        assert_eq!(parsed.method, "ping");
        assert_eq!(parsed.id, Some(1));

        let reply = RpcResponse::success(1, json!(true)).to_message("device").unwrap();
        assert!(reply.is_response());
        assert_eq!(RpcResponse::from_message(&reply).unwrap().id, Some(1));
    }
}
