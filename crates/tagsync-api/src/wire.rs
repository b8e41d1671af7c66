//! JSON frame envelope for the backend socket.
//!
//! Every text frame on the wire is one of three shapes:
//!
//! - Request:  `{"requestId": 7, "methodName": "getAllTags", "payload": {...}}`
//! - Response: `{"requestId": 7, "result": {...}}` or
//!   `{"requestId": 7, "error": "message"}`
//! - Event:    `{"event": "env-add-files", "payload": {...}}`
//!
//! Responses are correlated to requests by `requestId`; events carry no
//! correlation id and fan out to all subscribers.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// An outbound RPC request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestFrame {
    #[serde(rename = "requestId")]
    pub request_id: u64,

    #[serde(rename = "methodName")]
    pub method: String,

    /// Method arguments. `Null` for zero-argument methods.
    #[serde(default)]
    pub payload: Value,
}

/// An inbound response to a previously issued request.
///
/// Exactly one of `result` / `error` is populated by the backend; a
/// frame with neither is treated as a `Null` result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseFrame {
    #[serde(rename = "requestId")]
    pub request_id: u64,

    #[serde(default)]
    pub result: Option<Value>,

    #[serde(default)]
    pub error: Option<String>,
}

/// An unsolicited event push from the backend.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventFrame {
    pub event: String,

    #[serde(default)]
    pub payload: Value,
}

/// Any frame the socket can carry, discriminated by shape.
///
/// Decode order matters for the untagged representation: requests are
/// the only shape with `methodName`, events the only one with `event`,
/// and responses are matched last by `requestId` alone.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Frame {
    Request(RequestFrame),
    Event(EventFrame),
    Response(ResponseFrame),
}

impl Frame {
    /// Decode a raw text frame.
    pub fn decode(text: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(text)
    }

    /// Encode for transmission.
    pub fn encode(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
