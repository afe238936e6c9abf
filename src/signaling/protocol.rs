//! JSON-RPC 2.0 signaling protocol types

use serde::{Deserialize, Serialize};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

/// JSON-RPC 2.0 protocol version
pub const JSONRPC_VERSION: &str = "2.0";

/// Error code reported for every signaling failure
///
/// No finer taxonomy is exposed over the wire; the message carries the
/// human-readable cause.
pub const ERROR_CODE: i32 = 500;

/// JSON-RPC 2.0 request or notification
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcRequest {
    /// Protocol version (must be "2.0")
    pub jsonrpc: String,

    /// Method name to invoke
    pub method: String,

    /// Method parameters
    #[serde(default)]
    pub params: serde_json::Value,

    /// Request id; absent for notifications
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id: Option<serde_json::Value>,
}

impl JsonRpcRequest {
    /// Build a server-to-client notification
    pub fn notification(method: impl Into<String>, params: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            method: method.into(),
            params,
            id: None,
        }
    }
}

/// JSON-RPC 2.0 success response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcResponse {
    pub jsonrpc: String,
    pub result: serde_json::Value,
    pub id: serde_json::Value,
}

impl JsonRpcResponse {
    pub fn new(result: serde_json::Value, id: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            result,
            id,
        }
    }
}

/// JSON-RPC 2.0 error response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct JsonRpcError {
    pub jsonrpc: String,
    pub error: ErrorObject,
    pub id: serde_json::Value,
}

/// JSON-RPC 2.0 error object
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ErrorObject {
    pub code: i32,
    pub message: String,
}

impl JsonRpcError {
    pub fn new(message: impl Into<String>, id: serde_json::Value) -> Self {
        Self {
            jsonrpc: JSONRPC_VERSION.to_string(),
            error: ErrorObject {
                code: ERROR_CODE,
                message: message.into(),
            },
            id,
        }
    }
}

/// `join` parameters: bind a peer to this connection and answer its offer
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Join {
    pub sid: String,
    pub offer: RTCSessionDescription,
}

/// `offer` / `answer` parameters for renegotiation
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Negotiation {
    pub desc: RTCSessionDescription,
}

/// `trickle` parameters: one remote ICE candidate
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trickle {
    pub candidate: RTCIceCandidateInit,
}
