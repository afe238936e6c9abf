//! JSON-RPC 2.0 signaling over WebSocket

pub mod handler;
pub mod protocol;
pub mod server;

pub use protocol::{Join, JsonRpcError, JsonRpcRequest, JsonRpcResponse, Negotiation, Trickle};
pub use server::SignalingServer;
