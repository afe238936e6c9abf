//! Selective Forwarding Unit for real-time audio/video conferencing
//!
//! Participants connect one peer connection each; the SFU forwards every
//! participant's RTP streams to all other participants in the same session
//! without transcoding. Senders upload once, receivers scale independently.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────┐
//! │  Sfu (session registry, shared WebRTC config)        │
//! │  └─ Session (one room)                               │
//! │      └─ WebRtcTransport (one per participant)        │
//! │          └─ Router (one per inbound track)           │
//! │              ├─ Receiver (replay buffer + feedback)  │
//! │              └─ Sender × N (one per subscriber)      │
//! └──────────────────────────────────────────────────────┘
//! ```
//!
//! Upstream RTP flows Receiver → Router → all Senders. Downstream RTCP
//! flows Sender → Router → Receiver, with NACKs answered from the router's
//! replay buffer when the packet is still held.
//!
//! Signaling is JSON-RPC 2.0 over WebSocket (`join` / `offer` / `answer` /
//! `trickle`), served by [`signaling::SignalingServer`].

#![warn(clippy::all)]

pub mod config;
pub mod error;
pub mod media;
pub mod router;
pub mod session;
pub mod sfu;
pub mod signaling;
pub mod transport;

pub use config::{Config, IceServerConfig, ReceiverConfig, VideoReceiverConfig, WebRtcConfig};
pub use error::{Error, Result};
pub use media::{Receiver, Sender, TrackInfo, TrackKind};
pub use router::Router;
pub use session::Session;
pub use sfu::Sfu;
pub use signaling::SignalingServer;
pub use transport::{Transport, WebRtcTransport};

/// Get the version of this crate
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
