//! Peer transports: the seam between the session/router core and one
//! participant's peer connection.

pub mod debounce;
pub mod webrtc;

use crate::error::Result;
use crate::media::{Sender, TrackInfo};
use crate::router::Router;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;

pub use debounce::Debouncer;
pub use webrtc::WebRtcTransport;

/// One participant's connection to the SFU
///
/// The session cross-subscribes transports through this trait; the concrete
/// implementation wraps a WebRTC peer connection.
#[async_trait]
pub trait Transport: Send + Sync {
    /// Unique transport id
    fn id(&self) -> &str;

    /// Router for one of this transport's own inbound tracks
    async fn router(&self, ssrc: u32) -> Option<Arc<Router>>;

    /// Routers for every track this transport is the source of
    async fn routers(&self) -> HashMap<u32, Arc<Router>>;

    /// Create an outbound sender carrying `track` to this transport's peer
    async fn new_sender(&self, track: &TrackInfo) -> Result<Arc<dyn Sender>>;

    /// Fire the (debounced) negotiation-needed handler
    fn negotiation_needed(&self);

    /// Idempotent teardown: routers, session membership, peer connection
    async fn close(&self);

    async fn stats(&self) -> String;
}
