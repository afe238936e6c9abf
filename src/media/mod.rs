//! Media primitives: track metadata, packet aliases, and the seams the
//! routing core uses to talk to the underlying peer-connection library.

pub mod buffer;
pub mod engine;
pub mod receiver;
pub mod sender;

use crate::error::Result;
use async_trait::async_trait;
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

pub use buffer::ReplayBuffer;
pub use engine::CodecTable;
pub use receiver::{AudioReceiver, Receiver, VideoReceiver};
pub use sender::{Sender, WebRtcSender};

/// One RTP packet as carried by the underlying stack
pub type RtpPacket = webrtc::rtp::packet::Packet;

/// One RTCP packet as carried by the underlying stack
pub type RtcpPacket = Box<dyn webrtc::rtcp::packet::Packet + Send + Sync>;

/// Track kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackKind {
    Audio,
    Video,
}

impl std::fmt::Display for TrackKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TrackKind::Audio => write!(f, "audio"),
            TrackKind::Video => write!(f, "video"),
        }
    }
}

/// Metadata describing one media track
///
/// Carried from the source transport to every subscriber so outbound tracks
/// keep the source's SSRC, id and stream id end-to-end.
#[derive(Debug, Clone)]
pub struct TrackInfo {
    pub ssrc: u32,
    pub id: String,
    pub stream_id: String,
    pub kind: TrackKind,
    pub codec: RTCRtpCodecCapability,
}

impl TrackInfo {
    /// Codec name without the `audio/` / `video/` mime prefix
    pub fn codec_name(&self) -> &str {
        codec_name(&self.codec.mime_type)
    }
}

/// Extract the codec name from a mime type, e.g. `video/VP8` -> `VP8`
pub fn codec_name(mime_type: &str) -> &str {
    mime_type
        .split_once('/')
        .map(|(_, name)| name)
        .unwrap_or(mime_type)
}

/// Source of inbound RTP for one track
#[async_trait]
pub trait RtpReader: Send + Sync {
    async fn read_rtp(&self) -> Result<RtpPacket>;
}

/// Sink for RTCP written up to the source peer connection
#[async_trait]
pub trait RtcpWriter: Send + Sync {
    async fn write_rtcp(&self, pkt: RtcpPacket) -> Result<()>;
}
