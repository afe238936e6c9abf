//! SFU-side producers of outbound tracks
//!
//! One sender binds one forwarded track to one subscriber's peer connection.

use super::{RtcpPacket, RtpPacket};
use crate::error::{Error, Result};
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use webrtc::rtp_transceiver::rtp_sender::RTCRtpSender;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocalWriter;

/// SFU-side producer of one outbound track to one participant
#[async_trait]
pub trait Sender: Send + Sync {
    /// Write one RTP packet to the subscriber; drops under congestion are
    /// acceptable, reordering between adjacent packets is not
    async fn write_rtp(&self, pkt: &RtpPacket) -> Result<()>;

    /// Next batch of RTCP from the subscriber for this stream
    async fn read_rtcp(&self) -> Result<Vec<RtcpPacket>>;

    /// Terminal; unblocks any pending `read_rtcp`
    async fn close(&self);

    fn stats(&self) -> String;
}

/// Sender backed by a local static-RTP track on the subscriber's connection
pub struct WebRtcSender {
    track: Arc<TrackLocalStaticRTP>,
    rtp_sender: Arc<RTCRtpSender>,
    packets_sent: AtomicU64,
    shutdown: CancellationToken,
}

impl WebRtcSender {
    pub fn new(track: Arc<TrackLocalStaticRTP>, rtp_sender: Arc<RTCRtpSender>) -> Arc<Self> {
        Arc::new(Self {
            track,
            rtp_sender,
            packets_sent: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl Sender for WebRtcSender {
    async fn write_rtp(&self, pkt: &RtpPacket) -> Result<()> {
        if self.shutdown.is_cancelled() {
            return Err(Error::SenderClosed);
        }
        self.track.write_rtp(pkt).await?;
        self.packets_sent.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn read_rtcp(&self) -> Result<Vec<RtcpPacket>> {
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(Error::SenderClosed),
            result = self.rtp_sender.read_rtcp() => {
                let (pkts, _) = result?;
                Ok(pkts)
            }
        }
    }

    async fn close(&self) {
        self.shutdown.cancel();
        if let Err(err) = self.rtp_sender.stop().await {
            tracing::debug!("rtp sender stop: {}", err);
        }
    }

    fn stats(&self) -> String {
        format!("packets sent: {}", self.packets_sent.load(Ordering::Relaxed))
    }
}
