//! SFU-side consumers of inbound remote tracks
//!
//! The video receiver feeds a replay buffer for NACK recovery and generates
//! REMB/PLI/TCC feedback on configured cadences. The audio receiver is a
//! plain passthrough.

use super::{RtcpPacket, RtcpWriter, RtpPacket, RtpReader, TrackInfo};
use crate::config::VideoReceiverConfig;
use crate::error::{Error, Result};
use crate::media::ReplayBuffer;
use async_trait::async_trait;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::{self, Instant, Interval};
use tokio_util::sync::CancellationToken;
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtcp::payload_feedbacks::receiver_estimated_maximum_bitrate::ReceiverEstimatedMaximumBitrate;
use webrtc::rtcp::transport_feedbacks::transport_layer_cc::TransportLayerCc;

/// Replay buffer entry cap, alongside the configured age bound
const MAX_BUFFERED_PACKETS: usize = 2048;

/// Generated-feedback channel depth
const FEEDBACK_CHANNEL_SIZE: usize = 64;

/// SFU-side consumer of one inbound remote track
#[async_trait]
pub trait Receiver: Send + Sync {
    /// Metadata of the wrapped track
    fn track(&self) -> &TrackInfo;

    /// Blocking read of the next inbound RTP packet
    async fn read_rtp(&self) -> Result<RtpPacket>;

    /// Replay-buffer lookup by RTP sequence number
    fn get_packet(&self, seq: u16) -> Option<RtpPacket>;

    /// Relay an RTCP packet up to the source peer connection
    async fn write_rtcp(&self, pkt: RtcpPacket) -> Result<()>;

    /// Next generated feedback packet (REMB/PLI/TCC)
    async fn read_rtcp(&self) -> Result<RtcpPacket>;

    /// Terminal; unblocks pending reads
    fn close(&self);

    fn stats(&self) -> String;
}

/// Video receiver with replay buffer and scheduled feedback
pub struct VideoReceiver {
    info: TrackInfo,
    source: Arc<dyn RtpReader>,
    upstream: Arc<dyn RtcpWriter>,
    buffer: Mutex<ReplayBuffer>,
    feedback_rx: tokio::sync::Mutex<mpsc::Receiver<RtcpPacket>>,
    bytes_received: Arc<AtomicU64>,
    packets_received: AtomicU64,
    shutdown: CancellationToken,
}

impl VideoReceiver {
    pub fn new(
        source: Arc<dyn RtpReader>,
        upstream: Arc<dyn RtcpWriter>,
        info: TrackInfo,
        config: &VideoReceiverConfig,
    ) -> Arc<Self> {
        let (feedback_tx, feedback_rx) = mpsc::channel(FEEDBACK_CHANNEL_SIZE);
        let shutdown = CancellationToken::new();
        let bytes_received = Arc::new(AtomicU64::new(0));

        let recv = Arc::new(Self {
            info,
            source,
            upstream,
            buffer: Mutex::new(ReplayBuffer::new(
                Duration::from_millis(config.max_buffer_time),
                MAX_BUFFERED_PACKETS,
            )),
            feedback_rx: tokio::sync::Mutex::new(feedback_rx),
            bytes_received: bytes_received.clone(),
            packets_received: AtomicU64::new(0),
            shutdown: shutdown.clone(),
        });

        tokio::spawn(run_feedback(
            recv.info.ssrc,
            config.clone(),
            bytes_received,
            feedback_tx,
            shutdown,
        ));

        recv
    }
}

#[async_trait]
impl Receiver for VideoReceiver {
    fn track(&self) -> &TrackInfo {
        &self.info
    }

    async fn read_rtp(&self) -> Result<RtpPacket> {
        let pkt = self.source.read_rtp().await?;
        self.bytes_received
            .fetch_add(pkt.payload.len() as u64, Ordering::Relaxed);
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        self.buffer.lock().unwrap().push(pkt.clone());
        Ok(pkt)
    }

    fn get_packet(&self, seq: u16) -> Option<RtpPacket> {
        self.buffer.lock().unwrap().get(seq)
    }

    async fn write_rtcp(&self, pkt: RtcpPacket) -> Result<()> {
        self.upstream.write_rtcp(pkt).await
    }

    async fn read_rtcp(&self) -> Result<RtcpPacket> {
        let mut rx = self.feedback_rx.lock().await;
        tokio::select! {
            _ = self.shutdown.cancelled() => Err(Error::ReceiverClosed),
            pkt = rx.recv() => pkt.ok_or(Error::ReceiverClosed),
        }
    }

    fn close(&self) {
        self.shutdown.cancel();
    }

    fn stats(&self) -> String {
        format!(
            "packets: {} bytes: {}",
            self.packets_received.load(Ordering::Relaxed),
            self.bytes_received.load(Ordering::Relaxed)
        )
    }
}

/// Audio receiver: passthrough, no buffer, no generated feedback
pub struct AudioReceiver {
    info: TrackInfo,
    source: Arc<dyn RtpReader>,
    upstream: Arc<dyn RtcpWriter>,
    packets_received: AtomicU64,
    shutdown: CancellationToken,
}

impl AudioReceiver {
    pub fn new(
        source: Arc<dyn RtpReader>,
        upstream: Arc<dyn RtcpWriter>,
        info: TrackInfo,
    ) -> Arc<Self> {
        Arc::new(Self {
            info,
            source,
            upstream,
            packets_received: AtomicU64::new(0),
            shutdown: CancellationToken::new(),
        })
    }
}

#[async_trait]
impl Receiver for AudioReceiver {
    fn track(&self) -> &TrackInfo {
        &self.info
    }

    async fn read_rtp(&self) -> Result<RtpPacket> {
        let pkt = self.source.read_rtp().await?;
        self.packets_received.fetch_add(1, Ordering::Relaxed);
        Ok(pkt)
    }

    fn get_packet(&self, _seq: u16) -> Option<RtpPacket> {
        None
    }

    async fn write_rtcp(&self, pkt: RtcpPacket) -> Result<()> {
        self.upstream.write_rtcp(pkt).await
    }

    async fn read_rtcp(&self) -> Result<RtcpPacket> {
        self.shutdown.cancelled().await;
        Err(Error::ReceiverClosed)
    }

    fn close(&self) {
        self.shutdown.cancel();
    }

    fn stats(&self) -> String {
        format!(
            "packets: {}",
            self.packets_received.load(Ordering::Relaxed)
        )
    }
}

fn cycle_interval(cycle_secs: u64) -> Option<Interval> {
    (cycle_secs > 0).then(|| {
        let period = Duration::from_secs(cycle_secs);
        time::interval_at(Instant::now() + period, period)
    })
}

async fn tick_opt(interval: &mut Option<Interval>) {
    match interval {
        Some(interval) => {
            interval.tick().await;
        }
        None => std::future::pending().await,
    }
}

fn feedback(pkt: impl webrtc::rtcp::packet::Packet + Send + Sync + 'static) -> RtcpPacket {
    Box::new(pkt)
}

/// Generate REMB/PLI/TCC feedback on the configured cadences until shutdown
async fn run_feedback(
    ssrc: u32,
    config: VideoReceiverConfig,
    bytes_received: Arc<AtomicU64>,
    feedback_tx: mpsc::Sender<RtcpPacket>,
    shutdown: CancellationToken,
) {
    let mut remb = cycle_interval(config.remb_cycle);
    let mut pli = cycle_interval(config.pli_cycle);
    let mut tcc = cycle_interval(config.tcc_cycle);
    let max_bitrate = (config.max_bandwidth * 1000) as f32;
    let mut fb_pkt_count: u8 = 0;

    loop {
        let pkt: RtcpPacket = tokio::select! {
            _ = shutdown.cancelled() => return,
            _ = tick_opt(&mut remb) => {
                let bytes = bytes_received.swap(0, Ordering::Relaxed);
                let observed = (bytes * 8 / config.remb_cycle) as f32;
                let bitrate = if observed > 0.0 {
                    observed.min(max_bitrate)
                } else {
                    max_bitrate
                };
                feedback(ReceiverEstimatedMaximumBitrate {
                    sender_ssrc: ssrc,
                    bitrate,
                    ssrcs: vec![ssrc],
                })
            }
            _ = tick_opt(&mut pli) => {
                feedback(PictureLossIndication {
                    sender_ssrc: ssrc,
                    media_ssrc: ssrc,
                })
            }
            _ = tick_opt(&mut tcc) => {
                fb_pkt_count = fb_pkt_count.wrapping_add(1);
                feedback(TransportLayerCc {
                    sender_ssrc: ssrc,
                    media_ssrc: ssrc,
                    fb_pkt_count,
                    ..Default::default()
                })
            }
        };

        if feedback_tx.send(pkt).await.is_err() {
            return;
        }
    }
}
