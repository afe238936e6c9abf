//! Shared test doubles for the routing core
//!
//! Mock receivers, senders and transports implementing the crate's media
//! seams, plus small packet builders.

#![allow(dead_code)]

pub mod signaling;

use async_trait::async_trait;
use rtc_sfu::error::{Error, Result};
use rtc_sfu::media::{
    Receiver, ReplayBuffer, RtcpPacket, RtpPacket, Sender, TrackInfo, TrackKind,
};
use rtc_sfu::router::Router;
use rtc_sfu::transport::Transport;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::{mpsc, RwLock};
use webrtc::rtcp::payload_feedbacks::picture_loss_indication::PictureLossIndication;
use webrtc::rtcp::transport_feedbacks::transport_layer_nack::{NackPair, TransportLayerNack};
use webrtc::rtp_transceiver::rtp_codec::RTCRtpCodecCapability;

pub fn video_track(ssrc: u32) -> TrackInfo {
    TrackInfo {
        ssrc,
        id: format!("video-{ssrc}"),
        stream_id: "stream".to_string(),
        kind: TrackKind::Video,
        codec: RTCRtpCodecCapability {
            mime_type: "video/VP8".to_string(),
            clock_rate: 90000,
            ..Default::default()
        },
    }
}

pub fn audio_track(ssrc: u32) -> TrackInfo {
    TrackInfo {
        ssrc,
        id: format!("audio-{ssrc}"),
        stream_id: "stream".to_string(),
        kind: TrackKind::Audio,
        codec: RTCRtpCodecCapability {
            mime_type: "audio/opus".to_string(),
            clock_rate: 48000,
            channels: 2,
            ..Default::default()
        },
    }
}

pub fn rtp(seq: u16, ssrc: u32) -> RtpPacket {
    let mut pkt = RtpPacket::default();
    pkt.header.sequence_number = seq;
    pkt.header.ssrc = ssrc;
    pkt.payload = vec![0u8; 16].into();
    pkt
}

pub fn nack(media_ssrc: u32, packet_id: u16) -> RtcpPacket {
    Box::new(TransportLayerNack {
        sender_ssrc: 1,
        media_ssrc,
        nacks: vec![NackPair {
            packet_id,
            lost_packets: 0,
        }],
    })
}

pub fn pli(media_ssrc: u32) -> RtcpPacket {
    Box::new(PictureLossIndication {
        sender_ssrc: 1,
        media_ssrc,
    })
}

/// Poll `cond` until it holds or the timeout elapses
pub async fn wait_until<F: Fn() -> bool>(cond: F, what: &str) {
    let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
    while !cond() {
        if tokio::time::Instant::now() > deadline {
            panic!("timed out waiting for {what}");
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
}

/// Receiver double fed by a channel, with a real replay buffer behind it
pub struct MockReceiver {
    info: TrackInfo,
    rtp_tx: Mutex<Option<mpsc::UnboundedSender<RtpPacket>>>,
    rtp_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<RtpPacket>>,
    buffer: Mutex<ReplayBuffer>,
    pub forwarded_rtcp: Mutex<Vec<RtcpPacket>>,
    pub close_calls: AtomicUsize,
}

impl MockReceiver {
    pub fn new(info: TrackInfo) -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            info,
            rtp_tx: Mutex::new(Some(tx)),
            rtp_rx: tokio::sync::Mutex::new(rx),
            buffer: Mutex::new(ReplayBuffer::new(Duration::from_secs(1), 512)),
            forwarded_rtcp: Mutex::new(Vec::new()),
            close_calls: AtomicUsize::new(0),
        })
    }

    /// Feed one packet into the pending `read_rtp`
    pub fn push_rtp(&self, pkt: RtpPacket) {
        if let Some(tx) = self.rtp_tx.lock().unwrap().as_ref() {
            let _ = tx.send(pkt);
        }
    }

    /// Simulate a terminal source failure without counting a close
    pub fn stop_rtp(&self) {
        self.rtp_tx.lock().unwrap().take();
    }

    pub fn forwarded_count(&self) -> usize {
        self.forwarded_rtcp.lock().unwrap().len()
    }
}

#[async_trait]
impl Receiver for MockReceiver {
    fn track(&self) -> &TrackInfo {
        &self.info
    }

    async fn read_rtp(&self) -> Result<RtpPacket> {
        let pkt = self
            .rtp_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(Error::ReceiverClosed)?;
        self.buffer.lock().unwrap().push(pkt.clone());
        Ok(pkt)
    }

    fn get_packet(&self, seq: u16) -> Option<RtpPacket> {
        self.buffer.lock().unwrap().get(seq)
    }

    async fn write_rtcp(&self, pkt: RtcpPacket) -> Result<()> {
        self.forwarded_rtcp.lock().unwrap().push(pkt);
        Ok(())
    }

    async fn read_rtcp(&self) -> Result<RtcpPacket> {
        std::future::pending::<()>().await;
        unreachable!()
    }

    fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.rtp_tx.lock().unwrap().take();
    }

    fn stats(&self) -> String {
        "mock receiver".to_string()
    }
}

/// Sender double recording writes and injecting RTCP feedback
pub struct MockSender {
    pub written: Mutex<Vec<RtpPacket>>,
    rtcp_tx: Mutex<Option<mpsc::UnboundedSender<Vec<RtcpPacket>>>>,
    rtcp_rx: tokio::sync::Mutex<mpsc::UnboundedReceiver<Vec<RtcpPacket>>>,
    pub close_calls: AtomicUsize,
}

impl MockSender {
    pub fn new() -> Arc<Self> {
        let (tx, rx) = mpsc::unbounded_channel();
        Arc::new(Self {
            written: Mutex::new(Vec::new()),
            rtcp_tx: Mutex::new(Some(tx)),
            rtcp_rx: tokio::sync::Mutex::new(rx),
            close_calls: AtomicUsize::new(0),
        })
    }

    /// Deliver one RTCP batch to the router's feedback loop
    pub fn inject_rtcp(&self, pkts: Vec<RtcpPacket>) {
        if let Some(tx) = self.rtcp_tx.lock().unwrap().as_ref() {
            let _ = tx.send(pkts);
        }
    }

    pub fn written_count(&self) -> usize {
        self.written.lock().unwrap().len()
    }

    pub fn written_seqs(&self) -> Vec<u16> {
        self.written
            .lock()
            .unwrap()
            .iter()
            .map(|p| p.header.sequence_number)
            .collect()
    }
}

#[async_trait]
impl Sender for MockSender {
    async fn write_rtp(&self, pkt: &RtpPacket) -> Result<()> {
        if self.close_calls.load(Ordering::SeqCst) > 0 {
            return Err(Error::SenderClosed);
        }
        self.written.lock().unwrap().push(pkt.clone());
        Ok(())
    }

    async fn read_rtcp(&self) -> Result<Vec<RtcpPacket>> {
        self.rtcp_rx
            .lock()
            .await
            .recv()
            .await
            .ok_or(Error::SenderClosed)
    }

    async fn close(&self) {
        self.close_calls.fetch_add(1, Ordering::SeqCst);
        self.rtcp_tx.lock().unwrap().take();
    }

    fn stats(&self) -> String {
        format!("packets sent: {}", self.written_count())
    }
}

/// Transport double handing out mock senders
pub struct MockTransport {
    id: String,
    routers: RwLock<HashMap<u32, Arc<Router>>>,
    pub created_senders: Mutex<Vec<Arc<MockSender>>>,
    pub negotiation_calls: AtomicUsize,
    pub fail_new_sender: AtomicBool,
}

impl MockTransport {
    pub fn new(id: impl Into<String>) -> Arc<Self> {
        Arc::new(Self {
            id: id.into(),
            routers: RwLock::new(HashMap::new()),
            created_senders: Mutex::new(Vec::new()),
            negotiation_calls: AtomicUsize::new(0),
            fail_new_sender: AtomicBool::new(false),
        })
    }

    pub async fn register_router(&self, router: Arc<Router>) {
        self.routers
            .write()
            .await
            .insert(router.track().ssrc, router);
    }

    pub fn negotiations(&self) -> usize {
        self.negotiation_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Transport for MockTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn router(&self, ssrc: u32) -> Option<Arc<Router>> {
        self.routers.read().await.get(&ssrc).cloned()
    }

    async fn routers(&self) -> HashMap<u32, Arc<Router>> {
        self.routers.read().await.clone()
    }

    async fn new_sender(&self, _track: &TrackInfo) -> Result<Arc<dyn Sender>> {
        if self.fail_new_sender.load(Ordering::SeqCst) {
            return Err(Error::PayloadTypeNotSupported);
        }
        let sender = MockSender::new();
        self.created_senders.lock().unwrap().push(sender.clone());
        Ok(sender)
    }

    fn negotiation_needed(&self) {
        self.negotiation_calls.fetch_add(1, Ordering::SeqCst);
    }

    async fn close(&self) {}

    async fn stats(&self) -> String {
        format!("  peer: {}\n", self.id)
    }
}
