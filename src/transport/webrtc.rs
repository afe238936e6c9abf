//! WebRTC peer-connection transport
//!
//! Wraps one participant's peer connection: negotiates a codec table from
//! the remote offer, turns inbound tracks into routers, and manufactures
//! outbound senders for other participants' tracks.

use crate::config::{VideoReceiverConfig, WebRtcConfig};
use crate::error::{Error, Result};
use crate::media::{
    AudioReceiver, CodecTable, Receiver, RtcpPacket, RtcpWriter, RtpPacket, RtpReader, Sender,
    TrackInfo, TrackKind, VideoReceiver, WebRtcSender,
};
use crate::router::Router;
use crate::session::Session;
use crate::transport::{Debouncer, Transport};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, warn};
use webrtc::api::setting_engine::SettingEngine;
use webrtc::api::APIBuilder;
use webrtc::ice::udp_network::{EphemeralUDP, UDPNetwork};
use webrtc::ice_transport::ice_candidate::RTCIceCandidateInit;
use webrtc::ice_transport::ice_connection_state::RTCIceConnectionState;
use webrtc::ice_transport::ice_server::RTCIceServer;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::peer_connection_state::RTCPeerConnectionState;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::peer_connection::RTCPeerConnection;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;
use webrtc::track::track_local::track_local_static_rtp::TrackLocalStaticRTP;
use webrtc::track::track_local::TrackLocal;
use webrtc::track::track_remote::TrackRemote;

const NEGOTIATION_DEBOUNCE: Duration = Duration::from_millis(500);

const DEFAULT_STUN_SERVER: &str = "stun:stun.l.google.com:19302";

type TrackHandler = Arc<dyn Fn(TrackInfo) + Send + Sync>;
type NegotiationHandler = Arc<dyn Fn() + Send + Sync>;

/// One participant's peer connection and the routers it feeds
pub struct WebRtcTransport {
    id: String,
    pc: Arc<RTCPeerConnection>,
    codecs: CodecTable,
    session: Arc<Session>,
    receiver_config: VideoReceiverConfig,
    routers: RwLock<HashMap<u32, Arc<Router>>>,
    on_track: Mutex<Option<TrackHandler>>,
    negotiation_handler: Mutex<Option<NegotiationHandler>>,
    debouncer: Debouncer,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl WebRtcTransport {
    /// Create a transport inside `session`, answering `offer`
    ///
    /// The codec table comes from the remote offer so the answer reuses the
    /// remote's dynamic payload-type assignments.
    pub async fn new(
        session: Arc<Session>,
        offer: &RTCSessionDescription,
        webrtc_config: &WebRtcConfig,
        receiver_config: VideoReceiverConfig,
    ) -> Result<Arc<Self>> {
        let codecs = CodecTable::from_offer(offer)?;
        let media_engine = codecs.media_engine()?;

        let mut setting_engine = SettingEngine::default();
        if let Some((low, high)) = webrtc_config.ice_port_range {
            let ephemeral =
                EphemeralUDP::new(low, high).map_err(|_| Error::PeerConnectionInitFailed)?;
            setting_engine.set_udp_network(UDPNetwork::Ephemeral(ephemeral));
        }

        let ice_servers: Vec<RTCIceServer> = if webrtc_config.ice_servers.is_empty() {
            vec![RTCIceServer {
                urls: vec![DEFAULT_STUN_SERVER.to_string()],
                ..Default::default()
            }]
        } else {
            webrtc_config
                .ice_servers
                .iter()
                .map(|server| RTCIceServer {
                    urls: server.urls.clone(),
                    username: server.username.clone(),
                    credential: server.credential.clone(),
                    ..Default::default()
                })
                .collect()
        };

        let api = APIBuilder::new()
            .with_media_engine(media_engine)
            .with_setting_engine(setting_engine)
            .build();

        let pc = api
            .new_peer_connection(RTCConfiguration {
                ice_servers,
                ..Default::default()
            })
            .await
            .map_err(|err| {
                error!("new peer connection: {}", err);
                Error::PeerConnectionInitFailed
            })?;

        let transport = Arc::new(Self {
            id: uuid::Uuid::new_v4().to_string(),
            pc: Arc::new(pc),
            codecs,
            session: session.clone(),
            receiver_config,
            routers: RwLock::new(HashMap::new()),
            on_track: Mutex::new(None),
            negotiation_handler: Mutex::new(None),
            debouncer: Debouncer::new(NEGOTIATION_DEBOUNCE),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        session.add_transport(transport.clone()).await;

        // Subscribe to media already flowing in this session so the new
        // participant receives existing streams immediately.
        for (tid, existing) in session.transports().await {
            if tid == transport.id {
                continue;
            }
            for (_, router) in existing.routers().await {
                match transport.new_sender(router.track()).await {
                    Ok(sender) => {
                        debug!(
                            "subscribed {} to existing router ssrc {}",
                            transport.id,
                            router.track().ssrc
                        );
                        router.add_sender(transport.id.clone(), sender).await;
                    }
                    Err(err) => warn!("error subscribing to router: {}", err),
                }
            }
        }

        transport.install_track_handler();
        transport.install_ice_handler();

        Ok(transport)
    }

    /// Generate a local offer
    pub async fn create_offer(&self) -> Result<RTCSessionDescription> {
        Ok(self.pc.create_offer(None).await?)
    }

    /// Generate a local answer
    pub async fn create_answer(&self) -> Result<RTCSessionDescription> {
        Ok(self.pc.create_answer(None).await?)
    }

    pub async fn set_local_description(&self, desc: RTCSessionDescription) -> Result<()> {
        Ok(self.pc.set_local_description(desc).await?)
    }

    pub async fn set_remote_description(&self, desc: RTCSessionDescription) -> Result<()> {
        Ok(self.pc.set_remote_description(desc).await?)
    }

    pub async fn local_description(&self) -> Option<RTCSessionDescription> {
        self.pc.local_description().await
    }

    pub async fn add_ice_candidate(&self, candidate: RTCIceCandidateInit) -> Result<()> {
        Ok(self.pc.add_ice_candidate(candidate).await?)
    }

    /// Install the trickle-candidate handler
    ///
    /// Candidates arrive in init (JSON) form; `None` marks the end of
    /// gathering.
    pub fn on_ice_candidate(
        &self,
        handler: impl Fn(Option<RTCIceCandidateInit>) + Send + Sync + 'static,
    ) {
        self.pc.on_ice_candidate(Box::new(move |candidate| {
            let init = match candidate {
                Some(candidate) => match candidate.to_json() {
                    Ok(init) => Some(init),
                    Err(err) => {
                        warn!("candidate to json: {}", err);
                        return Box::pin(async {});
                    }
                },
                None => None,
            };
            handler(init);
            Box::pin(async {})
        }));
    }

    /// Install the renegotiation handler, debounced on the trailing edge
    pub fn on_negotiation_needed(&self, handler: impl Fn() + Send + Sync + 'static) {
        *self.negotiation_handler.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Install the inbound-track observer
    pub fn on_track(&self, handler: impl Fn(TrackInfo) + Send + Sync + 'static) {
        *self.on_track.lock().unwrap() = Some(Arc::new(handler));
    }

    /// Passthrough to the peer connection state callback
    pub fn on_connection_state_change(
        &self,
        handler: impl Fn(RTCPeerConnectionState) + Send + Sync + 'static,
    ) {
        self.pc
            .on_peer_connection_state_change(Box::new(move |state| {
                handler(state);
                Box::pin(async {})
            }));
    }

    fn install_track_handler(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.pc.on_track(Box::new(move |track, _receiver, _transceiver| {
            let weak = weak.clone();
            Box::pin(async move {
                if let Some(transport) = weak.upgrade() {
                    transport.handle_remote_track(track).await;
                }
            })
        }));
    }

    fn install_ice_handler(self: &Arc<Self>) {
        let weak = Arc::downgrade(self);
        self.pc.on_ice_connection_state_change(Box::new(move |state| {
            let weak = weak.clone();
            Box::pin(async move {
                debug!("ice connection state: {}", state);
                match state {
                    RTCIceConnectionState::Disconnected => {
                        debug!("ice disconnected");
                    }
                    RTCIceConnectionState::Failed | RTCIceConnectionState::Closed => {
                        if let Some(transport) = weak.upgrade() {
                            Transport::close(transport.as_ref()).await;
                        }
                    }
                    _ => {}
                }
            })
        }));
    }

    /// Wrap a newly arrived remote track in a receiver and router, then let
    /// the session subscribe everyone else to it
    async fn handle_remote_track(self: &Arc<Self>, track: Arc<TrackRemote>) {
        let kind = match track.kind() {
            RTPCodecType::Video => TrackKind::Video,
            RTPCodecType::Audio => TrackKind::Audio,
            _ => return,
        };

        let info = TrackInfo {
            ssrc: track.ssrc(),
            id: track.id(),
            stream_id: track.stream_id(),
            kind,
            codec: track.codec().capability,
        };
        debug!(
            "transport {} got remote track id: {} ssrc: {}",
            self.id, info.id, info.ssrc
        );

        let source: Arc<dyn RtpReader> = Arc::new(RemoteTrackReader { track });
        let upstream: Arc<dyn RtcpWriter> = Arc::new(PeerRtcpWriter {
            pc: self.pc.clone(),
        });

        let receiver: Arc<dyn Receiver> = match kind {
            TrackKind::Video => {
                let receiver =
                    VideoReceiver::new(source, upstream, info.clone(), &self.receiver_config);
                self.spawn_rtcp_drain(receiver.clone());
                receiver
            }
            TrackKind::Audio => AudioReceiver::new(source, upstream, info.clone()),
        };

        let router = Router::new(self.id.clone(), receiver);
        self.session.add_router(&router).await;
        self.routers.write().await.insert(info.ssrc, router);

        let handler = self.on_track.lock().unwrap().clone();
        if let Some(handler) = handler {
            handler(info);
        }
    }

    /// Pump generated receiver feedback (REMB/PLI/TCC) up to the source peer
    fn spawn_rtcp_drain(&self, receiver: Arc<VideoReceiver>) {
        let pc = self.pc.clone();
        let shutdown = self.shutdown.clone();
        tokio::spawn(async move {
            loop {
                let pkt: RtcpPacket = tokio::select! {
                    _ = shutdown.cancelled() => return,
                    result = receiver.read_rtcp() => match result {
                        Ok(pkt) => pkt,
                        Err(_) => return,
                    },
                };
                if let Err(err) = pc.write_rtcp(&[pkt]).await {
                    debug!("write rtcp: {}", err);
                }
            }
        });
    }
}

#[async_trait]
impl Transport for WebRtcTransport {
    fn id(&self) -> &str {
        &self.id
    }

    async fn router(&self, ssrc: u32) -> Option<Arc<Router>> {
        self.routers.read().await.get(&ssrc).cloned()
    }

    async fn routers(&self) -> HashMap<u32, Arc<Router>> {
        self.routers.read().await.clone()
    }

    async fn new_sender(&self, track: &TrackInfo) -> Result<Arc<dyn Sender>> {
        let matches = self.codecs.codecs_by_name(track.codec_name());
        let Some(codec) = matches.first() else {
            return Err(Error::PayloadTypeNotSupported);
        };

        debug!(
            "creating sender track: pt {} ssrc {} id {} stream {}",
            codec.payload_type, track.ssrc, track.id, track.stream_id
        );

        let out_track = Arc::new(TrackLocalStaticRTP::new(
            codec.capability.clone(),
            track.id.clone(),
            track.stream_id.clone(),
        ));

        let rtp_sender = self
            .pc
            .add_track(out_track.clone() as Arc<dyn TrackLocal + Send + Sync>)
            .await?;

        Ok(WebRtcSender::new(out_track, rtp_sender))
    }

    fn negotiation_needed(&self) {
        let handler = self.negotiation_handler.lock().unwrap().clone();
        if let Some(handler) = handler {
            self.debouncer.call(move || handler());
        }
    }

    async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("transport {} close", self.id);

        self.shutdown.cancel();

        let routers: Vec<Arc<Router>> =
            self.routers.write().await.drain().map(|(_, r)| r).collect();
        for router in routers {
            router.close().await;
        }

        self.session.remove_transport(&self.id).await;

        if let Err(err) = self.pc.close().await {
            warn!("peer connection close: {}", err);
        }
    }

    async fn stats(&self) -> String {
        let mut info = format!("  peer: {}\n", self.id);
        let routers: Vec<Arc<Router>> =
            self.routers.read().await.values().cloned().collect();
        for router in routers {
            info += &router.stats().await;
        }
        info
    }
}

/// Inbound RTP straight off the remote track
struct RemoteTrackReader {
    track: Arc<TrackRemote>,
}

#[async_trait]
impl RtpReader for RemoteTrackReader {
    async fn read_rtp(&self) -> Result<RtpPacket> {
        let (pkt, _) = self.track.read_rtp().await?;
        Ok(pkt)
    }
}

/// RTCP sink writing to the source peer connection
struct PeerRtcpWriter {
    pc: Arc<RTCPeerConnection>,
}

#[async_trait]
impl RtcpWriter for PeerRtcpWriter {
    async fn write_rtcp(&self, pkt: RtcpPacket) -> Result<()> {
        self.pc.write_rtcp(&[pkt]).await?;
        Ok(())
    }
}
