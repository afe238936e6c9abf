//! WebSocket-driving harness for signaling tests
//!
//! Boots the real JSON-RPC connection handler behind a loopback listener
//! and talks to it with a tokio-tungstenite client, the way a conferencing
//! client would.

use futures_util::{SinkExt, StreamExt};
use rtc_sfu::signaling::handler::handle_connection;
use rtc_sfu::{Config, Sfu};
use serde_json::{json, Value};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::{connect_async, tungstenite::Message, MaybeTlsStream, WebSocketStream};
use webrtc::api::media_engine::MediaEngine;
use webrtc::api::APIBuilder;
use webrtc::peer_connection::configuration::RTCConfiguration;
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;
use webrtc::rtp_transceiver::rtp_codec::RTPCodecType;

/// Produce a realistic remote offer using a scratch peer connection
pub async fn remote_offer(audio: bool, video: bool) -> RTCSessionDescription {
    let mut media_engine = MediaEngine::default();
    media_engine.register_default_codecs().unwrap();
    let api = APIBuilder::new().with_media_engine(media_engine).build();
    let pc = api
        .new_peer_connection(RTCConfiguration::default())
        .await
        .unwrap();

    if audio {
        pc.add_transceiver_from_kind(RTPCodecType::Audio, None)
            .await
            .unwrap();
    }
    if video {
        pc.add_transceiver_from_kind(RTPCodecType::Video, None)
            .await
            .unwrap();
    }

    pc.create_offer(None).await.unwrap()
}

/// Signaling server running the real connection handler on a loopback port
pub struct SignalingHarness {
    pub sfu: Arc<Sfu>,
    addr: SocketAddr,
}

impl SignalingHarness {
    pub async fn start() -> Self {
        let sfu = Sfu::new(Config::default());
        let listener = TcpListener::bind("127.0.0.1:0").await.expect("bind loopback");
        let addr = listener.local_addr().expect("local addr");

        let accept_sfu = sfu.clone();
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                let sfu = accept_sfu.clone();
                tokio::spawn(async move {
                    let _ = handle_connection(stream, sfu).await;
                });
            }
        });

        Self { sfu, addr }
    }

    pub async fn connect(&self) -> SignalingClient {
        let (ws, _) = connect_async(format!("ws://{}", self.addr))
            .await
            .expect("websocket connect");
        SignalingClient { ws }
    }
}

/// One participant's signaling connection
pub struct SignalingClient {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
}

impl SignalingClient {
    /// Send a JSON-RPC request
    pub async fn request(&mut self, method: &str, params: Value, id: u64) {
        let msg = json!({
            "jsonrpc": "2.0",
            "method": method,
            "params": params,
            "id": id,
        });
        self.ws
            .send(Message::Text(msg.to_string()))
            .await
            .expect("send request");
    }

    pub async fn join(&mut self, sid: &str, offer: &RTCSessionDescription, id: u64) {
        self.request("join", json!({"sid": sid, "offer": offer}), id)
            .await;
    }

    /// Next message passing `pred`; everything else (trickle notifications
    /// and the like) is discarded
    pub async fn next_matching(&mut self, pred: impl Fn(&Value) -> bool) -> Value {
        loop {
            let msg = self
                .ws
                .next()
                .await
                .expect("connection open")
                .expect("read frame");
            let Message::Text(text) = msg else { continue };
            let value: Value = serde_json::from_str(&text).expect("json frame");
            if pred(&value) {
                return value;
            }
        }
    }

    /// Response (success or error) to request `id`
    pub async fn response(&mut self, id: u64) -> Value {
        self.next_matching(|v| v.get("id").and_then(Value::as_u64) == Some(id))
            .await
    }

    /// Next server notification carrying `method`
    pub async fn notification(&mut self, method: &str) -> Value {
        self.next_matching(|v| {
            v.get("method").and_then(Value::as_str) == Some(method) && v.get("id").is_none()
        })
        .await
    }

    pub async fn close(mut self) {
        let _ = self.ws.close(None).await;
    }
}
