//! Per-connection JSON-RPC dispatch
//!
//! One WebSocket connection carries one participant: `join` binds a peer,
//! `offer`/`answer`/`trickle` drive renegotiation and ICE. Every failure is
//! reported as an opaque code-500 JSON-RPC error and the connection stays
//! usable.

use super::protocol::{JsonRpcError, JsonRpcRequest, JsonRpcResponse, Join, Negotiation, Trickle};
use crate::error::{Error, Result};
use crate::sfu::Sfu;
use crate::transport::{Transport, WebRtcTransport};
use futures_util::{SinkExt, StreamExt};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio_tungstenite::{accept_async, tungstenite::Message};
use tracing::{debug, error, info, warn};

/// Delay before the unconditional post-join server offer. Forces
/// renegotiation for subscriber tracks added while the join answer was in
/// flight.
const POST_JOIN_OFFER_DELAY: Duration = Duration::from_millis(1000);

const OUTBOUND_CHANNEL_SIZE: usize = 64;

/// Service one signaling connection until it disconnects
pub async fn handle_connection(stream: TcpStream, sfu: Arc<Sfu>) -> Result<()> {
    let ws = accept_async(stream).await?;
    let (mut sink, mut stream) = ws.split();

    let (out_tx, mut out_rx) = mpsc::channel::<Message>(OUTBOUND_CHANNEL_SIZE);
    let writer = tokio::spawn(async move {
        while let Some(msg) = out_rx.recv().await {
            if sink.send(msg).await.is_err() {
                break;
            }
        }
    });

    let mut peer: Option<Arc<WebRtcTransport>> = None;

    while let Some(msg) = stream.next().await {
        let msg = match msg {
            Ok(msg) => msg,
            Err(err) => {
                debug!("websocket read: {}", err);
                break;
            }
        };

        let text = match msg {
            Message::Text(text) => text,
            Message::Ping(payload) => {
                let _ = out_tx.send(Message::Pong(payload)).await;
                continue;
            }
            Message::Close(_) => break,
            _ => continue,
        };

        let req: JsonRpcRequest = match serde_json::from_str(&text) {
            Ok(req) => req,
            Err(err) => {
                warn!("invalid json-rpc message: {}", err);
                continue;
            }
        };

        handle_request(&sfu, &out_tx, &mut peer, req).await;
    }

    if let Some(peer) = peer.take() {
        info!("closing peer {}", peer.id());
        Transport::close(peer.as_ref()).await;
    }
    writer.abort();

    Ok(())
}

async fn handle_request(
    sfu: &Arc<Sfu>,
    out: &mpsc::Sender<Message>,
    peer: &mut Option<Arc<WebRtcTransport>>,
    req: JsonRpcRequest,
) {
    match req.method.as_str() {
        "join" => handle_join(sfu, out, peer, req).await,
        "offer" => handle_offer(out, peer, req).await,
        "answer" => handle_answer(out, peer, req).await,
        "trickle" => handle_trickle(out, peer, req).await,
        other => {
            warn!("unknown method: {}", other);
            reply_error(out, req.id, format!("unknown method: {other}")).await;
        }
    }
}

async fn handle_join(
    sfu: &Arc<Sfu>,
    out: &mpsc::Sender<Message>,
    peer: &mut Option<Arc<WebRtcTransport>>,
    req: JsonRpcRequest,
) {
    if peer.is_some() {
        error!("join: peer already exists for connection");
        reply_error(out, req.id, Error::PeerAlreadyExists).await;
        return;
    }

    let join: Join = match serde_json::from_value(req.params) {
        Ok(join) => join,
        Err(err) => {
            error!("join: error parsing offer: {}", err);
            reply_error(out, req.id, err).await;
            return;
        }
    };

    let transport = match sfu.new_webrtc_transport(&join.sid, &join.offer).await {
        Ok(transport) => transport,
        Err(err) => {
            error!("join: error creating peer: {}", err);
            reply_error(out, req.id, err).await;
            return;
        }
    };

    info!("peer {} join session {}", transport.id(), join.sid);

    if let Err(err) = transport.set_remote_description(join.offer).await {
        error!("join: set remote description: {}", err);
        reply_error(out, req.id, err).await;
        return;
    }

    let answer = match transport.create_answer().await {
        Ok(answer) => answer,
        Err(err) => {
            error!("join: create answer: {}", err);
            reply_error(out, req.id, err).await;
            return;
        }
    };

    if let Err(err) = transport.set_local_description(answer.clone()).await {
        error!("join: set local description: {}", err);
        reply_error(out, req.id, err).await;
        return;
    }

    // Trickle candidates down to the client; null marks gathering complete.
    let trickle_tx = out.clone();
    transport.on_ice_candidate(move |candidate| {
        let params = match serde_json::to_value(&candidate) {
            Ok(params) => params,
            Err(err) => {
                error!("error encoding trickle candidate: {}", err);
                return;
            }
        };
        let tx = trickle_tx.clone();
        tokio::spawn(async move {
            notify(&tx, "trickle", params).await;
        });
    });

    // Server-initiated renegotiation when the session wires in new tracks.
    let weak = Arc::downgrade(&transport);
    let offer_tx = out.clone();
    transport.on_negotiation_needed(move || {
        debug!("negotiation needed");
        let Some(transport) = weak.upgrade() else {
            return;
        };
        let tx = offer_tx.clone();
        tokio::spawn(async move {
            push_server_offer(transport, tx).await;
        });
    });

    *peer = Some(transport.clone());

    match serde_json::to_value(&answer) {
        Ok(result) => reply_result(out, req.id, result).await,
        Err(err) => reply_error(out, req.id, err).await,
    }

    // Force one renegotiation after the join settles, in case subscriber
    // tracks were added while the answer was in flight.
    let tx = out.clone();
    tokio::spawn(async move {
        tokio::time::sleep(POST_JOIN_OFFER_DELAY).await;
        push_server_offer(transport, tx).await;
    });
}

async fn handle_offer(
    out: &mpsc::Sender<Message>,
    peer: &mut Option<Arc<WebRtcTransport>>,
    req: JsonRpcRequest,
) {
    let Some(transport) = peer.as_ref() else {
        error!("offer: no peer exists for connection");
        reply_error(out, req.id, Error::NoPeerExists).await;
        return;
    };

    info!("peer {} offer", transport.id());

    let negotiation: Negotiation = match serde_json::from_value(req.params) {
        Ok(negotiation) => negotiation,
        Err(err) => {
            error!("offer: error parsing offer: {}", err);
            reply_error(out, req.id, err).await;
            return;
        }
    };

    if let Err(err) = transport.set_remote_description(negotiation.desc).await {
        error!("offer: set remote description: {}", err);
        reply_error(out, req.id, err).await;
        return;
    }

    let answer = match transport.create_answer().await {
        Ok(answer) => answer,
        Err(err) => {
            error!("offer: create answer: {}", err);
            reply_error(out, req.id, err).await;
            return;
        }
    };

    if let Err(err) = transport.set_local_description(answer.clone()).await {
        error!("offer: set local description: {}", err);
        reply_error(out, req.id, err).await;
        return;
    }

    match serde_json::to_value(&answer) {
        Ok(result) => reply_result(out, req.id, result).await,
        Err(err) => reply_error(out, req.id, err).await,
    }
}

async fn handle_answer(
    out: &mpsc::Sender<Message>,
    peer: &mut Option<Arc<WebRtcTransport>>,
    req: JsonRpcRequest,
) {
    let Some(transport) = peer.as_ref() else {
        error!("answer: no peer exists for connection");
        reply_error(out, req.id, Error::NoPeerExists).await;
        return;
    };

    info!("peer {} answer", transport.id());

    let negotiation: Negotiation = match serde_json::from_value(req.params) {
        Ok(negotiation) => negotiation,
        Err(err) => {
            error!("answer: error parsing answer: {}", err);
            reply_error(out, req.id, err).await;
            return;
        }
    };

    if let Err(err) = transport.set_remote_description(negotiation.desc).await {
        error!("answer: set remote description: {}", err);
    }
}

async fn handle_trickle(
    out: &mpsc::Sender<Message>,
    peer: &mut Option<Arc<WebRtcTransport>>,
    req: JsonRpcRequest,
) {
    let Some(transport) = peer.as_ref() else {
        error!("trickle: no peer exists for connection");
        reply_error(out, req.id, Error::NoPeerExists).await;
        return;
    };

    debug!("peer {} trickle", transport.id());

    let trickle: Trickle = match serde_json::from_value(req.params) {
        Ok(trickle) => trickle,
        Err(err) => {
            error!("trickle: error parsing candidate: {}", err);
            reply_error(out, req.id, err).await;
            return;
        }
    };

    if let Err(err) = transport.add_ice_candidate(trickle.candidate).await {
        error!("error adding ice candidate: {}", err);
    }
}

/// Create a fresh local offer and push it as an `offer` notification
async fn push_server_offer(transport: Arc<WebRtcTransport>, out: mpsc::Sender<Message>) {
    let offer = match transport.create_offer().await {
        Ok(offer) => offer,
        Err(err) => {
            error!("create offer: {}", err);
            return;
        }
    };

    if let Err(err) = transport.set_local_description(offer.clone()).await {
        error!("set local description: {}", err);
        return;
    }

    match serde_json::to_value(&offer) {
        Ok(params) => notify(&out, "offer", params).await,
        Err(err) => error!("error encoding offer: {}", err),
    }
}

async fn reply_result(
    out: &mpsc::Sender<Message>,
    id: Option<serde_json::Value>,
    result: serde_json::Value,
) {
    let Some(id) = id else { return };
    let response = JsonRpcResponse::new(result, id);
    send_json(out, &response).await;
}

async fn reply_error(
    out: &mpsc::Sender<Message>,
    id: Option<serde_json::Value>,
    err: impl std::fmt::Display,
) {
    let Some(id) = id else { return };
    let response = JsonRpcError::new(err.to_string(), id);
    send_json(out, &response).await;
}

async fn notify(out: &mpsc::Sender<Message>, method: &str, params: serde_json::Value) {
    let note = JsonRpcRequest::notification(method, params);
    send_json(out, &note).await;
}

async fn send_json<T: serde::Serialize>(out: &mpsc::Sender<Message>, payload: &T) {
    match serde_json::to_string(payload) {
        Ok(text) => {
            if out.send(Message::Text(text)).await.is_err() {
                debug!("outbound channel closed");
            }
        }
        Err(err) => error!("error encoding message: {}", err),
    }
}
