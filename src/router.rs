//! Per-track RTP/RTCP router
//!
//! One router per inbound track: pumps RTP from its receiver to every
//! subscribed sender and services per-sender RTCP feedback, answering NACKs
//! from the replay buffer when it can.

use crate::error::Error;
use crate::media::{Receiver, Sender, TrackInfo};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use webrtc::rtcp::transport_feedbacks::transport_layer_nack::{NackPair, TransportLayerNack};

/// Fan-out node owning one receiver and the senders subscribed to it
pub struct Router {
    tid: String,
    receiver: Arc<dyn Receiver>,
    senders: RwLock<HashMap<String, Arc<dyn Sender>>>,
    shutdown: CancellationToken,
    closed: AtomicBool,
}

impl Router {
    /// Create a router for `receiver` sourced from transport `tid` and start
    /// its forward loop
    pub fn new(tid: impl Into<String>, receiver: Arc<dyn Receiver>) -> Arc<Self> {
        let router = Arc::new(Self {
            tid: tid.into(),
            receiver,
            senders: RwLock::new(HashMap::new()),
            shutdown: CancellationToken::new(),
            closed: AtomicBool::new(false),
        });

        tokio::spawn(run_forward(router.clone()));

        router
    }

    /// Id of the transport this router's track originates from
    pub fn id(&self) -> &str {
        &self.tid
    }

    pub fn track(&self) -> &TrackInfo {
        self.receiver.track()
    }

    /// Subscribe `sender` under the subscriber transport id `tid`
    ///
    /// Refused after close: the sender is closed instead of registered.
    pub async fn add_sender(self: &Arc<Self>, tid: impl Into<String>, sender: Arc<dyn Sender>) {
        if self.shutdown.is_cancelled() {
            sender.close().await;
            return;
        }

        let tid = tid.into();
        self.senders.write().await.insert(tid.clone(), sender.clone());

        tokio::spawn(run_feedback(self.clone(), tid, sender));
    }

    /// Drop and close the sender for subscriber `tid`, if any
    pub async fn del_sender(&self, tid: &str) {
        let removed = self.senders.write().await.remove(tid);
        if let Some(sender) = removed {
            sender.close().await;
        }
    }

    pub async fn sender_count(&self) -> usize {
        self.senders.read().await.len()
    }

    pub async fn has_sender(&self, tid: &str) -> bool {
        self.senders.read().await.contains_key(tid)
    }

    /// Terminal. Closes every sender and the receiver exactly once.
    pub async fn close(&self) {
        if self.closed.swap(true, Ordering::SeqCst) {
            return;
        }
        debug!("router {} ssrc {} close", self.tid, self.track().ssrc);

        self.shutdown.cancel();

        let senders: Vec<Arc<dyn Sender>> =
            self.senders.write().await.drain().map(|(_, s)| s).collect();
        for sender in senders {
            sender.close().await;
        }
        self.receiver.close();
    }

    pub async fn stats(&self) -> String {
        let track = self.track();
        let mut info = format!(
            "    track router id: {} ssrc: {} | {}\n",
            track.id,
            track.ssrc,
            self.receiver.stats()
        );

        let senders = self.senders.read().await;
        if senders.len() < 6 {
            for (tid, sender) in senders.iter() {
                info += &format!("      sender: {} | {}\n", tid, sender.stats());
            }
        } else {
            info += &format!("      senders: {}\n", senders.len());
        }

        info
    }
}

/// Pump RTP from the receiver to every current sender, in source order
async fn run_forward(router: Arc<Router>) {
    loop {
        let pkt = tokio::select! {
            _ = router.shutdown.cancelled() => return,
            result = router.receiver.read_rtp() => match result {
                Ok(pkt) => pkt,
                Err(Error::ReceiverClosed) => {
                    router.close().await;
                    return;
                }
                Err(err) => {
                    debug!("receiver read error: {}", err);
                    continue;
                }
            },
        };

        let senders: Vec<Arc<dyn Sender>> =
            router.senders.read().await.values().cloned().collect();
        for sender in senders {
            if let Err(err) = sender.write_rtp(&pkt).await {
                debug!("sender write error: {}", err);
            }
        }
    }
}

/// Service RTCP from one sender: answer NACKs locally when the replay buffer
/// has the packet, relay everything else to the receiver
async fn run_feedback(router: Arc<Router>, tid: String, sender: Arc<dyn Sender>) {
    loop {
        let pkts = tokio::select! {
            _ = router.shutdown.cancelled() => return,
            result = sender.read_rtcp() => match result {
                Ok(pkts) => pkts,
                // Subscriber is gone.
                Err(_) => return,
            },
        };

        for pkt in pkts {
            if let Some(nack) = pkt.as_any().downcast_ref::<TransportLayerNack>() {
                for pair in &nack.nacks {
                    if let Some(buffered) = router.receiver.get_packet(pair.packet_id) {
                        // Serve the retransmission locally, only to the
                        // sender that asked.
                        if let Err(err) = sender.write_rtp(&buffered).await {
                            debug!("retransmit to {} failed: {}", tid, err);
                        }
                        continue;
                    }

                    let relay = TransportLayerNack {
                        sender_ssrc: nack.sender_ssrc,
                        media_ssrc: nack.media_ssrc,
                        nacks: vec![NackPair {
                            packet_id: pair.packet_id,
                            lost_packets: 0,
                        }],
                    };
                    if let Err(err) = router.receiver.write_rtcp(Box::new(relay)).await {
                        warn!("nack relay failed: {}", err);
                    }
                }
            } else if let Err(err) = router.receiver.write_rtcp(pkt).await {
                warn!("rtcp relay failed: {}", err);
            }
        }
    }
}
