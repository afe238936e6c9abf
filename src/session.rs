//! Session: the set of transports sharing one room
//!
//! Cross-subscribes new transports to existing routers and vice versa, and
//! reports emptiness to the SFU registry through the close hook.

use crate::router::Router;
use crate::transport::Transport;
use futures_util::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use tokio::sync::RwLock;
use tracing::{info, warn};

type CloseHandler = Box<dyn Fn() -> BoxFuture<'static, ()> + Send + Sync>;

/// One room of transports exchanging media
pub struct Session {
    id: String,
    transports: RwLock<HashMap<String, Arc<dyn Transport>>>,
    on_close: Mutex<Option<CloseHandler>>,
}

impl Session {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            transports: RwLock::new(HashMap::new()),
            on_close: Mutex::new(None),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Register a transport in this session
    pub async fn add_transport(&self, transport: Arc<dyn Transport>) {
        self.transports
            .write()
            .await
            .insert(transport.id().to_string(), transport);
    }

    /// Remove a transport; drop its senders from every remaining router and
    /// fire the close hook once when the session empties
    pub async fn remove_transport(&self, tid: &str) {
        let (remaining, became_empty) = {
            let mut transports = self.transports.write().await;
            transports.remove(tid);
            (
                transports.values().cloned().collect::<Vec<_>>(),
                transports.is_empty(),
            )
        };

        for transport in remaining {
            for (_, router) in transport.routers().await {
                router.del_sender(tid).await;
            }
        }

        if became_empty {
            let handler = self.on_close.lock().unwrap().take();
            if let Some(handler) = handler {
                handler().await;
            }
        }
    }

    /// Subscribe every other transport to `router`'s track
    pub async fn add_router(&self, router: &Arc<Router>) {
        let transports: Vec<Arc<dyn Transport>> =
            self.transports.read().await.values().cloned().collect();

        for transport in transports {
            if transport.id() == router.id() {
                continue;
            }

            info!(
                "subscribing {} to router ssrc {}",
                transport.id(),
                router.track().ssrc
            );

            match transport.new_sender(router.track()).await {
                Ok(sender) => {
                    router.add_sender(transport.id(), sender).await;
                    transport.negotiation_needed();
                }
                Err(err) => {
                    warn!("error subscribing transport to router: {}", err);
                    continue;
                }
            }
        }
    }

    /// Snapshot of current membership
    pub async fn transports(&self) -> HashMap<String, Arc<dyn Transport>> {
        self.transports.read().await.clone()
    }

    /// Install the hook fired when the last transport leaves
    pub fn on_close(&self, handler: CloseHandler) {
        *self.on_close.lock().unwrap() = Some(handler);
    }

    pub async fn stats(&self) -> String {
        let mut info = format!("\nsession: {}\n", self.id);
        let transports: Vec<Arc<dyn Transport>> =
            self.transports.read().await.values().cloned().collect();
        for transport in transports {
            info += &transport.stats().await;
        }
        info
    }
}
