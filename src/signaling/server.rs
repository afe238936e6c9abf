//! WebSocket signaling server
//!
//! Accepts connections and services each one with the JSON-RPC handler.

use super::handler::handle_connection;
use crate::error::Result;
use crate::sfu::Sfu;
use std::sync::Arc;
use tokio::net::TcpListener;
use tracing::{debug, info, warn};

/// WebSocket front door for signaling
pub struct SignalingServer {
    sfu: Arc<Sfu>,
}

impl SignalingServer {
    pub fn new(sfu: Arc<Sfu>) -> Self {
        Self { sfu }
    }

    /// Bind `addr` and serve connections until the task is dropped
    pub async fn run(&self, addr: &str) -> Result<()> {
        let listener = TcpListener::bind(addr).await?;
        info!("signaling listening on ws://{}", listener.local_addr()?);

        loop {
            let (stream, peer_addr) = listener.accept().await?;
            debug!("accepted connection from {}", peer_addr);

            let sfu = self.sfu.clone();
            tokio::spawn(async move {
                if let Err(err) = handle_connection(stream, sfu).await {
                    warn!("connection {}: {}", peer_addr, err);
                }
            });
        }
    }
}
