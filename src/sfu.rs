//! Process-wide session registry

use crate::config::Config;
use crate::error::Result;
use crate::session::Session;
use crate::transport::WebRtcTransport;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tracing::{debug, info};
use webrtc::peer_connection::sdp::session_description::RTCSessionDescription;

const STAT_CYCLE: Duration = Duration::from_secs(6);

type SessionMap = Arc<RwLock<HashMap<String, Arc<Session>>>>;

/// Registry of sessions plus the shared WebRTC configuration
pub struct Sfu {
    config: Config,
    sessions: SessionMap,
}

impl Sfu {
    /// Create the SFU and start its stats task
    ///
    /// Panics on an inverted ICE port range; that is a startup-time
    /// programmer error, not a runtime condition.
    pub fn new(config: Config) -> Arc<Self> {
        if let Some((low, high)) = config.webrtc.ice_port_range {
            assert!(
                low <= high,
                "invalid ICE port range: {low} > {high}"
            );
        }

        let sfu = Arc::new(Self {
            config,
            sessions: Arc::new(RwLock::new(HashMap::new())),
        });

        tokio::spawn(run_stats(sfu.sessions.clone()));

        sfu
    }

    /// Look up a session by id
    pub async fn session(&self, sid: &str) -> Option<Arc<Session>> {
        self.sessions.read().await.get(sid).cloned()
    }

    /// Create a transport that is a member of session `sid`, creating the
    /// session on first join
    pub async fn new_webrtc_transport(
        &self,
        sid: &str,
        offer: &RTCSessionDescription,
    ) -> Result<Arc<WebRtcTransport>> {
        let session = self.get_or_create_session(sid).await;
        WebRtcTransport::new(
            session,
            offer,
            &self.config.webrtc,
            self.config.receiver.video.clone(),
        )
        .await
    }

    async fn get_or_create_session(&self, sid: &str) -> Arc<Session> {
        let mut sessions = self.sessions.write().await;
        if let Some(session) = sessions.get(sid) {
            return session.clone();
        }

        let session = Arc::new(Session::new(sid));
        let registry = self.sessions.clone();
        let session_id = sid.to_string();
        session.on_close(Box::new(move || {
            let registry = registry.clone();
            let session_id = session_id.clone();
            Box::pin(async move {
                registry.write().await.remove(&session_id);
                debug!("session {} removed", session_id);
            })
        }));

        sessions.insert(sid.to_string(), session.clone());
        session
    }
}

/// Periodically log a formatted snapshot of every session
async fn run_stats(sessions: SessionMap) {
    let mut ticker = tokio::time::interval(STAT_CYCLE);
    ticker.tick().await;

    loop {
        ticker.tick().await;

        let snapshot: Vec<Arc<Session>> = sessions.read().await.values().cloned().collect();
        if snapshot.is_empty() {
            continue;
        }

        let mut info = "\n----------------stats-----------------\n".to_string();
        for session in snapshot {
            info += &session.stats().await;
        }
        info!("{}", info);
    }
}
