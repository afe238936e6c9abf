//! Configuration types for the SFU

use serde::{Deserialize, Serialize};

/// Top-level SFU configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// ICE / peer connection parameters
    pub webrtc: WebRtcConfig,

    /// Receiver-side feedback parameters
    pub receiver: ReceiverConfig,
}

/// ICE parameters shared by every peer connection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WebRtcConfig {
    /// Ephemeral UDP port range `[low, high]` for ICE, `None` = OS default
    pub ice_port_range: Option<(u16, u16)>,

    /// ICE servers; a single Google STUN server is used when empty
    pub ice_servers: Vec<IceServerConfig>,
}

/// One STUN/TURN server entry
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct IceServerConfig {
    pub urls: Vec<String>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub credential: String,
}

/// Receiver configuration per track kind
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ReceiverConfig {
    pub video: VideoReceiverConfig,
}

/// Feedback cadence and buffering for video receivers
///
/// A cycle of 0 disables that feedback generator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VideoReceiverConfig {
    /// REMB interval in seconds
    pub remb_cycle: u64,

    /// PLI interval in seconds
    pub pli_cycle: u64,

    /// Transport-wide congestion control feedback interval in seconds
    pub tcc_cycle: u64,

    /// REMB bandwidth cap in kbps
    pub max_bandwidth: u64,

    /// How long replay-buffer packets stay retrievable, in milliseconds
    pub max_buffer_time: u64,
}

impl Default for VideoReceiverConfig {
    fn default() -> Self {
        Self {
            remb_cycle: 2,
            pli_cycle: 1,
            tcc_cycle: 1,
            max_bandwidth: 1000,
            max_buffer_time: 1000,
        }
    }
}
