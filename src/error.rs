//! Error types for the SFU core

/// Result type alias using the SFU [`Error`]
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while routing media or servicing signaling
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// The remote offer could not be parsed into a codec table
    #[error("sdp parse failed")]
    SdpParseFailed,

    /// The underlying stack refused the peer connection configuration
    #[error("peer connection init failed")]
    PeerConnectionInitFailed,

    /// A subscriber cannot carry the source track's codec
    #[error("payload type not supported")]
    PayloadTypeNotSupported,

    /// A peer is already bound to this signaling connection
    #[error("peer already exists")]
    PeerAlreadyExists,

    /// No peer is bound to this signaling connection yet
    #[error("no peer exists")]
    NoPeerExists,

    /// The receiver was closed while a read was pending
    #[error("receiver closed")]
    ReceiverClosed,

    /// The sender was closed while a read was pending
    #[error("sender closed")]
    SenderClosed,

    /// Invalid configuration parameter
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// WebRTC library error
    #[error("webrtc error: {0}")]
    WebRtc(#[from] webrtc::Error),

    /// WebSocket transport error
    #[error("websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Serialization/deserialization error
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// I/O error
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}
