/// Errors raised by the session core, the peer backends and the relay.
///
/// None of these is fatal to the process. Media errors are reported to the
/// UI, protocol and stale-negotiation errors are logged and the offending
/// message dropped, connectivity loss triggers standby regeneration and a
/// full room aborts the join.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("Media acquisition failed: {0}")]
    MediaAcquisition(String),

    #[error("Signaling protocol error: {0}")]
    SignalingProtocol(String),

    #[error("Stale negotiation signal: {0}")]
    NegotiationStale(String),

    #[error("Connectivity lost ({attempts} consecutive attempts)")]
    ConnectivityLost { attempts: u32 },

    #[error("Room is full")]
    RoomFull,

    #[error("Invalid state: {0}")]
    InvalidState(String),

    #[error("Invalid room token: {0}")]
    InvalidRoomToken(String),

    #[error("WebRTC error: {0}")]
    WebRtc(String),

    #[error("Transport error: {0}")]
    Transport(String),
}

impl Error {
    /// Errors that only mean "this message no longer applies" and are logged
    /// at debug level instead of warn.
    pub fn is_stale(&self) -> bool {
        matches!(self, Error::NegotiationStale(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(err: serde_json::Error) -> Self {
        Error::SignalingProtocol(format!("JSON error: {}", err))
    }
}

impl From<webrtc::Error> for Error {
    fn from(err: webrtc::Error) -> Self {
        Error::WebRtc(err.to_string())
    }
}

impl From<tokio_tungstenite::tungstenite::Error> for Error {
    fn from(err: tokio_tungstenite::tungstenite::Error) -> Self {
        Error::Transport(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, Error>;
