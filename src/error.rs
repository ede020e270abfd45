use thiserror::Error;

/// Errors terminating an NDT session.
///
/// Every variant is fatal for the current session; there is no retry, a
/// fresh [`Client::run`](crate::client::Client::run) call is required to
/// try again.
#[derive(Debug, Error)]
pub enum NdtError {
    /// A frame was illegal for the current state, carried an unknown
    /// type or test code, or was otherwise malformed.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// The server gave up on the session while it was queued.
    #[error("server rejected the session (SRV_QUEUE 9977)")]
    ServerRejected,
    /// An encoded body would overflow the 16-bit length field.
    #[error("message body too long: {0} bytes")]
    OversizeBody(usize),
    /// The control connection ended before the server logged us out.
    #[error("control connection closed unexpectedly")]
    ConnectionClosed,
    /// Transport failure on the control or a data connection.
    #[error("websocket error: {0}")]
    WebSocket(Box<tokio_tungstenite::tungstenite::Error>),
    /// Serializing the control envelope failed.
    #[error("serialize error: {0}")]
    Json(#[from] serde_json::Error),
    /// The configured host/port/path do not form a valid URL.
    #[error("bad server URL: {0}")]
    BadUrl(#[from] url::ParseError),
    /// I/O failure below the WebSocket layer.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

// reducing size of NdtError by putting large element in the Box
impl From<tokio_tungstenite::tungstenite::Error> for NdtError {
    fn from(e: tokio_tungstenite::tungstenite::Error) -> Self {
        NdtError::WebSocket(Box::new(e))
    }
}

/// Crate-local result alias.
pub type Result<T> = std::result::Result<T, NdtError>;
